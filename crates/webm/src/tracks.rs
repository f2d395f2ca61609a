use bytes::Bytes;
use media_types::{
    AudioCodec, AudioStreamInfo, Resolution, TextStreamInfo, VideoCodec, VideoStreamInfo,
};
use rustc_hash::FxHashSet;
use tracing::debug;

use crate::ebml::{self, children, complete_element};
use crate::{Result, WebMError, ids};

/// Sample timestamps produced by this crate are in microseconds.
pub const WEBM_TIMESCALE: u32 = 1_000_000;

const DEFAULT_SAMPLING_FREQUENCY: f64 = 8000.0;
const DEFAULT_SAMPLE_BITS: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
    Text,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VideoSettings {
    pub pixel_width: Option<u32>,
    pub pixel_height: Option<u32>,
    pub display_width: Option<u32>,
    pub display_height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioSettings {
    pub sampling_frequency: f64,
    pub output_sampling_frequency: Option<f64>,
    pub channels: u64,
    pub bit_depth: Option<u64>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sampling_frequency: DEFAULT_SAMPLING_FREQUENCY,
            output_sampling_frequency: None,
            channels: 1,
            bit_depth: None,
        }
    }
}

/// One `TrackEntry`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackEntry {
    pub number: u64,
    pub uid: Option<u64>,
    pub track_type: u64,
    pub codec_id: String,
    pub codec_private: Bytes,
    /// Nanoseconds per frame.
    pub default_duration_ns: Option<u64>,
    pub language: Option<String>,
    pub name: Option<String>,
    pub codec_delay_ns: u64,
    pub seek_preroll_ns: u64,
    pub video: Option<VideoSettings>,
    pub audio: Option<AudioSettings>,
    /// `ContentEncKeyID` of the track's encryption encoding.
    pub encryption_key_id: Option<Bytes>,
}

impl TrackEntry {
    fn parse(payload: &[u8]) -> Result<Self> {
        let mut entry = Self::default();
        let mut number = None;
        let mut track_type = None;

        for child in children(payload) {
            let (id, value) = child?;
            match id {
                ids::TRACK_NUMBER => number = Some(ebml::read_uint(id, value)?),
                ids::TRACK_UID => entry.uid = Some(ebml::read_uint(id, value)?),
                ids::TRACK_TYPE => track_type = Some(ebml::read_uint(id, value)?),
                ids::CODEC_ID => entry.codec_id = ebml::read_string(id, value)?,
                ids::CODEC_PRIVATE => entry.codec_private = Bytes::copy_from_slice(value),
                ids::DEFAULT_DURATION => {
                    entry.default_duration_ns = Some(ebml::read_uint(id, value)?)
                }
                ids::LANGUAGE => entry.language = Some(ebml::read_string(id, value)?),
                ids::NAME => entry.name = Some(ebml::read_string(id, value)?),
                ids::CODEC_DELAY => entry.codec_delay_ns = ebml::read_uint(id, value)?,
                ids::SEEK_PRE_ROLL => entry.seek_preroll_ns = ebml::read_uint(id, value)?,
                ids::VIDEO => entry.video = Some(parse_video(value)?),
                ids::AUDIO => entry.audio = Some(parse_audio(value)?),
                ids::CONTENT_ENCODINGS => entry.encryption_key_id = parse_encryption_key_id(value)?,
                _ => {}
            }
        }

        entry.number = number.ok_or(WebMError::MissingElement {
            parent: ids::TRACK_ENTRY,
            id: ids::TRACK_NUMBER,
        })?;
        if entry.number == 0 {
            return Err(WebMError::InvalidValue {
                id: ids::TRACK_NUMBER,
                reason: "track number must be non-zero",
            });
        }
        entry.track_type = track_type.ok_or(WebMError::MissingElement {
            parent: ids::TRACK_ENTRY,
            id: ids::TRACK_TYPE,
        })?;

        Ok(entry)
    }

    pub fn kind(&self) -> Option<TrackKind> {
        match self.track_type {
            ids::TRACK_TYPE_AUDIO => Some(TrackKind::Audio),
            ids::TRACK_TYPE_VIDEO => Some(TrackKind::Video),
            ids::TRACK_TYPE_SUBTITLE => Some(TrackKind::Text),
            _ => None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_key_id.is_some()
    }

    /// Default frame duration in microseconds. Zero is treated as absent.
    pub fn default_duration_us(&self) -> Option<i64> {
        self.default_duration_ns
            .filter(|&ns| ns > 0)
            .map(|ns| (ns / 1000) as i64)
    }

    fn track_id(&self) -> Result<u32> {
        u32::try_from(self.number).map_err(|_| WebMError::InvalidValue {
            id: ids::TRACK_NUMBER,
            reason: "track number does not fit 32 bits",
        })
    }

    pub fn audio_codec(&self) -> Result<AudioCodec> {
        match self.codec_id.as_str() {
            "A_OPUS" => Ok(AudioCodec::Opus),
            "A_VORBIS" => Ok(AudioCodec::Vorbis),
            id if id == "A_AAC" || id.starts_with("A_AAC/") => Ok(AudioCodec::Aac),
            _ => Err(WebMError::UnsupportedCodec(self.codec_id.clone())),
        }
    }

    pub fn video_codec(&self) -> Result<VideoCodec> {
        match self.codec_id.as_str() {
            "V_VP8" => Ok(VideoCodec::Vp8),
            "V_VP9" => Ok(VideoCodec::Vp9),
            "V_AV1" => Ok(VideoCodec::Av1),
            "V_MPEG4/ISO/AVC" => Ok(VideoCodec::H264),
            "V_MPEGH/ISO/HEVC" => Ok(VideoCodec::H265),
            _ => Err(WebMError::UnsupportedCodec(self.codec_id.clone())),
        }
    }

    pub fn audio_stream_info(&self) -> Result<AudioStreamInfo> {
        let codec = self.audio_codec()?;
        let settings = self.audio.clone().unwrap_or_default();

        let frequency = settings
            .output_sampling_frequency
            .unwrap_or(settings.sampling_frequency);
        if !frequency.is_finite() || frequency <= 0.0 || frequency > f64::from(u32::MAX) {
            return Err(WebMError::InvalidValue {
                id: ids::SAMPLING_FREQUENCY,
                reason: "sampling frequency out of range",
            });
        }
        let num_channels = u8::try_from(settings.channels)
            .ok()
            .filter(|&channels| channels > 0)
            .ok_or(WebMError::InvalidValue {
                id: ids::CHANNELS,
                reason: "channel count must be between 1 and 255",
            })?;
        let sample_bits = match settings.bit_depth {
            Some(bits) => u8::try_from(bits).map_err(|_| WebMError::InvalidValue {
                id: ids::BIT_DEPTH,
                reason: "bit depth out of range",
            })?,
            None => DEFAULT_SAMPLE_BITS,
        };

        let codec_string = match codec {
            AudioCodec::Aac => {
                // AudioSpecificConfig starts with a 5-bit object type.
                let object_type = self
                    .codec_private
                    .first()
                    .map(|b| b >> 3)
                    .filter(|&aot| aot != 0)
                    .unwrap_or(2);
                format!("mp4a.40.{object_type}")
            }
            other => other.as_str().to_owned(),
        };

        Ok(AudioStreamInfo {
            track_id: self.track_id()?,
            time_scale: WEBM_TIMESCALE,
            duration: None,
            codec,
            codec_string,
            language: self.language.clone(),
            sample_bits,
            num_channels,
            sampling_frequency: frequency as u32,
            extra_data: self.codec_private.clone(),
            codec_delay_ns: self.codec_delay_ns,
            seek_preroll_ns: self.seek_preroll_ns,
            encryption_key_id: self.encryption_key_id.clone(),
        })
    }

    pub fn video_stream_info(&self) -> Result<VideoStreamInfo> {
        let codec = self.video_codec()?;
        let settings = self.video.clone().unwrap_or_default();

        let width = settings.pixel_width.ok_or(WebMError::MissingElement {
            parent: ids::VIDEO,
            id: ids::PIXEL_WIDTH,
        })?;
        let height = settings.pixel_height.ok_or(WebMError::MissingElement {
            parent: ids::VIDEO,
            id: ids::PIXEL_HEIGHT,
        })?;
        let resolution = Resolution::new(width, height);
        let display = Resolution::new(
            settings.display_width.unwrap_or(width),
            settings.display_height.unwrap_or(height),
        );

        let codec_string = match codec {
            VideoCodec::H264 if self.codec_private.len() >= 4 => {
                // AVCDecoderConfigurationRecord: profile, compatibility, level.
                let p = &self.codec_private;
                format!("avc1.{:02x}{:02x}{:02x}", p[1], p[2], p[3])
            }
            other => other.as_str().to_owned(),
        };

        Ok(VideoStreamInfo {
            track_id: self.track_id()?,
            time_scale: WEBM_TIMESCALE,
            duration: None,
            codec,
            codec_string,
            language: self.language.clone(),
            resolution,
            display_resolution: (display != resolution).then_some(display),
            extra_data: self.codec_private.clone(),
            encryption_key_id: self.encryption_key_id.clone(),
        })
    }

    pub fn text_stream_info(&self) -> Result<TextStreamInfo> {
        Ok(TextStreamInfo {
            track_id: self.track_id()?,
            time_scale: WEBM_TIMESCALE,
            duration: None,
            codec_id: self.codec_id.clone(),
            language: self.language.clone(),
            extra_data: self.codec_private.clone(),
        })
    }
}

fn dimension(id: u32, value: &[u8]) -> Result<u32> {
    u32::try_from(ebml::read_uint(id, value)?).map_err(|_| WebMError::InvalidValue {
        id,
        reason: "dimension does not fit 32 bits",
    })
}

fn parse_video(payload: &[u8]) -> Result<VideoSettings> {
    let mut video = VideoSettings::default();
    for child in children(payload) {
        let (id, value) = child?;
        match id {
            ids::PIXEL_WIDTH => video.pixel_width = Some(dimension(id, value)?),
            ids::PIXEL_HEIGHT => video.pixel_height = Some(dimension(id, value)?),
            ids::DISPLAY_WIDTH => video.display_width = Some(dimension(id, value)?),
            ids::DISPLAY_HEIGHT => video.display_height = Some(dimension(id, value)?),
            _ => {}
        }
    }
    Ok(video)
}

fn parse_audio(payload: &[u8]) -> Result<AudioSettings> {
    let mut audio = AudioSettings::default();
    for child in children(payload) {
        let (id, value) = child?;
        match id {
            ids::SAMPLING_FREQUENCY => audio.sampling_frequency = ebml::read_float(id, value)?,
            ids::OUTPUT_SAMPLING_FREQUENCY => {
                audio.output_sampling_frequency = Some(ebml::read_float(id, value)?)
            }
            ids::CHANNELS => audio.channels = ebml::read_uint(id, value)?,
            ids::BIT_DEPTH => audio.bit_depth = Some(ebml::read_uint(id, value)?),
            _ => {}
        }
    }
    Ok(audio)
}

/// ContentEncodings > ContentEncoding > ContentEncryption > ContentEncKeyID
fn parse_encryption_key_id(payload: &[u8]) -> Result<Option<Bytes>> {
    let mut key_id = None;
    for encoding in children(payload) {
        let (id, encoding) = encoding?;
        if id != ids::CONTENT_ENCODING {
            continue;
        }
        for encryption in children(encoding) {
            let (id, encryption) = encryption?;
            if id != ids::CONTENT_ENCRYPTION {
                continue;
            }
            for field in children(encryption) {
                let (id, value) = field?;
                if id == ids::CONTENT_ENC_KEY_ID && !value.is_empty() {
                    key_id = Some(Bytes::copy_from_slice(value));
                }
            }
        }
    }
    Ok(key_id)
}

/// Track layout of a segment: the first audio and the first video track,
/// text tracks when they are not ignored, and every other track number
/// whose blocks are dropped.
#[derive(Debug, Clone, Default)]
pub struct Tracks {
    pub audio: Option<TrackEntry>,
    pub video: Option<TrackEntry>,
    pub text: Vec<TrackEntry>,
    pub ignored: FxHashSet<u64>,
}

impl Tracks {
    /// Parses the `Tracks` element at the front of `buf`.
    ///
    /// Returns `Ok(None)` until the whole element is buffered.
    pub fn parse(buf: &[u8], ignore_text_tracks: bool) -> Result<Option<(Self, usize)>> {
        let Some((header, payload)) = complete_element(buf)? else {
            return Ok(None);
        };
        if header.id != ids::TRACKS {
            return Err(WebMError::UnexpectedElement { id: header.id });
        }

        let mut tracks = Self::default();
        let mut seen = FxHashSet::default();
        for child in children(payload) {
            let (id, value) = child?;
            if id != ids::TRACK_ENTRY {
                continue;
            }
            let entry = TrackEntry::parse(value)?;
            if !seen.insert(entry.number) {
                return Err(WebMError::DuplicateTrackNumber(entry.number));
            }
            tracks.add(entry, ignore_text_tracks)?;
        }

        let consumed = header.header_len + payload.len();
        Ok(Some((tracks, consumed)))
    }

    fn add(&mut self, entry: TrackEntry, ignore_text_tracks: bool) -> Result<()> {
        match entry.kind() {
            Some(TrackKind::Audio) if self.audio.is_none() => {
                entry.audio_codec()?;
                self.audio = Some(entry);
            }
            Some(TrackKind::Video) if self.video.is_none() => {
                entry.video_codec()?;
                self.video = Some(entry);
            }
            Some(TrackKind::Text) if !ignore_text_tracks => self.text.push(entry),
            kind => {
                debug!(
                    track_number = entry.number,
                    ?kind,
                    codec_id = %entry.codec_id,
                    "ignoring track"
                );
                self.ignored.insert(entry.number);
            }
        }
        Ok(())
    }

    pub fn audio_track_num(&self) -> Option<u64> {
        self.audio.as_ref().map(|entry| entry.number)
    }

    pub fn video_track_num(&self) -> Option<u64> {
        self.video.as_ref().map(|entry| entry.number)
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
pub(crate) mod tests {
    use super::*;
    use crate::ebml::tests::{element, uint_element};

    pub(crate) fn track_entry(number: u64, track_type: u64, codec_id: &str) -> Vec<u8> {
        let mut payload = uint_element(ids::TRACK_NUMBER, number);
        payload.extend(uint_element(ids::TRACK_UID, number * 1000));
        payload.extend(uint_element(ids::TRACK_TYPE, track_type));
        payload.extend(element(ids::CODEC_ID, codec_id.as_bytes()));
        payload
    }

    pub(crate) fn opus_track(number: u64) -> Vec<u8> {
        let mut payload = track_entry(number, ids::TRACK_TYPE_AUDIO, "A_OPUS");
        payload.extend(uint_element(ids::CODEC_DELAY, 6_500_000));
        payload.extend(uint_element(ids::SEEK_PRE_ROLL, 80_000_000));
        payload.extend(element(ids::CODEC_PRIVATE, b"OpusHead"));
        let mut audio = element(ids::SAMPLING_FREQUENCY, &48000.0f64.to_be_bytes());
        audio.extend(uint_element(ids::CHANNELS, 2));
        payload.extend(element(ids::AUDIO, &audio));
        element(ids::TRACK_ENTRY, &payload)
    }

    pub(crate) fn vp9_track(number: u64, default_duration_ns: Option<u64>) -> Vec<u8> {
        let mut payload = track_entry(number, ids::TRACK_TYPE_VIDEO, "V_VP9");
        if let Some(duration) = default_duration_ns {
            payload.extend(uint_element(ids::DEFAULT_DURATION, duration));
        }
        let mut video = uint_element(ids::PIXEL_WIDTH, 640);
        video.extend(uint_element(ids::PIXEL_HEIGHT, 360));
        payload.extend(element(ids::VIDEO, &video));
        element(ids::TRACK_ENTRY, &payload)
    }

    #[test]
    fn test_audio_and_video_tracks() {
        let mut payload = opus_track(1);
        payload.extend(vp9_track(2, Some(33_366_666)));
        let data = element(ids::TRACKS, &payload);

        let (tracks, consumed) = Tracks::parse(&data, true).unwrap().unwrap();
        assert_eq!(consumed, data.len());
        assert_eq!(tracks.audio_track_num(), Some(1));
        assert_eq!(tracks.video_track_num(), Some(2));
        assert!(tracks.ignored.is_empty());

        let audio = tracks.audio.as_ref().unwrap().audio_stream_info().unwrap();
        assert_eq!(audio.track_id, 1);
        assert_eq!(audio.codec, AudioCodec::Opus);
        assert_eq!(audio.codec_string, "opus");
        assert_eq!(audio.time_scale, WEBM_TIMESCALE);
        assert_eq!(audio.sampling_frequency, 48000);
        assert_eq!(audio.num_channels, 2);
        assert_eq!(audio.sample_bits, 16);
        assert_eq!(audio.codec_delay_ns, 6_500_000);
        assert_eq!(audio.seek_preroll_ns, 80_000_000);
        assert_eq!(audio.extra_data.as_ref(), b"OpusHead");

        let video_entry = tracks.video.as_ref().unwrap();
        assert_eq!(video_entry.default_duration_us(), Some(33_366));
        let video = video_entry.video_stream_info().unwrap();
        assert_eq!(video.codec, VideoCodec::Vp9);
        assert_eq!(video.resolution, Resolution::new(640, 360));
        assert_eq!(video.display_resolution, None);
    }

    #[test]
    fn test_extra_tracks_are_ignored() {
        let mut payload = opus_track(1);
        payload.extend(opus_track(3));
        payload.extend(element(
            ids::TRACK_ENTRY,
            &track_entry(4, ids::TRACK_TYPE_SUBTITLE, "S_TEXT/WEBVTT"),
        ));
        payload.extend(element(ids::TRACK_ENTRY, &track_entry(5, 0x20, "B_VOBBTN")));
        let data = element(ids::TRACKS, &payload);

        let (tracks, _) = Tracks::parse(&data, true).unwrap().unwrap();
        assert_eq!(tracks.audio_track_num(), Some(1));
        assert_eq!(tracks.video, None);
        assert!(tracks.text.is_empty());
        assert_eq!(tracks.ignored.len(), 3);
        assert!(tracks.ignored.contains(&3));
        assert!(tracks.ignored.contains(&4));

        let (tracks, _) = Tracks::parse(&data, false).unwrap().unwrap();
        assert_eq!(tracks.text.len(), 1);
        let text = tracks.text[0].text_stream_info().unwrap();
        assert_eq!(text.track_id, 4);
        assert_eq!(text.codec_id, "S_TEXT/WEBVTT");
        assert!(!tracks.ignored.contains(&4));
    }

    #[test]
    fn test_encryption_key_id() {
        let mut payload = track_entry(1, ids::TRACK_TYPE_VIDEO, "V_VP8");
        let encryption = element(ids::CONTENT_ENC_KEY_ID, &[0x11; 16]);
        let encoding = element(ids::CONTENT_ENCRYPTION, &encryption);
        let encodings = element(ids::CONTENT_ENCODING, &encoding);
        payload.extend(element(ids::CONTENT_ENCODINGS, &encodings));
        let mut video = uint_element(ids::PIXEL_WIDTH, 320);
        video.extend(uint_element(ids::PIXEL_HEIGHT, 240));
        video.extend(uint_element(ids::DISPLAY_WIDTH, 640));
        payload.extend(element(ids::VIDEO, &video));
        let data = element(ids::TRACKS, &element(ids::TRACK_ENTRY, &payload));

        let (tracks, _) = Tracks::parse(&data, true).unwrap().unwrap();
        let entry = tracks.video.unwrap();
        assert!(entry.is_encrypted());
        let info = entry.video_stream_info().unwrap();
        assert_eq!(info.encryption_key_id.as_deref(), Some(&[0x11; 16][..]));
        assert_eq!(info.display_resolution, Some(Resolution::new(640, 240)));
    }

    #[test]
    fn test_aac_and_avc_codec_strings() {
        let mut payload = track_entry(1, ids::TRACK_TYPE_AUDIO, "A_AAC");
        payload.extend(element(ids::CODEC_PRIVATE, &[0x2B, 0x92, 0x08, 0x00]));
        let aac = TrackEntry::parse(&payload).unwrap();
        assert_eq!(aac.audio_stream_info().unwrap().codec_string, "mp4a.40.5");

        let mut payload = track_entry(2, ids::TRACK_TYPE_VIDEO, "V_MPEG4/ISO/AVC");
        payload.extend(element(ids::CODEC_PRIVATE, &[0x01, 0x64, 0x00, 0x1F, 0xFF]));
        let mut video = uint_element(ids::PIXEL_WIDTH, 1920);
        video.extend(uint_element(ids::PIXEL_HEIGHT, 1080));
        payload.extend(element(ids::VIDEO, &video));
        let avc = TrackEntry::parse(&payload).unwrap();
        assert_eq!(avc.video_stream_info().unwrap().codec_string, "avc1.64001f");
    }

    #[test]
    fn test_invalid_track_entries() {
        let data = element(
            ids::TRACKS,
            &element(ids::TRACK_ENTRY, &track_entry(1, ids::TRACK_TYPE_AUDIO, "A_MPEG/L3")),
        );
        assert!(matches!(
            Tracks::parse(&data, true),
            Err(WebMError::UnsupportedCodec(id)) if id == "A_MPEG/L3"
        ));

        let mut payload = opus_track(1);
        payload.extend(vp9_track(1, None));
        let data = element(ids::TRACKS, &payload);
        assert!(matches!(
            Tracks::parse(&data, true),
            Err(WebMError::DuplicateTrackNumber(1))
        ));

        let data = element(
            ids::TRACKS,
            &element(ids::TRACK_ENTRY, &track_entry(0, ids::TRACK_TYPE_AUDIO, "A_OPUS")),
        );
        assert!(Tracks::parse(&data, true).is_err());

        let data = element(
            ids::TRACKS,
            &element(ids::TRACK_ENTRY, &uint_element(ids::TRACK_TYPE, 2)),
        );
        assert!(matches!(
            Tracks::parse(&data, true),
            Err(WebMError::MissingElement {
                id: ids::TRACK_NUMBER,
                ..
            })
        ));
    }

    #[test]
    fn test_incomplete_tracks() {
        let data = element(ids::TRACKS, &opus_track(1));
        assert!(Tracks::parse(&data[..data.len() - 1], true).unwrap().is_none());
    }
}
