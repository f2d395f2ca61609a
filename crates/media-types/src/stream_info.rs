use bytes::Bytes;

use crate::{AudioCodec, Codec, Resolution, VideoCodec};

/// Configuration of an audio track.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioStreamInfo {
    pub track_id: u32,
    /// Ticks per second for sample timestamps on this track.
    pub time_scale: u32,
    /// Track duration in `time_scale` units; `None` when unknown or unbounded.
    pub duration: Option<i64>,
    pub codec: AudioCodec,
    /// RFC 6381 style codec string, e.g. `mp4a.40.2`.
    pub codec_string: String,
    pub language: Option<String>,
    pub sample_bits: u8,
    pub num_channels: u8,
    pub sampling_frequency: u32,
    /// Codec-specific decoder configuration (AudioSpecificConfig, CodecPrivate, ...).
    pub extra_data: Bytes,
    pub codec_delay_ns: u64,
    pub seek_preroll_ns: u64,
    /// Key id for encrypted tracks.
    pub encryption_key_id: Option<Bytes>,
}

/// Configuration of a video track.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoStreamInfo {
    pub track_id: u32,
    pub time_scale: u32,
    pub duration: Option<i64>,
    pub codec: VideoCodec,
    pub codec_string: String,
    pub language: Option<String>,
    pub resolution: Resolution,
    /// Display size when it differs from the coded size.
    pub display_resolution: Option<Resolution>,
    pub extra_data: Bytes,
    pub encryption_key_id: Option<Bytes>,
}

/// Configuration of a text (subtitle) track.
#[derive(Debug, Clone, PartialEq)]
pub struct TextStreamInfo {
    pub track_id: u32,
    pub time_scale: u32,
    pub duration: Option<i64>,
    /// Container codec id, e.g. `S_TEXT/WEBVTT`.
    pub codec_id: String,
    pub language: Option<String>,
    pub extra_data: Bytes,
}

/// Configuration of one elementary stream, as reported by a parser.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamInfo {
    Audio(AudioStreamInfo),
    Video(VideoStreamInfo),
    Text(TextStreamInfo),
}

impl StreamInfo {
    pub fn track_id(&self) -> u32 {
        match self {
            StreamInfo::Audio(info) => info.track_id,
            StreamInfo::Video(info) => info.track_id,
            StreamInfo::Text(info) => info.track_id,
        }
    }

    pub fn time_scale(&self) -> u32 {
        match self {
            StreamInfo::Audio(info) => info.time_scale,
            StreamInfo::Video(info) => info.time_scale,
            StreamInfo::Text(info) => info.time_scale,
        }
    }

    pub fn duration(&self) -> Option<i64> {
        match self {
            StreamInfo::Audio(info) => info.duration,
            StreamInfo::Video(info) => info.duration,
            StreamInfo::Text(info) => info.duration,
        }
    }

    pub fn set_duration(&mut self, duration: Option<i64>) {
        match self {
            StreamInfo::Audio(info) => info.duration = duration,
            StreamInfo::Video(info) => info.duration = duration,
            StreamInfo::Text(info) => info.duration = duration,
        }
    }

    pub fn codec(&self) -> Codec {
        match self {
            StreamInfo::Audio(info) => Codec::Audio(info.codec),
            StreamInfo::Video(info) => Codec::Video(info.codec),
            StreamInfo::Text(_) => Codec::Text,
        }
    }

    pub fn encryption_key_id(&self) -> Option<&Bytes> {
        match self {
            StreamInfo::Audio(info) => info.encryption_key_id.as_ref(),
            StreamInfo::Video(info) => info.encryption_key_id.as_ref(),
            StreamInfo::Text(_) => None,
        }
    }

    #[inline]
    pub fn is_encrypted(&self) -> bool {
        self.encryption_key_id().is_some()
    }

    pub fn as_audio(&self) -> Option<&AudioStreamInfo> {
        match self {
            StreamInfo::Audio(info) => Some(info),
            _ => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoStreamInfo> {
        match self {
            StreamInfo::Video(info) => Some(info),
            _ => None,
        }
    }
}
