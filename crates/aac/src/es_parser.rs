use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use bytes_util::ByteQueue;
use media_types::{
    AudioCodec, AudioStreamInfo, AudioTimestampHelper, MediaSample, NewSampleCb, NewStreamInfoCb,
    StreamInfo,
};
use tracing::{debug, trace, warn};

use crate::adts::{
    ADTS_FREQUENCY_TABLE, ADTS_HEADER_MIN_SIZE, ADTS_NUM_CHANNELS_TABLE, AdtsHeader,
    MAX_EXTENDED_SAMPLE_RATE, SAMPLES_PER_AAC_FRAME, SyncSearch, find_sync_word,
};
use crate::{AacError, Result};

/// Clock of MPEG-2 transport stream timestamps.
pub const MPEG2_TIMESCALE: u32 = 90_000;

const AAC_SAMPLE_BITS: u8 = 16;

/// Options for [`EsParserAdts`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdtsParserOptions {
    /// The stream's mime type announced SBR (HE-AAC): the reported sample
    /// rate is doubled and capped at 48kHz.
    pub sbr_in_mimetype: bool,
}

/// A timestamp waiting for the frame that starts at or after `offset`
/// (relative to the front of the byte queue).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingTimestamp {
    offset: usize,
    pts: i64,
}

/// Incremental ADTS elementary stream parser.
///
/// Bytes are buffered until a complete frame is available; each frame becomes
/// one key-frame sample with `pts == dts`. The audio configuration is taken
/// from the first frame and kept until [`reset`](Self::reset); later headers
/// are not re-validated, so a mid-stream configuration change goes unnoticed.
pub struct EsParserAdts {
    track_id: u32,
    options: AdtsParserOptions,
    new_audio_config_cb: NewStreamInfoCb,
    emit_sample_cb: NewSampleCb,

    es_byte_queue: ByteQueue,
    pts_list: VecDeque<PendingTimestamp>,

    audio_timestamp_helper: Option<AudioTimestampHelper>,
    last_audio_decoder_config: Option<Arc<StreamInfo>>,
}

impl EsParserAdts {
    pub fn new(
        track_id: u32,
        new_audio_config_cb: NewStreamInfoCb,
        emit_sample_cb: NewSampleCb,
    ) -> Self {
        Self {
            track_id,
            options: AdtsParserOptions::default(),
            new_audio_config_cb,
            emit_sample_cb,
            es_byte_queue: ByteQueue::new(),
            pts_list: VecDeque::new(),
            audio_timestamp_helper: None,
            last_audio_decoder_config: None,
        }
    }

    pub fn with_options(mut self, options: AdtsParserOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_sbr_in_mimetype(mut self, enable: bool) -> Self {
        self.options.sbr_in_mimetype = enable;
        self
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    /// Configuration established by the first frame of the current epoch.
    pub fn audio_config(&self) -> Option<&Arc<StreamInfo>> {
        self.last_audio_decoder_config.as_ref()
    }

    /// Feeds `buf` to the parser and emits every complete frame found.
    ///
    /// `pts` applies to the first frame starting at or after the current end
    /// of buffered data. `_dts` is accepted for interface symmetry; ADTS frames
    /// are never reordered, so decode time always equals presentation time.
    pub fn parse(&mut self, buf: &[u8], pts: Option<i64>, _dts: Option<i64>) -> Result<()> {
        if let Some(pts) = pts {
            self.pts_list.push_back(PendingTimestamp {
                offset: self.es_byte_queue.len(),
                pts,
            });
        }

        self.es_byte_queue.push(buf);

        let mut es_position = 0;
        let result = loop {
            let raw_es = self.es_byte_queue.peek();
            let (frame_offset, frame_size) = match find_sync_word(raw_es, es_position) {
                SyncSearch::Found { offset, frame_size } => (offset, frame_size),
                SyncSearch::NotFound { resume_at } => {
                    es_position = resume_at;
                    break Ok(());
                }
            };
            es_position = frame_offset;

            trace!(
                position = frame_offset,
                frame_size, "ADTS syncword found"
            );
            trace!(
                "ADTS header: {:02x?}",
                &raw_es[frame_offset..frame_offset + ADTS_HEADER_MIN_SIZE]
            );

            // Partial frame: wait for the rest.
            if frame_size > raw_es.len() - frame_offset {
                break Ok(());
            }

            let frame = Bytes::copy_from_slice(&raw_es[frame_offset..frame_offset + frame_size]);
            let Some(header) = AdtsHeader::parse(&frame) else {
                break Ok(());
            };

            if let Err(err) = self.emit_frame(&header, frame, es_position) {
                break Err(err);
            }

            es_position += frame_size;
        };

        // Frames already emitted must not be seen again, even when a later
        // one failed.
        self.discard_es(es_position)?;
        result
    }

    fn emit_frame(&mut self, header: &AdtsHeader, frame: Bytes, es_position: usize) -> Result<()> {
        self.update_audio_configuration(header)?;

        let helper = self
            .audio_timestamp_helper
            .as_mut()
            .ok_or(AacError::MissingTimestampHelper)?;

        while let Some(pending) = self.pts_list.front() {
            if pending.offset > es_position {
                break;
            }
            helper.set_base_timestamp(pending.pts);
            self.pts_list.pop_front();
        }

        let current_pts = helper.timestamp().ok_or(AacError::TimestampOutOfRange)?;
        let frame_duration = helper
            .frame_duration(SAMPLES_PER_AAC_FRAME)
            .ok_or(AacError::TimestampOutOfRange)?;

        let sample = MediaSample::new(self.track_id, frame, true)
            .with_timestamps(current_pts, current_pts)
            .with_duration(frame_duration);
        if !(self.emit_sample_cb)(sample) {
            return Err(AacError::SampleRejected {
                track_id: self.track_id,
                pts: current_pts,
            });
        }

        helper.add_frames(SAMPLES_PER_AAC_FRAME);
        Ok(())
    }

    /// Every complete frame is emitted by [`parse`](Self::parse); a trailing
    /// partial frame stays buffered.
    pub fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drops buffered bytes, pending timestamps, the timeline and the audio
    /// configuration. The next frame re-establishes the configuration and
    /// fires the callback.
    pub fn reset(&mut self) {
        self.es_byte_queue.reset();
        self.pts_list.clear();
        self.audio_timestamp_helper = None;
        self.last_audio_decoder_config = None;
    }

    fn update_audio_configuration(&mut self, header: &AdtsHeader) -> Result<()> {
        if let Some(config) = &self.last_audio_decoder_config {
            if let Some(audio) = config.as_audio() {
                let channels = ADTS_NUM_CHANNELS_TABLE
                    .get(header.channel_config as usize)
                    .copied();
                if channels != Some(audio.num_channels) {
                    debug!(
                        channel_config = header.channel_config,
                        "ignoring ADTS configuration change"
                    );
                }
            }
            return Ok(());
        }

        let frequency_index = header.frequency_index as usize;
        if frequency_index >= ADTS_FREQUENCY_TABLE.len() {
            return Err(AacError::UnsupportedFrequencyIndex(header.frequency_index));
        }

        let channel_config = header.channel_config as usize;
        if channel_config == 0 || channel_config >= ADTS_NUM_CHANNELS_TABLE.len() {
            return Err(AacError::UnsupportedChannelConfig(header.channel_config));
        }

        let samples_per_second = ADTS_FREQUENCY_TABLE[frequency_index];
        let extended_samples_per_second = if self.options.sbr_in_mimetype {
            (2 * samples_per_second).min(MAX_EXTENDED_SAMPLE_RATE)
        } else {
            samples_per_second
        };

        debug!("Sampling frequency: {samples_per_second}");
        debug!("Extended sampling frequency: {extended_samples_per_second}");
        debug!("Channel config: {channel_config}");
        debug!("Adts profile: {}", header.profile);

        let config = AudioStreamInfo {
            track_id: self.track_id,
            time_scale: MPEG2_TIMESCALE,
            duration: None,
            codec: AudioCodec::Aac,
            codec_string: format!("mp4a.40.{}", header.audio_object_type()),
            language: None,
            sample_bits: AAC_SAMPLE_BITS,
            num_channels: ADTS_NUM_CHANNELS_TABLE[channel_config],
            sampling_frequency: extended_samples_per_second,
            extra_data: Bytes::copy_from_slice(&header.audio_specific_config()),
            codec_delay_ns: 0,
            seek_preroll_ns: 0,
            encryption_key_id: None,
        };

        // Frames always carry 1024 core samples, so the timeline runs at the
        // core rate even when SBR doubles the output rate.
        let mut helper = AudioTimestampHelper::new(MPEG2_TIMESCALE, samples_per_second);
        if let Some(previous) = self.audio_timestamp_helper.take() {
            let position = previous
                .timestamp()
                .ok_or(AacError::TimestampOutOfRange)?;
            helper.set_base_timestamp(position);
        }
        self.audio_timestamp_helper = Some(helper);

        let config = Arc::new(StreamInfo::Audio(config));
        self.last_audio_decoder_config = Some(Arc::clone(&config));
        (self.new_audio_config_cb)(config);

        Ok(())
    }

    fn discard_es(&mut self, nbytes: usize) -> Result<()> {
        if nbytes == 0 {
            return Ok(());
        }

        for pending in self.pts_list.iter_mut() {
            if pending.offset < nbytes {
                // The bytes it pointed into were skipped while resyncing; it
                // now applies to the first frame found.
                warn!(
                    offset = pending.offset,
                    discarded = nbytes,
                    "pending timestamp precedes discarded data"
                );
            }
            pending.offset = pending.offset.saturating_sub(nbytes);
        }

        self.es_byte_queue.pop(nbytes)?;
        Ok(())
    }
}
