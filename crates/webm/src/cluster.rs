use std::collections::BTreeMap;

use bytes::Bytes;
use media_types::{MediaSample, NewSampleCb};
use rustc_hash::FxHashSet;
use tracing::{error, trace};

use crate::block::Block;
use crate::ebml::{self, ElementHeader, children, parse_element_header};
use crate::{Result, WebMError, ids};

/// A track whose blocks the cluster parser turns into samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterTrack {
    pub track_id: u32,
    /// Microseconds per frame, when the track declares one.
    pub default_duration_us: Option<i64>,
}

fn timestamp_out_of_range(id: u32) -> WebMError {
    WebMError::InvalidValue {
        id,
        reason: "timestamp out of range",
    }
}

#[derive(Debug)]
struct TrackBuffer {
    track_id: u32,
    default_duration: Option<i64>,
    /// Sample waiting for the next block of the track to learn its duration.
    held: Option<MediaSample>,
    last_duration: Option<i64>,
}

impl TrackBuffer {
    fn push(
        &mut self,
        id: u32,
        sample: MediaSample,
        duration: Option<i64>,
        new_sample_cb: &mut NewSampleCb,
    ) -> Result<()> {
        if let Some(mut held) = self.held.take() {
            let delta = sample
                .pts
                .checked_sub(held.pts)
                .ok_or_else(|| timestamp_out_of_range(id))?;
            let estimated = if delta >= 0 {
                delta
            } else {
                self.last_duration.unwrap_or(0)
            };
            held.duration = estimated;
            self.last_duration = Some(estimated);
            emit(new_sample_cb, held)?;
        }

        match duration {
            Some(duration) => {
                self.last_duration = Some(duration);
                emit(new_sample_cb, sample.with_duration(duration))
            }
            None => {
                self.held = Some(sample);
                Ok(())
            }
        }
    }

    fn flush(&mut self, new_sample_cb: &mut NewSampleCb) -> Result<()> {
        let Some(mut held) = self.held.take() else {
            return Ok(());
        };
        held.duration = self
            .last_duration
            .or(self.default_duration)
            .unwrap_or(0);
        emit(new_sample_cb, held)
    }
}

fn emit(new_sample_cb: &mut NewSampleCb, sample: MediaSample) -> Result<()> {
    let (track_id, pts) = (sample.track_id, sample.pts);
    if new_sample_cb(sample) {
        Ok(())
    } else {
        Err(WebMError::SampleRejected { track_id, pts })
    }
}

/// Incremental parser for `Cluster` elements.
///
/// Consumes the cluster header, then one complete child element per step.
/// A known-size cluster ends once its payload is consumed; an unknown-size
/// cluster ends at the next top-level element, which is left unconsumed.
pub struct ClusterParser {
    /// Nanoseconds per timecode tick.
    timecode_scale: u64,
    tracks: BTreeMap<u64, TrackBuffer>,
    ignored_tracks: FxHashSet<u64>,
    new_sample_cb: NewSampleCb,

    in_cluster: bool,
    /// Payload bytes left in the current cluster, `None` for unknown size.
    cluster_remaining: Option<u64>,
    cluster_timecode: Option<i64>,
    cluster_ended: bool,
}

impl ClusterParser {
    pub fn new(
        timecode_scale: u64,
        tracks: impl IntoIterator<Item = ClusterTrack>,
        ignored_tracks: FxHashSet<u64>,
        new_sample_cb: NewSampleCb,
    ) -> Self {
        let tracks = tracks
            .into_iter()
            .map(|track| {
                (
                    u64::from(track.track_id),
                    TrackBuffer {
                        track_id: track.track_id,
                        default_duration: track.default_duration_us,
                        held: None,
                        last_duration: None,
                    },
                )
            })
            .collect();

        Self {
            timecode_scale,
            tracks,
            ignored_tracks,
            new_sample_cb,
            in_cluster: false,
            cluster_remaining: None,
            cluster_timecode: None,
            cluster_ended: false,
        }
    }

    /// Whether the last [`parse`](Self::parse) call reached the end of a
    /// cluster.
    pub fn cluster_ended(&self) -> bool {
        self.cluster_ended
    }

    /// Consumes as many complete elements of the current cluster as `buf`
    /// holds and returns the number of bytes used.
    pub fn parse(&mut self, buf: &[u8]) -> Result<usize> {
        self.cluster_ended = false;
        let mut consumed = 0;

        if !self.in_cluster {
            let Some(header) = parse_element_header(buf)? else {
                return Ok(0);
            };
            if header.id != ids::CLUSTER {
                return Err(WebMError::UnexpectedElement { id: header.id });
            }
            self.start_cluster(&header);
            consumed = header.header_len;
        }

        loop {
            if self.cluster_remaining == Some(0) {
                self.finish_cluster()?;
                break;
            }

            let cur = &buf[consumed..];
            let Some(header) = parse_element_header(cur)? else {
                break;
            };

            if self.cluster_remaining.is_none() && ids::is_top_level(header.id) {
                self.finish_cluster()?;
                break;
            }

            let total = header
                .total_len()
                .ok_or(WebMError::UnknownSize { id: header.id })?;
            if let Some(remaining) = self.cluster_remaining {
                if total as u64 > remaining {
                    return Err(WebMError::ChildOverflow {
                        id: header.id,
                        size: total as u64,
                        available: remaining,
                    });
                }
            }
            if cur.len() < total {
                break;
            }

            self.parse_child(header.id, &cur[header.header_len..total])?;
            consumed += total;
            if let Some(remaining) = self.cluster_remaining.as_mut() {
                *remaining -= total as u64;
            }
        }

        Ok(consumed)
    }

    /// Emits every held sample and forgets the current cluster.
    pub fn flush(&mut self) -> Result<()> {
        self.reset_cluster_state();
        self.cluster_ended = false;
        self.flush_held_samples()
    }

    fn start_cluster(&mut self, header: &ElementHeader) {
        trace!(size = header.size, "cluster start");
        self.in_cluster = true;
        self.cluster_remaining = (!header.is_unknown_size()).then_some(header.size);
        self.cluster_timecode = None;
    }

    fn finish_cluster(&mut self) -> Result<()> {
        trace!("cluster end");
        self.reset_cluster_state();
        self.cluster_ended = true;
        self.flush_held_samples()
    }

    fn reset_cluster_state(&mut self) {
        self.in_cluster = false;
        self.cluster_remaining = None;
        self.cluster_timecode = None;
    }

    fn flush_held_samples(&mut self) -> Result<()> {
        for track in self.tracks.values_mut() {
            track.flush(&mut self.new_sample_cb)?;
        }
        Ok(())
    }

    fn parse_child(&mut self, id: u32, payload: &[u8]) -> Result<()> {
        match id {
            ids::TIMECODE => {
                let timecode = ebml::read_uint(id, payload)?;
                let timecode = i64::try_from(timecode).map_err(|_| WebMError::InvalidValue {
                    id,
                    reason: "cluster timecode out of range",
                })?;
                self.cluster_timecode = Some(timecode);
                Ok(())
            }
            ids::SIMPLE_BLOCK => {
                let block = Block::parse(id, Bytes::copy_from_slice(payload))?;
                let is_key_frame = block.is_keyframe();
                self.on_block(id, block, is_key_frame, None)
            }
            ids::BLOCK_GROUP => self.parse_block_group(payload),
            _ => {
                trace!(id = format_args!("0x{id:X}"), "skipping cluster child");
                Ok(())
            }
        }
    }

    fn parse_block_group(&mut self, payload: &[u8]) -> Result<()> {
        let mut block = None;
        let mut block_duration = None;
        let mut has_reference = false;

        for child in children(payload) {
            let (id, value) = child?;
            match id {
                ids::BLOCK => block = Some(Block::parse(id, Bytes::copy_from_slice(value))?),
                ids::BLOCK_DURATION => block_duration = Some(ebml::read_uint(id, value)?),
                ids::REFERENCE_BLOCK => has_reference = true,
                _ => {}
            }
        }

        let block = block.ok_or(WebMError::MissingElement {
            parent: ids::BLOCK_GROUP,
            id: ids::BLOCK,
        })?;
        self.on_block(ids::BLOCK, block, !has_reference, block_duration)
    }

    /// Converts timecode ticks to microseconds, failing when the result does
    /// not fit the sample timeline.
    fn ticks_to_us(&self, id: u32, ticks: i128) -> Result<i64> {
        ticks
            .checked_mul(i128::from(self.timecode_scale))
            .map(|ns| ns / 1000)
            .and_then(|us| i64::try_from(us).ok())
            .ok_or_else(|| timestamp_out_of_range(id))
    }

    fn on_block(
        &mut self,
        id: u32,
        block: Block,
        is_key_frame: bool,
        block_duration: Option<u64>,
    ) -> Result<()> {
        let cluster_timecode = self
            .cluster_timecode
            .ok_or(WebMError::BlockBeforeTimecode)?;

        if self.ignored_tracks.contains(&block.track_number) {
            trace!(track_number = block.track_number, "dropping block of ignored track");
            return Ok(());
        }

        let timestamp = self.ticks_to_us(
            id,
            i128::from(cluster_timecode) + i128::from(block.relative_timecode),
        )?;
        let block_duration = block_duration
            .map(|ticks| self.ticks_to_us(id, i128::from(ticks)))
            .transpose()?;

        let Some(track) = self.tracks.get_mut(&block.track_number) else {
            error!(track_number = block.track_number, "block for unknown track");
            return Err(WebMError::UnknownTrack(block.track_number));
        };

        let frame_count = block.frames.len();
        if frame_count > 1 && track.default_duration.is_none() {
            return Err(WebMError::LacedWithoutDefaultDuration(block.track_number));
        }

        let step = track.default_duration.unwrap_or(0);
        for (i, frame) in block.frames.into_iter().enumerate() {
            let pts = i64::try_from(i)
                .ok()
                .and_then(|i| i.checked_mul(step))
                .and_then(|offset| timestamp.checked_add(offset))
                .ok_or_else(|| timestamp_out_of_range(id))?;
            let duration = if frame_count == 1 {
                block_duration.or(track.default_duration)
            } else {
                track.default_duration
            };
            let sample =
                MediaSample::new(track.track_id, frame, is_key_frame).with_timestamps(pts, pts);
            track.push(id, sample, duration, &mut self.new_sample_cb)?;
        }
        Ok(())
    }
}
