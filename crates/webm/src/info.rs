use crate::ebml::{self, children, complete_element};
use crate::{Result, WebMError, ids};

pub const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// Segment-wide timing and muxer metadata from the `Info` element.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    /// Nanoseconds per cluster/block timecode tick.
    pub timecode_scale: u64,
    /// Segment duration in timecode ticks.
    pub duration: Option<f64>,
    /// Nanoseconds since 2001-01-01T00:00:00 UTC.
    pub date_utc: Option<i64>,
    pub title: Option<String>,
    pub muxing_app: Option<String>,
    pub writing_app: Option<String>,
}

impl Default for SegmentInfo {
    fn default() -> Self {
        Self {
            timecode_scale: DEFAULT_TIMECODE_SCALE,
            duration: None,
            date_utc: None,
            title: None,
            muxing_app: None,
            writing_app: None,
        }
    }
}

impl SegmentInfo {
    /// Parses the `Info` element at the front of `buf`.
    ///
    /// Returns the info and the number of bytes it spans, or `Ok(None)` until
    /// the whole element is buffered.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>> {
        let Some((header, payload)) = complete_element(buf)? else {
            return Ok(None);
        };
        if header.id != ids::INFO {
            return Err(WebMError::UnexpectedElement { id: header.id });
        }

        let mut info = Self::default();
        for child in children(payload) {
            let (id, value) = child?;
            match id {
                ids::TIMECODE_SCALE => {
                    info.timecode_scale = ebml::read_uint(id, value)?;
                    if info.timecode_scale == 0 {
                        return Err(WebMError::InvalidValue {
                            id,
                            reason: "timecode scale must be positive",
                        });
                    }
                }
                ids::DURATION => {
                    let duration = ebml::read_float(id, value)?;
                    if !duration.is_finite() || duration < 0.0 {
                        return Err(WebMError::InvalidValue {
                            id,
                            reason: "duration must be a non-negative number",
                        });
                    }
                    info.duration = Some(duration);
                }
                ids::DATE_UTC => info.date_utc = Some(ebml::read_int(id, value)?),
                ids::TITLE => info.title = Some(ebml::read_string(id, value)?),
                ids::MUXING_APP => info.muxing_app = Some(ebml::read_string(id, value)?),
                ids::WRITING_APP => info.writing_app = Some(ebml::read_string(id, value)?),
                _ => {}
            }
        }

        let consumed = header.header_len + payload.len();
        Ok(Some((info, consumed)))
    }

    /// Microseconds per timecode tick.
    pub fn timecode_scale_in_us(&self) -> f64 {
        self.timecode_scale as f64 / 1000.0
    }

    /// Segment duration in microseconds.
    pub fn duration_in_us(&self) -> Option<i64> {
        self.duration
            .map(|duration| (duration * self.timecode_scale_in_us()) as i64)
    }
}
