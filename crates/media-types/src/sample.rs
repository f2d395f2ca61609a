use bytes::Bytes;

/// A single decodable unit handed to the sample callback.
///
/// Timestamps and duration are expressed in the time scale of the stream the
/// sample belongs to (see [`StreamInfo::time_scale`](crate::StreamInfo::time_scale)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSample {
    pub track_id: u32,
    pub data: Bytes,
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub is_key_frame: bool,
}

impl MediaSample {
    pub fn new(track_id: u32, data: Bytes, is_key_frame: bool) -> Self {
        Self {
            track_id,
            data,
            pts: 0,
            dts: 0,
            duration: 0,
            is_key_frame,
        }
    }

    pub fn with_timestamps(mut self, pts: i64, dts: i64) -> Self {
        self.pts = pts;
        self.dts = dts;
        self
    }

    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
