/// Converts a running count of audio frames (PCM sample frames) into
/// timestamps on a fixed time scale.
///
/// The position is always recomputed from the base timestamp and the total
/// frame count, so rounding never accumulates across frames. Positions that
/// fall outside the `i64` range are reported as `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioTimestampHelper {
    base_timestamp: i64,
    frame_count: i64,
    timescale: i64,
    samples_per_second: i64,
}

impl AudioTimestampHelper {
    /// `timescale` is ticks per second of the output timeline,
    /// `samples_per_second` the PCM sample rate being counted.
    pub fn new(timescale: u32, samples_per_second: u32) -> Self {
        Self {
            base_timestamp: 0,
            frame_count: 0,
            timescale: timescale as i64,
            samples_per_second: samples_per_second.max(1) as i64,
        }
    }

    /// Moves the timeline origin to `base_timestamp` and clears the frame count.
    pub fn set_base_timestamp(&mut self, base_timestamp: i64) {
        self.base_timestamp = base_timestamp;
        self.frame_count = 0;
    }

    pub fn base_timestamp(&self) -> i64 {
        self.base_timestamp
    }

    pub fn frame_count(&self) -> i64 {
        self.frame_count
    }

    pub fn add_frames(&mut self, frame_count: i64) {
        self.frame_count = self.frame_count.saturating_add(frame_count);
    }

    /// Timestamp of the next frame to be counted.
    pub fn timestamp(&self) -> Option<i64> {
        self.compute_timestamp(i128::from(self.frame_count))
    }

    /// Duration of the next `frame_count` frames.
    pub fn frame_duration(&self, frame_count: i64) -> Option<i64> {
        let end =
            self.compute_timestamp(i128::from(self.frame_count) + i128::from(frame_count))?;
        end.checked_sub(self.timestamp()?)
    }

    fn compute_timestamp(&self, frame_count: i128) -> Option<i64> {
        let frames_ticks =
            frame_count * i128::from(self.timescale) / i128::from(self.samples_per_second);
        i64::try_from(i128::from(self.base_timestamp) + frames_ticks).ok()
    }
}
