use bytes_util::ByteQueueError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AacError {
    /// Sampling frequency indices 13 and 14 are reserved, 15 signals an
    /// explicit frequency, which ADTS does not carry.
    #[error("unsupported ADTS sampling frequency index: {0}")]
    UnsupportedFrequencyIndex(u8),

    /// Channel configuration 0 (in-band PCE) or a value past the table.
    #[error("unsupported ADTS channel configuration: {0}")]
    UnsupportedChannelConfig(u8),

    #[error("sample rejected by consumer (track {track_id}, pts {pts})")]
    SampleRejected { track_id: u32, pts: i64 },

    #[error("byte queue error: {0}")]
    ByteQueue(#[from] ByteQueueError),

    #[error("timestamp outside the representable timeline")]
    TimestampOutOfRange,

    #[error("timestamp helper missing after audio configuration")]
    MissingTimestampHelper,
}
