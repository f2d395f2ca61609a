use bytes_util::ByteQueueError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebMError {
    #[error("parser not initialized")]
    NotInitialized,

    #[error("parser already initialized")]
    AlreadyInitialized,

    #[error("parser is in the error state")]
    ErrorState,

    #[error("invalid element header: {0}")]
    InvalidElementHeader(&'static str),

    #[error("unexpected element id 0x{id:X}")]
    UnexpectedElement { id: u32 },

    #[error("found Cluster element before Info")]
    ClusterBeforeInfo,

    #[error("element 0x{id:X} has unknown size")]
    UnknownSize { id: u32 },

    #[error("element 0x{id:X} overflows its parent ({size} > {available} bytes)")]
    ChildOverflow { id: u32, size: u64, available: u64 },

    #[error("invalid value for element 0x{id:X}: {reason}")]
    InvalidValue { id: u32, reason: &'static str },

    #[error("element 0x{id:X} is missing from 0x{parent:X}")]
    MissingElement { parent: u32, id: u32 },

    #[error("duplicate track number {0}")]
    DuplicateTrackNumber(u64),

    #[error("unsupported codec id {0:?}")]
    UnsupportedCodec(String),

    #[error("block found before the cluster timecode")]
    BlockBeforeTimecode,

    #[error("block for unknown track {0}")]
    UnknownTrack(u64),

    #[error("invalid lacing: {0}")]
    InvalidLacing(&'static str),

    #[error("laced block on track {0} without a default duration")]
    LacedWithoutDefaultDuration(u64),

    #[error("sample rejected by consumer (track {track_id}, pts {pts})")]
    SampleRejected { track_id: u32, pts: i64 },

    #[error("byte queue error: {0}")]
    ByteQueue(#[from] ByteQueueError),
}
