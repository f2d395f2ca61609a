//! Byte buffering helpers shared by the incremental demuxers.
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(unsafe_code)]

mod byte_queue;

pub use byte_queue::{ByteQueue, ByteQueueError};
