//! Shared media domain types for the demuxers: stream descriptions, samples,
//! the audio timestamp helper and the callback signatures parsers emit through.
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(unsafe_code)]

mod codec;
mod key_source;
mod sample;
mod stream_info;
mod timestamp;

use std::sync::Arc;

pub use codec::{AudioCodec, Codec, VideoCodec};
pub use key_source::KeySource;
pub use sample::MediaSample;
pub use stream_info::{AudioStreamInfo, StreamInfo, TextStreamInfo, VideoStreamInfo};
pub use timestamp::AudioTimestampHelper;

/// Receives a newly established stream configuration.
pub type NewStreamInfoCb = Box<dyn FnMut(Arc<StreamInfo>) + Send>;

/// Receives every stream configured by a container header, in track order.
pub type InitCb = Box<dyn FnMut(Vec<Arc<StreamInfo>>) + Send>;

/// Receives one decodable sample. Returning `false` rejects the sample and
/// aborts the current parse call.
pub type NewSampleCb = Box<dyn FnMut(MediaSample) -> bool + Send>;

/// Video resolution information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    #[inline]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_display() {
        assert_eq!(Resolution::new(640, 360).to_string(), "640x360");
    }

    #[test]
    fn test_callbacks_are_send() {
        fn assert_send<T: Send>(_: &T) {}

        let init: InitCb = Box::new(|streams| assert!(streams.is_empty()));
        let sample: NewSampleCb = Box::new(|sample| sample.is_key_frame);
        assert_send(&init);
        assert_send(&sample);
    }
}
