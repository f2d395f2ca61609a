//! Incremental WebM (Matroska) demuxing.
//!
//! [`WebMMediaParser`] walks the top-level element sequence of a WebM
//! segment as bytes arrive: configuration-free elements are skipped, the
//! `Info` and `Tracks` elements produce one [`StreamInfo`] per usable track,
//! and `Cluster` payloads are handed to the [`ClusterParser`], which emits
//! one [`MediaSample`] per frame with microsecond timestamps.
//!
//! [`StreamInfo`]: media_types::StreamInfo
//! [`MediaSample`]: media_types::MediaSample
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(unsafe_code)]

pub mod block;
pub mod cluster;
pub mod config;
pub mod ebml;
pub mod error;
pub mod ids;
pub mod info;
pub mod media_parser;
pub mod tracks;

pub use block::{Block, Lacing};
pub use cluster::{ClusterParser, ClusterTrack};
pub use config::WebMParserConfig;
pub use ebml::{ElementHeader, UNKNOWN_SIZE, parse_element_header};
pub use error::WebMError;
pub use info::SegmentInfo;
pub use media_parser::{ParserState, WebMMediaParser};
pub use tracks::{TrackEntry, TrackKind, Tracks, WEBM_TIMESCALE};

/// Result type for WebM parsing operations
pub type Result<T> = std::result::Result<T, WebMError>;
