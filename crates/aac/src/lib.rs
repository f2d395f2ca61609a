//! ADTS (Audio Data Transport Stream) AAC elementary stream parsing.
//!
//! [`EsParserAdts`] accepts raw ADTS bytes in arbitrarily sized chunks, locates
//! frame boundaries with a corroborated sync-word search, extracts the audio
//! configuration from the first frame header and emits one [`MediaSample`] per
//! complete frame.
//!
//! [`MediaSample`]: media_types::MediaSample
#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(unsafe_code)]

pub mod adts;
pub mod error;
pub mod es_parser;

pub use adts::{AdtsHeader, SyncSearch, find_sync_word, is_sync_word};
pub use error::AacError;
pub use es_parser::{AdtsParserOptions, EsParserAdts, MPEG2_TIMESCALE};

/// Result type for AAC parsing operations
pub type Result<T> = std::result::Result<T, AacError>;
