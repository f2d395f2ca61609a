//! ADTS fixed header decoding and frame boundary search.
//!
//! Header layout (ISO 14496-3, 1.A.2.2), first 7 bytes:
//!
//! ```text
//! syncword(12) id(1) layer(2) protection_absent(1)
//! profile(2) sampling_frequency_index(4) private(1) channel_configuration(3)
//! original(1) home(1) copyright_id(1) copyright_start(1) frame_length(13)
//! buffer_fullness(11) raw_data_blocks(2)
//! ```

use memchr::memchr;

/// Size of the ADTS header without CRC.
pub const ADTS_HEADER_MIN_SIZE: usize = 7;
/// Bytes needed to recognise a sync word.
pub const ADTS_SYNC_WORD_SIZE: usize = 2;
/// PCM samples carried by one AAC frame.
pub const SAMPLES_PER_AAC_FRAME: i64 = 1024;

/// Sample rates indexed by `sampling_frequency_index`.
pub const ADTS_FREQUENCY_TABLE: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Channel counts indexed by `channel_configuration`.
pub const ADTS_NUM_CHANNELS_TABLE: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 8];

/// Maximum output rate when SBR doubling applies (Table 1.11 cap).
pub const MAX_EXTENDED_SAMPLE_RATE: u32 = 48000;

/// Returns true if `buf` starts with an ADTS sync word: twelve set bits
/// followed by a zero layer field.
#[inline]
pub fn is_sync_word(buf: &[u8]) -> bool {
    buf.len() >= ADTS_SYNC_WORD_SIZE && buf[0] == 0xFF && (buf[1] & 0xF6) == 0xF0
}

/// Fields of the fixed ADTS header that the parser relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    pub protection_absent: bool,
    /// `profile_ObjectType`; the MPEG-4 audio object type is `profile + 1`.
    pub profile: u8,
    pub frequency_index: u8,
    pub channel_config: u8,
    /// Total frame length including the header.
    pub frame_size: usize,
}

impl AdtsHeader {
    /// Decodes the header at the start of `buf`.
    ///
    /// Returns `None` when fewer than [`ADTS_HEADER_MIN_SIZE`] bytes are
    /// available or the sync word does not match. Field values are not
    /// validated against the rate and channel tables.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < ADTS_HEADER_MIN_SIZE || !is_sync_word(buf) {
            return None;
        }
        Some(Self {
            protection_absent: (buf[1] & 0x01) != 0,
            profile: (buf[2] >> 6) & 0x03,
            frequency_index: (buf[2] >> 2) & 0x0F,
            channel_config: ((buf[2] & 0x01) << 2) | ((buf[3] >> 6) & 0x03),
            frame_size: extract_frame_size(buf),
        })
    }

    /// MPEG-4 audio object type (1 = AAC Main, 2 = AAC LC, ...).
    #[inline]
    pub fn audio_object_type(&self) -> u8 {
        self.profile + 1
    }

    /// Two-byte AudioSpecificConfig equivalent to this header.
    pub fn audio_specific_config(&self) -> [u8; 2] {
        let object_type = self.audio_object_type();
        [
            (object_type << 3) | ((self.frequency_index >> 1) & 0x07),
            ((self.frequency_index & 0x01) << 7) | ((self.channel_config & 0x0F) << 3),
        ]
    }
}

/// 13-bit `frame_length` spanning bytes 3..=5. `buf` must hold at least
/// 6 bytes.
#[inline]
fn extract_frame_size(buf: &[u8]) -> usize {
    (((buf[3] & 0x03) as usize) << 11) | ((buf[4] as usize) << 3) | ((buf[5] as usize) >> 5)
}

/// Outcome of [`find_sync_word`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSearch {
    /// A frame starts at `offset` and declares `frame_size` bytes. The frame
    /// itself may extend past the end of the buffer.
    Found { offset: usize, frame_size: usize },
    /// Every candidate before `resume_at` was rejected; scanning has to
    /// resume there once more bytes are available.
    NotFound { resume_at: usize },
}

/// Looks for the next ADTS frame in `raw`, starting at `pos`.
///
/// Candidates are offsets where a full header fits. A candidate needs a valid
/// sync word and a declared size of at least [`ADTS_HEADER_MIN_SIZE`]; when
/// the buffer also holds the start of the following frame, a second sync word
/// must sit at `offset + frame_size`. A rejected candidate resumes the scan one
/// byte later. Near the end of the buffer the corroboration is skipped and the
/// candidate is accepted as is.
pub fn find_sync_word(raw: &[u8], pos: usize) -> SyncSearch {
    let Some(max_offset) = raw.len().checked_sub(ADTS_HEADER_MIN_SIZE) else {
        return SyncSearch::NotFound { resume_at: pos };
    };
    if pos > max_offset {
        return SyncSearch::NotFound { resume_at: pos };
    }

    let mut offset = pos;
    while offset <= max_offset {
        let Some(skip) = memchr(0xFF, &raw[offset..=max_offset]) else {
            break;
        };
        offset += skip;

        let cur = &raw[offset..];
        if !is_sync_word(cur) {
            offset += 1;
            continue;
        }

        let frame_size = extract_frame_size(cur);
        if frame_size < ADTS_HEADER_MIN_SIZE {
            offset += 1;
            continue;
        }

        let remaining = cur.len();
        if remaining >= frame_size + ADTS_SYNC_WORD_SIZE && !is_sync_word(&cur[frame_size..]) {
            offset += 1;
            continue;
        }

        return SyncSearch::Found { offset, frame_size };
    }

    SyncSearch::NotFound {
        resume_at: max_offset + 1,
    }
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
pub(crate) mod tests {
    use super::*;

    /// Builds an AAC-LC ADTS frame of `frame_size` bytes with a zeroed payload.
    pub(crate) fn adts_frame(frame_size: usize, frequency_index: u8, channel_config: u8) -> Vec<u8> {
        let profile = 1u8;
        let mut frame = vec![
            0xFF,
            0xF1,
            (profile << 6) | ((frequency_index & 0x0F) << 2) | ((channel_config >> 2) & 0x01),
            ((channel_config & 0x03) << 6) | ((frame_size >> 11) & 0x03) as u8,
            ((frame_size >> 3) & 0xFF) as u8,
            (((frame_size & 0x07) << 5) as u8) | 0x1F,
            0xFC,
        ];
        frame.resize(frame_size.max(ADTS_HEADER_MIN_SIZE), 0);
        frame
    }

    #[test]
    fn test_sync_word() {
        assert!(is_sync_word(&[0xFF, 0xF1]));
        assert!(is_sync_word(&[0xFF, 0xF9]));
        assert!(!is_sync_word(&[0xFF, 0xF2])); // layer bits set
        assert!(!is_sync_word(&[0xFF, 0xF4]));
        assert!(!is_sync_word(&[0xFE, 0xF1]));
        assert!(!is_sync_word(&[0xFF]));
    }

    #[test]
    fn test_parse_header_fields() {
        let frame = adts_frame(371, 4, 2);
        let header = AdtsHeader::parse(&frame).unwrap();
        assert!(header.protection_absent);
        assert_eq!(header.profile, 1);
        assert_eq!(header.audio_object_type(), 2);
        assert_eq!(header.frequency_index, 4);
        assert_eq!(header.channel_config, 2);
        assert_eq!(header.frame_size, 371);
    }

    #[test]
    fn test_parse_header_large_frame_and_high_channel_config() {
        let frame = adts_frame(8191, 11, 7);
        let header = AdtsHeader::parse(&frame).unwrap();
        assert_eq!(header.frame_size, 8191);
        assert_eq!(header.frequency_index, 11);
        assert_eq!(header.channel_config, 7);
    }

    #[test]
    fn test_parse_header_too_short() {
        let frame = adts_frame(100, 4, 2);
        assert!(AdtsHeader::parse(&frame[..6]).is_none());
    }

    #[test]
    fn test_audio_specific_config() {
        // AAC-LC, 44.1kHz, stereo => 0x12 0x10
        let header = AdtsHeader::parse(&adts_frame(100, 4, 2)).unwrap();
        assert_eq!(header.audio_specific_config(), [0x12, 0x10]);

        // AAC-LC, 48kHz, mono => 0x11 0x88
        let header = AdtsHeader::parse(&adts_frame(100, 3, 1)).unwrap();
        assert_eq!(header.audio_specific_config(), [0x11, 0x88]);
    }

    #[test]
    fn test_find_corroborated_frame() {
        let mut data = adts_frame(200, 4, 2);
        data.extend(adts_frame(200, 4, 2));
        assert_eq!(
            find_sync_word(&data, 0),
            SyncSearch::Found {
                offset: 0,
                frame_size: 200
            }
        );
        assert_eq!(
            find_sync_word(&data, 200),
            SyncSearch::Found {
                offset: 200,
                frame_size: 200
            }
        );
    }

    #[test]
    fn test_short_buffer_never_matches() {
        let frame = adts_frame(100, 4, 2);
        assert_eq!(
            find_sync_word(&frame[..ADTS_HEADER_MIN_SIZE - 1], 0),
            SyncSearch::NotFound { resume_at: 0 }
        );
        assert_eq!(find_sync_word(&[], 0), SyncSearch::NotFound { resume_at: 0 });
    }

    #[test]
    fn test_exact_header_is_a_candidate() {
        let frame = adts_frame(100, 4, 2);
        assert_eq!(
            find_sync_word(&frame[..ADTS_HEADER_MIN_SIZE], 0),
            SyncSearch::Found {
                offset: 0,
                frame_size: 100
            }
        );
    }

    #[test]
    fn test_undersized_frame_is_skipped_byte_by_byte() {
        // Header declaring a 3-byte frame, then a genuine frame right after it.
        let mut data = adts_frame(ADTS_HEADER_MIN_SIZE, 4, 2);
        data[3] &= !0x03;
        data[4] = 0;
        data[5] = (3 << 5) | 0x1F;
        assert_eq!(AdtsHeader::parse(&data).unwrap().frame_size, 3);

        data.extend(adts_frame(50, 4, 2));
        data.extend(adts_frame(50, 4, 2));
        assert_eq!(
            find_sync_word(&data, 0),
            SyncSearch::Found {
                offset: ADTS_HEADER_MIN_SIZE,
                frame_size: 50
            }
        );
    }

    #[test]
    fn test_failed_corroboration_resumes_one_byte_later() {
        // 0xFF 0xFF 0xF1 ...: offset 0 is not a sync word (layer bits),
        // offset 1 is.
        let mut data = vec![0xFF];
        data.extend(adts_frame(40, 4, 2));
        data.extend(adts_frame(40, 4, 2));
        assert_eq!(
            find_sync_word(&data, 0),
            SyncSearch::Found {
                offset: 1,
                frame_size: 40
            }
        );

        // A sync word claiming 20 bytes with no sync word 20 bytes later.
        let mut data = adts_frame(20, 4, 2);
        data.extend(vec![0u8; 10]);
        data.extend(adts_frame(20, 4, 2));
        data.extend(adts_frame(20, 4, 2));
        assert_eq!(
            find_sync_word(&data, 0),
            SyncSearch::Found {
                offset: 30,
                frame_size: 20
            }
        );
    }

    #[test]
    fn test_speculative_accept_near_end() {
        // Not enough bytes to see the next sync word: accepted as is.
        let frame = adts_frame(100, 4, 2);
        assert_eq!(
            find_sync_word(&frame[..50], 0),
            SyncSearch::Found {
                offset: 0,
                frame_size: 100
            }
        );
    }

    #[test]
    fn test_not_found_reports_resume_position() {
        let data = vec![0u8; 64];
        assert_eq!(
            find_sync_word(&data, 0),
            SyncSearch::NotFound {
                resume_at: 64 - ADTS_HEADER_MIN_SIZE + 1
            }
        );
        // Starting past the last candidate leaves the position untouched.
        assert_eq!(
            find_sync_word(&data, 60),
            SyncSearch::NotFound { resume_at: 60 }
        );
    }
}
