//! `SimpleBlock` / `Block` payload decoding.
//!
//! ```text
//! [track number: vint] [timecode: i16, relative to cluster] [flags: u8] [lacing header] [frames]
//! ```
//!
//! Flag bit 0x80 marks a key frame (SimpleBlock only), bits 0x06 select the
//! lacing: 00 none, 01 Xiph, 11 EBML, 10 fixed-size.

use byteorder::{BigEndian, ByteOrder};
use bytes::Bytes;

use crate::{Result, WebMError};

const FLAG_KEYFRAME: u8 = 0x80;
const LACING_MASK: u8 = 0x06;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lacing {
    None,
    Xiph,
    FixedSize,
    Ebml,
}

impl Lacing {
    fn from_flags(flags: u8) -> Self {
        match (flags & LACING_MASK) >> 1 {
            0b00 => Lacing::None,
            0b01 => Lacing::Xiph,
            0b10 => Lacing::FixedSize,
            _ => Lacing::Ebml,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub track_number: u64,
    pub relative_timecode: i16,
    pub flags: u8,
    /// One entry per laced frame; a single entry without lacing.
    pub frames: Vec<Bytes>,
}

impl Block {
    /// Decodes a block payload. `id` names the enclosing element in errors.
    pub fn parse(id: u32, payload: Bytes) -> Result<Self> {
        let invalid = |reason| WebMError::InvalidValue { id, reason };

        let (track_number, vint_len) =
            read_vint(&payload).ok_or_else(|| invalid("bad block track number"))?;
        let header_len = vint_len + 3;
        if payload.len() < header_len {
            return Err(invalid("block header truncated"));
        }
        let relative_timecode = BigEndian::read_i16(&payload[vint_len..vint_len + 2]);
        let flags = payload[vint_len + 2];

        let frames = split_frames(Lacing::from_flags(flags), payload.slice(header_len..))?;

        Ok(Self {
            track_number,
            relative_timecode,
            flags,
            frames,
        })
    }

    pub fn is_keyframe(&self) -> bool {
        self.flags & FLAG_KEYFRAME != 0
    }

    pub fn lacing(&self) -> Lacing {
        Lacing::from_flags(self.flags)
    }
}

/// Reads an unsigned vint with its marker removed.
fn read_vint(buf: &[u8]) -> Option<(u64, usize)> {
    let first = *buf.first()?;
    let width = first.leading_zeros() as usize + 1;
    if width > 8 || buf.len() < width {
        return None;
    }
    let raw = BigEndian::read_uint(&buf[..width], width);
    Some((raw & ((1u64 << (7 * width)) - 1), width))
}

/// Reads a signed EBML lacing delta: the unsigned value minus half its range.
fn read_signed_vint(buf: &[u8]) -> Option<(i64, usize)> {
    let (value, width) = read_vint(buf)?;
    let bias = (1i64 << (7 * width - 1)) - 1;
    Some((value as i64 - bias, width))
}

pub fn split_frames(lacing: Lacing, data: Bytes) -> Result<Vec<Bytes>> {
    if lacing == Lacing::None {
        return Ok(vec![data]);
    }

    let Some(&count_minus_one) = data.first() else {
        return Err(WebMError::InvalidLacing("missing frame count"));
    };
    let frame_count = count_minus_one as usize + 1;
    let mut pos = 1;
    let mut sizes = Vec::with_capacity(frame_count);

    match lacing {
        Lacing::Xiph => {
            for _ in 1..frame_count {
                let mut size = 0usize;
                loop {
                    let byte = *data
                        .get(pos)
                        .ok_or(WebMError::InvalidLacing("truncated Xiph lace sizes"))?;
                    pos += 1;
                    size += byte as usize;
                    if byte != 0xFF {
                        break;
                    }
                }
                sizes.push(size);
            }
        }
        Lacing::FixedSize => {
            let remaining = data.len() - pos;
            if remaining % frame_count != 0 {
                return Err(WebMError::InvalidLacing(
                    "fixed-size lacing does not divide the block",
                ));
            }
            sizes.resize(frame_count - 1, remaining / frame_count);
        }
        Lacing::Ebml => {
            if frame_count > 1 {
                let (first, width) = read_vint(&data[pos..])
                    .ok_or(WebMError::InvalidLacing("truncated EBML lace size"))?;
                pos += width;
                let mut size = i64::try_from(first)
                    .map_err(|_| WebMError::InvalidLacing("EBML lace size too large"))?;
                sizes.push(size as usize);
                for _ in 2..frame_count {
                    let (delta, width) = read_signed_vint(&data[pos..])
                        .ok_or(WebMError::InvalidLacing("truncated EBML lace delta"))?;
                    pos += width;
                    size = size
                        .checked_add(delta)
                        .filter(|&size| size >= 0)
                        .ok_or(WebMError::InvalidLacing("negative EBML lace size"))?;
                    sizes.push(size as usize);
                }
            }
        }
        Lacing::None => {}
    }

    let laced: usize = sizes
        .iter()
        .try_fold(0usize, |total, &size| total.checked_add(size))
        .ok_or(WebMError::InvalidLacing("lace sizes overflow"))?;
    let last = (data.len() - pos)
        .checked_sub(laced)
        .ok_or(WebMError::InvalidLacing("lace sizes exceed the block"))?;
    sizes.push(last);

    let mut frames = Vec::with_capacity(frame_count);
    for size in sizes {
        frames.push(data.slice(pos..pos + size));
        pos += size;
    }
    Ok(frames)
}
