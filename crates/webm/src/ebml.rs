//! EBML element header and value decoding.
//!
//! Element ids and sizes are variable-length integers whose width is given
//! by the position of the first set bit of the leading byte:
//!
//! ```text
//! 1xxx xxxx                     1 byte,  7 data bits
//! 01xx xxxx xxxx xxxx           2 bytes, 14 data bits
//! ...
//! 0000 0001 xxxx ... xxxx       8 bytes, 56 data bits
//! ```
//!
//! Ids keep the marker bit and are at most 4 bytes wide. Sizes drop it; a
//! size whose data bits are all set means "unknown" (a streamed element).

use byteorder::{BigEndian, ByteOrder};

use crate::{Result, WebMError};

/// Size of an element whose end is not known in advance.
pub const UNKNOWN_SIZE: u64 = u64::MAX;

const MAX_ID_WIDTH: usize = 4;
const MAX_SIZE_WIDTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub id: u32,
    /// Payload size, or [`UNKNOWN_SIZE`].
    pub size: u64,
    /// Bytes taken by the id and size fields.
    pub header_len: usize,
}

impl ElementHeader {
    pub fn is_unknown_size(&self) -> bool {
        self.size == UNKNOWN_SIZE
    }

    /// Header plus payload length, `None` for unknown-size elements.
    pub fn total_len(&self) -> Option<usize> {
        if self.is_unknown_size() {
            return None;
        }
        let size = usize::try_from(self.size).unwrap_or(usize::MAX);
        Some(size.saturating_add(self.header_len))
    }
}

#[inline]
fn vint_width(first: u8) -> usize {
    first.leading_zeros() as usize + 1
}

/// Decodes the element header at the front of `buf`.
///
/// Returns `Ok(None)` when `buf` ends inside the header.
pub fn parse_element_header(buf: &[u8]) -> Result<Option<ElementHeader>> {
    let Some(&first) = buf.first() else {
        return Ok(None);
    };
    let id_width = vint_width(first);
    if id_width > MAX_ID_WIDTH {
        return Err(WebMError::InvalidElementHeader(
            "element id wider than 4 bytes",
        ));
    }
    if buf.len() < id_width {
        return Ok(None);
    }
    let id = BigEndian::read_uint(&buf[..id_width], id_width) as u32;

    let Some(&size_first) = buf.get(id_width) else {
        return Ok(None);
    };
    let size_width = vint_width(size_first);
    if size_width > MAX_SIZE_WIDTH {
        return Err(WebMError::InvalidElementHeader(
            "element size wider than 8 bytes",
        ));
    }
    let header_len = id_width + size_width;
    if buf.len() < header_len {
        return Ok(None);
    }

    let raw = BigEndian::read_uint(&buf[id_width..header_len], size_width);
    let mask = (1u64 << (7 * size_width)) - 1;
    let value = raw & mask;
    let size = if value == mask { UNKNOWN_SIZE } else { value };

    Ok(Some(ElementHeader {
        id,
        size,
        header_len,
    }))
}

/// Returns the header and payload of the element at the front of `buf` once
/// it is completely buffered.
pub fn complete_element(buf: &[u8]) -> Result<Option<(ElementHeader, &[u8])>> {
    let Some(header) = parse_element_header(buf)? else {
        return Ok(None);
    };
    let total = header
        .total_len()
        .ok_or(WebMError::UnknownSize { id: header.id })?;
    if buf.len() < total {
        return Ok(None);
    }
    Ok(Some((header, &buf[header.header_len..total])))
}

/// Iterates over the children of a completely buffered master element.
pub fn children(payload: &[u8]) -> Children<'_> {
    Children { buf: payload }
}

pub struct Children<'a> {
    buf: &'a [u8],
}

impl<'a> Children<'a> {
    fn next_child(&mut self) -> Result<(u32, &'a [u8])> {
        let header = parse_element_header(self.buf)?.ok_or(
            WebMError::InvalidElementHeader("truncated child element header"),
        )?;
        if header.is_unknown_size() {
            return Err(WebMError::UnknownSize { id: header.id });
        }
        let available = (self.buf.len() - header.header_len) as u64;
        if header.size > available {
            return Err(WebMError::ChildOverflow {
                id: header.id,
                size: header.size,
                available,
            });
        }
        let end = header.header_len + header.size as usize;
        let payload = &self.buf[header.header_len..end];
        self.buf = &self.buf[end..];
        Ok((header.id, payload))
    }
}

impl<'a> Iterator for Children<'a> {
    type Item = Result<(u32, &'a [u8])>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buf.is_empty() {
            return None;
        }
        let child = self.next_child();
        if child.is_err() {
            self.buf = &[];
        }
        Some(child)
    }
}

pub fn read_uint(id: u32, payload: &[u8]) -> Result<u64> {
    if payload.is_empty() || payload.len() > 8 {
        return Err(WebMError::InvalidValue {
            id,
            reason: "unsigned integer must be 1 to 8 bytes",
        });
    }
    Ok(BigEndian::read_uint(payload, payload.len()))
}

pub fn read_int(id: u32, payload: &[u8]) -> Result<i64> {
    if payload.is_empty() || payload.len() > 8 {
        return Err(WebMError::InvalidValue {
            id,
            reason: "signed integer must be 1 to 8 bytes",
        });
    }
    Ok(BigEndian::read_int(payload, payload.len()))
}

pub fn read_float(id: u32, payload: &[u8]) -> Result<f64> {
    match payload.len() {
        4 => Ok(f64::from(BigEndian::read_f32(payload))),
        8 => Ok(BigEndian::read_f64(payload)),
        _ => Err(WebMError::InvalidValue {
            id,
            reason: "float must be 4 or 8 bytes",
        }),
    }
}

/// Reads a string element; trailing NUL padding is dropped.
pub fn read_string(id: u32, payload: &[u8]) -> Result<String> {
    let end = payload
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    std::str::from_utf8(&payload[..end])
        .map(str::to_owned)
        .map_err(|_| WebMError::InvalidValue {
            id,
            reason: "string is not valid UTF-8",
        })
}

#[cfg(test)]
#[cfg_attr(all(coverage_nightly, test), coverage(off))]
pub(crate) mod tests {
    use super::*;
    use crate::ids;

    /// Encodes an element with a minimal-width size field.
    pub(crate) fn element(id: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = id_bytes(id);
        out.extend(size_bytes(payload.len() as u64));
        out.extend_from_slice(payload);
        out
    }

    pub(crate) fn id_bytes(id: u32) -> Vec<u8> {
        let bytes = id.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count();
        bytes[skip..].to_vec()
    }

    pub(crate) fn size_bytes(size: u64) -> Vec<u8> {
        let width = (1..=8usize)
            .find(|w| size < (1u64 << (7 * w)) - 1)
            .unwrap();
        let encoded = size | (1u64 << (7 * width));
        encoded.to_be_bytes()[8 - width..].to_vec()
    }

    pub(crate) fn uint_element(id: u32, value: u64) -> Vec<u8> {
        let bytes = value.to_be_bytes();
        let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
        element(id, &bytes[skip..])
    }

    #[test]
    fn test_one_byte_id_header() {
        let header = parse_element_header(&[0xA3, 0x85, 0, 0, 0, 0, 0])
            .unwrap()
            .unwrap();
        assert_eq!(header.id, ids::SIMPLE_BLOCK);
        assert_eq!(header.size, 5);
        assert_eq!(header.header_len, 2);
        assert_eq!(header.total_len(), Some(7));
    }

    #[test]
    fn test_four_byte_id_header() {
        let data = [0x1A, 0x45, 0xDF, 0xA3, 0x42, 0x00];
        let header = parse_element_header(&data).unwrap().unwrap();
        assert_eq!(header.id, ids::EBML_HEADER);
        assert_eq!(header.size, 0x200);
        assert_eq!(header.header_len, 6);
    }

    #[test]
    fn test_header_needs_more_data() {
        assert_eq!(parse_element_header(&[]).unwrap(), None);
        assert_eq!(parse_element_header(&[0x1F, 0x43, 0xB6]).unwrap(), None);
        assert_eq!(parse_element_header(&[0x1F, 0x43, 0xB6, 0x75]).unwrap(), None);
        assert_eq!(
            parse_element_header(&[0x1F, 0x43, 0xB6, 0x75, 0x01, 0xFF]).unwrap(),
            None
        );
    }

    #[test]
    fn test_unknown_size_sentinel() {
        let data = [0x18, 0x53, 0x80, 0x67, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let header = parse_element_header(&data).unwrap().unwrap();
        assert_eq!(header.id, ids::SEGMENT);
        assert!(header.is_unknown_size());
        assert_eq!(header.total_len(), None);
        assert_eq!(header.header_len, 12);

        let header = parse_element_header(&[0xA3, 0xFF]).unwrap().unwrap();
        assert!(header.is_unknown_size());
    }

    #[test]
    fn test_invalid_vint_widths() {
        assert!(matches!(
            parse_element_header(&[0x08, 0x00, 0x00, 0x00, 0x00, 0x81]),
            Err(WebMError::InvalidElementHeader(_))
        ));
        assert!(matches!(
            parse_element_header(&[0xA3, 0x00]),
            Err(WebMError::InvalidElementHeader(_))
        ));
        assert!(parse_element_header(&[0x00]).is_err());
    }

    #[test]
    fn test_size_encoding_helper_matches_decoder() {
        for size in [0u64, 1, 126, 127, 200, 16_382, 16_383, 1 << 20] {
            let mut data = vec![0xA3];
            data.extend(size_bytes(size));
            let header = parse_element_header(&data).unwrap().unwrap();
            assert_eq!(header.size, size, "size {size}");
        }
    }

    #[test]
    fn test_complete_element() {
        let data = element(ids::TIMECODE, &[0x01, 0x02]);
        assert_eq!(complete_element(&data[..3]).unwrap(), None);
        let (header, payload) = complete_element(&data).unwrap().unwrap();
        assert_eq!(header.id, ids::TIMECODE);
        assert_eq!(payload, &[0x01, 0x02]);

        assert!(matches!(
            complete_element(&[0xE7, 0xFF]),
            Err(WebMError::UnknownSize { id: ids::TIMECODE })
        ));
    }

    #[test]
    fn test_children() {
        let mut payload = uint_element(ids::TRACK_NUMBER, 1);
        payload.extend(element(ids::CODEC_ID, b"A_OPUS"));
        let parsed: Vec<_> = children(&payload).collect::<Result<_>>().unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0], (ids::TRACK_NUMBER, &[1u8][..]));
        assert_eq!(parsed[1], (ids::CODEC_ID, &b"A_OPUS"[..]));
    }

    #[test]
    fn test_child_overflowing_parent() {
        let payload = [0xD7, 0x84, 0x01];
        let mut iter = children(&payload);
        assert!(matches!(
            iter.next(),
            Some(Err(WebMError::ChildOverflow {
                id: ids::TRACK_NUMBER,
                size: 4,
                available: 1
            }))
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_value_readers() {
        assert_eq!(read_uint(0, &[0x0F, 0x42, 0x40]).unwrap(), 1_000_000);
        assert!(read_uint(0, &[]).is_err());
        assert!(read_uint(0, &[0; 9]).is_err());

        assert_eq!(read_int(0, &[0xFF, 0xFE]).unwrap(), -2);
        assert_eq!(read_int(0, &[0x7F]).unwrap(), 127);

        assert_eq!(read_float(0, &1.5f32.to_be_bytes()).unwrap(), 1.5);
        assert_eq!(read_float(0, &2500.25f64.to_be_bytes()).unwrap(), 2500.25);
        assert!(read_float(0, &[0; 2]).is_err());

        assert_eq!(read_string(0, b"eng\0\0").unwrap(), "eng");
        assert_eq!(read_string(0, b"").unwrap(), "");
        assert!(read_string(0, &[0xC3, 0x28]).is_err());
    }
}
