//! FORM/EMC2 chunk container codec.
//!
//! Splits a `.EMC` file into its three named chunk payloads (`ORDR`,
//! optional `TEXT`, `DATA`) or joins them back into file bytes. This module
//! knows nothing about word or TEXT-string semantics — it only knows how to
//! slice and pad chunks, the way the teacher's encoder stays ignorant of
//! lexer tokenization. See spec.md §3, §4.1.

use crate::error::{Error, Result};

const FORM_TAG: &[u8; 4] = b"FORM";
const EMC2_TAG: &[u8; 4] = b"EMC2";
const ORDR_TAG: [u8; 4] = *b"ORDR";
const TEXT_TAG: [u8; 4] = *b"TEXT";
const DATA_TAG: [u8; 4] = *b"DATA";

/// The three chunk payloads carried by an EMC2 container, pre-padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunks {
    pub order: Vec<u8>,
    pub text: Option<Vec<u8>>,
    pub data: Vec<u8>,
}

fn malformed(reason: impl Into<String>) -> Error {
    Error::MalformedContainer { reason: reason.into() }
}

fn read_u32(bytes: &[u8], at: usize) -> Result<u32> {
    bytes
        .get(at..at + 4)
        .map(|s| u32::from_be_bytes(s.try_into().unwrap()))
        .ok_or_else(|| malformed("truncated length field"))
}

fn read_tag<'a>(bytes: &'a [u8], at: usize) -> Result<&'a [u8]> {
    bytes.get(at..at + 4).ok_or_else(|| malformed("truncated tag"))
}

/// Split container bytes into `ORDR`/`TEXT`/`DATA` chunk payloads.
///
/// Fails with [`Error::MalformedContainer`] on a bad magic, a length
/// mismatch, a truncated or unpadded chunk, or a missing required chunk.
pub fn split(bytes: &[u8]) -> Result<Chunks> {
    if read_tag(bytes, 0)? != FORM_TAG.as_slice() {
        return Err(malformed("missing FORM magic"));
    }
    let declared_len = read_u32(bytes, 4)? as usize;
    if declared_len != bytes.len() {
        return Err(malformed(format!(
            "declared FORM length {declared_len} does not match buffer length {}",
            bytes.len()
        )));
    }

    let mut cursor = 8;
    if read_tag(bytes, cursor)? != EMC2_TAG.as_slice() {
        return Err(malformed("missing EMC2 form type"));
    }
    cursor += 4;

    let (order_name, order) = read_chunk(bytes, &mut cursor)?;
    if order_name != ORDR_TAG {
        return Err(malformed("expected ORDR chunk"));
    }
    if order.len() % 2 != 0 {
        return Err(malformed("ORDR chunk size is not a multiple of 2"));
    }

    let mut text = None;
    if bytes.get(cursor..cursor + 4) == Some(TEXT_TAG.as_slice()) {
        let (_, payload) = read_chunk(bytes, &mut cursor)?;
        text = Some(payload);
    }

    let (data_name, data) = read_chunk(bytes, &mut cursor)?;
    if data_name != DATA_TAG {
        return Err(malformed("expected DATA chunk"));
    }
    if data.len() % 2 != 0 {
        return Err(malformed("DATA chunk size is not a multiple of 2"));
    }

    if cursor != bytes.len() {
        return Err(malformed("trailing bytes after DATA chunk"));
    }

    Ok(Chunks { order, text, data })
}

/// Read one `NAME SIZE payload [pad]` chunk at `*cursor`, advancing it past
/// the chunk including any zero pad byte.
fn read_chunk(bytes: &[u8], cursor: &mut usize) -> Result<([u8; 4], Vec<u8>)> {
    let name: [u8; 4] = read_tag(bytes, *cursor)?.try_into().unwrap();
    let size = read_u32(bytes, *cursor + 4)? as usize;
    let payload_start = *cursor + 8;
    let payload = bytes
        .get(payload_start..payload_start + size)
        .ok_or_else(|| malformed(format!("chunk {:?} truncated", tag_display(&name))))?
        .to_vec();

    let mut end = payload_start + size;
    if size % 2 == 1 {
        if bytes.get(end) != Some(&0) {
            return Err(malformed(format!(
                "chunk {:?} has odd size but no zero pad byte",
                tag_display(&name)
            )));
        }
        end += 1;
    }
    *cursor = end;
    Ok((name, payload))
}

fn tag_display(name: &[u8; 4]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

/// Join `ORDR`/`TEXT`/`DATA` chunk payloads back into container bytes, in
/// the fixed chunk order ORDR, optional TEXT, DATA.
#[must_use]
pub fn join(chunks: &Chunks) -> Vec<u8> {
    let mut payload = Vec::new();
    payload.extend_from_slice(EMC2_TAG);
    write_chunk(&mut payload, &ORDR_TAG, &chunks.order);
    if let Some(text) = &chunks.text {
        write_chunk(&mut payload, &TEXT_TAG, text);
    }
    write_chunk(&mut payload, &DATA_TAG, &chunks.data);

    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(FORM_TAG);
    out.extend_from_slice(&((8 + payload.len()) as u32).to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

fn write_chunk(out: &mut Vec<u8>, name: &[u8; 4], payload: &[u8]) {
    out.extend_from_slice(name);
    out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    out.extend_from_slice(payload);
    if payload.len() % 2 == 1 {
        out.push(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(text: Option<Vec<u8>>) -> Chunks {
        Chunks {
            order: vec![0x00, 0x00],
            text,
            data: vec![0x80, 0x00],
        }
    }

    #[test]
    fn round_trips_without_text() {
        let chunks = sample(None);
        let bytes = join(&chunks);
        assert_eq!(split(&bytes).unwrap(), chunks);
    }

    #[test]
    fn round_trips_with_text() {
        let chunks = sample(Some(vec![0x00, 0x02, b'a', 0]));
        let bytes = join(&chunks);
        assert_eq!(split(&bytes).unwrap(), chunks);
    }

    #[test]
    fn round_trips_odd_sized_data_with_pad() {
        let chunks = Chunks {
            order: vec![0x00, 0x00],
            text: None,
            data: vec![0x80, 0x00, 0xAA],
        };
        let bytes = join(&chunks);
        assert_eq!(split(&bytes).unwrap(), chunks);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = join(&sample(None));
        bytes[0] = b'X';
        assert!(matches!(split(&bytes), Err(Error::MalformedContainer { .. })));
    }

    #[test]
    fn rejects_length_mismatch() {
        let mut bytes = join(&sample(None));
        bytes.push(0xFF);
        assert!(matches!(split(&bytes), Err(Error::MalformedContainer { .. })));
    }

    #[test]
    fn rejects_missing_pad_byte() {
        let chunks = Chunks {
            order: vec![0x00, 0x00],
            text: None,
            data: vec![0x80, 0x00, 0xAA],
        };
        let mut bytes = join(&chunks);
        let last = bytes.len() - 1;
        bytes[last] = 0x01; // pad byte should be zero
        assert!(matches!(split(&bytes), Err(Error::MalformedContainer { .. })));
    }

    #[test]
    fn rejects_missing_required_chunk() {
        // ORDR chunk renamed so the required-chunk check fails.
        let mut bytes = join(&sample(None));
        bytes[8] = b'X';
        assert!(matches!(split(&bytes), Err(Error::MalformedContainer { .. })));
    }
}
