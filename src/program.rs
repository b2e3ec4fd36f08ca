//! In-memory program model: entry table, string table, word stream.
//!
//! A `Program` is built once by [`Program::from_bytes`] (container parse +
//! TEXT decoding) and consumed once by the disassembler, or built by the
//! lowerer and consumed once by [`Program::to_bytes`]. Nothing mutates it in
//! place. See spec.md §3.

use crate::container::{self, Chunks};
use crate::error::{Error, Result};

/// The parsed form of an EMC2 script: entry table, optional string table,
/// raw word stream, and whether a TEXT chunk was present on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    pub order: Vec<u16>,
    pub strings: Vec<String>,
    pub data: Vec<u16>,
    pub text_present: bool,
}

impl Program {
    /// Build a program from its parts, defaulting TEXT presence to "present
    /// iff strings is non-empty" — the re-emission default spec.md §3 names.
    #[must_use]
    pub fn new(order: Vec<u16>, strings: Vec<String>, data: Vec<u16>) -> Self {
        let text_present = !strings.is_empty();
        Self { order, strings, data, text_present }
    }

    /// Parse a FORM/EMC2 container into a program.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let chunks = container::split(bytes)?;
        let order = words_from_be_bytes(&chunks.order);

        let (strings, text_present) = match &chunks.text {
            Some(text_bytes) => (parse_text(text_bytes)?, true),
            None => (Vec::new(), false),
        };

        let data = words_from_be_bytes(&chunks.data);

        for &entry in &order {
            if entry as usize >= data.len() {
                return Err(Error::MalformedContainer {
                    reason: format!(
                        "ORDR entry {entry} is out of range for DATA of length {}",
                        data.len()
                    ),
                });
            }
        }

        Ok(Self { order, strings, data, text_present })
    }

    /// Serialize the program back into FORM/EMC2 container bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let chunks = Chunks {
            order: words_to_be_bytes(&self.order),
            text: self.text_present.then(|| write_text(&self.strings)),
            data: words_to_be_bytes(&self.data),
        };
        container::join(&chunks)
    }
}

fn words_from_be_bytes(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

fn words_to_be_bytes(words: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 2);
    for w in words {
        out.extend_from_slice(&w.to_be_bytes());
    }
    out
}

/// Decode a TEXT chunk payload into its ordered ASCII strings.
///
/// The offset table has no length field of its own: it ends as soon as the
/// read cursor reaches the value of its own first entry, which must equal
/// the table's exact byte size. See spec.md §3.
fn parse_text(bytes: &[u8]) -> Result<Vec<String>> {
    let mut offsets = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let pair = bytes.get(i..i + 2).ok_or_else(|| Error::MalformedText {
            reason: "truncated TEXT offset table".into(),
        })?;
        let off = u16::from_be_bytes([pair[0], pair[1]]) as usize;
        offsets.push(off);
        i += 2;
        if offsets[0] <= i {
            if offsets[0] != i {
                return Err(Error::MalformedText {
                    reason: format!("TEXT offset table size {i} does not match first offset {}", offsets[0]),
                });
            }
            break;
        }
    }
    offsets.push(bytes.len());

    if !offsets.windows(2).all(|w| w[0] <= w[1]) {
        return Err(Error::MalformedText { reason: "TEXT offsets are not sorted ascending".into() });
    }

    let mut strings = Vec::with_capacity(offsets.len().saturating_sub(1));
    for w in offsets.windows(2) {
        let (start, end) = (w[0], w[1]);
        let slice = bytes.get(start..end).ok_or_else(|| Error::MalformedText {
            reason: "TEXT string offset out of range".into(),
        })?;
        let Some((&0, body)) = slice.split_last() else {
            return Err(Error::MalformedText { reason: "TEXT string is not NUL-terminated".into() });
        };
        if !body.is_ascii() {
            return Err(Error::MalformedText { reason: "TEXT string contains non-ASCII bytes".into() });
        }
        strings.push(String::from_utf8(body.to_vec()).expect("validated ASCII above"));
    }
    Ok(strings)
}

/// Encode strings back into a TEXT chunk payload, inverse of [`parse_text`].
fn write_text(strings: &[String]) -> Vec<u8> {
    let table_size = strings.len() * 2;
    let mut offsets = Vec::with_capacity(strings.len());
    let mut offset = table_size;
    for s in strings {
        offsets.push(offset);
        offset += s.len() + 1;
    }

    let mut out = Vec::with_capacity(offset);
    for &off in &offsets {
        out.extend_from_slice(&(off as u16).to_be_bytes());
    }
    for s in strings {
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty_program() {
        let program = Program {
            order: vec![0],
            strings: Vec::new(),
            data: vec![0x8000],
            text_present: false,
        };
        let bytes = program.to_bytes();
        assert_eq!(Program::from_bytes(&bytes).unwrap(), program);
    }

    #[test]
    fn round_trips_program_with_strings() {
        let program = Program::new(
            vec![0],
            vec!["hi".to_string(), "there".to_string()],
            vec![0x8000],
        );
        let bytes = program.to_bytes();
        assert_eq!(Program::from_bytes(&bytes).unwrap(), program);
    }

    #[test]
    fn round_trips_explicit_empty_text_chunk() {
        let program = Program {
            order: vec![0],
            strings: Vec::new(),
            data: vec![0x8000],
            text_present: true,
        };
        let bytes = program.to_bytes();
        let decoded = Program::from_bytes(&bytes).unwrap();
        assert!(decoded.text_present);
        assert!(decoded.strings.is_empty());
    }

    #[test]
    fn rejects_order_entry_out_of_range() {
        let program = Program {
            order: vec![5],
            strings: Vec::new(),
            data: vec![0x8000],
            text_present: false,
        };
        let bytes = program.to_bytes();
        assert!(matches!(Program::from_bytes(&bytes), Err(Error::MalformedContainer { .. })));
    }

    #[test]
    fn text_round_trip_preserves_order() {
        let strings = vec!["alpha".to_string(), "".to_string(), "beta gamma".to_string()];
        let bytes = write_text(&strings);
        assert_eq!(parse_text(&bytes).unwrap(), strings);
    }
}
