//! Message parsing.
//!
//! An unstuffed frame is a length-prefixed envelope around a list of
//! property records:
//!
//! ```text
//! C0 12 <outer varint> <sep> <inner varint> { <hdr> <len> <code> <value> }* [token] C0
//! ```
//!
//! Two envelope forms exist. Status messages from the fan use separator
//! `0x22` and end in a 72-byte token block starting with `0x28`. Command
//! envelopes (the shape we send, which the fan also echoes) use separator
//! `0x12` and carry no token.
//!
//! The two length fields are the only structure the protocol offers, so both
//! are checked exactly and any mismatch rejects the whole frame. Nothing is
//! dispatched until the full frame has been walked.

use crate::error::FrameError;
use crate::frame::{self, DELIMITER};
use crate::property::PropertyCode;
use crate::varint;

/// Fixed marker byte following the opening delimiter.
pub const MESSAGE_MARKER: u8 = 0x12;
/// Outer separator of a status message.
pub const STATUS_SEPARATOR: u8 = 0x22;
/// Outer separator of a command envelope.
pub const COMMAND_SEPARATOR: u8 = 0x12;
/// Bytes that may open a property record.
pub const RECORD_HEADERS: [u8; 2] = [0x12, 0x1A];
/// First byte of the trailing token block.
pub const TOKEN_MARKER: u8 = 0x28;
/// Length of the token block itself.
pub const TOKEN_LEN: usize = 72;
/// Token block plus the closing delimiter.
pub const TOKEN_BLOCK: usize = TOKEN_LEN + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Envelope {
    Status,
    Command,
}

impl Envelope {
    fn separator(self) -> u8 {
        match self {
            Self::Status => STATUS_SEPARATOR,
            Self::Command => COMMAND_SEPARATOR,
        }
    }

    /// Bytes that follow the records beyond what the inner length counts.
    fn inner_trailer(self) -> u64 {
        match self {
            Self::Status => TOKEN_BLOCK as u64,
            Self::Command => 1,
        }
    }
}

/// One `(code, value)` unit of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyRecord {
    pub header: u8,
    pub code: PropertyCode,
    pub value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub envelope: Envelope,
    pub records: Vec<PropertyRecord>,
    /// The trailing token of a status message, without the delimiter.
    pub token: Option<Vec<u8>>,
}

/// Unstuff and parse one raw frame.
pub fn decode_frame(raw: &[u8]) -> Result<Message, FrameError> {
    let unstuffed = frame::unstuff(raw)?;
    parse_message(&unstuffed)
}

/// Parse one unstuffed frame into its records.
pub fn parse_message(bytes: &[u8]) -> Result<Message, FrameError> {
    let (&first, _) = bytes.split_first().ok_or(FrameError::Empty)?;
    if first != DELIMITER {
        return Err(FrameError::MissingStartDelimiter(first));
    }
    if let Some(&last) = bytes.last().filter(|_| bytes.len() > 1) {
        if last != DELIMITER {
            return Err(FrameError::MissingEndDelimiter(last));
        }
    } else {
        return Err(FrameError::Truncated {
            needed: 2,
            available: bytes.len(),
        });
    }

    let mut pos = 1;
    match bytes.get(pos) {
        Some(&MESSAGE_MARKER) => pos += 1,
        Some(&other) => return Err(FrameError::MissingMarker(other)),
        None => {
            return Err(FrameError::Truncated {
                needed: 1,
                available: 0,
            });
        }
    }

    let (envelope, sep_at) = outer_length(bytes, pos)?;
    pos = sep_at + 1;

    let inner_at = length_field(
        bytes,
        pos,
        &RECORD_HEADERS,
        envelope.inner_trailer(),
        "inner length",
    )?;
    pos = inner_at;

    let mut records = Vec::new();
    let mut token = None;
    let end = bytes.len() - 1;

    while pos < end {
        let remaining = bytes.len() - pos;
        let byte = bytes[pos];

        if byte == TOKEN_MARKER && remaining == TOKEN_BLOCK {
            token = Some(bytes[pos..end].to_vec());
            pos = end;
            break;
        }
        if !RECORD_HEADERS.contains(&byte) {
            return Err(FrameError::UnexpectedByte { byte, offset: pos });
        }

        let length = *bytes.get(pos + 1).ok_or(FrameError::Truncated {
            needed: 1,
            available: 0,
        })? as usize;
        let start = pos + 2;
        let fields = bytes
            .get(start..start + length)
            .filter(|_| start + length <= end)
            .ok_or(FrameError::Truncated {
                needed: length,
                available: end.saturating_sub(start),
            })?;

        let (code, width) = PropertyCode::split(fields).ok_or(FrameError::Truncated {
            needed: 2,
            available: fields.len(),
        })?;
        records.push(PropertyRecord {
            header: byte,
            code,
            value: fields[width..].to_vec(),
        });
        pos = start + length;
    }

    if pos != end {
        return Err(FrameError::TrailingBytes(bytes.len() - pos - 1));
    }

    Ok(Message {
        envelope,
        records,
        token,
    })
}

/// Longest length field the parser will consider, enough for any frame the
/// codec accepts.
const MAX_LENGTH_BYTES: usize = 3;

/// Locate the outer separator and with it the envelope form.
///
/// The status separator is tried first. A two-byte length can contain
/// `0x12` as its second byte, so the command form is only taken when the
/// status form does not check out.
fn outer_length(bytes: &[u8], from: usize) -> Result<(Envelope, usize), FrameError> {
    let mut failure = None;
    for envelope in [Envelope::Status, Envelope::Command] {
        match length_field(bytes, from, &[envelope.separator()], 1, "outer length") {
            Ok(at) => return Ok((envelope, at)),
            Err(e) => {
                if !matches!(failure, Some(FrameError::LengthMismatch { .. })) {
                    failure = Some(e);
                }
            }
        }
    }
    Err(failure.unwrap_or(FrameError::UnterminatedLength {
        field: "outer length",
    }))
}

/// Read the varint length starting at `from` and return the index of its
/// terminator.
///
/// Every terminator within reach is a candidate, and the first one whose
/// length matches the rest of the frame (`value + trailer` bytes) wins. A
/// length field is at least one byte long, so `bytes[from]` is never a
/// terminator.
fn length_field(
    bytes: &[u8],
    from: usize,
    terminators: &[u8],
    trailer: u64,
    field: &'static str,
) -> Result<usize, FrameError> {
    let reach = (from + 1 + MAX_LENGTH_BYTES).min(bytes.len());
    let mut mismatch = None;
    for at in from + 1..reach {
        if !terminators.contains(&bytes[at]) {
            continue;
        }
        let value = varint::decode(&bytes[from..at]);
        match check_length(field, value + trailer, bytes.len() - at) {
            Ok(()) => return Ok(at),
            Err(e) => {
                mismatch.get_or_insert(e);
            }
        }
    }
    Err(mismatch.unwrap_or(FrameError::UnterminatedLength { field }))
}

fn check_length(field: &'static str, expected: u64, actual: usize) -> Result<(), FrameError> {
    if expected == actual as u64 {
        Ok(())
    } else {
        Err(FrameError::LengthMismatch {
            field,
            expected,
            actual: actual as u64,
        })
    }
}
