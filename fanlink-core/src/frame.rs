//! Frame delimiting and byte stuffing.
//!
//! Every frame on the wire is wrapped in `0xC0` delimiters. Payload bytes that
//! collide with the delimiter or the escape byte are sent as two-byte escape
//! pairs, in the manner of SLIP:
//!
//! ```text
//! 0xC0  ->  0xDB 0xDC
//! 0xDB  ->  0xDB 0xDD
//! ```

use crate::error::FrameError;

/// Frame delimiter, first and last byte of every frame.
pub const DELIMITER: u8 = 0xC0;
/// Escape byte introducing a stuffed pair.
pub const ESCAPE: u8 = 0xDB;
/// Second byte of the pair standing for a literal delimiter.
pub const ESCAPED_DELIMITER: u8 = 0xDC;
/// Second byte of the pair standing for a literal escape.
pub const ESCAPED_ESCAPE: u8 = 0xDD;

/// Split a buffer into the delimited frames it contains.
///
/// A frame spans from a delimiter to the next one, both included. A start
/// delimiter with no closing partner is not a complete frame and is left out.
/// Bytes before the first delimiter are ignored.
pub fn split_frames(bytes: &[u8]) -> Vec<&[u8]> {
    let mut frames = Vec::new();
    let mut rest = bytes;

    while let Some((start, end)) = next_frame_bounds(rest) {
        frames.push(&rest[start..=end]);
        rest = &rest[end + 1..];
    }
    frames
}

/// Locate the next complete frame in `bytes`, returning the indices of its
/// opening and closing delimiters.
///
/// Two adjacent delimiters are read as the tail of one frame followed by the
/// head of the next, so the scan re-anchors on the second one instead of
/// yielding an empty frame.
pub(crate) fn next_frame_bounds(bytes: &[u8]) -> Option<(usize, usize)> {
    let mut start = bytes.iter().position(|&b| b == DELIMITER)?;
    loop {
        let offset = bytes[start + 1..].iter().position(|&b| b == DELIMITER)?;
        let end = start + 1 + offset;
        if end == start + 1 {
            start = end;
            continue;
        }
        return Some((start, end));
    }
}

/// Resolve escape pairs in a delimited frame.
///
/// The first and last bytes are copied verbatim and must both be the
/// delimiter. An escape byte followed by anything other than a known second
/// byte is copied through untouched.
pub fn unstuff(frame: &[u8]) -> Result<Vec<u8>, FrameError> {
    let (&first, body) = frame.split_first().ok_or(FrameError::Empty)?;
    if first != DELIMITER {
        return Err(FrameError::MissingStartDelimiter(first));
    }
    let (&last, body) = body
        .split_last()
        .ok_or(FrameError::MissingEndDelimiter(first))?;
    if last != DELIMITER {
        return Err(FrameError::MissingEndDelimiter(last));
    }

    let mut out = Vec::with_capacity(frame.len());
    out.push(first);

    let mut i = 0;
    while i < body.len() {
        match (body[i], body.get(i + 1)) {
            (ESCAPE, Some(&ESCAPED_DELIMITER)) => {
                out.push(DELIMITER);
                i += 2;
            }
            (ESCAPE, Some(&ESCAPED_ESCAPE)) => {
                out.push(ESCAPE);
                i += 2;
            }
            (b, _) => {
                out.push(b);
                i += 1;
            }
        }
    }

    out.push(last);
    Ok(out)
}

/// Escape payload bytes so they can sit between two delimiters.
pub fn stuff(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    for &b in payload {
        match b {
            DELIMITER => out.extend_from_slice(&[ESCAPE, ESCAPED_DELIMITER]),
            ESCAPE => out.extend_from_slice(&[ESCAPE, ESCAPED_ESCAPE]),
            _ => out.push(b),
        }
    }
    out
}

/// Stuff `payload` and wrap it in delimiters.
pub fn wrap(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 6);
    out.push(DELIMITER);
    out.extend(stuff(payload));
    out.push(DELIMITER);
    out
}
