//! The fan's variable-length integer ("big number") format.
//!
//! Each byte after the first contributes `(byte - 1) * 128^i`. For one and
//! two byte encodings this agrees with a protobuf varint; three byte values
//! drift because the continuation bit of the middle byte is never stripped.
//! The device itself uses the same arithmetic, so it is reproduced here
//! as-is rather than corrected: values below 32 768 round-trip exactly,
//! larger values (colour temperatures never get there) are approximate.

/// Largest value whose encoding is guaranteed to decode back to itself.
pub const EXACT_LIMIT: u64 = 32_767;

/// Decode a varint.
///
/// Never fails. Garbage in yields a wrong number out, so callers that care
/// about plausibility (temperature, humidity) range-check the result.
pub fn decode(bytes: &[u8]) -> u64 {
    let Some((&first, rest)) = bytes.split_first() else {
        return 0;
    };

    let mut n = first as i64;
    let mut scale: i64 = 1;
    for &b in rest {
        scale = scale.wrapping_mul(128);
        n = n.wrapping_add((b as i64 - 1).wrapping_mul(scale));
    }
    n.max(0) as u64
}

/// Encode `n` with the device's recursive construction.
pub fn encode(n: u64) -> Vec<u8> {
    if n <= 255 {
        return vec![n as u8];
    }

    let b = n / 128;
    if b > 255 {
        let mut out = vec![(n % 256) as u8];
        out.extend(encode(b));
        out
    } else {
        let mut out = encode(n - (b - 1) * 128);
        out.push(b as u8);
        out
    }
}
