//! MIDI variable-length quantities: big-endian base-128 with a
//! continuation bit, at most four bytes.

/// Longest legal encoding in bytes.
pub const VLQ_MAX_BYTES: usize = 4;

/// Largest value a four-byte quantity can carry.
pub const VLQ_MAX_VALUE: u32 = 0x0FFF_FFFF;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VlqError {
    /// Input ended while the continuation bit was still set
    Truncated,
    /// The fourth byte still had its continuation bit set
    TooLong,
}

/// Decode a quantity from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_vlq(bytes: &[u8]) -> Result<(u32, usize), VlqError> {
    let mut value = 0u32;
    for i in 0..VLQ_MAX_BYTES {
        let byte = *bytes.get(i).ok_or(VlqError::Truncated)?;
        value = (value << 7) | (byte & 0x7F) as u32;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(VlqError::TooLong)
}

/// Append the encoding of `value` to `out`.
///
/// Values above [`VLQ_MAX_VALUE`] are clamped to it.
pub fn encode_vlq(value: u32, out: &mut Vec<u8>) {
    let value = value.min(VLQ_MAX_VALUE);
    let mut groups = [0u8; VLQ_MAX_BYTES];
    let mut n = 0;
    let mut rest = value;
    loop {
        groups[n] = (rest & 0x7F) as u8;
        n += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        out.push(groups[i] | continuation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_standard_examples() {
        assert_eq!(decode_vlq(&[0x00]), Ok((0, 1)));
        assert_eq!(decode_vlq(&[0x7F]), Ok((0x7F, 1)));
        assert_eq!(decode_vlq(&[0x81, 0x00]), Ok((0x80, 2)));
        assert_eq!(decode_vlq(&[0xC0, 0x00]), Ok((0x2000, 2)));
        assert_eq!(decode_vlq(&[0xFF, 0x7F]), Ok((0x3FFF, 2)));
        assert_eq!(decode_vlq(&[0x81, 0x80, 0x00]), Ok((0x4000, 3)));
        assert_eq!(decode_vlq(&[0xFF, 0xFF, 0xFF, 0x7F]), Ok((0x0FFF_FFFF, 4)));
    }

    #[test]
    fn round_trips_each_length() {
        for value in [0, 1, 0x7F, 0x80, 0x3FFF, 0x4000, 0x1F_FFFF, 0x20_0000, VLQ_MAX_VALUE] {
            let mut buf = Vec::new();
            encode_vlq(value, &mut buf);
            assert!(buf.len() <= VLQ_MAX_BYTES);
            assert_eq!(decode_vlq(&buf), Ok((value, buf.len())), "value {value:#x}");
        }
    }

    #[test]
    fn ignores_trailing_bytes() {
        assert_eq!(decode_vlq(&[0x83, 0x60, 0x90, 0x3C]), Ok((480, 2)));
    }

    #[test]
    fn rejects_fifth_byte() {
        assert_eq!(decode_vlq(&[0x81, 0x80, 0x80, 0x80, 0x00]), Err(VlqError::TooLong));
    }

    #[test]
    fn rejects_truncated_input() {
        assert_eq!(decode_vlq(&[]), Err(VlqError::Truncated));
        assert_eq!(decode_vlq(&[0x81, 0x80]), Err(VlqError::Truncated));
    }
}
