use nom::{bytes::complete::take, IResult};

pub use crate::encoder::uvarint_encoder::write_uvarint;
pub use crate::encoder::varint_encoder::write_varint;

/// Parses a Golang uvarint: little-endian 7-bit groups, the high bit set on
/// every byte except the last, at most 10 bytes.
///
/// A single byte below 128 is the value itself and consumes exactly one
/// byte, so short lengths round-trip without touching the shift loop.
pub fn read_uvarint(input: &[u8]) -> IResult<&[u8], u64> {
    let (remaining_input, first) = take(1usize)(input)?;
    let first = first[0];
    if first < 0x80 {
        return Ok((remaining_input, first as u64));
    }

    let mut input_pointer = remaining_input;
    let mut value: u64 = (first & 0x7f) as u64;
    let mut shift: usize = 7;

    for i in 1..10 {
        let (new_input_pointer, byte_buffer) = take(1usize)(input_pointer)?;
        input_pointer = new_input_pointer;
        let byte = byte_buffer[0];

        if byte < 0x80 {
            // the tenth byte carries at most one bit
            if i == 9 && byte > 1 {
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::TooLarge,
                )));
            }
            return Ok((input_pointer, value | (byte as u64) << shift));
        }

        value |= ((byte & 0x7f) as u64) << shift;
        shift += 7;
    }

    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::TooLarge,
    )))
}

/// Parses a Golang varint: a uvarint holding a zig-zag encoded i64.
pub fn read_varint(input: &[u8]) -> IResult<&[u8], i64> {
    let (remaining_input, raw) = read_uvarint(input)?;

    let value = (raw >> 1) as i64;
    if raw & 1 != 0 {
        Ok((remaining_input, !value))
    } else {
        Ok((remaining_input, value))
    }
}
