use nom::{
    bits::complete::{bool, take},
    IResult,
};

use crate::NomBitInput;

pub use crate::encoder::varbit_ts_encoder::write_varbit_ts;

/// Reads the delta-of-delta prefix code.
///
/// A run of 1 bits terminated by a 0, at most 4 bits long; four 1 bits have
/// no terminator. The run length selects the bucket:
/// `0`, `10`, `110`, `1110`, `1111`.
fn read_dod_bucket(input: NomBitInput) -> IResult<NomBitInput, u8> {
    let mut remaining_input = input;

    for i in 0..4 {
        let (new_remaining_input, bit) = bool(remaining_input)?;
        remaining_input = new_remaining_input;
        if !bit {
            return Ok((remaining_input, i));
        }
    }

    Ok((remaining_input, 4))
}

#[inline]
fn bucket_bit_count(bucket: u8) -> u8 {
    match bucket {
        0 => 0,
        1 => 14,
        2 => 17,
        3 => 20,
        4 => 64,
        _ => unreachable!("prefix run is at most 4 bits"),
    }
}

/// Reads a Prometheus timestamp delta-of-delta.
///
/// For widths below 64 the payload is sign-extended with one asymmetry:
/// the bit pattern `10…0` (that is, exactly `2^(n-1)`) decodes to the most
/// *positive* value rather than the most negative, matching the range the
/// writer packs into n bits.
pub fn read_varbit_ts(input: NomBitInput) -> IResult<NomBitInput, i64> {
    let (remaining_input, bucket) = read_dod_bucket(input)?;
    let num_bits = bucket_bit_count(bucket);

    if bucket == 0 {
        return Ok((remaining_input, 0));
    }

    let (remaining_input, raw): (_, u64) = take(num_bits)(remaining_input)?;
    if num_bits == 64 {
        return Ok((remaining_input, raw as i64));
    }

    let mut value = raw as i64;
    if value > (1 << (num_bits - 1)) {
        value -= 1 << num_bits;
    }

    Ok((remaining_input, value))
}

/// Whether `dod` fits in `nbits` under the writer's asymmetric range,
/// `-(2^(n-1) - 1) ..= 2^(n-1)`.
pub(crate) fn fits_in_bits(dod: i64, nbits: u8) -> bool {
    -((1i64 << (nbits - 1)) - 1) <= dod && dod <= (1i64 << (nbits - 1))
}

/// The smallest width from `{1, 2, 14, 17, 20, 64}` able to hold `dod`.
///
/// 1 covers only the zero delta-of-delta (the lone `0` prefix bit); 2 is
/// the floor for any non-zero value; the rest are the payload widths of the
/// prefix code buckets.
pub fn min_timestamp_bits(dod: i64) -> u16 {
    if dod == 0 {
        return 1;
    }
    for nbits in [2u8, 14, 17, 20] {
        if fits_in_bits(dod, nbits) {
            return nbits as u16;
        }
    }
    64
}
