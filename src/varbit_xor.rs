use nom::{
    bits::complete::{bool, take},
    IResult,
};

use crate::NomBitInput;

pub use crate::encoder::varbit_xor_encoder::write_varbit_xor;

fn read_leading_bits_count(input: NomBitInput) -> IResult<NomBitInput, u8> {
    take(5usize)(input)
}

fn read_significant_bits_count(input: NomBitInput) -> IResult<NomBitInput, u8> {
    let (remaining_input, significant_bits_count): (NomBitInput, u8) = take(6usize)(input)?;

    // 64 does not fit in 6 bits, and 0 significant bits never occurs (a
    // zero XOR takes the single-bit path), so 0 encodes 64.
    if significant_bits_count == 0 {
        return Ok((remaining_input, 64));
    }

    Ok((remaining_input, significant_bits_count))
}

/// Reads one Gorilla XOR-encoded value.
///
/// Layout: a `0` bit repeats the previous value; `10` reuses the previous
/// leading/trailing window; `11` carries a new window as 5 bits of leading
/// count and 6 bits of significant count. The significant bits of the XOR
/// delta follow, shifted up by the trailing count.
///
/// Returns the decoded value and the `(leading, trailing)` window to feed
/// into the next sample.
pub fn read_varbit_xor<'a>(
    previous_value: f64,
    previous_leading_bits_count: u8,
    previous_trailing_bits_count: u8,
) -> impl Fn(NomBitInput<'a>) -> IResult<NomBitInput<'a>, (f64, u8, u8)> {
    move |input: NomBitInput<'a>| {
        let (remaining_input, value_changed) = bool(input)?;
        if !value_changed {
            return Ok((
                remaining_input,
                (
                    previous_value,
                    previous_leading_bits_count,
                    previous_trailing_bits_count,
                ),
            ));
        }

        let (remaining_input, new_window) = bool(remaining_input)?;
        let mut remaining_input = remaining_input;

        let leading_bits_count: u8;
        let significant_bits_count: u8;
        let trailing_bits_count: u8;
        if new_window {
            let (tmp_remaining_input, tmp_leading) = read_leading_bits_count(remaining_input)?;
            let (tmp_remaining_input, tmp_significant) =
                read_significant_bits_count(tmp_remaining_input)?;
            remaining_input = tmp_remaining_input;
            leading_bits_count = tmp_leading;
            significant_bits_count = tmp_significant;
            // a corrupt stream can claim more than 64 bits of window
            if leading_bits_count + significant_bits_count > 64 {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    remaining_input,
                    nom::error::ErrorKind::Verify,
                )));
            }
            trailing_bits_count = 64 - leading_bits_count - significant_bits_count;
        } else {
            leading_bits_count = previous_leading_bits_count;
            trailing_bits_count = previous_trailing_bits_count;
            // a corrupt stream can leave no significant bits; reject it
            // rather than reading zero bits and looping on garbage
            if leading_bits_count + trailing_bits_count >= 64 {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    remaining_input,
                    nom::error::ErrorKind::Verify,
                )));
            }
            significant_bits_count = 64 - leading_bits_count - trailing_bits_count;
        }

        let (remaining_input, significant_bits): (NomBitInput, u64) =
            take(significant_bits_count)(remaining_input)?;

        let new_value = f64::from_bits(
            previous_value.to_bits() ^ (significant_bits << trailing_bits_count),
        );

        Ok((
            remaining_input,
            (new_value, leading_bits_count, trailing_bits_count),
        ))
    }
}
