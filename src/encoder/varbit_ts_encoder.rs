/// Writes a timestamp delta-of-delta using the prefix code.
///
/// Bucket selection uses the asymmetric range `-(2^(n-1) - 1) ..= 2^(n-1)`:
/// the all-but-sign-bit-zero pattern encodes the largest positive value of
/// each bucket rather than the most negative.
pub fn write_varbit_ts<W: bitstream_io::BitWrite>(
    value: i64,
    writer: &mut W,
) -> std::io::Result<()> {
    match value {
        0 => writer.write_bit(false)?,
        -8191..=8192 => {
            writer.write::<u8>(2, 0b10)?;
            writer.write::<u64>(14, value as u64 & 0x3FFF)?;
        }
        -65535..=65536 => {
            writer.write::<u8>(3, 0b110)?;
            writer.write::<u64>(17, value as u64 & 0x1FFFF)?;
        }
        -524287..=524288 => {
            writer.write::<u8>(4, 0b1110)?;
            writer.write::<u64>(20, value as u64 & 0x0FFFFF)?;
        }
        _ => {
            writer.write::<u8>(4, 0b1111)?;
            writer.write::<u64>(64, value as u64)?;
        }
    }
    Ok(())
}
