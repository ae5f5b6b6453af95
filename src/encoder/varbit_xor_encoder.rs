/// Sentinel meaning "no leading/trailing window has been written yet".
pub(crate) const NO_WINDOW: u8 = u8::MAX;

/// Writes one Gorilla XOR-encoded value.
///
/// `previous_leading` should be [`NO_WINDOW`] for the first encoded value
/// so the window is always emitted. Returns the `(leading, trailing)`
/// window in effect afterwards, to be passed back in for the next value.
pub fn write_varbit_xor<W: bitstream_io::BitWrite>(
    value: f64,
    previous_value: f64,
    previous_leading: u8,
    previous_trailing: u8,
    writer: &mut W,
) -> std::io::Result<(u8, u8)> {
    let delta = value.to_bits() ^ previous_value.to_bits();

    if delta == 0 {
        writer.write_bit(false)?;
        return Ok((previous_leading, previous_trailing));
    }
    writer.write_bit(true)?;

    let mut leading = delta.leading_zeros() as u8;
    let trailing = delta.trailing_zeros() as u8;

    // 5 bits can encode at most 31; further leading zeroes ride along
    // inside the significant bits
    if leading >= 32 {
        leading = 31;
    }

    if previous_leading != NO_WINDOW && leading >= previous_leading && trailing >= previous_trailing
    {
        // the previous window still covers every changed bit, reuse it
        writer.write_bit(false)?;
        writer.write(
            (64 - previous_leading - previous_trailing) as u32,
            delta >> previous_trailing,
        )?;
        Ok((previous_leading, previous_trailing))
    } else {
        let significant = 64 - leading - trailing;

        writer.write_bit(true)?;
        writer.write::<u8>(5, leading)?;
        // 64 does not fit in 6 bits; 0 is never written otherwise, so it
        // stands in for 64
        writer.write::<u8>(6, significant & 0b11_1111)?;

        writer.write(significant as u32, delta >> trailing)?;
        Ok((leading, trailing))
    }
}
