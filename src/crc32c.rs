//! CRC32 Castagnoli helpers.
//!
//! Checksums are written so produced files are bit-faithful, and read so
//! cursors land in the right place, but never verified.

#[inline]
pub fn compute_crc32c(input: &[u8]) -> u32 {
    ::crc32c::crc32c(input)
}

/// Golang serialises CRC32s as big-endian u32s.
pub fn write_crc32c<W: std::io::Write>(input: &[u8], writer: &mut W) -> std::io::Result<()> {
    let crc32c = compute_crc32c(input);
    writer.write_all(&crc32c.to_be_bytes())?;
    Ok(())
}
