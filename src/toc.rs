use crate::decoder::{ByteDecode, Decoder, Whence};
use crate::errors::Result;

/// Byte size of the table of contents at the end of an index file: six
/// big-endian u64 offsets plus a CRC32C.
pub const TOC_SIZE: usize = 8 * 6 + 4;

/// Section offsets of one index file. A zero offset means the section is
/// absent.
#[derive(Debug, Clone, Copy, Default)]
pub struct Toc {
    pub symbols: u64,
    pub series: u64,
    pub label_indices: u64,
    pub label_offset_table: u64,
    pub postings_start: u64,
    pub postings_offset_table: u64,
}

impl Toc {
    pub fn read(dec: &mut Decoder) -> Result<Toc> {
        let toc = Toc {
            symbols: dec.read_u64()?,
            series: dec.read_u64()?,
            label_indices: dec.read_u64()?,
            label_offset_table: dec.read_u64()?,
            postings_start: dec.read_u64()?,
            postings_offset_table: dec.read_u64()?,
        };
        dec.read_u32()?; // CRC, not verified
        Ok(toc)
    }

    /// Read the TOC from its fixed position at the end of the index.
    pub fn read_at_end(dec: &mut Decoder) -> Result<Toc> {
        dec.seek(-(TOC_SIZE as i64), Whence::End)?;
        Self::read(dec)
    }
}
