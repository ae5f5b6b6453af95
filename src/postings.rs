use std::collections::BTreeSet;

use crate::decoder::{ByteDecode, Decoder};
use crate::errors::{Result, TsdbError};

/// Pointer from a `(label key, label value)` pair to its posting list.
///
/// Key and value borrow from the mapped index bytes.
#[derive(Debug, Clone, Copy)]
pub struct PostingOffset<'a> {
    pub label_key: &'a str,
    pub label_value: &'a str,
    pub offset: u64,
}

impl<'a> PostingOffset<'a> {
    fn read(dec: &mut Decoder<'a>) -> Result<PostingOffset<'a>> {
        let constant = dec.read_u8()?;
        if constant != 2 {
            return Err(TsdbError::Parse(format!(
                "posting offset entry has reserved byte {} instead of 2",
                constant
            )));
        }
        let key_len = dec.read_varuint()? as usize;
        let label_key = std::str::from_utf8(dec.read_view(key_len)?)
            .map_err(|_| TsdbError::Parse("posting label key is not valid UTF-8".into()))?;
        let value_len = dec.read_varuint()? as usize;
        let label_value = std::str::from_utf8(dec.read_view(value_len)?)
            .map_err(|_| TsdbError::Parse("posting label value is not valid UTF-8".into()))?;
        let offset = dec.read_varuint()?;
        Ok(PostingOffset {
            label_key,
            label_value,
            offset,
        })
    }
}

/// Header of the posting offset table; entries decode lazily through
/// [`PostingOffsetIterator`] so opening a block does not walk every label
/// pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostingOffsetTable {
    /// Position of the first entry within the index.
    pub entries_offset: usize,
    pub entries: u32,
}

impl PostingOffsetTable {
    /// Read the `{u32 len, u32 entries}` header, leaving the entry cursor
    /// recorded for later iteration.
    pub fn read(dec: &mut Decoder) -> Result<PostingOffsetTable> {
        dec.read_u32()?; // section length
        let entries = dec.read_u32()?;
        Ok(PostingOffsetTable {
            entries_offset: dec.tell(),
            entries,
        })
    }

    pub fn iter<'a>(&self, index_bytes: &'a [u8]) -> PostingOffsetIterator<'a> {
        let mut dec = Decoder::new(index_bytes);
        // position at the first entry; the bytes were walked at load time
        dec.seek(self.entries_offset as i64, crate::decoder::Whence::Begin)
            .expect("posting offset table lies within the index");
        PostingOffsetIterator {
            dec,
            remaining: self.entries,
        }
    }
}

pub struct PostingOffsetIterator<'a> {
    dec: Decoder<'a>,
    remaining: u32,
}

impl<'a> Iterator for PostingOffsetIterator<'a> {
    type Item = Result<PostingOffset<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let entry = PostingOffset::read(&mut self.dec);
        match &entry {
            Ok(_) => self.remaining -= 1,
            Err(_) => self.remaining = 0,
        }
        Some(entry)
    }
}

/// Decode the posting list at `offset`: the sorted set of series refs
/// carrying one `(label, value)` pair.
pub fn read_posting(index_bytes: &[u8], offset: u64) -> Result<BTreeSet<u64>> {
    let mut dec = Decoder::new(index_bytes);
    dec.seek(offset as i64, crate::decoder::Whence::Begin)?;
    dec.read_u32()?; // section length
    let entries = dec.read_u32()?;
    let mut refs = BTreeSet::new();
    for _ in 0..entries {
        refs.insert(dec.read_u32()? as u64);
    }
    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::varint::write_uvarint;

    fn encode_offset_entry(out: &mut Vec<u8>, key: &str, value: &str, offset: u64) {
        out.push(2);
        write_uvarint(key.len() as u64, out).unwrap();
        out.extend_from_slice(key.as_bytes());
        write_uvarint(value.len() as u64, out).unwrap();
        out.extend_from_slice(value.as_bytes());
        write_uvarint(offset, out).unwrap();
    }

    #[test]
    fn test_lazy_iteration() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_be_bytes()); // len, unchecked
        data.extend_from_slice(&2u32.to_be_bytes());
        encode_offset_entry(&mut data, "__name__", "up", 900);
        encode_offset_entry(&mut data, "job", "api", 1800);

        let mut dec = Decoder::new(&data);
        let table = PostingOffsetTable::read(&mut dec).unwrap();
        assert_eq!(table.entries, 2);

        let entries: Result<Vec<_>> = table.iter(&data).collect();
        let entries = entries.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].label_key, "__name__");
        assert_eq!(entries[0].label_value, "up");
        assert_eq!(entries[0].offset, 900);
        assert_eq!(entries[1].label_key, "job");
        assert_eq!(entries[1].offset, 1800);
    }

    #[test]
    fn test_reserved_byte_must_match() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_be_bytes());
        data.extend_from_slice(&1u32.to_be_bytes());
        data.push(3); // wrong reserved byte
        data.extend_from_slice(b"\x01k\x01v\x00");

        let mut dec = Decoder::new(&data);
        let table = PostingOffsetTable::read(&mut dec).unwrap();
        let entries: Vec<_> = table.iter(&data).collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_err());
    }

    #[test]
    fn test_read_posting() {
        let mut data = vec![0u8; 16]; // padding so the offset is non-trivial
        let offset = data.len() as u64;
        data.extend_from_slice(&12u32.to_be_bytes());
        data.extend_from_slice(&3u32.to_be_bytes());
        for reference in [9u32, 4, 7] {
            data.extend_from_slice(&reference.to_be_bytes());
        }

        let refs = read_posting(&data, offset).unwrap();
        assert_eq!(refs.into_iter().collect::<Vec<_>>(), vec![4, 7, 9]);
    }
}
