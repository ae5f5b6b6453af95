use std::collections::BTreeMap;

use crate::decoder::{ByteDecode, Decoder};
use crate::errors::{Result, TsdbError};
use crate::symbols::SymbolTable;

/// Label set of one series: keys unique, ordered lexicographically.
///
/// The map ordering doubles as the series ordering used by the cross-block
/// merge (compare pairs key-then-value, shortest prefix first).
pub type Labels = BTreeMap<String, String>;

/// First synthetic segment id handed to in-memory WAL chunks, far above
/// any real on-disk segment number so the two can never collide.
pub const RAW_SEGMENT_ID_BASE: u32 = 0xFF00_0000;

/// How the bytes a [`ChunkReference`] points at are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// Chunk in a block's `chunks/` segment file.
    Block,
    /// Chunk in a `chunks_head/` file; carries a longer prologue.
    Head,
    /// Packed `(i64, f64)` pairs. Never written by Prometheus: the WAL
    /// loader synthesises these to fold in-memory samples into the same
    /// iterator machinery without re-encoding them as XOR chunks.
    Raw,
}

/// Pointer from a series to one chunk of its samples.
///
/// The low 32 bits of `file_reference` are a byte offset into a segment
/// file; the high 32 bits are the segment file id minus one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkReference {
    pub min_time: i64,
    pub max_time: i64,
    pub file_reference: u64,
    pub kind: ChunkKind,
}

impl ChunkReference {
    pub fn segment_file_id(&self) -> u32 {
        (self.file_reference >> 32) as u32 + 1
    }

    pub fn offset(&self) -> u32 {
        (self.file_reference & 0xFFFF_FFFF) as u32
    }
}

pub fn make_file_reference(file_id: u64, offset: u64) -> u64 {
    ((file_id - 1) << 32) | offset
}

/// One time series: a label set and the ordered chunks holding its samples.
#[derive(Debug, Clone, Default)]
pub struct Series {
    pub labels: Labels,
    pub chunks: Vec<ChunkReference>,
}

impl Series {
    /// Parse one series table entry, resolving label symbol ids.
    ///
    /// Chunk records after the first are delta-encoded against their
    /// predecessor: `minTime` relative to the previous `maxTime`,
    /// `maxTime` relative to its own `minTime`, and the file reference as
    /// a signed delta.
    pub fn read(dec: &mut Decoder, symbols: &SymbolTable, reference: u64) -> Result<Series> {
        let _frame_len = dec.read_varuint()?;
        let label_count = dec.read_varuint()?;

        let mut labels = Labels::new();
        for _ in 0..label_count {
            let name_id = dec.read_varuint()?;
            let value_id = dec.read_varuint()?;
            labels.insert(
                symbols.lookup(name_id)?.to_string(),
                symbols.lookup(value_id)?.to_string(),
            );
        }

        let chunk_count = dec.read_varuint()?;
        if chunk_count == 0 {
            // valid mid-compaction, but this reader only opens sealed blocks
            return Err(TsdbError::SeriesWithoutChunks { reference });
        }

        let mut chunks = Vec::with_capacity(chunk_count as usize);

        let min_time = dec.read_varint()?;
        let max_time = min_time + dec.read_varuint()? as i64;
        let file_reference = dec.read_varuint()?;
        chunks.push(ChunkReference {
            min_time,
            max_time,
            file_reference,
            kind: ChunkKind::Block,
        });

        for _ in 1..chunk_count {
            let prev = *chunks.last().unwrap();
            let min_time = prev.max_time + dec.read_varuint()? as i64;
            let max_time = min_time + dec.read_varuint()? as i64;
            let file_reference = (prev.file_reference as i64 + dec.read_varint()?) as u64;
            chunks.push(ChunkReference {
                min_time,
                max_time,
                file_reference,
                kind: ChunkKind::Block,
            });
        }

        dec.read_u32()?; // CRC, not verified

        Ok(Series { labels, chunks })
    }
}
