//! Portable series wire format.
//!
//! Series and their chunk bytes serialised to a stream, for moving parsed
//! series between processes without shipping whole blocks:
//! `{u8 magic (0x5A one series, 0x5B group), [uvarint count,] series…}`,
//! each series `{uvarint labelCount, labelCount × (uvarint len, key,
//! uvarint len, value), uvarint chunkCount, chunks…}`, each chunk
//! `{uvarint minTime, uvarint maxTime, u8 kind, uvarint len, verbatim
//! chunk body}`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::ChunkFileCache;
use crate::chunk::ChunkView;
use crate::decoder::ByteDecode;
use crate::errors::{Result, TsdbError};
use crate::query::{CrossIndexSeries, SeriesIterator};
use crate::resource::Resource;
use crate::series::{make_file_reference, ChunkKind, ChunkReference, Labels, Series};
use crate::source::{MemSource, SeriesSource};
use crate::varint::write_uvarint;

/// Leading magic byte: one series follows.
pub const MAGIC_SERIES: u8 = 0x5A;
/// Leading magic byte: a counted group of series follows.
pub const MAGIC_SERIES_GROUP: u8 = 0x5B;

fn kind_byte(kind: ChunkKind) -> u8 {
    match kind {
        ChunkKind::Block => 0,
        ChunkKind::Head => 1,
        ChunkKind::Raw => 2,
    }
}

fn kind_from_byte(byte: u8) -> Result<ChunkKind> {
    match byte {
        0 => Ok(ChunkKind::Block),
        1 => Ok(ChunkKind::Head),
        2 => Ok(ChunkKind::Raw),
        other => Err(TsdbError::Parse(format!(
            "portable chunk has unknown kind byte: {}",
            other
        ))),
    }
}

fn write_series<W: std::io::Write>(series: &CrossIndexSeries, writer: &mut W) -> Result<()> {
    let labels = series.labels();
    write_uvarint(labels.len() as u64, writer)?;
    for (key, value) in labels {
        write_uvarint(key.len() as u64, writer)?;
        writer.write_all(key.as_bytes())?;
        write_uvarint(value.len() as u64, writer)?;
        writer.write_all(value.as_bytes())?;
    }

    let mut chunk_count = 0u64;
    for (source, reference) in series.sources() {
        let contributed = source
            .series(*reference)
            .expect("cross-index entries hold resolved refs");
        chunk_count += contributed.chunks.len() as u64;
    }
    write_uvarint(chunk_count, writer)?;

    for (source, reference) in series.sources() {
        let contributed = source
            .series(*reference)
            .expect("cross-index entries hold resolved refs");
        for chunk_ref in &contributed.chunks {
            let view = ChunkView::new(source.cache(), chunk_ref)?;
            let body = view.body();

            write_uvarint(chunk_ref.min_time as u64, writer)?;
            write_uvarint(chunk_ref.max_time as u64, writer)?;
            writer.write_all(&[kind_byte(chunk_ref.kind)])?;
            write_uvarint(body.len() as u64, writer)?;
            writer.write_all(body)?;
        }
    }
    Ok(())
}

/// Serialise one series with all its chunk data.
pub fn serialise_series<W: std::io::Write>(
    series: &CrossIndexSeries,
    writer: &mut W,
) -> Result<()> {
    writer.write_all(&[MAGIC_SERIES])?;
    write_series(series, writer)
}

/// Serialise every series the iterator yields as a counted group.
pub fn serialise_group<W: std::io::Write>(
    iterator: &SeriesIterator,
    writer: &mut W,
) -> Result<()> {
    writer.write_all(&[MAGIC_SERIES_GROUP])?;
    // the count is not known without walking the iterator; walk a clone
    let count = iterator.clone().count() as u64;
    write_uvarint(count, writer)?;
    for series in iterator.clone() {
        write_series(&series, writer)?;
    }
    Ok(())
}

fn read_series<D: ByteDecode>(dec: &mut D) -> Result<CrossIndexSeries> {
    let mut labels = Labels::new();
    let label_count = dec.read_varuint()?;
    for _ in 0..label_count {
        let key_len = dec.read_varuint()? as usize;
        let key = String::from_utf8(dec.read_vec(key_len)?)
            .map_err(|_| TsdbError::Parse("portable label key is not UTF-8".into()))?;
        let value_len = dec.read_varuint()? as usize;
        let value = String::from_utf8(dec.read_vec(value_len)?)
            .map_err(|_| TsdbError::Parse("portable label value is not UTF-8".into()))?;
        labels.insert(key, value);
    }

    let cache = Arc::new(ChunkFileCache::default());
    let mut chunks = Vec::new();

    let chunk_count = dec.read_varuint()?;
    for i in 0..chunk_count {
        let min_time = dec.read_varuint()? as i64;
        let max_time = dec.read_varuint()? as i64;
        let kind = kind_from_byte(dec.read_u8()?)?;
        let body_len = dec.read_varuint()? as usize;
        let body = dec.read_vec(body_len)?;

        // raw bodies are consumable as they are; XOR bodies get the block
        // framing put back so the regular chunk view parses them
        let (stored, kind) = match kind {
            ChunkKind::Raw => (body, ChunkKind::Raw),
            _ => {
                let mut framed = Vec::with_capacity(body.len() + 11);
                write_uvarint(body.len() as u64, &mut framed)?;
                framed.push(1);
                framed.extend_from_slice(&body);
                (framed, ChunkKind::Block)
            }
        };

        let segment_id = i as u32 + 1;
        cache.store(segment_id, Arc::new(Resource::from_vec(stored)))?;
        chunks.push(ChunkReference {
            min_time,
            max_time,
            file_reference: make_file_reference(segment_id as u64, 0),
            kind,
        });
    }

    let mut series_map = BTreeMap::new();
    series_map.insert(0u64, Series { labels, chunks });

    let source = SeriesSource::Mem(Arc::new(MemSource {
        series: series_map,
        cache,
    }));
    Ok(CrossIndexSeries::new(vec![(source, 0)]))
}

/// Deserialise a single-series or group stream.
pub fn deserialise<D: ByteDecode>(dec: &mut D) -> Result<Vec<CrossIndexSeries>> {
    let magic = dec.read_u8()?;
    match magic {
        MAGIC_SERIES => Ok(vec![read_series(dec)?]),
        MAGIC_SERIES_GROUP => {
            let count = dec.read_varuint()?;
            let mut result = Vec::with_capacity(count as usize);
            for _ in 0..count {
                result.push(read_series(dec)?);
            }
            Ok(result)
        }
        other => Err(TsdbError::Parse(format!(
            "unknown portable series magic: {:#x}",
            other
        ))),
    }
}
