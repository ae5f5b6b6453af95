//! On-disk fixture builders: just enough of the Prometheus TSDB write
//! path to produce bit-faithful blocks, head chunk files, and WAL
//! segments for the reader to exercise.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use rusty_tsdb::chunk::{write_block_chunk, write_head_chunk};
use rusty_tsdb::series::make_file_reference;
use rusty_tsdb::varint::{write_uvarint, write_varint};
use rusty_tsdb::xor::Sample;

pub fn samples(pairs: &[(i64, f64)]) -> Vec<Sample> {
    pairs
        .iter()
        .map(|(timestamp, value)| Sample {
            timestamp: *timestamp,
            value: *value,
        })
        .collect()
}

/// One series to place in a block: labels plus its chunks' samples.
#[derive(Debug, Clone)]
pub struct SeriesSpec {
    pub labels: Vec<(&'static str, &'static str)>,
    pub chunks: Vec<Vec<Sample>>,
}

impl SeriesSpec {
    pub fn new(labels: &[(&'static str, &'static str)], chunks: &[&[(i64, f64)]]) -> Self {
        Self {
            labels: labels.to_vec(),
            chunks: chunks.iter().map(|pairs| samples(pairs)).collect(),
        }
    }

    fn sorted_labels(&self) -> BTreeMap<String, String> {
        self.labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

fn pad_to_16(buf: &mut Vec<u8>) {
    while buf.len() % 16 != 0 {
        buf.push(0);
    }
}

/// Write `<data_dir>/<ulid>/` with `meta.json`, `chunks/000001`, and a
/// complete `index` (symbols, 16-aligned series table, posting lists,
/// posting offset table, TOC).
pub fn build_block(
    data_dir: &Path,
    ulid: &str,
    min_time: i64,
    max_time: i64,
    series: &[SeriesSpec],
    parents: &[&str],
) {
    let block_dir = data_dir.join(ulid);
    std::fs::create_dir_all(block_dir.join("chunks")).unwrap();

    // sort series by label order, as the index write path does
    let mut series: Vec<SeriesSpec> = series.to_vec();
    series.sort_by_key(|spec| spec.sorted_labels());

    // chunk segment file
    let mut segment: Vec<u8> = vec![0x85, 0xBD, 0x40, 0xDD, 0x01, 0x00, 0x00, 0x00];
    // per series: (min_time, max_time, file_reference) per chunk
    let mut chunk_refs: Vec<Vec<(i64, i64, u64)>> = Vec::new();
    for spec in &series {
        let mut refs = Vec::new();
        for chunk in &spec.chunks {
            let offset = segment.len() as u64;
            write_block_chunk(chunk, &mut segment).unwrap();
            refs.push((
                chunk.first().unwrap().timestamp,
                chunk.last().unwrap().timestamp,
                make_file_reference(1, offset),
            ));
        }
        chunk_refs.push(refs);
    }
    std::fs::write(block_dir.join("chunks").join("000001"), &segment).unwrap();

    // index
    let mut index: Vec<u8> = vec![0xBA, 0xAA, 0xD7, 0x00, 0x02];

    // symbol table
    let symbol_set: BTreeSet<String> = series
        .iter()
        .flat_map(|spec| spec.labels.iter())
        .flat_map(|(k, v)| [k.to_string(), v.to_string()])
        .collect();
    let symbols: Vec<String> = symbol_set.into_iter().collect();
    let symbol_id = |s: &str| symbols.iter().position(|sym| sym == s).unwrap() as u64;

    let symbols_offset = index.len() as u64;
    let mut symbol_data = Vec::new();
    for symbol in &symbols {
        write_uvarint(symbol.len() as u64, &mut symbol_data).unwrap();
        symbol_data.extend_from_slice(symbol.as_bytes());
    }
    index.extend_from_slice(&(symbol_data.len() as u32 + 4).to_be_bytes());
    index.extend_from_slice(&(symbols.len() as u32).to_be_bytes());
    index.extend_from_slice(&symbol_data);
    index.extend_from_slice(&crc32c::crc32c(&symbol_data).to_be_bytes());

    // series table, each entry 16-aligned; ref = offset / 16
    pad_to_16(&mut index);
    let series_offset = index.len() as u64;
    let mut posting_refs: BTreeMap<(String, String), BTreeSet<u32>> = BTreeMap::new();
    for (spec, refs) in series.iter().zip(&chunk_refs) {
        pad_to_16(&mut index);
        let series_ref = (index.len() / 16) as u32;

        for (key, value) in spec.sorted_labels() {
            posting_refs.entry((key, value)).or_default().insert(series_ref);
        }

        let mut content = Vec::new();
        let labels = spec.sorted_labels();
        write_uvarint(labels.len() as u64, &mut content).unwrap();
        for (key, value) in &labels {
            write_uvarint(symbol_id(key), &mut content).unwrap();
            write_uvarint(symbol_id(value), &mut content).unwrap();
        }
        write_uvarint(refs.len() as u64, &mut content).unwrap();
        for (i, (chunk_min, chunk_max, file_reference)) in refs.iter().enumerate() {
            if i == 0 {
                write_varint(*chunk_min, &mut content).unwrap();
                write_uvarint((chunk_max - chunk_min) as u64, &mut content).unwrap();
                write_uvarint(*file_reference, &mut content).unwrap();
            } else {
                let (_, prev_max, prev_ref) = refs[i - 1];
                write_uvarint((chunk_min - prev_max) as u64, &mut content).unwrap();
                write_uvarint((chunk_max - chunk_min) as u64, &mut content).unwrap();
                write_varint(*file_reference as i64 - prev_ref as i64, &mut content).unwrap();
            }
        }

        write_uvarint(content.len() as u64, &mut index).unwrap();
        index.extend_from_slice(&content);
        index.extend_from_slice(&crc32c::crc32c(&content).to_be_bytes());
    }

    pad_to_16(&mut index);
    let label_indices_offset = index.len() as u64;

    // posting lists
    let postings_start_offset = index.len() as u64;
    let mut posting_offsets: Vec<((String, String), u64)> = Vec::new();
    for ((key, value), refs) in &posting_refs {
        let offset = index.len() as u64;
        posting_offsets.push(((key.clone(), value.clone()), offset));
        let mut data = Vec::new();
        data.extend_from_slice(&(refs.len() as u32).to_be_bytes());
        for series_ref in refs {
            data.extend_from_slice(&series_ref.to_be_bytes());
        }
        index.extend_from_slice(&(data.len() as u32).to_be_bytes());
        index.extend_from_slice(&data);
        index.extend_from_slice(&crc32c::crc32c(&data).to_be_bytes());
    }

    // posting offset table
    let postings_offset_table_offset = index.len() as u64;
    let mut table = Vec::new();
    for ((key, value), offset) in &posting_offsets {
        table.push(2u8);
        write_uvarint(key.len() as u64, &mut table).unwrap();
        table.extend_from_slice(key.as_bytes());
        write_uvarint(value.len() as u64, &mut table).unwrap();
        table.extend_from_slice(value.as_bytes());
        write_uvarint(*offset, &mut table).unwrap();
    }
    index.extend_from_slice(&(table.len() as u32).to_be_bytes());
    index.extend_from_slice(&(posting_offsets.len() as u32).to_be_bytes());
    index.extend_from_slice(&table);
    index.extend_from_slice(&crc32c::crc32c(&table).to_be_bytes());

    // TOC
    let mut toc = Vec::with_capacity(52);
    for offset in [
        symbols_offset,
        series_offset,
        label_indices_offset,
        0u64, // label offset table, unused here
        postings_start_offset,
        postings_offset_table_offset,
    ] {
        toc.extend_from_slice(&offset.to_be_bytes());
    }
    toc.extend_from_slice(&crc32c::crc32c(&toc).to_be_bytes());
    index.extend_from_slice(&toc);

    std::fs::write(block_dir.join("index"), &index).unwrap();

    // meta.json
    let parents_json: Vec<serde_json::Value> = parents
        .iter()
        .map(|ulid| serde_json::json!({ "ulid": ulid }))
        .collect();
    let num_chunks: usize = series.iter().map(|spec| spec.chunks.len()).sum();
    let num_samples: usize = series
        .iter()
        .flat_map(|spec| spec.chunks.iter())
        .map(|chunk| chunk.len())
        .sum();
    let meta = serde_json::json!({
        "ulid": ulid,
        "minTime": min_time,
        "maxTime": max_time,
        "stats": {
            "numSamples": num_samples,
            "numSeries": series.len(),
            "numChunks": num_chunks,
        },
        "compaction": {
            "level": if parents.is_empty() { 1 } else { 2 },
            "sources": [ulid],
            "parents": parents_json,
        },
        "version": 1,
    });
    std::fs::write(
        block_dir.join("meta.json"),
        serde_json::to_string_pretty(&meta).unwrap(),
    )
    .unwrap();
}

/// Write a `chunks_head/000001` file holding the given
/// `(series_ref, chunk samples)` entries.
pub fn build_head_chunk_file(data_dir: &Path, entries: &[(u64, Vec<Sample>)]) {
    let head_dir = data_dir.join("chunks_head");
    std::fs::create_dir_all(&head_dir).unwrap();

    let mut file: Vec<u8> = Vec::new();
    file.extend_from_slice(&0x0130_BC91u32.to_be_bytes());
    file.push(1);
    file.extend_from_slice(&[0, 0, 0]);
    for (series_ref, chunk) in entries {
        write_head_chunk(*series_ref, chunk, &mut file).unwrap();
    }
    std::fs::write(head_dir.join("000001"), &file).unwrap();
}

/// WAL series record: `{1, n × (u64 ref, labels)}`.
pub fn wal_series_record(entries: &[(u64, &[(&str, &str)])]) -> Vec<u8> {
    let mut record = vec![1u8];
    for (series_id, labels) in entries {
        record.extend_from_slice(&series_id.to_be_bytes());
        write_uvarint(labels.len() as u64, &mut record).unwrap();
        for (key, value) in *labels {
            write_uvarint(key.len() as u64, &mut record).unwrap();
            record.extend_from_slice(key.as_bytes());
            write_uvarint(value.len() as u64, &mut record).unwrap();
            record.extend_from_slice(value.as_bytes());
        }
    }
    record
}

/// WAL samples record: `{2, u64 baseRef, i64 baseTs, n × (varint dRef,
/// varint dTs, u64 value bits)}`.
pub fn wal_samples_record(base_ref: u64, base_ts: i64, samples: &[(i64, i64, f64)]) -> Vec<u8> {
    let mut record = vec![2u8];
    record.extend_from_slice(&base_ref.to_be_bytes());
    record.extend_from_slice(&base_ts.to_be_bytes());
    for (d_ref, d_ts, value) in samples {
        write_varint(*d_ref, &mut record).unwrap();
        write_varint(*d_ts, &mut record).unwrap();
        record.extend_from_slice(&value.to_bits().to_be_bytes());
    }
    record
}

/// Frame one record as a single full WAL fragment, optionally
/// snappy-compressed.
pub fn wal_fragment(record: &[u8], compressed: bool) -> Vec<u8> {
    let (payload, type_byte) = if compressed {
        (
            snap::raw::Encoder::new().compress_vec(record).unwrap(),
            0b1001u8,
        )
    } else {
        (record.to_vec(), 0b0001u8)
    };
    let mut out = vec![type_byte];
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend_from_slice(&crc32c::crc32c(&payload).to_be_bytes());
    out.extend_from_slice(&payload);
    out
}

/// Write `wal/<name>` from framed fragments.
pub fn build_wal_segment(data_dir: &Path, name: &str, fragments: &[Vec<u8>]) {
    let wal_dir = data_dir.join("wal");
    std::fs::create_dir_all(&wal_dir).unwrap();
    let mut file = std::fs::File::create(wal_dir.join(name)).unwrap();
    for fragment in fragments {
        file.write_all(fragment).unwrap();
    }
}
