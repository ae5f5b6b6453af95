use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::decoder::{ByteDecode, Decoder, Whence};
use crate::errors::{Result, TsdbError};
use crate::resource::Resource;
use crate::series::{ChunkKind, ChunkReference, Series};

/// WAL segments are written in 32 KiB pages.
pub const PAGE_SIZE: usize = 32 * 1024;

const FRAGMENT_FULL: u8 = 0b0001;
const FRAGMENT_START: u8 = 0b0010;
const FRAGMENT_MID: u8 = 0b0011;
const FRAGMENT_END: u8 = 0b0100;
const FRAGMENT_COMPRESSED: u8 = 0b1000;

const RECORD_SERIES: u8 = 1;
const RECORD_SAMPLES: u8 = 2;
const RECORD_TOMBSTONE: u8 = 3;

/// Samples replayed from the WAL for one series, buffered as packed
/// little-endian `(i64, f64)` pairs so they can later be served through
/// the raw-chunk path without re-encoding.
#[derive(Debug)]
pub struct InMemWalChunk {
    data: Vec<u8>,
    /// Samples below this are duplicates of the series' on-disk head
    /// chunks and are discarded.
    floor: i64,
    min_time: i64,
    max_time: i64,
}

impl Default for InMemWalChunk {
    fn default() -> Self {
        Self {
            // most series see a steady scrape interval; one page of pairs
            // avoids early regrowth
            data: Vec::with_capacity(100 * 16),
            floor: i64::MIN,
            min_time: i64::MAX,
            max_time: i64::MIN,
        }
    }
}

impl InMemWalChunk {
    pub fn set_floor(&mut self, ts: i64) {
        self.floor = ts;
    }

    pub fn add_sample(&mut self, ts: i64, value: f64) {
        if ts < self.floor {
            return;
        }
        self.min_time = self.min_time.min(ts);
        self.max_time = self.max_time.max(ts);
        self.data.extend_from_slice(&ts.to_le_bytes());
        self.data.extend_from_slice(&value.to_bits().to_le_bytes());
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Package the buffered samples as a raw chunk. The caller assigns the
    /// synthetic file reference.
    pub fn into_resource(self) -> (Arc<Resource>, ChunkReference) {
        let reference = ChunkReference {
            min_time: self.min_time,
            max_time: self.max_time,
            file_reference: 0,
            kind: ChunkKind::Raw,
        };
        (Arc::new(Resource::from_vec(self.data)), reference)
    }
}

/// Replays `wal/` (and the latest checkpoint) into a series map and
/// per-series in-memory chunks.
///
/// Series records define labels; sample records append values. Label
/// strings are copied out of the segment: the mapping is dropped as soon
/// as the segment has been read.
pub struct WalLoader<'a> {
    series: &'a mut BTreeMap<u64, Series>,
    wal_chunks: &'a mut BTreeMap<u64, InMemWalChunk>,
    raw_buffer: Vec<u8>,
    in_partial_fragment: bool,
    needs_decompressing: bool,
}

impl<'a> WalLoader<'a> {
    pub fn new(
        series: &'a mut BTreeMap<u64, Series>,
        wal_chunks: &'a mut BTreeMap<u64, InMemWalChunk>,
    ) -> Self {
        Self {
            series,
            wal_chunks,
            raw_buffer: Vec::new(),
            in_partial_fragment: false,
            needs_decompressing: false,
        }
    }

    fn clear(&mut self) {
        self.raw_buffer.clear();
        self.needs_decompressing = false;
    }

    pub fn load(&mut self, data_dir: &Path) -> Result<()> {
        let wal_dir = data_dir.join("wal");

        let mut segments: Vec<PathBuf> = Vec::new();
        let mut checkpoints: Vec<PathBuf> = Vec::new();

        for entry in std::fs::read_dir(&wal_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.contains(".tmp") {
                continue;
            }
            if name.contains("checkpoint") {
                checkpoints.push(entry.path());
            } else {
                segments.push(entry.path());
            }
        }

        segments.sort();
        checkpoints.sort();

        if let Some(latest_checkpoint) = checkpoints.last() {
            let checkpoint_index = checkpoint_number(latest_checkpoint)?;

            // segments from before the checkpoint duplicate its contents
            segments.retain(|path| {
                segment_number(path).map_or(false, |number| number >= checkpoint_index)
            });

            let mut checkpoint_segments: Vec<PathBuf> = std::fs::read_dir(latest_checkpoint)?
                .map(|entry| entry.map(|e| e.path()))
                .collect::<std::io::Result<_>>()?;
            checkpoint_segments.sort();

            debug!(
                checkpoint = %latest_checkpoint.display(),
                segments = checkpoint_segments.len(),
                "replaying WAL checkpoint"
            );
            checkpoint_segments.append(&mut segments);
            segments = checkpoint_segments;
        }

        let last = segments.len().saturating_sub(1);
        for (i, segment) in segments.iter().enumerate() {
            self.load_file(segment, i == last)?;
        }
        Ok(())
    }

    fn load_file(&mut self, path: &Path, is_last: bool) -> Result<()> {
        debug!(segment = %path.display(), is_last, "reading WAL segment");
        let resource = Resource::map_file(path)?;
        if resource.is_empty() {
            return Ok(());
        }
        let mut dec = Decoder::new(resource.bytes());
        while !dec.is_empty() {
            self.load_fragments(&mut dec, is_last)?;
        }
        Ok(())
    }

    /// Consume fragments until one whole record has been assembled and
    /// processed, the page padding has been skipped, or the (tolerated)
    /// truncated tail of the last file has been discarded.
    fn load_fragments(&mut self, dec: &mut Decoder, is_last_file: bool) -> Result<()> {
        let mut record: &[u8] = &[];

        while !dec.is_empty() {
            let mut fragment_type = dec.read_u8()?;

            if fragment_type == 0 {
                // rest of the page is padding
                let pos = dec.tell();
                let boundary = (pos & !(PAGE_SIZE - 1)) + PAGE_SIZE;
                if dec.remaining() < boundary - pos {
                    if is_last_file {
                        warn!("WAL ends with a partial empty page, discarding");
                        dec.seek(0, Whence::End)?;
                    } else {
                        return Err(TsdbError::Wal(
                            "too few bytes left to read to page boundary".into(),
                        ));
                    }
                } else {
                    dec.seek(boundary as i64, Whence::Begin)?;
                }
                self.clear();
                return Ok(());
            }

            if dec.remaining() < 6 {
                if is_last_file {
                    warn!("WAL ends mid fragment header, discarding");
                    dec.seek(0, Whence::End)?;
                    return Ok(());
                }
                return Err(TsdbError::Wal("too few bytes for fragment header".into()));
            }

            let len = dec.read_u16()? as usize;
            dec.read_u32()?; // CRC, not verified

            if dec.remaining() < len {
                if is_last_file {
                    warn!("WAL ends mid fragment body, discarding");
                    dec.seek(0, Whence::End)?;
                    return Ok(());
                }
                return Err(TsdbError::Wal("too few bytes for fragment body".into()));
            }

            if fragment_type & FRAGMENT_COMPRESSED != 0 {
                self.needs_decompressing = true;
                fragment_type &= !FRAGMENT_COMPRESSED;
            }

            match fragment_type {
                FRAGMENT_FULL => {
                    if self.in_partial_fragment || !self.raw_buffer.is_empty() {
                        return Err(TsdbError::Wal(
                            "complete fragment seen in the middle of partial fragments".into(),
                        ));
                    }
                    record = dec.read_view(len)?;
                    break;
                }
                FRAGMENT_START => {
                    if self.in_partial_fragment {
                        return Err(TsdbError::Wal(
                            "start fragment seen in the middle of partial fragments".into(),
                        ));
                    }
                    self.raw_buffer.extend_from_slice(dec.read_view(len)?);
                    self.in_partial_fragment = true;
                }
                FRAGMENT_MID => {
                    if !self.in_partial_fragment {
                        return Err(TsdbError::Wal("middle fragment seen before start".into()));
                    }
                    self.raw_buffer.extend_from_slice(dec.read_view(len)?);
                }
                FRAGMENT_END => {
                    if !self.in_partial_fragment {
                        return Err(TsdbError::Wal("end fragment seen before start".into()));
                    }
                    self.raw_buffer.extend_from_slice(dec.read_view(len)?);
                    self.in_partial_fragment = false;
                    record = &[];
                    break;
                }
                other => {
                    return Err(TsdbError::Wal(format!("unknown fragment type: {}", other)));
                }
            }
        }

        if self.in_partial_fragment {
            return Err(TsdbError::Wal("incomplete record found".into()));
        }

        let reassembled: Vec<u8>;
        let mut record = record;
        if record.is_empty() && !self.raw_buffer.is_empty() {
            reassembled = std::mem::take(&mut self.raw_buffer);
            record = &reassembled;
        }

        if record.is_empty() {
            return Err(TsdbError::Wal("empty record found".into()));
        }

        let decompressed: Vec<u8>;
        if self.needs_decompressing {
            decompressed = snap::raw::Decoder::new()
                .decompress_vec(record)
                .map_err(|err| TsdbError::Wal(format!("snappy decompression failed: {}", err)))?;
            record = &decompressed;
        }

        self.load_record(record)?;
        self.clear();
        Ok(())
    }

    fn load_record(&mut self, record: &[u8]) -> Result<()> {
        let mut dec = Decoder::new(record);
        let record_type = dec.read_u8()?;
        match record_type {
            RECORD_SERIES => self.load_series(&mut dec),
            RECORD_SAMPLES => self.load_samples(&mut dec),
            RECORD_TOMBSTONE => Ok(()),
            other => Err(TsdbError::Wal(format!(
                "record contains unknown record type: {}",
                other
            ))),
        }
    }

    fn load_series(&mut self, dec: &mut Decoder) -> Result<()> {
        while !dec.is_empty() {
            let series_id = dec.read_u64()?;
            let series = self.series.entry(series_id).or_default();

            let label_count = dec.read_varuint()?;
            for _ in 0..label_count {
                let key_len = dec.read_varuint()? as usize;
                let key = String::from_utf8(dec.read_vec(key_len)?)
                    .map_err(|_| TsdbError::Wal("series label key is not UTF-8".into()))?;
                let value_len = dec.read_varuint()? as usize;
                let value = String::from_utf8(dec.read_vec(value_len)?)
                    .map_err(|_| TsdbError::Wal("series label value is not UTF-8".into()))?;
                series.labels.insert(key, value);
            }
        }
        Ok(())
    }

    fn load_samples(&mut self, dec: &mut Decoder) -> Result<()> {
        if dec.is_empty() {
            return Ok(());
        }
        let base_ref = dec.read_u64()?;
        let base_ts = dec.read_i64()?;

        while !dec.is_empty() {
            let d_ref = dec.read_varint()?;
            let d_ts = dec.read_varint()?;
            let value = f64::from_bits(dec.read_u64()?);

            let reference = (base_ref as i64).wrapping_add(d_ref) as u64;
            let ts = base_ts + d_ts;

            let Some(series) = self.series.get(&reference) else {
                // sample for a series this WAL never defined; nothing to
                // attach it to
                continue;
            };

            // first WAL sample for a series with on-disk head chunks: start
            // past them, so overlapping samples are dropped
            if !self.wal_chunks.contains_key(&reference) && !series.chunks.is_empty() {
                let floor = series.chunks.last().unwrap().max_time + 1;
                self.wal_chunks.entry(reference).or_default().set_floor(floor);
            }

            self.wal_chunks
                .entry(reference)
                .or_default()
                .add_sample(ts, value);
        }
        Ok(())
    }
}

fn checkpoint_number(path: &Path) -> Result<u64> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.rsplit('.')
        .next()
        .and_then(|suffix| suffix.parse().ok())
        .ok_or_else(|| TsdbError::InvalidFileName {
            path: path.to_path_buf(),
        })
}

fn segment_number(path: &Path) -> Option<u64> {
    path.file_name()?.to_string_lossy().parse().ok()
}
