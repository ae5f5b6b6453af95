use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::ChunkFileCache;
use crate::decoder::{ByteDecode, Decoder, Whence};
use crate::errors::{Result, TsdbError};
use crate::series::{make_file_reference, ChunkKind, ChunkReference, Series, RAW_SEGMENT_ID_BASE};
use crate::wal::{InMemWalChunk, WalLoader};

/// Magic number opening every `chunks_head/` file.
pub const HEAD_CHUNK_FILE_MAGIC: u32 = 0x0130_BC91;

/// Minimum bytes a head chunk entry needs: series ref, min/max time,
/// encoding, a one-byte length, and the CRC.
pub const HEAD_CHUNK_META_MIN_LEN: usize = 8 + 8 + 8 + 1 + 1 + 4;

/// The mutable head of the database, reassembled in memory from
/// `chunks_head/` files plus the WAL.
///
/// Owns all its label strings (the WAL segments they came from are read
/// once and unmapped) and a chunk cache that also carries the
/// WAL-synthesised raw chunks under synthetic segment ids.
#[derive(Debug)]
pub struct HeadChunks {
    pub series: BTreeMap<u64, Series>,
    cache: Arc<ChunkFileCache>,
}

impl HeadChunks {
    /// Load the head state of `data_dir`. Absent `chunks_head/` or `wal/`
    /// means a fresh or fully compacted directory: an empty source.
    pub fn load(data_dir: &Path) -> Result<HeadChunks> {
        let head_dir = data_dir.join("chunks_head");
        let cache = Arc::new(ChunkFileCache::new(head_dir.clone()));
        let mut head = HeadChunks {
            series: BTreeMap::new(),
            cache,
        };

        if !head_dir.is_dir() || !data_dir.join("wal").is_dir() {
            return Ok(head);
        }

        let mut file_names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&head_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.contains(".tmp") {
                continue;
            }
            file_names.push(name);
        }
        file_names.sort();

        let last = file_names.len().saturating_sub(1);
        for (i, name) in file_names.iter().enumerate() {
            let file_id: u64 = name.parse().map_err(|_| TsdbError::InvalidFileName {
                path: head_dir.join(name),
            })?;
            let resource = head.cache.get(file_id as u32)?;
            let mut dec = Decoder::new(resource.bytes());

            match head.load_chunk_file(&mut dec, file_id) {
                Ok(()) => {}
                // the newest file may end mid-entry while being written
                Err(err) if err.is_eof() && i == last => {
                    warn!(file = %name, "head chunk file is truncated, keeping entries so far");
                }
                Err(err) => return Err(err),
            }
        }

        head.load_wal(data_dir)?;

        Ok(head)
    }

    fn load_chunk_file(&mut self, dec: &mut Decoder, file_id: u64) -> Result<()> {
        let magic = dec.read_u32()?;
        if magic != HEAD_CHUNK_FILE_MAGIC {
            return Err(TsdbError::Parse(format!(
                "head chunk file has unexpected magic: {:#x}",
                magic
            )));
        }

        let version = dec.read_u8()?;
        if version != 1 {
            return Err(TsdbError::Parse(format!(
                "head chunk file has unexpected version: {}",
                version
            )));
        }

        // padding
        dec.read_u8()?;
        dec.read_u8()?;
        dec.read_u8()?;

        while dec.remaining() > HEAD_CHUNK_META_MIN_LEN {
            let Some((series_ref, chunk_ref)) = read_head_chunk_meta(dec, file_id)? else {
                // zeroed tail of the newest file
                break;
            };
            self.series
                .entry(series_ref)
                .or_default()
                .chunks
                .push(chunk_ref);
        }
        Ok(())
    }

    fn load_wal(&mut self, data_dir: &Path) -> Result<()> {
        let mut wal_chunks: BTreeMap<u64, InMemWalChunk> = BTreeMap::new();
        WalLoader::new(&mut self.series, &mut wal_chunks).load(data_dir)?;

        // publish the in-memory chunks through the cache so they flow
        // through the same iterator machinery as mapped segments
        let mut counter: u32 = 0;
        for (series_ref, chunk) in wal_chunks {
            if chunk.is_empty() {
                continue;
            }
            let file_id = RAW_SEGMENT_ID_BASE + counter;
            let (resource, mut chunk_ref) = chunk.into_resource();
            chunk_ref.file_reference = make_file_reference(file_id as u64, 0);
            self.cache.store(file_id, resource)?;
            self.series
                .get_mut(&series_ref)
                .expect("WAL chunks exist only for known series")
                .chunks
                .push(chunk_ref);
            counter += 1;
        }
        debug!(series = self.series.len(), raw_chunks = counter, "head loaded");
        Ok(())
    }

    pub fn series(&self, reference: u64) -> Option<&Series> {
        self.series.get(&reference)
    }

    pub fn cache(&self) -> &Arc<ChunkFileCache> {
        &self.cache
    }
}

/// Read one head chunk entry, leaving the cursor at the next one.
///
/// `Ok(None)` means a zeroed entry: the pre-allocated tail of the file.
pub fn read_head_chunk_meta(
    dec: &mut Decoder,
    file_id: u64,
) -> Result<Option<(u64, ChunkReference)>> {
    let offset = dec.tell();

    let series_ref = dec.read_u64()?;
    let min_time = dec.read_i64()?;
    let max_time = dec.read_i64()?;

    let encoding = dec.read_u8()?;
    if encoding != 1 {
        if encoding == 0 && min_time == 0 && max_time == 0 {
            return Ok(None);
        }
        return Err(TsdbError::UnknownEncoding {
            context: "head chunk meta",
            encoding,
        });
    }

    let data_len = dec.read_varuint()?;
    // skip data and CRC to land on the next entry
    dec.seek(data_len as i64 + 4, Whence::Current)?;

    Ok(Some((
        series_ref,
        ChunkReference {
            min_time,
            max_time,
            file_reference: make_file_reference(file_id, offset as u64),
            kind: ChunkKind::Head,
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_meta(series_ref: u64, min_time: i64, max_time: i64, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&series_ref.to_be_bytes());
        out.extend_from_slice(&min_time.to_be_bytes());
        out.extend_from_slice(&max_time.to_be_bytes());
        out.push(1);
        crate::varint::write_uvarint(data.len() as u64, &mut out).unwrap();
        out.extend_from_slice(data);
        out.extend_from_slice(&[0u8; 4]); // crc
        out
    }

    #[test]
    fn test_read_head_chunk_meta() {
        let data = encode_meta(9, 100, 200, b"payload");
        let mut dec = Decoder::new(&data);
        let (series_ref, chunk_ref) = read_head_chunk_meta(&mut dec, 3).unwrap().unwrap();
        assert_eq!(series_ref, 9);
        assert_eq!(chunk_ref.min_time, 100);
        assert_eq!(chunk_ref.max_time, 200);
        assert_eq!(chunk_ref.kind, ChunkKind::Head);
        assert_eq!(chunk_ref.segment_file_id(), 3);
        assert_eq!(chunk_ref.offset(), 0);
        assert!(dec.is_empty());
    }

    #[test]
    fn test_zeroed_entry_ends_file() {
        let data = vec![0u8; 64];
        let mut dec = Decoder::new(&data);
        assert!(read_head_chunk_meta(&mut dec, 1).unwrap().is_none());
    }

    #[test]
    fn test_other_encodings_are_fatal() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u64.to_be_bytes());
        data.extend_from_slice(&5i64.to_be_bytes()); // non-zero min time
        data.extend_from_slice(&9i64.to_be_bytes());
        data.push(0);
        data.extend_from_slice(&[0u8; 8]);
        let mut dec = Decoder::new(&data);
        assert!(matches!(
            read_head_chunk_meta(&mut dec, 1),
            Err(TsdbError::UnknownEncoding { .. })
        ));
    }

    #[test]
    fn test_truncated_meta_is_eof() {
        let data = encode_meta(9, 100, 200, b"payload");
        let truncated = &data[..20];
        let mut dec = Decoder::new(truncated);
        assert!(read_head_chunk_meta(&mut dec, 1).unwrap_err().is_eof());
    }

    #[test]
    fn test_missing_directories_mean_empty_head() {
        let dir = tempfile::tempdir().unwrap();
        let head = HeadChunks::load(dir.path()).unwrap();
        assert!(head.series.is_empty());

        // chunks_head without wal is also treated as empty
        std::fs::create_dir(dir.path().join("chunks_head")).unwrap();
        let head = HeadChunks::load(dir.path()).unwrap();
        assert!(head.series.is_empty());
    }
}
