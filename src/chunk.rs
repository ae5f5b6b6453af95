use std::sync::Arc;

use crate::cache::ChunkFileCache;
use crate::decoder::{ByteDecode, Decoder, Whence};
use crate::errors::{Result, TsdbError};
use crate::resource::Resource;
use crate::series::{ChunkKind, ChunkReference};
use crate::xor::SampleIterator;

pub use crate::encoder::chunk_encoder::{write_block_chunk, write_head_chunk, XOR_ENCODING};

/// A parsed chunk header plus the location of its sample data.
///
/// Holds a shared handle on the backing resource, so the mapping stays
/// alive for as long as any view or sample iterator derived from it.
#[derive(Debug, Clone)]
pub struct ChunkView {
    resource: Arc<Resource>,
    pub kind: ChunkKind,
    pub base_offset: usize,
    /// Start of the sample stream (for XOR chunks: just past the `u16`
    /// sample count; for raw chunks: the first packed pair).
    pub data_offset: usize,
    /// Length of the chunk body. For XOR chunks the body is the sample
    /// count plus the encoded stream; for raw chunks, all the pairs.
    pub data_len: usize,
    pub sample_count: usize,
}

impl ChunkView {
    /// Resolve `chunk_ref` through `cache` and parse the chunk prologue.
    pub fn new(cache: &ChunkFileCache, chunk_ref: &ChunkReference) -> Result<ChunkView> {
        let resource = cache.get(chunk_ref.segment_file_id())?;
        let base_offset = chunk_ref.offset() as usize;

        let bytes = resource.bytes();
        let mut dec = Decoder::new(bytes);
        dec.seek(base_offset as i64, Whence::Begin)?;

        if chunk_ref.kind == ChunkKind::Raw {
            let data_len = dec.remaining();
            return Ok(ChunkView {
                resource: Arc::clone(&resource),
                kind: ChunkKind::Raw,
                base_offset,
                data_offset: base_offset,
                data_len,
                sample_count: data_len / 16,
            });
        }

        let data_len = match chunk_ref.kind {
            ChunkKind::Head => {
                dec.read_u64()?; // series ref
                dec.read_i64()?; // min time
                dec.read_i64()?; // max time

                let encoding = dec.read_u8()?;
                if encoding != 1 {
                    return Err(TsdbError::UnknownEncoding {
                        context: "head chunk",
                        encoding,
                    });
                }
                dec.read_varuint()? as usize
            }
            _ => {
                let data_len = dec.read_varuint()? as usize;

                let encoding = dec.read_u8()?;
                if encoding != 1 {
                    return Err(TsdbError::UnknownEncoding {
                        context: "chunk",
                        encoding,
                    });
                }
                data_len
            }
        };

        if data_len < 2 {
            return Err(TsdbError::InvalidChunk(format!(
                "chunk body of {} bytes cannot hold a sample count",
                data_len
            )));
        }
        let sample_count = dec.read_u16()? as usize;
        let data_offset = dec.tell();

        if data_offset - 2 + data_len > bytes.len() {
            return Err(TsdbError::Eof {
                context: "locating chunk data",
                wanted: data_len,
                remaining: bytes.len() - (data_offset - 2),
            });
        }

        Ok(ChunkView {
            resource,
            kind: chunk_ref.kind,
            base_offset,
            data_offset,
            data_len,
            sample_count,
        })
    }

    /// The chunk body bytes, verbatim: `u16` count plus encoded stream for
    /// XOR chunks, packed pairs for raw chunks. This is what the portable
    /// format carries.
    pub fn body(&self) -> &[u8] {
        let start = match self.kind {
            ChunkKind::Raw => self.data_offset,
            _ => self.data_offset - 2,
        };
        &self.resource.bytes()[start..start + self.data_len]
    }

    /// Lazy iterator over this chunk's samples.
    pub fn samples(&self) -> SampleIterator {
        match self.kind {
            ChunkKind::Raw => SampleIterator::new(
                Arc::clone(&self.resource),
                self.data_offset,
                self.data_offset + self.data_len,
                self.sample_count,
                true,
            ),
            _ => SampleIterator::new(
                Arc::clone(&self.resource),
                self.data_offset,
                self.data_offset - 2 + self.data_len,
                self.sample_count,
                false,
            ),
        }
    }
}
