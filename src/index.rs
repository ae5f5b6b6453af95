use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::cache::ChunkFileCache;
use crate::decoder::{Decoder, Whence};
use crate::errors::{Result, TsdbError};
use crate::postings::{read_posting, PostingOffset, PostingOffsetIterator, PostingOffsetTable};
use crate::resource::Resource;
use crate::series::Series;
use crate::symbols::SymbolTable;
use crate::toc::Toc;

/// `stats` object of a block's `meta.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockStats {
    #[serde(default, rename = "numSamples")]
    pub num_samples: u64,
    #[serde(default, rename = "numSeries")]
    pub num_series: u64,
    #[serde(default, rename = "numChunks")]
    pub num_chunks: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockParent {
    #[serde(default)]
    pub ulid: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlockCompaction {
    #[serde(default)]
    pub level: i64,
    #[serde(default)]
    pub sources: Vec<String>,
    /// Blocks this one was compacted from. A parent entry without a ulid
    /// is kept as an empty string.
    #[serde(default)]
    pub parents: Vec<BlockParent>,
}

/// Parsed `meta.json` of one block.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockMeta {
    pub ulid: String,
    #[serde(rename = "minTime")]
    pub min_time: i64,
    #[serde(rename = "maxTime")]
    pub max_time: i64,
    #[serde(default)]
    pub stats: BlockStats,
    #[serde(default)]
    pub compaction: BlockCompaction,
    #[serde(default)]
    pub version: u64,
}

impl BlockMeta {
    pub fn read(path: &Path) -> Result<BlockMeta> {
        let file = std::fs::File::open(path).map_err(|err| TsdbError::Meta {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        serde_json::from_reader(file).map_err(|err| TsdbError::Meta {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }
}

/// One opened block: the mapped index file, its parsed tables, and the
/// chunk-file cache for the block's `chunks/` directory.
///
/// Everything is immutable after `open`; the cache only ever gains
/// entries. Series label strings are owned copies out of the symbol table,
/// so they stay valid independent of the mapping.
#[derive(Debug)]
pub struct Index {
    resource: Arc<Resource>,
    directory: PathBuf,
    pub meta: BlockMeta,
    pub symbols: SymbolTable,
    pub series: BTreeMap<u64, Series>,
    pub toc: Toc,
    postings: PostingOffsetTable,
    cache: Arc<ChunkFileCache>,
}

impl Index {
    /// Open the block at `block_dir` (`meta.json` + `index` + `chunks/`).
    pub fn open(block_dir: &Path) -> Result<Arc<Index>> {
        let meta = BlockMeta::read(&block_dir.join("meta.json"))?;
        let resource = Arc::new(Resource::map_file(&block_dir.join("index"))?);
        debug!(ulid = %meta.ulid, directory = %block_dir.display(), "opening block");

        let bytes = resource.bytes();
        let mut dec = Decoder::new(bytes);
        let toc = Toc::read_at_end(&mut dec)?;

        if toc.symbols == 0 {
            return Err(TsdbError::Parse("no symbol table in index file".into()));
        }
        dec.seek(toc.symbols as i64, Whence::Begin)?;
        let symbols = SymbolTable::read(&mut dec)?;

        if toc.series == 0 {
            return Err(TsdbError::Parse("no series in index file".into()));
        }
        // the series section runs up to whichever section follows it
        let series_end = [
            toc.label_indices,
            toc.label_offset_table,
            toc.postings_start,
            toc.postings_offset_table,
        ]
        .into_iter()
        .find(|offset| *offset != 0)
        .unwrap_or(0) as usize;

        dec.seek(toc.series as i64, Whence::Begin)?;
        let mut series = BTreeMap::new();
        while dec.consume_to_alignment(16)? < series_end {
            let offset = dec.tell();
            let reference = (offset / 16) as u64;
            series.insert(reference, Series::read(&mut dec, &symbols, reference)?);
        }

        if toc.postings_offset_table == 0 {
            return Err(TsdbError::Parse(
                "no posting offset table in index file".into(),
            ));
        }
        dec.seek(toc.postings_offset_table as i64, Whence::Begin)?;
        let postings = PostingOffsetTable::read(&mut dec)?;

        let cache = Arc::new(ChunkFileCache::new(block_dir.join("chunks")));

        Ok(Arc::new(Index {
            resource,
            directory: block_dir.to_path_buf(),
            meta,
            symbols,
            series,
            toc,
            postings,
            cache,
        }))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Lazily walk the posting offset table.
    pub fn posting_offsets(&self) -> PostingOffsetIterator<'_> {
        self.postings.iter(self.resource.bytes())
    }

    /// The sorted series refs of one posting list.
    pub fn series_refs_for(&self, offset: &PostingOffset) -> Result<BTreeSet<u64>> {
        read_posting(self.resource.bytes(), offset.offset)
    }

    pub fn all_series_refs(&self) -> BTreeSet<u64> {
        self.series.keys().copied().collect()
    }

    pub fn series(&self, reference: u64) -> Option<&Series> {
        self.series.get(&reference)
    }

    pub fn cache(&self) -> &Arc<ChunkFileCache> {
        &self.cache
    }
}
