use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::cache::ChunkFileCache;
use crate::errors::Result;
use crate::filter::SeriesFilter;
use crate::head::HeadChunks;
use crate::index::Index;
use crate::series::Series;

/// In-memory series source backing deserialised portable series: a series
/// map plus a cache already populated with their chunk bytes.
#[derive(Debug)]
pub struct MemSource {
    pub series: BTreeMap<u64, Series>,
    pub cache: Arc<ChunkFileCache>,
}

/// Anything that can answer a series query: an on-disk block, the
/// in-memory head, or deserialised portable series.
///
/// Three concrete kinds, so a plain enum; cloning is a reference-count
/// bump.
#[derive(Debug, Clone)]
pub enum SeriesSource {
    Block(Arc<Index>),
    Head(Arc<HeadChunks>),
    Mem(Arc<MemSource>),
}

impl SeriesSource {
    /// The sorted refs of every series satisfying `filter`.
    pub fn filtered_refs(&self, filter: &SeriesFilter) -> Result<BTreeSet<u64>> {
        match self {
            SeriesSource::Block(index) => filter.evaluate_index(index),
            SeriesSource::Head(head) => Ok(filter.scan(&head.series)),
            SeriesSource::Mem(mem) => Ok(filter.scan(&mem.series)),
        }
    }

    pub fn series(&self, reference: u64) -> Option<&Series> {
        match self {
            SeriesSource::Block(index) => index.series(reference),
            SeriesSource::Head(head) => head.series(reference),
            SeriesSource::Mem(mem) => mem.series.get(&reference),
        }
    }

    pub fn cache(&self) -> &Arc<ChunkFileCache> {
        match self {
            SeriesSource::Block(index) => index.cache(),
            SeriesSource::Head(head) => head.cache(),
            SeriesSource::Mem(mem) => &mem.cache,
        }
    }
}
