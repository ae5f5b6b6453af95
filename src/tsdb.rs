use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::filter::SeriesFilter;
use crate::head::HeadChunks;
use crate::histogram::HistogramIterator;
use crate::index::Index;
use crate::query::{FilteredSeriesSourceIterator, SeriesIterator};
use crate::source::SeriesSource;

/// An opened Prometheus data directory: its sealed blocks plus the
/// in-memory head reassembled from `chunks_head/` and the WAL.
///
/// Sources are held sorted by start time with the head last, so a merged
/// series yields its chunks in time order across block boundaries.
#[derive(Debug)]
pub struct Tsdb {
    blocks: Vec<Arc<Index>>,
    head: Option<Arc<HeadChunks>>,
}

impl Tsdb {
    /// Open `data_dir`, enumerating block subdirectories (entries whose
    /// name contains `.tmp` are compaction staging and skipped, as are
    /// directories without an `index` file), dropping blocks another
    /// block lists as a compaction parent, and loading the head.
    ///
    /// An empty or missing-everything directory is a valid, empty
    /// dataset.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Tsdb> {
        let data_dir = data_dir.as_ref();
        let mut blocks: Vec<Arc<Index>> = Vec::new();

        let mut block_dirs: Vec<_> = Vec::new();
        for entry in std::fs::read_dir(data_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.contains(".tmp") {
                continue;
            }
            let path = entry.path();
            if path.join("index").is_file() {
                block_dirs.push(path);
            }
        }
        block_dirs.sort();

        for block_dir in block_dirs {
            blocks.push(Index::open(&block_dir)?);
        }

        // blocks listed as compaction parents have been superseded by the
        // block listing them; drop them from the working set
        let parents: BTreeSet<String> = blocks
            .iter()
            .flat_map(|block| block.meta.compaction.parents.iter())
            .map(|parent| parent.ulid.clone())
            .filter(|ulid| !ulid.is_empty())
            .collect();
        blocks.retain(|block| {
            let obsolete = parents.contains(&block.meta.ulid);
            if obsolete {
                debug!(ulid = %block.meta.ulid, "dropping block compacted into a newer one");
            }
            !obsolete
        });

        blocks.sort_by_key(|block| block.meta.min_time);

        let head = HeadChunks::load(data_dir)?;
        let head = if head.series.is_empty() {
            None
        } else {
            Some(Arc::new(head))
        };

        debug!(blocks = blocks.len(), has_head = head.is_some(), "dataset opened");
        Ok(Tsdb { blocks, head })
    }

    pub fn blocks(&self) -> &[Arc<Index>] {
        &self.blocks
    }

    pub fn head(&self) -> Option<&Arc<HeadChunks>> {
        self.head.as_ref()
    }

    fn sources(&self) -> Vec<SeriesSource> {
        let mut sources: Vec<SeriesSource> = self
            .blocks
            .iter()
            .map(|block| SeriesSource::Block(Arc::clone(block)))
            .collect();
        if let Some(head) = &self.head {
            sources.push(SeriesSource::Head(Arc::clone(head)));
        }
        sources
    }

    /// Iterate every series, unfiltered, in label order.
    pub fn series(&self) -> Result<SeriesIterator> {
        self.filtered(&SeriesFilter::new())
    }

    /// Iterate the series matching `filter`, in label order, with the
    /// same series merged across sources.
    pub fn filtered(&self, filter: &SeriesFilter) -> Result<SeriesIterator> {
        let mut filtered = Vec::with_capacity(self.blocks.len() + 1);
        for source in self.sources() {
            filtered.push(FilteredSeriesSourceIterator::new(source, filter)?);
        }
        Ok(SeriesIterator::new(filtered))
    }

    /// Iterate the histograms reconstructible from every series.
    pub fn histograms(&self) -> Result<HistogramIterator> {
        Ok(HistogramIterator::new(self.series()?))
    }
}
