use std::cmp::Ordering;
use std::collections::VecDeque;

use crate::chunk::ChunkView;
use crate::errors::Result;
use crate::filter::SeriesFilter;
use crate::series::{Labels, Series};
use crate::source::SeriesSource;
use crate::xor::{SampleInfo, SampleIterator};

/// One source's filtered series, walked in label order.
///
/// Series refs are assigned in label order within a block (and the head's
/// map iterates label-insertion-independent refs re-sorted below), so the
/// sorted ref walk visits series lexicographically.
#[derive(Debug, Clone)]
pub struct FilteredSeriesSourceIterator {
    source: SeriesSource,
    refs: Vec<u64>,
    position: usize,
}

impl FilteredSeriesSourceIterator {
    pub fn new(source: SeriesSource, filter: &SeriesFilter) -> Result<Self> {
        let mut refs: Vec<u64> = source.filtered_refs(filter)?.into_iter().collect();
        // ref order within a block follows index layout, which Prometheus
        // writes in label order; re-sort by labels so every source agrees
        refs.sort_by(|a, b| {
            let left = source.series(*a).map(|s| &s.labels);
            let right = source.series(*b).map(|s| &s.labels);
            left.cmp(&right)
        });
        Ok(Self {
            source,
            refs,
            position: 0,
        })
    }

    fn current_ref(&self) -> Option<u64> {
        self.refs.get(self.position).copied()
    }

    fn current_labels(&self) -> Option<&Labels> {
        let reference = self.current_ref()?;
        self.source.series(reference).map(|series| &series.labels)
    }

    fn advance(&mut self) {
        self.position += 1;
    }
}

/// The same series as observed in one or more sources, in source order
/// (sources are sorted by block start time with the head last, so chunk
/// chaining walks time forward).
#[derive(Debug, Clone)]
pub struct CrossIndexSeries {
    entries: Vec<(SeriesSource, u64)>,
}

impl CrossIndexSeries {
    pub(crate) fn new(entries: Vec<(SeriesSource, u64)>) -> Self {
        debug_assert!(!entries.is_empty());
        Self { entries }
    }

    /// The series as seen by the first contributing source.
    pub fn series(&self) -> &Series {
        let (source, reference) = &self.entries[0];
        source
            .series(*reference)
            .expect("cross-index entries hold resolved refs")
    }

    pub fn labels(&self) -> &Labels {
        &self.series().labels
    }

    pub fn sources(&self) -> &[(SeriesSource, u64)] {
        &self.entries
    }

    /// All samples across the contributing sources, chained in order.
    pub fn samples(&self) -> CrossIndexSampleIterator {
        CrossIndexSampleIterator::new(
            self.entries
                .iter()
                .map(|(source, reference)| SeriesSampleIterator::new(source.clone(), *reference))
                .collect(),
        )
    }
}

/// Merges per-source filtered iterators into a label-ordered sequence of
/// [`CrossIndexSeries`].
///
/// Each step finds the smallest current label set across sources, bundles
/// every source positioned at an equal series, and advances them together;
/// the result is strictly increasing by label order with cross-source
/// duplicates merged.
#[derive(Debug, Clone)]
pub struct SeriesIterator {
    sources: Vec<FilteredSeriesSourceIterator>,
}

impl SeriesIterator {
    pub fn new(sources: Vec<FilteredSeriesSourceIterator>) -> Self {
        Self { sources }
    }
}

impl Iterator for SeriesIterator {
    type Item = CrossIndexSeries;

    fn next(&mut self) -> Option<Self::Item> {
        let mut winners: Vec<usize> = Vec::new();

        for i in 0..self.sources.len() {
            let Some(labels) = self.sources[i].current_labels() else {
                continue;
            };
            match winners.first() {
                None => winners.push(i),
                Some(&leader) => {
                    let leader_labels = self.sources[leader]
                        .current_labels()
                        .expect("winners always have a current series");
                    match labels.cmp(leader_labels) {
                        Ordering::Greater => {}
                        Ordering::Equal => winners.push(i),
                        Ordering::Less => {
                            winners.clear();
                            winners.push(i);
                        }
                    }
                }
            }
        }

        if winners.is_empty() {
            return None;
        }

        let entries = winners
            .iter()
            .map(|&i| {
                let iterator = &self.sources[i];
                (
                    iterator.source.clone(),
                    iterator.current_ref().expect("winner has a current series"),
                )
            })
            .collect();

        for &i in &winners {
            self.sources[i].advance();
        }

        Some(CrossIndexSeries::new(entries))
    }
}

/// Chains the chunks of one series in one source into a single sample
/// stream, resolving each chunk through the source's cache as it is
/// reached.
#[derive(Debug, Clone)]
pub struct SeriesSampleIterator {
    source: SeriesSource,
    reference: u64,
    chunk_index: usize,
    samples: Option<SampleIterator>,
    failed: bool,
}

impl SeriesSampleIterator {
    pub fn new(source: SeriesSource, reference: u64) -> Self {
        Self {
            source,
            reference,
            chunk_index: 0,
            samples: None,
            failed: false,
        }
    }

    /// Total samples over all chunks, from the chunk headers.
    pub fn count_samples(&self) -> Result<usize> {
        let series = self
            .source
            .series(self.reference)
            .expect("iterator holds a resolved ref");
        let mut total = 0;
        for chunk_ref in &series.chunks {
            total += ChunkView::new(self.source.cache(), chunk_ref)?.sample_count;
        }
        Ok(total)
    }

}

impl Iterator for SeriesSampleIterator {
    type Item = Result<SampleInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if self.samples.is_none() {
                let series = self.source.series(self.reference)?;
                let chunk_ref = series.chunks.get(self.chunk_index)?;
                match ChunkView::new(self.source.cache(), chunk_ref) {
                    Ok(view) => self.samples = Some(view.samples()),
                    Err(err) => {
                        self.failed = true;
                        return Some(Err(err));
                    }
                }
            }

            match self.samples.as_mut().unwrap().next() {
                Some(Ok(info)) => return Some(Ok(info)),
                Some(Err(err)) => {
                    self.failed = true;
                    return Some(Err(err));
                }
                None => {
                    self.samples = None;
                    self.chunk_index += 1;
                }
            }
        }
    }
}

/// Chains the per-source sample iterators of a [`CrossIndexSeries`]
/// back-to-back.
#[derive(Debug, Clone, Default)]
pub struct CrossIndexSampleIterator {
    subiterators: VecDeque<SeriesSampleIterator>,
}

impl CrossIndexSampleIterator {
    pub fn new(subiterators: VecDeque<SeriesSampleIterator>) -> Self {
        Self { subiterators }
    }

    /// Total samples over all sub-iterators, from the chunk headers.
    pub fn count_samples(&self) -> Result<usize> {
        let mut total = 0;
        for sub in &self.subiterators {
            total += sub.count_samples()?;
        }
        Ok(total)
    }
}

impl Iterator for CrossIndexSampleIterator {
    type Item = Result<SampleInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.subiterators.front_mut()?.next() {
                Some(item) => return Some(item),
                None => {
                    self.subiterators.pop_front();
                }
            }
        }
    }
}
