use std::collections::BTreeMap;

use crate::errors::{Result, TsdbError};
use crate::query::{CrossIndexSampleIterator, CrossIndexSeries, SeriesIterator};
use crate::series::Labels;
use crate::xor::SampleInfo;

/// One reconstructed histogram observation.
#[derive(Debug, Clone, PartialEq)]
pub struct TimestampedHistogram {
    pub timestamp: i64,
    /// Cumulative bucket values, ordered by bucket bound.
    pub bucket_values: Vec<f64>,
    pub sum: f64,
}

/// Every histogram observation of one metric over its time range: the
/// canonical labels (minus `le`), the bucket bounds, and the per-timestamp
/// observations.
#[derive(Debug, Clone, Default)]
pub struct HistogramTimeSpan {
    pub labels: Labels,
    pub bucket_bounds: Vec<f64>,
    pub histograms: Vec<TimestampedHistogram>,
}

impl HistogramTimeSpan {
    pub fn name(&self) -> &str {
        self.labels
            .get("__name__")
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.histograms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histograms.is_empty()
    }
}

struct SampleCursor {
    iterator: CrossIndexSampleIterator,
    current: Option<SampleInfo>,
}

impl SampleCursor {
    fn new(mut iterator: CrossIndexSampleIterator) -> Result<Self> {
        let current = iterator.next().transpose()?;
        Ok(Self { iterator, current })
    }

    fn advance(&mut self) -> Result<()> {
        self.current = self.iterator.next().transpose()?;
        Ok(())
    }
}

/// Advance every cursor until they all sit on the same timestamp.
///
/// Whenever a cursor is behind the candidate timestamp it skips forward
/// (those samples have no complete histogram anyway); whenever one is
/// ahead, the candidate moves up and the scan restarts. Returns false as
/// soon as any cursor runs out.
fn align_cursors(cursors: &mut [SampleCursor]) -> Result<bool> {
    let Some(first) = cursors.first() else {
        return Ok(false);
    };
    let Some(sample) = &first.current else {
        return Ok(false);
    };
    let mut timestamp = sample.timestamp();

    loop {
        let mut consistent = true;
        for cursor in cursors.iter_mut() {
            while cursor
                .current
                .is_some_and(|sample| sample.timestamp() < timestamp)
            {
                cursor.advance()?;
            }

            let Some(sample) = &cursor.current else {
                return Ok(false);
            };

            if sample.timestamp() > timestamp {
                timestamp = sample.timestamp();
                consistent = false;
            }
        }
        if consistent {
            return Ok(true);
        }
    }
}

fn build_time_span(
    labels: Labels,
    buckets: Vec<CrossIndexSeries>,
    sum: &CrossIndexSeries,
) -> Result<HistogramTimeSpan> {
    let mut bucket_bounds = Vec::with_capacity(buckets.len());
    for bucket in &buckets {
        let bound = bucket
            .labels()
            .get("le")
            .ok_or_else(|| TsdbError::InvalidBucketBound("<missing>".into()))?;
        let parsed: f64 = bound
            .parse()
            .map_err(|_| TsdbError::InvalidBucketBound(bound.clone()))?;
        bucket_bounds.push(parsed);
    }

    let mut cursors = Vec::with_capacity(buckets.len() + 1);
    for bucket in &buckets {
        cursors.push(SampleCursor::new(bucket.samples())?);
    }
    cursors.push(SampleCursor::new(sum.samples())?);

    let mut histograms: Vec<TimestampedHistogram> = Vec::new();
    loop {
        if !align_cursors(&mut cursors)? {
            break;
        }

        let (sum_cursor, bucket_cursors) = cursors.split_last_mut().expect("sum cursor exists");

        let mut bucket_values = Vec::with_capacity(bucket_cursors.len());
        for cursor in bucket_cursors.iter_mut() {
            let sample = cursor.current.expect("aligned cursors hold samples");
            bucket_values.push(sample.value());
            cursor.advance()?;
        }

        let sum_sample = sum_cursor.current.expect("aligned cursors hold samples");
        sum_cursor.advance()?;

        if let Some(previous) = histograms.last() {
            if sum_sample.timestamp() <= previous.timestamp {
                return Err(TsdbError::NonMonotonicTimestamps {
                    previous: previous.timestamp,
                    current: sum_sample.timestamp(),
                });
            }
        }

        histograms.push(TimestampedHistogram {
            timestamp: sum_sample.timestamp(),
            bucket_values,
            sum: sum_sample.value(),
        });
    }

    Ok(HistogramTimeSpan {
        labels,
        bucket_bounds,
        histograms,
    })
}

/// Split a metric name into its base and histogram-role suffix.
fn split_name(name: &str) -> (&str, &str) {
    match name.rsplit_once('_') {
        Some((base, suffix)) if matches!(suffix, "bucket" | "count" | "sum") => (base, suffix),
        _ => (name, ""),
    }
}

/// Labels identifying one histogram: the base name with `le` removed.
///
/// `name` is removed too, for recording rules which copy `__name__` into
/// `name`.
fn canonicalise(labels: &Labels) -> Labels {
    let mut canonical = labels.clone();
    if let Some(name) = canonical.get("__name__") {
        let base = split_name(name).0.to_string();
        canonical.insert("__name__".to_string(), base);
    }
    canonical.remove("le");
    canonical.remove("name");
    canonical
}

/// Collects related series until a histogram is complete.
///
/// Bucket series of one histogram are not necessarily adjacent in label
/// order (any label sorting after `le` interleaves them), but all of them
/// sort before the `_sum` series, so seeing `_sum` closes the histogram.
#[derive(Default)]
struct HistogramAccumulator {
    partial: BTreeMap<Labels, Vec<CrossIndexSeries>>,
}

impl HistogramAccumulator {
    fn add_series(&mut self, series: CrossIndexSeries) -> Result<Option<HistogramTimeSpan>> {
        let labels = series.labels();
        let Some(name) = labels.get("__name__") else {
            return Ok(None);
        };
        let (_, suffix) = split_name(name);
        let canonical = canonicalise(labels);

        match suffix {
            "bucket" => {
                self.partial.entry(canonical).or_default().push(series);
                Ok(None)
            }
            "sum" => {
                let Some(buckets) = self.partial.remove(&canonical) else {
                    // a _sum with no buckets: a summary, not a histogram
                    return Ok(None);
                };
                if buckets.is_empty() {
                    return Ok(None);
                }
                // order buckets by `le` as numbers, not strings
                let mut bounds: Vec<f64> = Vec::with_capacity(buckets.len());
                for bucket in &buckets {
                    let bound = bucket.labels().get("le").cloned().unwrap_or_default();
                    bounds.push(
                        bound
                            .parse()
                            .map_err(|_| TsdbError::InvalidBucketBound(bound.clone()))?,
                    );
                }
                let mut order: Vec<usize> = (0..buckets.len()).collect();
                order.sort_by(|a, b| bounds[*a].total_cmp(&bounds[*b]));
                let ordered: Vec<CrossIndexSeries> =
                    order.into_iter().map(|i| buckets[i].clone()).collect();

                build_time_span(canonical, ordered, &series).map(Some)
            }
            _ => Ok(None),
        }
    }
}

/// Iterator over every histogram reconstructible from a series iterator.
pub struct HistogramIterator {
    series: SeriesIterator,
    accumulator: HistogramAccumulator,
    failed: bool,
}

impl HistogramIterator {
    pub fn new(series: SeriesIterator) -> Self {
        Self {
            series,
            accumulator: HistogramAccumulator::default(),
            failed: false,
        }
    }
}

impl Iterator for HistogramIterator {
    type Item = Result<HistogramTimeSpan>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        for series in self.series.by_ref() {
            match self.accumulator.add_series(series) {
                Ok(Some(span)) => return Some(Ok(span)),
                Ok(None) => continue,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
