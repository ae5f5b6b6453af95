use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use regex::Regex;

use crate::errors::{Result, TsdbError};
use crate::index::Index;
use crate::series::Series;

/// Predicate over one label value.
#[derive(Clone)]
pub enum Matcher {
    Exact(String),
    /// Full-match against the whole label value, Prometheus style.
    Regex(Regex),
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl Matcher {
    pub fn regex(pattern: &str) -> Result<Matcher> {
        let anchored = format!("^(?:{})$", pattern);
        let regex = Regex::new(&anchored)
            .map_err(|err| TsdbError::Parse(format!("invalid filter regex: {}", err)))?;
        Ok(Matcher::Regex(regex))
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Exact(expected) => value == expected,
            Matcher::Regex(regex) => regex.is_match(value),
            Matcher::Predicate(predicate) => predicate(value),
        }
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Matcher::Exact(expected) => f.debug_tuple("Exact").field(expected).finish(),
            Matcher::Regex(regex) => f.debug_tuple("Regex").field(&regex.as_str()).finish(),
            Matcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A label-keyed set of matchers; a series matches when every matcher
/// accepts the value of its label (series missing a filtered label never
/// match). The empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct SeriesFilter {
    matchers: BTreeMap<String, Matcher>,
}

impl SeriesFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, matcher: Matcher) -> Self {
        self.add(key, matcher);
        self
    }

    pub fn with_exact(self, key: &str, value: &str) -> Self {
        self.with(key, Matcher::Exact(value.to_string()))
    }

    pub fn with_regex(self, key: &str, pattern: &str) -> Result<Self> {
        Ok(self.with(key, Matcher::regex(pattern)?))
    }

    pub fn with_predicate(
        self,
        key: &str,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.with(key, Matcher::Predicate(Arc::new(predicate)))
    }

    /// First matcher for a key wins; duplicate adds are ignored.
    pub fn add(&mut self, key: &str, matcher: Matcher) {
        self.matchers.entry(key.to_string()).or_insert(matcher);
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Direct evaluation against one series' labels.
    pub fn matches_series(&self, series: &Series) -> bool {
        self.matchers.iter().all(|(key, matcher)| {
            series
                .labels
                .get(key)
                .is_some_and(|value| matcher.matches(value))
        })
    }

    /// Evaluate against a block through its posting lists.
    ///
    /// For each filtered label key, collect the union of posting refs
    /// whose value satisfies that key's matcher, then intersect across
    /// keys. Every filtered key is seeded with an empty set first, so a
    /// key that matches no posting value empties the intersection rather
    /// than silently dropping out of it.
    pub fn evaluate_index(&self, index: &Index) -> Result<BTreeSet<u64>> {
        if self.is_empty() {
            return Ok(index.all_series_refs());
        }

        let mut per_key: BTreeMap<&str, BTreeSet<u64>> = self
            .matchers
            .keys()
            .map(|key| (key.as_str(), BTreeSet::new()))
            .collect();

        for entry in index.posting_offsets() {
            let posting_offset = entry?;
            if let Some(matcher) = self.matchers.get(posting_offset.label_key) {
                if matcher.matches(posting_offset.label_value) {
                    per_key
                        .get_mut(posting_offset.label_key)
                        .expect("every filtered key was seeded")
                        .extend(index.series_refs_for(&posting_offset)?);
                }
            }
        }

        let mut sets = per_key.into_values();
        let mut result = sets.next().expect("filter is non-empty");
        for set in sets {
            result = result.intersection(&set).copied().collect();
            if result.is_empty() {
                break;
            }
        }
        Ok(result)
    }

    /// Evaluate by scanning an in-memory series map.
    pub fn scan(&self, series: &BTreeMap<u64, Series>) -> BTreeSet<u64> {
        series
            .iter()
            .filter(|(_, s)| self.matches_series(s))
            .map(|(reference, _)| *reference)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::Labels;

    fn series_with(labels: &[(&str, &str)]) -> Series {
        let labels: Labels = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Series {
            labels,
            chunks: Vec::new(),
        }
    }

    #[test]
    fn test_matchers() {
        assert!(Matcher::Exact("up".into()).matches("up"));
        assert!(!Matcher::Exact("up".into()).matches("upper"));

        let regex = Matcher::regex("http_.*").unwrap();
        assert!(regex.matches("http_requests_total"));
        // full match, not substring match
        assert!(!regex.matches("not_http_requests"));

        let predicate = Matcher::Predicate(Arc::new(|v: &str| v.len() == 3));
        assert!(predicate.matches("api"));
        assert!(!predicate.matches("apis"));

        assert!(Matcher::regex("unclosed(").is_err());
    }

    #[test]
    fn test_matches_series() {
        let series = series_with(&[("__name__", "up"), ("job", "api")]);

        let filter = SeriesFilter::new().with_exact("__name__", "up");
        assert!(filter.matches_series(&series));

        let filter = SeriesFilter::new()
            .with_exact("__name__", "up")
            .with_exact("job", "web");
        assert!(!filter.matches_series(&series));

        // a filtered label the series lacks excludes it
        let filter = SeriesFilter::new().with_exact("instance", "a");
        assert!(!filter.matches_series(&series));

        // the empty filter matches everything
        assert!(SeriesFilter::new().matches_series(&series));
    }

    #[test]
    fn test_scan() {
        let mut map = BTreeMap::new();
        map.insert(1, series_with(&[("__name__", "up"), ("job", "api")]));
        map.insert(2, series_with(&[("__name__", "up"), ("job", "web")]));
        map.insert(3, series_with(&[("__name__", "down")]));

        let filter = SeriesFilter::new().with_exact("__name__", "up");
        assert_eq!(
            filter.scan(&map).into_iter().collect::<Vec<_>>(),
            vec![1, 2]
        );

        let filter = SeriesFilter::new()
            .with_exact("__name__", "up")
            .with_exact("job", "web");
        assert_eq!(filter.scan(&map).into_iter().collect::<Vec<_>>(), vec![2]);
    }
}
