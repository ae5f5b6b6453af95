//!
//! Read Prometheus TSDB data directories straight from disk.
//!
//! ## Features
//!
//! - Open a `<datadir>` and iterate every time series in it: sealed blocks
//!   (`<ULID>/index` + `chunks/`), the current head (`chunks_head/`), and
//!   the write-ahead log, merged into one label-ordered stream.
//! - Parse Prometheus XOR chunks (the [Gorilla](https://www.vldb.org/pvldb/vol8/p1816-teller.pdf)-style
//!   delta-of-delta / XOR encoding) lazily, sample by sample, with
//!   per-sample bit-width metadata.
//! - Filter series by label: exact values, anchored regular expressions,
//!   or arbitrary predicates, evaluated against the index posting lists.
//! - Reconstruct classic `_bucket`/`_sum` histograms over time.
//! - Serialise selected series (labels + verbatim chunk bytes) to a small
//!   portable format and read them back anywhere.
//! - Also comes with the underlying codecs: `varint`/`uvarint`, the
//!   timestamp delta-of-delta prefix code, and the XOR value encoding,
//!   each with a writer for round-tripping.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rusty_tsdb::{SeriesFilter, Tsdb};
//!
//! let tsdb = Tsdb::open("/prometheus/data").unwrap();
//!
//! let filter = SeriesFilter::new()
//!     .with_exact("__name__", "up")
//!     .with_exact("job", "api");
//!
//! for series in tsdb.filtered(&filter).unwrap() {
//!     println!("{:?}", series.labels());
//!     for sample in series.samples() {
//!         let sample = sample.unwrap();
//!         println!("  {} {}", sample.timestamp(), sample.value());
//!     }
//! }
//! ```
//!
//! Everything in a block is memory-mapped and shared: series, views, and
//! sample iterators keep their block alive through reference counts, and
//! nothing is mutated after open.

/// Chunk-file cache, keyed by segment id.
pub mod cache;
/// Chunk views: per-kind header parsing over cached segments.
pub mod chunk;
mod crc32c;
/// Byte cursors over slices and streams.
pub mod decoder;
mod encoder;
mod errors;
/// Label filters and their evaluation against posting lists.
pub mod filter;
/// The in-memory head: `chunks_head/` files plus the WAL.
pub mod head;
/// Histogram reconstruction from `_bucket`/`_sum` series.
pub mod histogram;
/// Block index files: TOC, symbols, series table, postings.
pub mod index;
/// Lazy posting offset table iteration.
pub mod postings;
/// Query core: filtered iteration and cross-block merging.
pub mod query;
/// Memory-mapped files and owned buffers.
pub mod resource;
/// Portable series serialisation.
pub mod serial;
/// Series, labels, and chunk references.
pub mod series;
/// Series sources: blocks, the head, deserialised series.
pub mod source;
/// Index symbol tables.
pub mod symbols;
/// The data directory entry point.
pub mod tsdb;
/// Index table of contents.
pub mod toc;
/// Prometheus's varbit timestamp encoding.
pub mod varbit_ts;
/// Prometheus's varbit xor encoding.
pub mod varbit_xor;
/// Golang's varint and uvarint.
pub mod varint;
/// Write-ahead log replay.
pub mod wal;
/// XOR chunk samples and the lazy sample iterator.
pub mod xor;

type NomBitInput<'a> = (&'a [u8], usize);

// Re-exports
pub use errors::{Result, TsdbError};
pub use filter::{Matcher, SeriesFilter};
pub use query::{CrossIndexSampleIterator, CrossIndexSeries, SeriesIterator};
pub use series::{ChunkKind, ChunkReference, Labels, Series};
pub use tsdb::Tsdb;
pub use xor::{Sample, SampleInfo, SampleIterator};
