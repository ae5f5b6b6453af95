use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide error type.
///
/// Three families: end-of-input (tolerated only at the documented spots in
/// the WAL and head-chunk loaders), format violations (always fatal at the
/// site they are detected), and plain I/O.
#[derive(Error, Debug)]
pub enum TsdbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unexpected end of input while {context}: wanted {wanted} bytes, {remaining} left")]
    Eof {
        context: &'static str,
        wanted: usize,
        remaining: usize,
    },

    #[error("parsing error: {0}")]
    Parse(String),

    #[error("{context} has unknown encoding: {encoding}")]
    UnknownEncoding { context: &'static str, encoding: u8 },

    #[error("index references missing chunk file: {}", path.display())]
    MissingChunkFile { path: PathBuf },

    #[error("failed to read block metadata {}: {reason}", path.display())]
    Meta { path: PathBuf, reason: String },

    #[error("unexpected file name: {}", path.display())]
    InvalidFileName { path: PathBuf },

    #[error("WAL error: {0}")]
    Wal(String),

    #[error("invalid chunk data: {0}")]
    InvalidChunk(String),

    #[error("series at ref {reference} has no chunks")]
    SeriesWithoutChunks { reference: u64 },

    #[error("histogram bucket has invalid \"le\" label: {0:?}")]
    InvalidBucketBound(String),

    #[error("timestamps went backwards across a merge boundary: {previous} then {current}")]
    NonMonotonicTimestamps { previous: i64, current: i64 },
}

impl TsdbError {
    /// Whether this error is a (possibly tolerable) end-of-input.
    pub fn is_eof(&self) -> bool {
        matches!(self, TsdbError::Eof { .. })
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for TsdbError {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        match &err {
            nom::Err::Incomplete(_) => TsdbError::Eof {
                context: "decoding",
                wanted: 1,
                remaining: 0,
            },
            nom::Err::Error(e) | nom::Err::Failure(e)
                if e.code == nom::error::ErrorKind::Eof =>
            {
                TsdbError::Eof {
                    context: "decoding",
                    wanted: 1,
                    remaining: e.input.len(),
                }
            }
            _ => TsdbError::Parse(format!("nom error: {:?}", err)),
        }
    }
}

impl From<nom::Err<nom::error::Error<(&[u8], usize)>>> for TsdbError {
    fn from(err: nom::Err<nom::error::Error<(&[u8], usize)>>) -> Self {
        match &err {
            nom::Err::Incomplete(_) => TsdbError::Eof {
                context: "decoding a chunk bit stream",
                wanted: 1,
                remaining: 0,
            },
            nom::Err::Error(e) | nom::Err::Failure(e)
                if e.code == nom::error::ErrorKind::Eof =>
            {
                TsdbError::Eof {
                    context: "decoding a chunk bit stream",
                    wanted: 1,
                    remaining: e.input.0.len(),
                }
            }
            _ => TsdbError::Parse(format!("nom error: {:?}", err)),
        }
    }
}

pub type Result<T> = std::result::Result<T, TsdbError>;
