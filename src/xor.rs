use std::sync::Arc;

use crate::errors::{Result, TsdbError};
use crate::resource::Resource;
use crate::varbit_ts::{min_timestamp_bits, read_varbit_ts};
use crate::varbit_xor::read_varbit_xor;
use crate::varint::{read_uvarint, read_varint};
use crate::NomBitInput;

pub use crate::encoder::xor_encoder::write_xor_samples;

/// One timestamped value. Timestamps are milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

/// Decoder metadata attached to each sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleMeta {
    /// Bits consumed by this sample's timestamp field.
    pub timestamp_bit_width: u16,
    /// Bits consumed by this sample's value field.
    pub value_bit_width: u16,
    /// Smallest width from `{1, 2, 14, 17, 20, 64}` that could have held
    /// this sample's timestamp delta-of-delta. The first two samples of a
    /// chunk carry no delta-of-delta and report `None`.
    pub min_timestamp_bit_width: Option<u16>,
}

/// A [`Sample`] plus how many bits it took on disk.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleInfo {
    pub sample: Sample,
    pub meta: SampleMeta,
}

impl SampleInfo {
    pub fn timestamp(&self) -> i64 {
        self.sample.timestamp
    }

    pub fn value(&self) -> f64 {
        self.sample.value
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DecodeState {
    timestamp: i64,
    timestamp_delta: i64,
    value: f64,
    leading_bits_count: u8,
    trailing_bits_count: u8,
}

#[inline]
fn bits_remaining(input: NomBitInput) -> usize {
    input.0.len() * 8 - input.1
}

/// Lazy, single-pass iterator over the samples of one chunk.
///
/// Holds its own decode state (previous timestamp, delta, value, and XOR
/// window) and a shared handle on the resource backing the chunk bytes, so
/// it remains valid for as long as it lives regardless of what happens to
/// the originating view.
///
/// Yields `Result` items: a decode failure is reported once and the
/// iterator fuses.
#[derive(Debug, Clone)]
pub struct SampleIterator {
    resource: Arc<Resource>,
    data_start: usize,
    data_end: usize,
    sample_count: usize,
    raw: bool,
    index: usize,
    bit_pos: usize,
    state: DecodeState,
    failed: bool,
}

impl SampleIterator {
    pub(crate) fn new(
        resource: Arc<Resource>,
        data_start: usize,
        data_end: usize,
        sample_count: usize,
        raw: bool,
    ) -> Self {
        Self {
            resource,
            data_start,
            data_end,
            sample_count,
            raw,
            index: 0,
            bit_pos: 0,
            state: DecodeState::default(),
            failed: false,
        }
    }

    /// Iterate a standalone chunk body: the `u16` sample count followed by
    /// the encoded stream, with no segment framing around it.
    pub fn over_chunk_body(body: Vec<u8>) -> Result<SampleIterator> {
        if body.len() < 2 {
            return Err(TsdbError::Eof {
                context: "reading a chunk sample count",
                wanted: 2,
                remaining: body.len(),
            });
        }
        let sample_count = u16::from_be_bytes(body[..2].try_into().unwrap()) as usize;
        let data_end = body.len();
        Ok(SampleIterator::new(
            Arc::new(Resource::from_vec(body)),
            2,
            data_end,
            sample_count,
            false,
        ))
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    fn decode_next(&mut self) -> Result<SampleInfo> {
        let bytes = &self.resource.bytes()[self.data_start..self.data_end];

        if self.raw {
            let offset = self.index * 16;
            if offset + 16 > bytes.len() {
                return Err(TsdbError::Eof {
                    context: "reading a raw chunk sample",
                    wanted: 16,
                    remaining: bytes.len().saturating_sub(offset),
                });
            }
            let timestamp = i64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap());
            let value =
                f64::from_bits(u64::from_le_bytes(bytes[offset + 8..offset + 16].try_into().unwrap()));
            return Ok(SampleInfo {
                sample: Sample { timestamp, value },
                meta: SampleMeta {
                    timestamp_bit_width: 64,
                    value_bit_width: 64,
                    min_timestamp_bit_width: None,
                },
            });
        }

        let total_bits = bytes.len() * 8;

        let meta;
        match self.index {
            0 => {
                let (rest, timestamp) = read_varint(bytes)?;
                let timestamp_bit_width = ((bytes.len() - rest.len()) * 8) as u16;
                if rest.len() < 8 {
                    return Err(TsdbError::Eof {
                        context: "reading the first sample value",
                        wanted: 8,
                        remaining: rest.len(),
                    });
                }
                let value = f64::from_bits(u64::from_be_bytes(rest[..8].try_into().unwrap()));

                self.bit_pos = (bytes.len() - rest.len() + 8) * 8;
                self.state.timestamp = timestamp;
                self.state.value = value;
                meta = SampleMeta {
                    timestamp_bit_width,
                    value_bit_width: 64,
                    min_timestamp_bit_width: None,
                };
            }
            1 => {
                // the timestamp delta is a byte-aligned uvarint, everything
                // after it is a bit stream
                let byte_input = &bytes[self.bit_pos / 8..];
                let (rest, delta) = read_uvarint(byte_input)?;
                let timestamp_bit_width = ((byte_input.len() - rest.len()) * 8) as u16;
                self.state.timestamp_delta = i64::try_from(delta).map_err(|_| {
                    TsdbError::InvalidChunk(format!("timestamp delta {} overflows i64", delta))
                })?;
                self.state.timestamp += self.state.timestamp_delta;

                let bit_input: NomBitInput = (rest, 0);
                let before = bits_remaining(bit_input);
                let (after, (value, leading, trailing)) = read_varbit_xor(
                    self.state.value,
                    self.state.leading_bits_count,
                    self.state.trailing_bits_count,
                )(bit_input)?;
                let value_bit_width = (before - bits_remaining(after)) as u16;

                self.bit_pos = total_bits - bits_remaining(after);
                self.state.value = value;
                self.state.leading_bits_count = leading;
                self.state.trailing_bits_count = trailing;
                meta = SampleMeta {
                    timestamp_bit_width,
                    value_bit_width,
                    min_timestamp_bit_width: None,
                };
            }
            _ => {
                let bit_input: NomBitInput = (&bytes[self.bit_pos / 8..], self.bit_pos % 8);

                let before = bits_remaining(bit_input);
                let (after_ts, dod) = read_varbit_ts(bit_input)?;
                let timestamp_bit_width = (before - bits_remaining(after_ts)) as u16;
                self.state.timestamp_delta += dod;
                self.state.timestamp += self.state.timestamp_delta;

                let before_value = bits_remaining(after_ts);
                let (after, (value, leading, trailing)) = read_varbit_xor(
                    self.state.value,
                    self.state.leading_bits_count,
                    self.state.trailing_bits_count,
                )(after_ts)?;
                let value_bit_width = (before_value - bits_remaining(after)) as u16;

                self.bit_pos = total_bits - bits_remaining(after);
                self.state.value = value;
                self.state.leading_bits_count = leading;
                self.state.trailing_bits_count = trailing;
                meta = SampleMeta {
                    timestamp_bit_width,
                    value_bit_width,
                    min_timestamp_bit_width: Some(min_timestamp_bits(dod)),
                };
            }
        }

        Ok(SampleInfo {
            sample: Sample {
                timestamp: self.state.timestamp,
                value: self.state.value,
            },
            meta,
        })
    }
}

impl Iterator for SampleIterator {
    type Item = Result<SampleInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.index >= self.sample_count {
            return None;
        }
        let result = self.decode_next();
        match result {
            Ok(_) => self.index += 1,
            Err(_) => self.failed = true,
        }
        Some(result)
    }
}
