use crate::crc32c::write_crc32c;
use crate::xor::Sample;

use super::uvarint_encoder::write_uvarint;
use super::xor_encoder::write_xor_samples;

/// XOR chunk encoding byte.
pub const XOR_ENCODING: u8 = 1;

/// Writes one chunk in the block segment framing:
/// `{uvarint len, encoding, body, crc32c}`.
///
/// Returns the number of bytes written, so callers laying out a segment
/// file can record chunk offsets.
pub fn write_block_chunk<W: std::io::Write>(
    samples: &[Sample],
    writer: &mut W,
) -> std::io::Result<usize> {
    let mut body: Vec<u8> = Vec::with_capacity(32);
    write_xor_samples(samples, &mut body)?;

    let mut written = 0;

    let mut header = Vec::with_capacity(11);
    write_uvarint(body.len() as u64, &mut header)?;
    header.push(XOR_ENCODING);
    writer.write_all(&header)?;
    written += header.len();

    writer.write_all(&body)?;
    written += body.len();

    // checksum covers the encoding byte and the body
    let mut checksummed = Vec::with_capacity(body.len() + 1);
    checksummed.push(XOR_ENCODING);
    checksummed.extend_from_slice(&body);
    write_crc32c(&checksummed, writer)?;
    written += 4;

    Ok(written)
}

/// Writes one chunk in the head-chunk file framing:
/// `{seriesRef, minTime, maxTime, encoding, uvarint len, body, crc32c}`.
pub fn write_head_chunk<W: std::io::Write>(
    series_ref: u64,
    samples: &[Sample],
    writer: &mut W,
) -> std::io::Result<usize> {
    let mut body: Vec<u8> = Vec::with_capacity(32);
    write_xor_samples(samples, &mut body)?;

    let min_time = samples.first().map(|s| s.timestamp).unwrap_or(0);
    let max_time = samples.last().map(|s| s.timestamp).unwrap_or(0);

    let mut header = Vec::with_capacity(36);
    header.extend_from_slice(&series_ref.to_be_bytes());
    header.extend_from_slice(&min_time.to_be_bytes());
    header.extend_from_slice(&max_time.to_be_bytes());
    header.push(XOR_ENCODING);
    write_uvarint(body.len() as u64, &mut header)?;
    writer.write_all(&header)?;

    writer.write_all(&body)?;

    let mut checksummed = Vec::with_capacity(body.len() + 1);
    checksummed.push(XOR_ENCODING);
    checksummed.extend_from_slice(&body);
    write_crc32c(&checksummed, writer)?;

    Ok(header.len() + body.len() + 4)
}
