use bitstream_io::{BigEndian, BitWrite, BitWriter};
use smallvec::SmallVec;

use crate::xor::Sample;

use super::{
    uvarint_encoder::write_uvarint,
    varbit_ts_encoder::write_varbit_ts,
    varbit_xor_encoder::{write_varbit_xor, NO_WINDOW},
    varint_encoder::write_varint,
};

fn write_first_sample<W: std::io::Write>(sample: &Sample, writer: &mut W) -> std::io::Result<()> {
    write_varint(sample.timestamp, writer)?;
    writer.write_all(&sample.value.to_bits().to_be_bytes())?;
    Ok(())
}

#[derive(Debug)]
struct WriteState {
    timestamp: i64,
    value: f64,
    leading_bits_count: u8,
    trailing_bits_count: u8,
    timestamp_delta: i64,
}

fn write_second_sample<W: BitWrite>(
    sample: &Sample,
    first: &Sample,
    writer: &mut W,
) -> std::io::Result<WriteState> {
    let timestamp_delta = sample.timestamp - first.timestamp;
    if timestamp_delta < 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "samples aren't sorted by timestamp ascending",
        ));
    }

    // uvarints are byte oriented; stage one on the stack and splice it
    // into the (still byte-aligned) bit stream
    let mut uvarint_bytes = SmallVec::<[u8; 10]>::new();
    write_uvarint(timestamp_delta as u64, &mut uvarint_bytes)?;
    writer.write_bytes(&uvarint_bytes)?;

    let (leading, trailing) =
        write_varbit_xor(sample.value, first.value, NO_WINDOW, 0, writer)?;

    Ok(WriteState {
        timestamp: sample.timestamp,
        value: sample.value,
        leading_bits_count: leading,
        trailing_bits_count: trailing,
        timestamp_delta,
    })
}

fn write_n_sample<W: BitWrite>(
    previous: &WriteState,
    sample: &Sample,
    writer: &mut W,
) -> std::io::Result<WriteState> {
    let timestamp_delta = sample.timestamp - previous.timestamp;
    if timestamp_delta < 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "samples aren't sorted by timestamp ascending",
        ));
    }
    let timestamp_delta_of_delta = timestamp_delta - previous.timestamp_delta;

    write_varbit_ts(timestamp_delta_of_delta, writer)?;

    let (leading, trailing) = write_varbit_xor(
        sample.value,
        previous.value,
        previous.leading_bits_count,
        previous.trailing_bits_count,
        writer,
    )?;

    Ok(WriteState {
        timestamp: sample.timestamp,
        value: sample.value,
        leading_bits_count: leading,
        trailing_bits_count: trailing,
        timestamp_delta,
    })
}

/// Writes a chunk body: the `u16` sample count followed by the
/// Gorilla-encoded sample stream, zero-padded to a byte boundary.
///
/// This is the byte run a block or head chunk frames with its length,
/// encoding byte, and checksum.
pub fn write_xor_samples<W: std::io::Write>(
    samples: &[Sample],
    writer: &mut W,
) -> std::io::Result<()> {
    let num_samples = u16::try_from(samples.len()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "too many samples for one chunk",
        )
    })?;
    writer.write_all(&num_samples.to_be_bytes())?;

    let Some(first_sample) = samples.first() else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "at least one sample is required",
        ));
    };
    write_first_sample(first_sample, writer)?;

    if samples.len() > 1 {
        let mut bit_writer = BitWriter::endian(writer, BigEndian);

        let mut state = write_second_sample(&samples[1], first_sample, &mut bit_writer)?;
        for sample in &samples[2..] {
            state = write_n_sample(&state, sample, &mut bit_writer)?;
        }

        bit_writer.byte_align()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_errors() {
        let mut buffer: Vec<u8> = Vec::new();

        // empty chunk
        assert!(write_xor_samples(&[], &mut buffer).is_err());

        // unsorted timestamps
        let unsorted = [
            Sample {
                timestamp: 10,
                value: 42.0,
            },
            Sample {
                timestamp: -10,
                value: 42.0,
            },
        ];
        assert!(write_xor_samples(&unsorted, &mut buffer).is_err());

        let unsorted_later = [
            Sample {
                timestamp: 9,
                value: 42.0,
            },
            Sample {
                timestamp: 10,
                value: 42.0,
            },
            Sample {
                timestamp: 9,
                value: 43.0,
            },
        ];
        assert!(write_xor_samples(&unsorted_later, &mut buffer).is_err());

        // one sample over the u16 limit
        let too_many: Vec<Sample> = (0..65536)
            .map(|i| Sample {
                timestamp: i as i64,
                value: i as f64,
            })
            .collect();
        assert!(write_xor_samples(&too_many, &mut buffer).is_err());
    }

    #[test]
    fn test_known_bytes() {
        // two-sample chunk with a known serialisation
        let mut buffer: Vec<u8> = Vec::new();
        write_xor_samples(
            &[
                Sample {
                    timestamp: 7200000,
                    value: 12000.0,
                },
                Sample {
                    timestamp: 7201000,
                    value: 12001.0,
                },
            ],
            &mut buffer,
        )
        .unwrap();

        assert_eq!(
            buffer,
            [
                0x00, 0x02, 0x80, 0xF4, 0xEE, 0x06, 0x40, 0xC7, 0x70, 0x00, 0x00, 0x00, 0x00,
                0x00, 0xE8, 0x07, 0xF0, 0x0C, 0x1F, 0xCE, 0x4F, 0xA7
            ]
        );
    }
}
