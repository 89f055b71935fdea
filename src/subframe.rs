//! Subframe decoding: prediction types, Rice residuals, linear prediction.
//!
//! Each channel of a frame is coded as one subframe. The subframe header
//! selects constant, verbatim, fixed-predictor or LPC coding; predictive
//! subframes carry warm-up samples followed by Rice-coded residual
//! partitions.

use crate::bitstream::{BitReader, ByteSource};
use crate::error::{BitstreamErrorKind, FlacError, Result};
use crate::frame::reserved_bit;
use crate::{DecoderConfig, SubframeType};

/// Decode one subframe into `block_size` samples at an effective width of
/// `bits_per_sample` (already adjusted for side channels).
pub(crate) fn decode_subframe<S: ByteSource>(
    reader: &mut BitReader<S>,
    block_size: usize,
    bits_per_sample: u8,
    config: &DecoderConfig,
) -> Result<Vec<i64>> {
    reserved_bit(reader, config, "subframe header")?;

    let type_code = reader.read_unsigned(6)? as u8;
    let subframe_type = match type_code {
        0 => SubframeType::Constant,
        1 => SubframeType::Verbatim,
        8..=12 => SubframeType::Fixed(type_code & 0x07),
        32..=63 => SubframeType::Lpc((type_code & 0x1F) + 1),
        _ => {
            return Err(FlacError::InvalidBitstream(
                BitstreamErrorKind::ReservedSubframeType,
            ))
        }
    };

    let wasted_bits = if reader.read_unsigned(1)? == 1 {
        let k = reader.read_unary()? + 1;
        if k >= u64::from(bits_per_sample) {
            return Err(FlacError::InvalidBitstream(
                BitstreamErrorKind::InvalidWastedBits,
            ));
        }
        k as u32
    } else {
        0
    };
    let width = u32::from(bits_per_sample) - wasted_bits;

    let mut samples = match subframe_type {
        SubframeType::Constant => {
            let value = reader.read_signed(width)?;
            vec![value; block_size]
        }
        SubframeType::Verbatim => {
            let mut samples = Vec::with_capacity(block_size);
            for _ in 0..block_size {
                samples.push(reader.read_signed(width)?);
            }
            samples
        }
        SubframeType::Fixed(order) => decode_fixed(reader, block_size, width, order)?,
        SubframeType::Lpc(order) => decode_lpc(reader, block_size, width, order)?,
    };

    if wasted_bits > 0 {
        for sample in &mut samples {
            *sample <<= wasted_bits;
        }
    }

    Ok(samples)
}

fn decode_fixed<S: ByteSource>(
    reader: &mut BitReader<S>,
    block_size: usize,
    width: u32,
    order: u8,
) -> Result<Vec<i64>> {
    let mut samples = Vec::with_capacity(block_size);
    for _ in 0..order {
        samples.push(reader.read_signed(width)?);
    }

    let residual = decode_residual(reader, block_size, order as usize)?;

    let coeffs: &[i64] = match order {
        0 => &[],
        1 => &[1],
        2 => &[2, -1],
        3 => &[3, -3, 1],
        4 => &[4, -6, 4, -1],
        _ => unreachable!("fixed order is at most 4"),
    };
    predict(&mut samples, &residual, coeffs, 0);

    Ok(samples)
}

fn decode_lpc<S: ByteSource>(
    reader: &mut BitReader<S>,
    block_size: usize,
    width: u32,
    order: u8,
) -> Result<Vec<i64>> {
    let mut samples = Vec::with_capacity(block_size);
    for _ in 0..order {
        samples.push(reader.read_signed(width)?);
    }

    let precision_code = reader.read_unsigned(4)? as u8;
    if precision_code == 0x0F {
        return Err(FlacError::InvalidBitstream(
            BitstreamErrorKind::ReservedQlpPrecision,
        ));
    }
    let precision = u32::from(precision_code) + 1;

    let shift = reader.read_signed(5)? as i32;

    let mut coeffs = Vec::with_capacity(order as usize);
    for _ in 0..order {
        coeffs.push(reader.read_signed(precision)?);
    }

    let residual = decode_residual(reader, block_size, order as usize)?;
    predict(&mut samples, &residual, &coeffs, shift);

    Ok(samples)
}

/// Extend `samples` (seeded with the warm-up values) by one predicted
/// sample per residual. The prediction sum uses 64-bit arithmetic; a
/// negative quantization shift applies a left shift.
fn predict(samples: &mut Vec<i64>, residual: &[i64], coeffs: &[i64], shift: i32) {
    for &res in residual {
        let mut sum = 0i64;
        for (j, &coeff) in coeffs.iter().enumerate() {
            sum += coeff * samples[samples.len() - 1 - j];
        }
        let predicted = if shift >= 0 { sum >> shift } else { sum << -shift };
        samples.push(res + predicted);
    }
}

/// Decode the residual section: coding method, partition order, then
/// `2^order` Rice-coded (or escape-coded) partitions. The first partition
/// is short by `predictor_order` samples, which the warm-up values cover.
fn decode_residual<S: ByteSource>(
    reader: &mut BitReader<S>,
    block_size: usize,
    predictor_order: usize,
) -> Result<Vec<i64>> {
    let method = reader.read_unsigned(2)?;
    let parameter_bits = match method {
        0 => 4,
        1 => 5,
        _ => {
            return Err(FlacError::InvalidBitstream(
                BitstreamErrorKind::ReservedResidualMethod,
            ))
        }
    };
    let escape = (1u64 << parameter_bits) - 1;

    let partition_order = reader.read_unsigned(4)? as u32;
    let partition_count = 1usize << partition_order;
    if block_size % partition_count != 0 {
        return Err(FlacError::InvalidBitstream(
            BitstreamErrorKind::InvalidPartitionOrder,
        ));
    }
    let partition_size = block_size >> partition_order;

    let mut residual = Vec::with_capacity(block_size - predictor_order.min(block_size));
    for partition in 0..partition_count {
        let count = if partition == 0 {
            partition_size.checked_sub(predictor_order).ok_or(
                FlacError::InvalidBitstream(BitstreamErrorKind::InvalidPartitionOrder),
            )?
        } else {
            partition_size
        };

        let parameter = reader.read_unsigned(parameter_bits)?;
        if parameter == escape {
            let raw_width = reader.read_unsigned(5)? as u32;
            for _ in 0..count {
                residual.push(reader.read_signed(raw_width)?);
            }
        } else {
            for _ in 0..count {
                residual.push(reader.read_rice(parameter as u32)?);
            }
        }
    }

    Ok(residual)
}
