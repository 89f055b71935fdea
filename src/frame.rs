//! Frame header parsing.
//!
//! Every FLAC frame opens with a 14-bit sync pattern followed by coded
//! block size, sample rate, channel assignment and sample size fields, a
//! UTF-8-style frame or sample number, optional tail fields for the coded
//! values, and a CRC-8 over the header bytes.

use log::{trace, warn};

use crate::bitstream::{BitReader, ByteSource};
use crate::error::{BitstreamErrorKind, CrcKind, FlacError, Result};
use crate::{
    BlockingStrategy, ChannelAssignment, DecoderConfig, FrameInfo, StreamInfo, FRAME_SYNC_CODE,
};

/// Parse one frame header, leaving the reader positioned at the first
/// subframe. `crc_16` is zero until the facade reads the frame trailer.
pub(crate) fn read_frame_header<S: ByteSource>(
    reader: &mut BitReader<S>,
    stream_info: &StreamInfo,
    config: &DecoderConfig,
) -> Result<FrameInfo> {
    if reader.read_unsigned(14)? as u16 != FRAME_SYNC_CODE {
        return Err(FlacError::InvalidBitstream(BitstreamErrorKind::SyncMismatch));
    }
    reserved_bit(reader, config, "frame header")?;

    let blocking_strategy = if reader.read_unsigned(1)? == 1 {
        BlockingStrategy::Variable
    } else {
        BlockingStrategy::Fixed
    };

    let block_size_code = reader.read_unsigned(4)? as u8;
    let sample_rate_code = reader.read_unsigned(4)? as u8;

    let channel_assignment = match reader.read_unsigned(4)? as u8 {
        n @ 0..=7 => ChannelAssignment::Independent(n + 1),
        8 => ChannelAssignment::LeftSide,
        9 => ChannelAssignment::RightSide,
        10 => ChannelAssignment::MidSide,
        _ => {
            return Err(FlacError::InvalidBitstream(
                BitstreamErrorKind::ReservedChannelAssignment,
            ))
        }
    };

    let bits_per_sample = match reader.read_unsigned(3)? as u8 {
        0 => stream_info.bits_per_sample,
        1 => 8,
        2 => 12,
        3 => {
            return Err(FlacError::InvalidBitstream(
                BitstreamErrorKind::ReservedSampleSize,
            ))
        }
        4 => 16,
        5 => 20,
        6 => 24,
        7 => 32,
        _ => unreachable!(),
    };

    reserved_bit(reader, config, "frame header")?;

    let frame_or_sample_number = reader.read_utf8_coded()?;

    let block_size = decode_block_size(reader, block_size_code)?;
    let sample_rate = decode_sample_rate(reader, sample_rate_code, stream_info)?;

    let computed_crc8 = reader.crc8();
    let crc_8 = reader.read_unsigned(8)? as u8;
    if config.verify_crc && crc_8 != computed_crc8 {
        return Err(FlacError::InvalidBitstream(BitstreamErrorKind::CrcMismatch {
            kind: CrcKind::Crc8,
            expected: u16::from(crc_8),
            actual: u16::from(computed_crc8),
        }));
    }

    trace!(
        "frame {frame_or_sample_number}: {block_size} samples, {sample_rate} Hz, \
         {bits_per_sample} bits, {channel_assignment:?}"
    );

    Ok(FrameInfo {
        blocking_strategy,
        block_size,
        sample_rate,
        channel_assignment,
        bits_per_sample,
        frame_or_sample_number,
        crc_8,
        crc_16: 0,
    })
}

/// Check a reserved bit that must be zero.
pub(crate) fn reserved_bit<S: ByteSource>(
    reader: &mut BitReader<S>,
    config: &DecoderConfig,
    context: &str,
) -> Result<()> {
    if reader.read_unsigned(1)? != 0 {
        if config.strict_reserved {
            return Err(FlacError::InvalidBitstream(BitstreamErrorKind::ReservedBit));
        }
        warn!("reserved bit set in {context}; continuing");
    }
    Ok(())
}

fn decode_block_size<S: ByteSource>(reader: &mut BitReader<S>, code: u8) -> Result<u32> {
    match code {
        0b0000 => Err(FlacError::InvalidBitstream(
            BitstreamErrorKind::ReservedBlockSize,
        )),
        0b0001 => Ok(192),
        0b0010..=0b0101 => Ok(576 << (code - 2)),
        0b0110 => Ok(reader.read_unsigned(8)? as u32 + 1),
        0b0111 => Ok(reader.read_unsigned(16)? as u32 + 1),
        _ => Ok(256 << (code - 8)),
    }
}

fn decode_sample_rate<S: ByteSource>(
    reader: &mut BitReader<S>,
    code: u8,
    stream_info: &StreamInfo,
) -> Result<u32> {
    const SAMPLE_RATES: [u32; 11] = [
        88_200, 176_400, 192_000, 8_000, 16_000, 22_050, 24_000, 32_000, 44_100, 48_000, 96_000,
    ];
    match code {
        0b0000 => Ok(stream_info.sample_rate),
        0b0001..=0b1011 => Ok(SAMPLE_RATES[code as usize - 1]),
        0b1100 => Ok(reader.read_unsigned(8)? as u32 * 1000),
        0b1101 => Ok(reader.read_unsigned(16)? as u32),
        0b1110 => Ok(reader.read_unsigned(16)? as u32 * 10),
        _ => Err(FlacError::InvalidBitstream(
            BitstreamErrorKind::ReservedSampleRate,
        )),
    }
}
