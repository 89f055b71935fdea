//! Stream marker and metadata block parsing.
//!
//! A FLAC stream opens with the `fLaC` marker followed by a chain of
//! metadata blocks. STREAMINFO must come first and is the only mandatory
//! block; VORBIS_COMMENT is parsed, everything else is skipped.

use log::{debug, trace, warn};

use crate::bitstream::{BitReader, ByteSource};
use crate::error::{FlacError, Result};
use crate::{MetadataBlockType, StreamInfo, VorbisComment, FLAC_MARKER, STREAMINFO_LENGTH};

/// Verify the 32-bit `fLaC` marker at the start of the stream.
pub(crate) fn check_marker<S: ByteSource>(reader: &mut BitReader<S>) -> Result<()> {
    if reader.read_unsigned(32)? as u32 != FLAC_MARKER {
        return Err(FlacError::NotFlac);
    }
    Ok(())
}

/// Walk the metadata block chain. Returns the mandatory stream info and
/// the Vorbis comment if one was present. The reader is left positioned
/// at the first audio frame.
pub(crate) fn read_metadata<S: ByteSource>(
    reader: &mut BitReader<S>,
    strict: bool,
) -> Result<(StreamInfo, Option<VorbisComment>)> {
    let mut stream_info: Option<StreamInfo> = None;
    let mut vorbis_comment: Option<VorbisComment> = None;
    let mut is_first = true;

    loop {
        let is_last = reader.read_unsigned(1)? == 1;
        let block_type = MetadataBlockType::from(reader.read_unsigned(7)? as u8);
        let length = reader.read_unsigned(24)? as u32;

        if is_first && block_type != MetadataBlockType::StreamInfo {
            return Err(FlacError::MalformedMetadata(
                "first metadata block is not STREAMINFO".into(),
            ));
        }
        is_first = false;

        match block_type {
            MetadataBlockType::StreamInfo => {
                if length != STREAMINFO_LENGTH {
                    return Err(FlacError::MalformedMetadata(format!(
                        "STREAMINFO block has length {length}, expected {STREAMINFO_LENGTH}"
                    )));
                }
                let data = read_block_data(reader, length)?;
                let info = parse_stream_info(&data)?;
                debug!(
                    "stream info: {} Hz, {} channels, {} bits, {} total samples",
                    info.sample_rate, info.channels, info.bits_per_sample, info.total_samples
                );
                stream_info = Some(info);
            }
            MetadataBlockType::VorbisComment => {
                let data = read_block_data(reader, length)?;
                let comment = parse_vorbis_comment(&data)?;
                trace!(
                    "vorbis comment: vendor {:?}, {} comments",
                    comment.vendor_string,
                    comment.user_comments.len()
                );
                vorbis_comment = Some(comment);
            }
            MetadataBlockType::Invalid => {
                if strict {
                    return Err(FlacError::MalformedMetadata(
                        "invalid metadata block type 127".into(),
                    ));
                }
                warn!("skipping invalid metadata block type 127 ({length} bytes)");
                reader.skip_bytes(u64::from(length))?;
            }
            other => {
                trace!("skipping metadata block {other:?} ({length} bytes)");
                reader.skip_bytes(u64::from(length))?;
            }
        }

        if is_last {
            break;
        }
    }

    match stream_info {
        Some(info) => Ok((info, vorbis_comment)),
        None => Err(FlacError::MalformedMetadata(
            "stream has no STREAMINFO block".into(),
        )),
    }
}

fn read_block_data<S: ByteSource>(reader: &mut BitReader<S>, length: u32) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(length as usize);
    for _ in 0..length {
        data.push(reader.read_byte()?);
    }
    Ok(data)
}

fn parse_stream_info(data: &[u8]) -> Result<StreamInfo> {
    debug_assert_eq!(data.len(), STREAMINFO_LENGTH as usize);

    let min_block_size = u16::from_be_bytes([data[0], data[1]]);
    let max_block_size = u16::from_be_bytes([data[2], data[3]]);
    let min_frame_size = u32::from_be_bytes([0, data[4], data[5], data[6]]);
    let max_frame_size = u32::from_be_bytes([0, data[7], data[8], data[9]]);

    // Sample rate: 20 bits.
    let sample_rate =
        (u32::from(data[10]) << 12) | (u32::from(data[11]) << 4) | (u32::from(data[12]) >> 4);

    // Channels: 3 bits, stored as channels - 1.
    let channels = ((data[12] >> 1) & 0x07) + 1;

    // Bits per sample: 5 bits, stored as bits - 1.
    let bits_per_sample = (((data[12] & 0x01) << 4) | ((data[13] >> 4) & 0x0F)) + 1;

    // Total samples: 36 bits.
    let total_samples = (u64::from(data[13] & 0x0F) << 32)
        | (u64::from(data[14]) << 24)
        | (u64::from(data[15]) << 16)
        | (u64::from(data[16]) << 8)
        | u64::from(data[17]);

    let mut md5_signature = [0u8; 16];
    md5_signature.copy_from_slice(&data[18..34]);

    if min_block_size > max_block_size {
        return Err(FlacError::MalformedMetadata(format!(
            "min block size {min_block_size} exceeds max block size {max_block_size}"
        )));
    }
    if sample_rate == 0 {
        return Err(FlacError::MalformedMetadata("sample rate is zero".into()));
    }
    if !(4..=32).contains(&bits_per_sample) {
        return Err(FlacError::MalformedMetadata(format!(
            "bits per sample {bits_per_sample} outside 4..=32"
        )));
    }

    Ok(StreamInfo {
        min_block_size,
        max_block_size,
        min_frame_size,
        max_frame_size,
        sample_rate,
        channels,
        bits_per_sample,
        total_samples,
        md5_signature,
    })
}

fn parse_vorbis_comment(data: &[u8]) -> Result<VorbisComment> {
    let truncated = || FlacError::MalformedMetadata("truncated VORBIS_COMMENT block".into());

    let read_u32 = |pos: usize| -> Result<u32> {
        let bytes = data.get(pos..pos + 4).ok_or_else(truncated)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    };

    let mut pos = 0;

    let vendor_len = read_u32(pos)? as usize;
    pos += 4;
    let vendor = data.get(pos..pos + vendor_len).ok_or_else(truncated)?;
    let vendor_string = String::from_utf8_lossy(vendor).into_owned();
    pos += vendor_len;

    let comment_count = read_u32(pos)? as usize;
    pos += 4;

    let mut comment = VorbisComment {
        vendor_string,
        ..VorbisComment::default()
    };

    for _ in 0..comment_count {
        let comment_len = read_u32(pos)? as usize;
        pos += 4;
        let bytes = data.get(pos..pos + comment_len).ok_or_else(truncated)?;
        pos += comment_len;

        let text = String::from_utf8_lossy(bytes);
        // Comments without a separator are ignored; duplicate keys keep
        // the last value.
        if let Some(eq_pos) = text.find('=') {
            let key = text[..eq_pos].to_uppercase();
            let value = text[eq_pos + 1..].to_string();
            comment.user_comments.insert(key, value);
        }
    }

    Ok(comment)
}
