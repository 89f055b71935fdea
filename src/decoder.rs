//! The FLAC decoder facade.
//!
//! [`FlacDecoder`] owns the bit reader, the parsed metadata and the
//! interleaved output buffer. Decoding is pull-based and synchronous:
//! [`FlacDecoder::initialize`] consumes the stream marker and metadata
//! chain, then each [`FlacDecoder::decode_frame`] call consumes exactly one
//! frame and leaves the reader aligned at the start of the next.

use std::io::Read;

use log::debug;
use md5::{Digest, Md5};

use crate::bitstream::{BitReader, ByteSource, IoByteSource};
use crate::error::{BitstreamErrorKind, CrcKind, FlacError, Result};
use crate::{frame, metadata, subframe};
use crate::{ChannelAssignment, DecoderConfig, FrameInfo, StreamInfo, VorbisComment};

/// Pull-based FLAC stream decoder.
///
/// After a failed call the decoder is left in an unspecified (but safely
/// droppable) state; callers must not continue decoding on the same
/// instance.
pub struct FlacDecoder<S> {
    reader: BitReader<S>,
    config: DecoderConfig,
    stream_info: Option<StreamInfo>,
    vorbis_comment: Option<VorbisComment>,
    frame_info: Option<FrameInfo>,
    /// Interleaved samples of the most recent frame,
    /// `channels × block_size` entries.
    buffer: Vec<i64>,
    sample_count: u64,
    frame_count: u64,
    initialized: bool,
    md5: Option<Md5>,
}

impl<R: Read> FlacDecoder<IoByteSource<R>> {
    /// Create a decoder over any [`std::io::Read`] with the default
    /// configuration.
    pub fn from_reader(reader: R) -> Self {
        Self::new(IoByteSource::new(reader))
    }
}

impl<S: ByteSource> FlacDecoder<S> {
    /// Create a decoder over a byte source with the default configuration.
    pub fn new(source: S) -> Self {
        Self::with_config(source, DecoderConfig::default())
    }

    /// Create a decoder with an explicit configuration.
    pub fn with_config(source: S, config: DecoderConfig) -> Self {
        let md5 = config.verify_md5.then(Md5::new);
        Self {
            reader: BitReader::new(source),
            config,
            stream_info: None,
            vorbis_comment: None,
            frame_info: None,
            buffer: Vec::new(),
            sample_count: 0,
            frame_count: 0,
            initialized: false,
            md5,
        }
    }

    /// Parse the `fLaC` marker and the metadata block chain. Must be
    /// called exactly once, before the first [`Self::decode_frame`].
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Err(FlacError::InvalidArgument(
                "initialize called more than once".into(),
            ));
        }
        metadata::check_marker(&mut self.reader)?;
        let (stream_info, vorbis_comment) =
            metadata::read_metadata(&mut self.reader, self.config.strict_reserved)?;
        debug!(
            "initialized: {} Hz, {} channels, {} bits per sample",
            stream_info.sample_rate, stream_info.channels, stream_info.bits_per_sample
        );
        self.stream_info = Some(stream_info);
        self.vorbis_comment = vorbis_comment;
        self.initialized = true;
        Ok(())
    }

    /// Decode the next frame into the internal buffer.
    ///
    /// Returns `Ok(true)` after a full frame, or `Ok(false)` once the byte
    /// source is exhausted at a frame boundary (which is also when MD5
    /// verification, if enabled, runs).
    pub fn decode_frame(&mut self) -> Result<bool> {
        if !self.initialized {
            return Err(FlacError::InvalidArgument(
                "decode_frame called before initialize".into(),
            ));
        }
        if self.reader.eos()? {
            self.check_md5()?;
            return Ok(false);
        }

        let stream_info = self.stream_info.clone().ok_or_else(|| {
            FlacError::InvalidArgument("decode_frame called before initialize".into())
        })?;

        self.reader.reset_crc();
        let mut info = frame::read_frame_header(&mut self.reader, &stream_info, &self.config)?;

        let channels = info.channel_assignment.channel_count() as usize;
        let block_size = info.block_size as usize;

        let mut channel_samples = Vec::with_capacity(channels);
        for ch in 0..channels {
            let bps = subframe_width(info.channel_assignment, ch, info.bits_per_sample);
            channel_samples.push(subframe::decode_subframe(
                &mut self.reader,
                block_size,
                bps,
                &self.config,
            )?);
        }

        decorrelate(info.channel_assignment, &mut channel_samples);

        self.buffer.clear();
        self.buffer.reserve(channels * block_size);
        for i in 0..block_size {
            for channel in &channel_samples {
                self.buffer.push(channel[i]);
            }
        }

        self.reader.align_to_byte();
        let computed_crc16 = self.reader.crc16();
        info.crc_16 = self.reader.read_unsigned(16)? as u16;
        if self.config.verify_crc && info.crc_16 != computed_crc16 {
            return Err(FlacError::InvalidBitstream(BitstreamErrorKind::CrcMismatch {
                kind: CrcKind::Crc16,
                expected: info.crc_16,
                actual: computed_crc16,
            }));
        }

        self.sample_count += u64::from(info.block_size);
        self.frame_count += 1;

        if let Some(md5) = self.md5.as_mut() {
            md5.update(sample_bytes(&self.buffer, info.bits_per_sample));
        }

        if self.config.normalize_output_to_32bit {
            let shift = 32 - u32::from(info.bits_per_sample);
            for sample in &mut self.buffer {
                *sample <<= shift;
            }
        }

        self.frame_info = Some(info);
        Ok(true)
    }

    /// Compare the accumulated MD5 digest against the STREAMINFO
    /// signature. An all-zero signature means "unknown" and is skipped.
    fn check_md5(&mut self) -> Result<()> {
        let Some(md5) = self.md5.take() else {
            return Ok(());
        };
        let signature = self
            .stream_info
            .as_ref()
            .map(|info| info.md5_signature)
            .unwrap_or_default();
        if signature == [0u8; 16] {
            return Ok(());
        }
        let digest = md5.finalize();
        if digest[..] != signature {
            return Err(FlacError::InvalidBitstream(BitstreamErrorKind::Md5Mismatch));
        }
        Ok(())
    }

    /// Stream parameters, available after [`Self::initialize`].
    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.stream_info.as_ref()
    }

    /// Vorbis comment metadata, if the stream carried any.
    pub fn vorbis_comment(&self) -> Option<&VorbisComment> {
        self.vorbis_comment.as_ref()
    }

    /// Header fields of the most recently decoded frame.
    pub fn frame_info(&self) -> Option<&FrameInfo> {
        self.frame_info.as_ref()
    }

    /// Interleaved samples of the most recently decoded frame. The
    /// reference must not be held across the next
    /// [`Self::decode_frame`] call.
    pub fn samples(&self) -> &[i64] {
        &self.buffer
    }

    /// Samples per channel decoded so far.
    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    /// Frames decoded so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// The active configuration.
    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }
}

/// Width of channel `ch` in a frame: side channels carry one extra bit.
fn subframe_width(assignment: ChannelAssignment, ch: usize, bits_per_sample: u8) -> u8 {
    match assignment {
        ChannelAssignment::LeftSide | ChannelAssignment::MidSide if ch == 1 => bits_per_sample + 1,
        ChannelAssignment::RightSide if ch == 0 => bits_per_sample + 1,
        _ => bits_per_sample,
    }
}

/// Reconstruct left/right from the coded stereo representation.
fn decorrelate(assignment: ChannelAssignment, channels: &mut [Vec<i64>]) {
    match assignment {
        ChannelAssignment::LeftSide => {
            // Channel 0 is left, channel 1 is side = left - right.
            let (left, side) = channels.split_at_mut(1);
            for (l, s) in left[0].iter().zip(side[0].iter_mut()) {
                *s = *l - *s;
            }
        }
        ChannelAssignment::RightSide => {
            // Channel 0 is side, channel 1 is right.
            let (side, right) = channels.split_at_mut(1);
            for (s, r) in side[0].iter_mut().zip(right[0].iter()) {
                *s += *r;
            }
        }
        ChannelAssignment::MidSide => {
            // The low bit of side carries the parity lost when mid was
            // computed as (left + right) >> 1.
            let (mid, side) = channels.split_at_mut(1);
            for (m, s) in mid[0].iter_mut().zip(side[0].iter_mut()) {
                let mid_shifted = (*m << 1) | (*s & 1);
                *m = (mid_shifted + *s) >> 1;
                *s = (mid_shifted - *s) >> 1;
            }
        }
        ChannelAssignment::Independent(_) => {}
    }
}

/// Serialize interleaved samples the way the FLAC MD5 signature covers
/// them: little-endian, `ceil(bits / 8)` bytes per sample.
fn sample_bytes(samples: &[i64], bits_per_sample: u8) -> Vec<u8> {
    let width = usize::from(bits_per_sample).div_ceil(8);
    let mut bytes = Vec::with_capacity(samples.len() * width);
    for &sample in samples {
        let raw = sample as u64;
        for i in 0..width {
            bytes.push((raw >> (8 * i)) as u8);
        }
    }
    bytes
}
