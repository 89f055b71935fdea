//! # flac-decode
//!
//! A pure Rust FLAC (Free Lossless Audio Codec) stream decoder.
//!
//! ## Features
//!
//! - Full metadata parsing (STREAMINFO, VORBIS_COMMENT; other blocks skipped)
//! - All subframe types: constant, verbatim, fixed predictors, LPC
//! - Rice-coded residual partitions including escape-coded partitions
//! - Left/side, right/side and mid/side stereo decorrelation
//! - Optional CRC-8/CRC-16 and MD5 verification
//! - Pull-based decoding over any sequential byte source; no seeking needed
//!
//! ## Example
//!
//! ```no_run
//! use flac_decode::FlacDecoder;
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! let file = File::open("audio.flac").unwrap();
//! let mut decoder = FlacDecoder::from_reader(BufReader::new(file));
//! decoder.initialize().unwrap();
//! while decoder.decode_frame().unwrap() {
//!     // Interleaved samples for the frame just decoded.
//!     let _samples = decoder.samples();
//! }
//! ```

#![warn(missing_docs)]

pub mod bitstream;
pub mod crc;
pub mod decoder;
pub mod error;
mod frame;
mod metadata;
mod subframe;

pub use bitstream::{BitReader, ByteSource, IoByteSource};
pub use decoder::FlacDecoder;
pub use error::{BitstreamErrorKind, CrcKind, FlacError, Result};

use std::collections::HashMap;

/// The 32-bit `fLaC` stream marker.
pub const FLAC_MARKER: u32 = 0x664C_6143;

/// The 14-bit frame sync pattern `11111111111110`.
pub const FRAME_SYNC_CODE: u16 = 0x3FFE;

/// Fixed length of a STREAMINFO block body in bytes.
pub const STREAMINFO_LENGTH: u32 = 34;

/// Maximum number of audio channels.
pub const MAX_CHANNELS: u8 = 8;

/// Maximum LPC predictor order.
pub const MAX_LPC_ORDER: u8 = 32;

/// FLAC metadata block types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBlockType {
    /// Mandatory first block with stream parameters.
    StreamInfo,
    /// Padding bytes.
    Padding,
    /// Application-specific data.
    Application,
    /// Seek table.
    SeekTable,
    /// Vorbis-style tags.
    VorbisComment,
    /// CD cue sheet.
    CueSheet,
    /// Embedded picture.
    Picture,
    /// Reserved block types 7..=126.
    Reserved(u8),
    /// Block type 127 is forbidden by the format.
    Invalid,
}

impl From<u8> for MetadataBlockType {
    fn from(value: u8) -> Self {
        match value {
            0 => MetadataBlockType::StreamInfo,
            1 => MetadataBlockType::Padding,
            2 => MetadataBlockType::Application,
            3 => MetadataBlockType::SeekTable,
            4 => MetadataBlockType::VorbisComment,
            5 => MetadataBlockType::CueSheet,
            6 => MetadataBlockType::Picture,
            127 => MetadataBlockType::Invalid,
            n => MetadataBlockType::Reserved(n),
        }
    }
}

/// STREAMINFO metadata block. Populated once by
/// [`FlacDecoder::initialize`] and immutable thereafter.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Minimum block size in samples per channel.
    pub min_block_size: u16,
    /// Maximum block size in samples per channel.
    pub max_block_size: u16,
    /// Minimum frame size in bytes (0 = unknown).
    pub min_frame_size: u32,
    /// Maximum frame size in bytes (0 = unknown).
    pub max_frame_size: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of channels (1..=8).
    pub channels: u8,
    /// Bits per sample (4..=32); the fallback when a frame header defers
    /// to stream info.
    pub bits_per_sample: u8,
    /// Total samples per channel in the stream (0 = unknown).
    pub total_samples: u64,
    /// MD5 signature of the unencoded audio data.
    pub md5_signature: [u8; 16],
}

/// Vorbis comment (tag) metadata.
#[derive(Debug, Clone, Default)]
pub struct VorbisComment {
    /// Vendor string.
    pub vendor_string: String,
    /// Comments keyed case-insensitively; keys are stored uppercased and
    /// a duplicate key keeps the last value seen.
    pub user_comments: HashMap<String, String>,
}

impl VorbisComment {
    /// Look up a comment by case-insensitive key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.user_comments
            .get(&key.to_uppercase())
            .map(String::as_str)
    }
}

/// Whether frames are counted by frame number or by starting sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingStrategy {
    /// Fixed block size; the coded number is a frame number.
    Fixed,
    /// Variable block size; the coded number is a sample number.
    Variable,
}

/// How the two subframes of a stereo frame relate to left/right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAssignment {
    /// 1..=8 independently coded channels.
    Independent(u8),
    /// Channel 0 is left, channel 1 is side (left − right).
    LeftSide,
    /// Channel 0 is side, channel 1 is right.
    RightSide,
    /// Channel 0 is mid, channel 1 is side.
    MidSide,
}

impl ChannelAssignment {
    /// Number of subframes (channels) in the frame.
    pub fn channel_count(&self) -> u8 {
        match self {
            ChannelAssignment::Independent(n) => *n,
            _ => 2,
        }
    }
}

/// Subframe prediction types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubframeType {
    /// A single repeated value.
    Constant,
    /// Uncompressed samples.
    Verbatim,
    /// Fixed linear predictor of order 0..=4.
    Fixed(u8),
    /// Linear predictive coding of order 1..=32.
    Lpc(u8),
}

/// Per-frame header fields. Overwritten by each
/// [`FlacDecoder::decode_frame`] call.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    /// Blocking strategy of this frame.
    pub blocking_strategy: BlockingStrategy,
    /// Samples per channel in this frame.
    pub block_size: u32,
    /// Sample rate for this frame (may override stream info).
    pub sample_rate: u32,
    /// Channel assignment of this frame.
    pub channel_assignment: ChannelAssignment,
    /// Effective sample width for this frame.
    pub bits_per_sample: u8,
    /// Frame number (fixed strategy) or first sample number (variable).
    pub frame_or_sample_number: u64,
    /// CRC-8 stored in the frame header.
    pub crc_8: u8,
    /// CRC-16 stored in the frame trailer.
    pub crc_16: u16,
}

/// Decoder behavior switches.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// Left-justify each decoded sample in a 32-bit field
    /// (shift left by `32 − bits_per_sample`).
    pub normalize_output_to_32bit: bool,
    /// Accumulate decoded audio into an MD5 digest and compare it against
    /// the STREAMINFO signature when the stream ends.
    pub verify_md5: bool,
    /// Treat reserved bits and unknown metadata as fatal. When false they
    /// are logged and skipped where the bitstream allows it; reserved code
    /// values whose payload length is unknown stay fatal.
    pub strict_reserved: bool,
    /// Recompute and check the header CRC-8 and frame CRC-16.
    pub verify_crc: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            normalize_output_to_32bit: false,
            verify_md5: false,
            strict_reserved: true,
            verify_crc: false,
        }
    }
}
