//! End-to-end decoder tests over hand-assembled FLAC streams.

mod common;

use common::*;
use flac_decode::{
    BitstreamErrorKind, BlockingStrategy, ChannelAssignment, DecoderConfig, FlacDecoder, FlacError,
};
use md5::{Digest, Md5};

/// A complete stream: marker, STREAMINFO, one frame.
fn single_frame_stream(
    block_size: u32,
    channels: u8,
    bits_per_sample: u8,
    md5: [u8; 16],
    frame_bytes: &[u8],
) -> Vec<u8> {
    let mut b = StreamBuilder::new();
    marker(&mut b);
    stream_info_block(
        &mut b,
        true,
        block_size as u16,
        44_100,
        channels,
        bits_per_sample,
        u64::from(block_size),
        md5,
    );
    b.push_bytes(frame_bytes);
    b.finish()
}

fn decoder_for(stream: Vec<u8>) -> FlacDecoder<flac_decode::IoByteSource<std::io::Cursor<Vec<u8>>>> {
    FlacDecoder::from_reader(std::io::Cursor::new(stream))
}

fn decoder_with_config(
    stream: Vec<u8>,
    config: DecoderConfig,
) -> FlacDecoder<flac_decode::IoByteSource<std::io::Cursor<Vec<u8>>>> {
    FlacDecoder::with_config(
        flac_decode::IoByteSource::new(std::io::Cursor::new(stream)),
        config,
    )
}

#[test]
fn test_constant_subframe_mono() {
    // One CONSTANT subframe, value 0x1234, block size 192, mono 16-bit.
    let frame = frame(
        |h| frame_header(h, 192, 9, 0, 4, 0),
        |s| constant_subframe(s, 0x1234, 16),
    );
    let stream = single_frame_stream(192, 1, 16, [0; 16], &frame);

    let mut decoder = decoder_for(stream);
    decoder.initialize().unwrap();
    assert!(decoder.decode_frame().unwrap());

    assert_eq!(decoder.samples(), vec![0x1234; 192].as_slice());
    let info = decoder.frame_info().unwrap();
    assert_eq!(info.block_size, 192);
    assert_eq!(info.sample_rate, 44_100);
    assert_eq!(info.bits_per_sample, 16);
    assert_eq!(info.blocking_strategy, BlockingStrategy::Fixed);
    assert_eq!(info.channel_assignment, ChannelAssignment::Independent(1));
    assert_eq!(decoder.sample_count(), 192);
    assert_eq!(decoder.frame_count(), 1);

    assert!(!decoder.decode_frame().unwrap());
}

#[test]
fn test_verbatim_two_channel_interleaving() {
    let frame = frame(
        |h| frame_header(h, 4, 9, 1, 4, 0),
        |s| {
            verbatim_subframe(s, &[1, -1, 2, -2], 16);
            verbatim_subframe(s, &[3, -3, 4, -4], 16);
        },
    );
    let stream = single_frame_stream(4, 2, 16, [0; 16], &frame);

    let mut decoder = decoder_for(stream);
    decoder.initialize().unwrap();
    assert!(decoder.decode_frame().unwrap());
    assert_eq!(decoder.samples(), &[1, 3, -1, -3, 2, 4, -2, -4]);
}

#[test]
fn test_fixed_order_two_extrapolation() {
    // Warm-up [10, 20], four zero residuals: coefficients (2, -1)
    // extrapolate the arithmetic progression.
    let frame = frame(
        |h| frame_header(h, 6, 9, 0, 4, 0),
        |s| {
            s.bits(0, 1); // pad
            s.bits(0b001010, 6); // fixed, order 2
            s.bits(0, 1); // no wasted bits
            s.signed(10, 16);
            s.signed(20, 16);
            s.bits(0, 2); // residual method 0
            s.bits(0, 4); // partition order 0
            s.bits(0, 4); // Rice parameter 0
            for _ in 0..4 {
                s.rice(0, 0);
            }
        },
    );
    let stream = single_frame_stream(6, 1, 16, [0; 16], &frame);

    let mut decoder = decoder_for(stream);
    decoder.initialize().unwrap();
    assert!(decoder.decode_frame().unwrap());
    assert_eq!(decoder.samples(), &[10, 20, 30, 40, 50, 60]);
}

#[test]
fn test_rice_escape_partition() {
    // Coding method 0, partition order 0, parameter 15 (escape), explicit
    // width 4, eight residuals as signed 4-bit values.
    let residuals = [0i64, 1, -1, 7, -8, 0, 0, 0];
    let frame = frame(
        |h| frame_header(h, 8, 9, 0, 4, 0),
        |s| {
            s.bits(0, 1);
            s.bits(0b001000, 6); // fixed, order 0
            s.bits(0, 1);
            s.bits(0, 2); // method 0
            s.bits(0, 4); // partition order 0
            s.bits(0b1111, 4); // escape
            s.bits(4, 5); // explicit width
            for &r in &residuals {
                s.signed(r, 4);
            }
        },
    );
    let stream = single_frame_stream(8, 1, 16, [0; 16], &frame);

    let mut decoder = decoder_for(stream);
    decoder.initialize().unwrap();
    assert!(decoder.decode_frame().unwrap());
    assert_eq!(decoder.samples(), residuals.as_slice());
}

#[test]
fn test_mid_side_reconstruction() {
    // mid [4, 4], side [2, 1]: the parity-preserving formula recovers
    // left [5, 5], right [3, 4].
    let frame = frame(
        |h| frame_header(h, 2, 9, 10, 4, 0),
        |s| {
            verbatim_subframe(s, &[4, 4], 16);
            verbatim_subframe(s, &[2, 1], 17); // side carries one extra bit
        },
    );
    let stream = single_frame_stream(2, 2, 16, [0; 16], &frame);

    let mut decoder = decoder_for(stream);
    decoder.initialize().unwrap();
    assert!(decoder.decode_frame().unwrap());
    assert_eq!(decoder.samples(), &[5, 3, 5, 4]);
}

#[test]
fn test_left_side_reconstruction() {
    // left [100, 50], side = left - right with right [90, 60].
    let frame = frame(
        |h| frame_header(h, 2, 9, 8, 4, 0),
        |s| {
            verbatim_subframe(s, &[100, 50], 16);
            verbatim_subframe(s, &[10, -10], 17);
        },
    );
    let stream = single_frame_stream(2, 2, 16, [0; 16], &frame);

    let mut decoder = decoder_for(stream);
    decoder.initialize().unwrap();
    assert!(decoder.decode_frame().unwrap());
    assert_eq!(decoder.samples(), &[100, 90, 50, 60]);
}

#[test]
fn test_right_side_reconstruction() {
    // side [10, -10], right [90, 60]: left = side + right.
    let frame = frame(
        |h| frame_header(h, 2, 9, 9, 4, 0),
        |s| {
            verbatim_subframe(s, &[10, -10], 17);
            verbatim_subframe(s, &[90, 60], 16);
        },
    );
    let stream = single_frame_stream(2, 2, 16, [0; 16], &frame);

    let mut decoder = decoder_for(stream);
    decoder.initialize().unwrap();
    assert!(decoder.decode_frame().unwrap());
    assert_eq!(decoder.samples(), &[100, 90, 50, 60]);
}

#[test]
fn test_metadata_skip_to_first_frame() {
    // STREAMINFO, a 17-byte PADDING block, then VORBIS_COMMENT; the byte
    // source must land exactly on the first frame.
    let frame = frame(
        |h| frame_header(h, 192, 9, 0, 4, 0),
        |s| constant_subframe(s, 0x1234, 16),
    );
    let mut b = StreamBuilder::new();
    marker(&mut b);
    stream_info_block(&mut b, false, 192, 44_100, 1, 16, 192, [0; 16]);
    padding_block(&mut b, false, 17);
    vorbis_comment_block(&mut b, true, "x", &["TITLE=Hello"]);
    b.push_bytes(&frame);
    let stream = b.finish();

    let mut decoder = decoder_for(stream);
    decoder.initialize().unwrap();

    let comment = decoder.vorbis_comment().unwrap();
    assert_eq!(comment.vendor_string, "x");
    assert_eq!(comment.get("TITLE"), Some("Hello"));
    assert_eq!(comment.get("title"), Some("Hello"));

    assert!(decoder.decode_frame().unwrap());
    assert_eq!(decoder.samples(), vec![0x1234; 192].as_slice());
}

#[test]
fn test_multiple_frames_and_counters() {
    let frame0 = frame(
        |h| frame_header(h, 192, 9, 0, 4, 0),
        |s| constant_subframe(s, 1, 16),
    );
    let frame1 = frame(
        |h| frame_header(h, 192, 9, 0, 4, 1),
        |s| constant_subframe(s, 2, 16),
    );

    let mut b = StreamBuilder::new();
    marker(&mut b);
    stream_info_block(&mut b, true, 192, 44_100, 1, 16, 384, [0; 16]);
    b.push_bytes(&frame0);
    b.push_bytes(&frame1);
    let stream = b.finish();

    let mut decoder = decoder_for(stream);
    decoder.initialize().unwrap();

    assert!(decoder.decode_frame().unwrap());
    assert_eq!(decoder.frame_info().unwrap().frame_or_sample_number, 0);
    assert_eq!(decoder.samples()[0], 1);

    assert!(decoder.decode_frame().unwrap());
    assert_eq!(decoder.frame_info().unwrap().frame_or_sample_number, 1);
    assert_eq!(decoder.samples()[0], 2);

    assert!(!decoder.decode_frame().unwrap());
    assert_eq!(decoder.sample_count(), 384);
    assert_eq!(decoder.frame_count(), 2);
}

#[test]
fn test_normalized_output() {
    let frame = frame(
        |h| frame_header(h, 192, 9, 0, 4, 0),
        |s| constant_subframe(s, 0x1234, 16),
    );
    let stream = single_frame_stream(192, 1, 16, [0; 16], &frame);

    let config = DecoderConfig {
        normalize_output_to_32bit: true,
        ..DecoderConfig::default()
    };
    let mut decoder = decoder_with_config(stream, config);
    decoder.initialize().unwrap();
    assert!(decoder.decode_frame().unwrap());
    assert_eq!(decoder.samples(), vec![0x1234 << 16; 192].as_slice());
}

#[test]
fn test_crc_verification_accepts_valid_frame() {
    let frame = frame(
        |h| frame_header(h, 192, 9, 0, 4, 0),
        |s| constant_subframe(s, 0x1234, 16),
    );
    let stream = single_frame_stream(192, 1, 16, [0; 16], &frame);

    let config = DecoderConfig {
        verify_crc: true,
        ..DecoderConfig::default()
    };
    let mut decoder = decoder_with_config(stream, config);
    decoder.initialize().unwrap();
    assert!(decoder.decode_frame().unwrap());
    assert!(!decoder.decode_frame().unwrap());
}

#[test]
fn test_crc16_mismatch_detected() {
    let frame = frame(
        |h| frame_header(h, 192, 9, 0, 4, 0),
        |s| constant_subframe(s, 0x1234, 16),
    );
    let mut stream = single_frame_stream(192, 1, 16, [0; 16], &frame);
    // Corrupt the CRC-16 trailer (the last byte of the stream).
    let last = stream.len() - 1;
    stream[last] ^= 0xFF;

    let config = DecoderConfig {
        verify_crc: true,
        ..DecoderConfig::default()
    };
    let mut decoder = decoder_with_config(stream.clone(), config);
    decoder.initialize().unwrap();
    assert!(matches!(
        decoder.decode_frame(),
        Err(FlacError::InvalidBitstream(BitstreamErrorKind::CrcMismatch { .. }))
    ));

    // Without verification the corrupt trailer is stored, not checked.
    let mut decoder = decoder_for(stream);
    decoder.initialize().unwrap();
    assert!(decoder.decode_frame().unwrap());
}

#[test]
fn test_md5_verification() {
    let frame = frame(
        |h| frame_header(h, 192, 9, 0, 4, 0),
        |s| constant_subframe(s, 0x1234, 16),
    );

    // FLAC hashes interleaved little-endian samples at ceil(bps/8) bytes.
    let mut audio = Vec::new();
    for _ in 0..192 {
        audio.extend_from_slice(&0x1234u16.to_le_bytes());
    }
    let digest: [u8; 16] = Md5::digest(&audio).into();

    let config = DecoderConfig {
        verify_md5: true,
        ..DecoderConfig::default()
    };

    let stream = single_frame_stream(192, 1, 16, digest, &frame);
    let mut decoder = decoder_with_config(stream, config.clone());
    decoder.initialize().unwrap();
    assert!(decoder.decode_frame().unwrap());
    assert!(!decoder.decode_frame().unwrap());

    // A wrong signature is reported at end of stream.
    let mut wrong = digest;
    wrong[0] ^= 0xFF;
    let stream = single_frame_stream(192, 1, 16, wrong, &frame);
    let mut decoder = decoder_with_config(stream, config);
    decoder.initialize().unwrap();
    assert!(decoder.decode_frame().unwrap());
    assert!(matches!(
        decoder.decode_frame(),
        Err(FlacError::InvalidBitstream(BitstreamErrorKind::Md5Mismatch))
    ));
}

#[test]
fn test_truncated_frame() {
    let frame = frame(
        |h| frame_header(h, 192, 9, 0, 4, 0),
        |s| constant_subframe(s, 0x1234, 16),
    );
    let mut stream = single_frame_stream(192, 1, 16, [0; 16], &frame);
    stream.truncate(stream.len() - 6);

    let mut decoder = decoder_for(stream);
    decoder.initialize().unwrap();
    assert!(matches!(
        decoder.decode_frame(),
        Err(FlacError::UnexpectedEof)
    ));
}

#[test]
fn test_sync_mismatch() {
    let mut b = StreamBuilder::new();
    marker(&mut b);
    stream_info_block(&mut b, true, 192, 44_100, 1, 16, 0, [0; 16]);
    b.push_bytes(&[0x00, 0x00, 0x00, 0x00]);
    let stream = b.finish();

    let mut decoder = decoder_for(stream);
    decoder.initialize().unwrap();
    assert!(matches!(
        decoder.decode_frame(),
        Err(FlacError::InvalidBitstream(BitstreamErrorKind::SyncMismatch))
    ));
}

#[test]
fn test_frame_bits_per_sample_from_stream_info() {
    // Sample size code 0 defers to STREAMINFO.
    let frame = frame(
        |h| frame_header(h, 192, 9, 0, 0, 0),
        |s| constant_subframe(s, -7, 12),
    );
    let stream = {
        let mut b = StreamBuilder::new();
        marker(&mut b);
        stream_info_block(&mut b, true, 192, 44_100, 1, 12, 192, [0; 16]);
        b.push_bytes(&frame);
        b.finish()
    };

    let mut decoder = decoder_for(stream);
    decoder.initialize().unwrap();
    assert!(decoder.decode_frame().unwrap());
    assert_eq!(decoder.frame_info().unwrap().bits_per_sample, 12);
    assert_eq!(decoder.samples(), vec![-7; 192].as_slice());
}

#[test]
fn test_buffer_length_matches_frame_shape() {
    for (channels, channel_code, block_size) in [(1u8, 0u8, 16u32), (2, 1, 8), (4, 3, 4)] {
        let frame = frame(
            |h| frame_header(h, block_size, 9, channel_code, 4, 0),
            |s| {
                for ch in 0..channels {
                    constant_subframe(s, i64::from(ch), 16);
                }
            },
        );
        let stream = {
            let mut b = StreamBuilder::new();
            marker(&mut b);
            stream_info_block(
                &mut b,
                true,
                block_size as u16,
                44_100,
                channels,
                16,
                u64::from(block_size),
                [0; 16],
            );
            b.push_bytes(&frame);
            b.finish()
        };

        let mut decoder = decoder_for(stream);
        decoder.initialize().unwrap();
        assert!(decoder.decode_frame().unwrap());
        assert_eq!(
            decoder.samples().len(),
            channels as usize * block_size as usize
        );
    }
}
