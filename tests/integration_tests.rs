//! Integration tests for embeddenator-codec
//!
//! Tests end-to-end workflows through the blocking stream adapters, the
//! one-shot block adapter and the file helpers.

#![cfg(feature = "compression")]

use embeddenator_codec::*;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::io::{self, Cursor, Read, Write};
use tempfile::tempdir;

const WORDS: &[&str] = &[
    "stream", "buffer", "engine", "cursor", "window", "flush", "finish", "block", "adapter",
    "status", "the", "of", "and", "to", "data", "compress", "a", "is", "with", "output",
];

/// Word salad: compressible, but not trivially so
fn text_data(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(len + 16);
    while out.len() < len {
        out.extend_from_slice(WORDS[rng.gen_range(0..WORDS.len())].as_bytes());
        out.push(if rng.gen_bool(0.1) { b'\n' } else { b' ' });
    }
    out.truncate(len);
    out
}

fn random_data(len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}

fn streaming_codecs() -> Vec<Codec> {
    Codec::ALL
        .into_iter()
        .filter(|c| c.supports_streaming())
        .collect()
}

fn compress_with(codec: Codec, data: &[u8], buffer_size: usize, chunk: usize) -> Vec<u8> {
    let options = StreamOptions::default().with_buffer_size(buffer_size);
    let mut compressor =
        StreamCompressor::with_options(Vec::new(), CodecOptions::new(codec), options).unwrap();
    for piece in data.chunks(chunk.max(1)) {
        compressor.write_all(piece).unwrap();
    }
    compressor.finish().unwrap()
}

fn decompress_with(codec: Codec, compressed: &[u8], buffer_size: usize, chunk: usize) -> Vec<u8> {
    let options = StreamOptions::default().with_buffer_size(buffer_size);
    let mut decompressor =
        StreamDecompressor::with_options(compressed, CodecOptions::new(codec), options).unwrap();
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk.max(1)];
    loop {
        let n = decompressor.read(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    out
}

#[test]
fn test_roundtrip_all_codecs_all_sizes() {
    let buffer_size = SMALL_BUFFER_SIZE;
    let sizes = [0, 100, buffer_size, 3 * buffer_size + 17];

    for codec in streaming_codecs() {
        for &size in &sizes {
            let data = text_data(size, size as u64);
            let compressed = compress_with(codec, &data, buffer_size, buffer_size);
            let decompressed = decompress_with(codec, &compressed, buffer_size, buffer_size);
            assert_eq!(decompressed, data, "{codec} at {size} bytes");
        }
    }
}

#[test]
fn test_roundtrip_incompressible_data() {
    let data = random_data(50_000, 7);
    for codec in streaming_codecs() {
        let compressed = compress_with(codec, &data, DEFAULT_BUFFER_SIZE, 8192);
        let decompressed = decompress_with(codec, &compressed, DEFAULT_BUFFER_SIZE, 8192);
        assert_eq!(decompressed, data, "{codec}");
    }
}

#[test]
fn test_one_byte_buffers_and_chunks() {
    let data = text_data(1500, 11);
    for codec in streaming_codecs() {
        let compressed = compress_with(codec, &data, 1, 1);
        let decompressed = decompress_with(codec, &compressed, 1, 1);
        assert_eq!(decompressed, data, "{codec}");
    }
}

#[test]
fn test_chunking_does_not_change_content() {
    let data = text_data(20_000, 3);
    for codec in streaming_codecs() {
        let packed = compress_with(codec, &data, 4096, 4096);
        let reference = decompress_with(codec, &packed, 4096, 4096);
        let odd = decompress_with(codec, &compress_with(codec, &data, 333, 77), 97, 13);
        assert_eq!(reference, data);
        assert_eq!(odd, data, "{codec}");
    }
}

#[test]
fn test_brotli_quality_ordering() {
    let data = text_data(64 * 1024, 42);
    let mut sizes = Vec::new();

    for level in [CompressionLevel::Fast, CompressionLevel::Default, CompressionLevel::Best] {
        let mut compressor = StreamCompressor::brotli(Vec::new(), level).unwrap();
        compressor.write_all(&data).unwrap();
        let compressed = compressor.finish().unwrap();

        let mut decompressed = Vec::new();
        StreamDecompressor::brotli(&compressed[..])
            .unwrap()
            .read_to_end(&mut decompressed)
            .unwrap();
        assert_eq!(decompressed, data);
        sizes.push(compressed.len());
    }

    assert!(sizes[0] > sizes[1], "fast {} vs default {}", sizes[0], sizes[1]);
    assert!(sizes[1] > sizes[2], "default {} vs best {}", sizes[1], sizes[2]);
}

#[test]
fn test_concurrent_codecs() {
    use std::thread;

    let handles: Vec<_> = streaming_codecs()
        .into_iter()
        .enumerate()
        .map(|(i, codec)| {
            thread::spawn(move || {
                let data = text_data(100_000, i as u64);
                let compressed = compress_with(codec, &data, DEFAULT_BUFFER_SIZE, 10_000);
                let decompressed = decompress_with(codec, &compressed, SMALL_BUFFER_SIZE, 5000);
                assert_eq!(decompressed, data, "{codec}");
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_truncated_stream_is_unexpected_eof() {
    let data = text_data(10_000, 5);
    for codec in streaming_codecs() {
        let compressed = compress_with(codec, &data, DEFAULT_BUFFER_SIZE, 10_000);
        let cut = &compressed[..compressed.len() / 2];

        let mut decompressor = StreamDecompressor::new(cut, codec).unwrap();
        let mut out = Vec::new();
        let err = decompressor.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof, "{codec}");
    }
}

#[test]
fn test_empty_source_is_empty_stream() {
    for codec in streaming_codecs() {
        let mut decompressor = StreamDecompressor::new(io::empty(), codec).unwrap();
        let mut out = Vec::new();
        assert_eq!(decompressor.read_to_end(&mut out).unwrap(), 0);
        assert!(out.is_empty());
    }
}

#[test]
fn test_corrupt_stream_is_invalid_data() {
    let garbage = random_data(4096, 99);
    let mut decompressor = StreamDecompressor::zstd(&garbage[..]).unwrap();
    let mut out = Vec::new();
    let err = decompressor.read_to_end(&mut out).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);

    let inner = err.into_inner().unwrap().downcast::<CodecError>().unwrap();
    assert!(matches!(*inner, CodecError::InvalidData { codec: Codec::Zstd, .. }));
}

#[test]
fn test_trailing_bytes_after_stream_are_ignored() {
    let data = text_data(3000, 8);
    let mut compressed = compress_with(Codec::Brotli, &data, DEFAULT_BUFFER_SIZE, 3000);
    compressed.extend_from_slice(b"trailing junk");

    let mut decompressor = StreamDecompressor::brotli(&compressed[..]).unwrap();
    let mut out = Vec::new();
    decompressor.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
    assert!(decompressor.is_finished());
}

/// Reader that counts how often it is asked for data
struct CountingReader<R> {
    inner: R,
    calls: usize,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.calls += 1;
        self.inner.read(buf)
    }
}

#[test]
fn test_zero_length_read_uses_buffered_input() {
    let data = text_data(200_000, 21);
    let compressed = compress_with(Codec::Zstd, &data, DEFAULT_BUFFER_SIZE, 200_000);

    let source = CountingReader {
        inner: Cursor::new(compressed),
        calls: 0,
    };
    let mut decompressor = StreamDecompressor::new(source, Codec::Zstd).unwrap();

    // Nothing buffered yet: the empty read goes to the source.
    assert_eq!(decompressor.read(&mut []).unwrap(), 0);
    assert_eq!(decompressor.get_ref().calls, 1);

    let mut first = [0u8; 16];
    let n = decompressor.read(&mut first).unwrap();
    assert_eq!(&first[..n], &data[..n]);

    // Most of the compressed stream is still sitting in the input buffer.
    assert!(decompressor.has_buffered_input());
    let calls = decompressor.get_ref().calls;
    assert_eq!(decompressor.read(&mut []).unwrap(), 0);
    assert_eq!(decompressor.get_ref().calls, calls);
}

/// Reader that claims to have filled more than it was given
struct LyingReader;

impl Read for LyingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(buf.len() + 10)
    }
}

#[test]
fn test_source_overrun_is_rejected() {
    let mut decompressor = StreamDecompressor::new(LyingReader, Codec::Zlib).unwrap();
    let err = decompressor.read(&mut [0u8; 32]).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);

    let inner = err.into_inner().unwrap().downcast::<CodecError>().unwrap();
    assert!(matches!(*inner, CodecError::SourceOverrun { .. }));
}

#[test]
fn test_leave_open_returns_writer() {
    let data = text_data(5000, 13);

    let options = StreamOptions::default().leave_open(true);
    let mut compressor =
        StreamCompressor::with_options(Vec::new(), CodecOptions::new(Codec::Xz), options).unwrap();
    compressor.write_all(&data).unwrap();
    let sink = compressor.close().unwrap().expect("writer kept open");
    assert_eq!(decompress_with(Codec::Xz, &sink, 4096, 4096), data);

    let mut compressor = StreamCompressor::new(Vec::new(), CodecOptions::new(Codec::Xz)).unwrap();
    compressor.write_all(&data).unwrap();
    assert!(compressor.close().unwrap().is_none());
}

#[test]
fn test_decompressor_leave_open() {
    let compressed = compress_with(Codec::Zstd, b"abc", 64, 64);
    let options = StreamOptions::default().leave_open(true);
    let mut decompressor = StreamDecompressor::with_options(
        Cursor::new(compressed),
        CodecOptions::new(Codec::Zstd),
        options,
    )
    .unwrap();
    let mut out = Vec::new();
    decompressor.read_to_end(&mut out).unwrap();
    assert!(decompressor.close().is_some());
}

#[test]
fn test_misuse_after_complete_and_dispose() {
    let mut compressor = StreamCompressor::zstd(Vec::new(), CompressionLevel::Default).unwrap();
    compressor.write_all(b"some data").unwrap();
    compressor.complete().unwrap();
    assert_eq!(compressor.write(b"more").unwrap_err().kind(), io::ErrorKind::Other);
    // Flushing a completed stream only flushes the sink.
    compressor.flush().unwrap();

    compressor.dispose();
    compressor.dispose();
    assert!(compressor.get_ref().is_none());
    assert!(matches!(compressor.complete(), Err(CodecError::Disposed)));
    assert!(compressor.flush().is_err());
}

#[test]
fn test_complete_after_dispose_fails_even_when_open() {
    let options = StreamOptions::default().leave_open(true);
    let mut compressor =
        StreamCompressor::with_options(Vec::new(), CodecOptions::new(Codec::Brotli), options)
            .unwrap();
    compressor.write_all(b"kept around").unwrap();
    compressor.complete().unwrap();
    compressor.dispose();

    assert!(compressor.get_ref().is_some());
    assert!(matches!(compressor.complete(), Err(CodecError::Disposed)));
    assert!(matches!(compressor.close(), Err(CodecError::Disposed)));
}

#[test]
fn test_dispose_completes_stream_and_keeps_open_writer() {
    let options = StreamOptions::default().leave_open(true);
    let mut compressor =
        StreamCompressor::with_options(Vec::new(), CodecOptions::new(Codec::Deflate), options)
            .unwrap();
    compressor.write_all(b"disposed mid-stream").unwrap();
    compressor.dispose();

    let sink = compressor.get_ref().unwrap().clone();
    assert_eq!(decompress_with(Codec::Deflate, &sink, 64, 64), b"disposed mid-stream");
    assert!(compressor.write(b"x").is_err());
}

#[test]
fn test_lzma_alone_flush_only_flushes_sink() {
    let data = text_data(2000, 19);
    let mut compressor = StreamCompressor::new(Vec::new(), CodecOptions::new(Codec::Lzma)).unwrap();
    compressor.write_all(&data).unwrap();
    compressor.flush().unwrap();

    // At most the header is out; the flushed prefix carries none of the data.
    let prefix = compressor.get_ref().unwrap().clone();
    let mut out = Vec::new();
    let result = StreamDecompressor::new(&prefix[..], Codec::Lzma)
        .unwrap()
        .read_to_end(&mut out);
    assert!(result.is_err() || out.is_empty());

    let compressed = compressor.finish().unwrap();
    assert_eq!(decompress_with(Codec::Lzma, &compressed, 4096, 4096), data);
}

#[test]
fn test_totals_and_version() {
    let data = text_data(10_000, 17);
    let mut compressor = StreamCompressor::zlib(Vec::new(), CompressionLevel::Best).unwrap();
    compressor.write_all(&data).unwrap();
    compressor.complete().unwrap();

    assert_eq!(compressor.total_in(), data.len() as u64);
    assert_eq!(compressor.total_out(), compressor.get_ref().unwrap().len() as u64);
    assert_eq!(compressor.codec(), Codec::Zlib);
    assert_eq!(compressor.version().codec, Codec::Zlib);
}

#[test]
fn test_window_log_option() {
    let data = text_data(30_000, 23);
    let options = CodecOptions::new(Codec::Zstd).with_window_log(16);
    let mut compressor = StreamCompressor::new(Vec::new(), options).unwrap();
    compressor.write_all(&data).unwrap();
    let compressed = compressor.finish().unwrap();

    let mut decompressor =
        StreamDecompressor::with_options(&compressed[..], options, StreamOptions::default())
            .unwrap();
    let mut out = Vec::new();
    decompressor.read_to_end(&mut out).unwrap();
    assert_eq!(out, data);
}

#[test]
fn test_invalid_level_rejected_at_construction() {
    let options = CodecOptions::new(Codec::Deflate).with_level(CompressionLevel::Custom(42));
    assert!(matches!(
        StreamCompressor::new(Vec::new(), options),
        Err(CodecError::InvalidParameter { .. })
    ));
}

#[test]
fn test_block_only_codec_has_no_stream() {
    assert!(matches!(
        StreamCompressor::new(Vec::new(), CodecOptions::new(Codec::Lz4)),
        Err(CodecError::Unsupported(Codec::Lz4))
    ));
}

#[test]
fn test_stream_helpers() {
    let data = text_data(100_000, 31);
    for codec in streaming_codecs() {
        let mut compressed = Vec::new();
        let written = stream_compress(
            Cursor::new(&data),
            &mut compressed,
            CodecOptions::new(codec).with_level(CompressionLevel::Fast),
            SMALL_BUFFER_SIZE,
        )
        .unwrap();
        assert_eq!(written, compressed.len() as u64);

        let mut decompressed = Vec::new();
        let total = stream_decompress(&compressed[..], &mut decompressed, codec, SMALL_BUFFER_SIZE)
            .unwrap();
        assert_eq!(total, data.len() as u64);
        assert_eq!(decompressed, data);
    }
}

#[test]
fn test_file_helpers() {
    let dir = tempdir().unwrap();
    let plain_path = dir.path().join("input.txt");
    let packed_path = dir.path().join("input.txt.br");
    let restored_path = dir.path().join("restored.txt");

    let data = text_data(LARGE_BUFFER_SIZE + 123, 37);
    std::fs::File::create(&plain_path)
        .unwrap()
        .write_all(&data)
        .unwrap();

    let (plain_size, packed_size) =
        compress_file(&plain_path, &packed_path, CodecOptions::new(Codec::Brotli)).unwrap();
    assert_eq!(plain_size, data.len() as u64);
    assert!(packed_size < plain_size);

    let (read_size, restored_size) =
        decompress_file(&packed_path, &restored_path, Codec::Brotli).unwrap();
    assert_eq!(read_size, packed_size);
    assert_eq!(restored_size, plain_size);
    assert_eq!(std::fs::read(&restored_path).unwrap(), data);
}

#[test]
fn test_block_adapter_all_codecs() {
    let data = text_data(20_000, 41);
    for codec in Codec::ALL {
        let compressed = compress_to_vec(CodecOptions::new(codec), &data).unwrap();
        if let Some(bound) = max_compressed_len(codec, data.len()) {
            assert!(compressed.len() <= bound, "{codec}");
        }

        let mut plain = vec![0u8; data.len()];
        let n = decompress_block(codec, &compressed, &mut plain).unwrap();
        assert_eq!(n, data.len(), "{codec}");
        assert_eq!(plain, data, "{codec}");
    }
}

#[test]
fn test_block_output_readable_by_stream_adapter() {
    let data = text_data(9000, 43);
    let mut dst = vec![0u8; max_compressed_len(Codec::Brotli, data.len()).unwrap()];
    let n = compress_block(CodecOptions::new(Codec::Brotli), &data, &mut dst).unwrap();

    assert_eq!(decompress_with(Codec::Brotli, &dst[..n], 512, 512), data);
}

#[test]
fn test_block_destination_too_small_for_plain_data() {
    let data = text_data(5000, 47);
    let compressed = compress_to_vec(CodecOptions::new(Codec::Zstd), &data).unwrap();
    let mut plain = vec![0u8; 100];
    assert!(matches!(
        decompress_block(Codec::Zstd, &compressed, &mut plain),
        Err(CodecError::DestinationTooSmall { capacity: 100, .. })
    ));
}

#[test]
fn test_registry_reports_versions() {
    let registry = embeddenator_codec::codec::init();
    let versions: Vec<_> = registry.versions().collect();
    assert_eq!(versions.len(), streaming_codecs().len());
    for version in versions {
        assert!(!version.to_string().is_empty());
    }
}
