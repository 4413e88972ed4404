//! One-shot compression between caller-owned slices
//!
//! No buffers are allocated: the caller's slices are wrapped as borrowed
//! [`CompressionBuffer`]s and the drive loop runs once to completion. A
//! destination that turns out too small is a sizing error on the caller's
//! side and is reported, not retried.

use super::buffer::CompressionBuffer;
use super::options::CodecOptions;
use super::stream_compress::StreamCompressor;
use crate::codec::{Codec, DecoderSession, EncoderSession, FlushOp, Status};
use crate::error::{CodecError, Result};

/// Compress all of `src` into `dst` as a complete stream
///
/// # Returns
/// Number of bytes written to `dst`
///
/// # Errors
/// [`CodecError::DestinationTooSmall`] if the stream does not fit; size `dst`
/// with [`max_compressed_len`] to rule that out.
pub fn compress_block(options: CodecOptions, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    let codec = options.codec;
    if codec == Codec::Lz4 {
        return lz4_compress(src, dst);
    }

    let capacity = dst.len();
    let mut session = EncoderSession::new(options)?;
    let mut input = CompressionBuffer::filled(src);
    let mut output = CompressionBuffer::empty(dst);

    match session.compress(&mut input, &mut output, FlushOp::Finish)? {
        Status::Done => Ok(output.size()),
        Status::DestinationTooSmall => {
            // The trailer may have landed exactly at the end of `dst`.
            let mut scratch = [0u8; 1];
            let mut spill = CompressionBuffer::empty(&mut scratch[..]);
            match session.compress(&mut input, &mut spill, FlushOp::Finish)? {
                Status::Done if spill.size() == 0 => Ok(output.size()),
                _ => Err(CodecError::DestinationTooSmall { codec, capacity }),
            }
        }
        Status::InvalidData => Err(failure(codec, session.last_error())),
        Status::NeedMoreData => Err(CodecError::invalid_data(
            codec,
            "encoder stopped before the stream was finished",
        )),
    }
}

/// Decompress the complete stream in `src` into `dst`
///
/// # Returns
/// Number of bytes written to `dst`
///
/// # Errors
/// [`CodecError::Truncated`] if `src` ends before the stream does,
/// [`CodecError::DestinationTooSmall`] if the plain data does not fit.
pub fn decompress_block(codec: Codec, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    if codec == Codec::Lz4 {
        return lz4_decompress(src, dst);
    }

    let capacity = dst.len();
    let mut session = DecoderSession::new(codec)?;
    let mut input = CompressionBuffer::filled(src);
    let mut output = CompressionBuffer::empty(dst);

    match session.decompress(&mut input, &mut output)? {
        Status::Done => Ok(output.size()),
        Status::DestinationTooSmall => {
            // The engine may only have the end-of-stream check left to do.
            let mut scratch = [0u8; 1];
            let mut spill = CompressionBuffer::empty(&mut scratch[..]);
            match session.decompress(&mut input, &mut spill)? {
                Status::Done if spill.size() == 0 => Ok(output.size()),
                Status::NeedMoreData if spill.size() == 0 => Err(CodecError::Truncated { codec }),
                Status::InvalidData => Err(failure(codec, session.last_error())),
                _ => Err(CodecError::DestinationTooSmall { codec, capacity }),
            }
        }
        Status::NeedMoreData => Err(CodecError::Truncated { codec }),
        Status::InvalidData => Err(failure(codec, session.last_error())),
    }
}

/// Worst-case compressed size of `input_len` bytes, where the codec defines one
///
/// `None` for codecs without a closed-form bound (xz, lzma) and for codecs
/// not compiled in.
pub fn max_compressed_len(codec: Codec, input_len: usize) -> Option<usize> {
    match codec {
        Codec::Brotli if cfg!(feature = "compression-brotli") => {
            if input_len == 0 {
                return Some(2);
            }
            let large_blocks = input_len >> 14;
            input_len.checked_add(2 + 4 * large_blocks + 3 + 1)
        }
        #[cfg(feature = "compression-zstd")]
        Codec::Zstd => Some(::zstd::zstd_safe::compress_bound(input_len)),
        Codec::Deflate | Codec::Zlib if cfg!(feature = "compression-flate") => input_len
            .checked_add((input_len >> 12) + (input_len >> 14) + (input_len >> 25) + 13),
        #[cfg(feature = "compression-lz4")]
        Codec::Lz4 => Some(crate::codec::lz4::max_compressed_len(input_len)),
        _ => None,
    }
}

/// Compress `src` into a freshly allocated vector
///
/// Sized from [`max_compressed_len`] when the codec has a bound; otherwise the
/// vector grows as the encoder produces output.
pub fn compress_to_vec(options: CodecOptions, src: &[u8]) -> Result<Vec<u8>> {
    if let Some(bound) = max_compressed_len(options.codec, src.len()) {
        let mut dst = vec![0u8; bound];
        let len = compress_block(options, src, &mut dst)?;
        dst.truncate(len);
        return Ok(dst);
    }

    let mut compressor = StreamCompressor::new(Vec::with_capacity(src.len() / 2 + 64), options)?;
    let mut rest = src;
    while !rest.is_empty() {
        let n = compressor.write_plain(rest)?;
        if n == 0 {
            return Err(CodecError::invalid_data(
                options.codec,
                "encoder stopped accepting input",
            ));
        }
        rest = &rest[n..];
    }
    compressor.finish()
}

fn failure(codec: Codec, detail: Option<&str>) -> CodecError {
    CodecError::invalid_data(codec, detail.unwrap_or("unknown failure"))
}

#[cfg(feature = "compression-lz4")]
fn lz4_compress(src: &[u8], dst: &mut [u8]) -> Result<usize> {
    crate::codec::lz4::compress_into(src, dst)
}

#[cfg(not(feature = "compression-lz4"))]
fn lz4_compress(_src: &[u8], _dst: &mut [u8]) -> Result<usize> {
    Err(CodecError::Unsupported(Codec::Lz4))
}

#[cfg(feature = "compression-lz4")]
fn lz4_decompress(src: &[u8], dst: &mut [u8]) -> Result<usize> {
    crate::codec::lz4::decompress_into(src, dst)
}

#[cfg(not(feature = "compression-lz4"))]
fn lz4_decompress(_src: &[u8], _dst: &mut [u8]) -> Result<usize> {
    Err(CodecError::Unsupported(Codec::Lz4))
}
