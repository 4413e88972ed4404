//! LZ4 block engine backed by `lz4_flex`
//!
//! The block format carries no framing, so a decoder cannot tell "need more
//! input" from "corrupt". LZ4 is therefore one-shot only and has no streaming
//! factory in the registry.

use lz4_flex::block;

use super::{Codec, CodecVersion};
use crate::error::{CodecError, Result};

pub const VERSION: CodecVersion = CodecVersion {
    codec: Codec::Lz4,
    library: "lz4_flex",
    version: "0.11",
};

/// Worst-case compressed size of `input_len` bytes
pub fn max_compressed_len(input_len: usize) -> usize {
    block::get_maximum_output_size(input_len)
}

/// Compress `src` into `dst`, returning the number of bytes written
pub fn compress_into(src: &[u8], dst: &mut [u8]) -> Result<usize> {
    block::compress_into(src, dst).map_err(|_| CodecError::DestinationTooSmall {
        codec: Codec::Lz4,
        capacity: dst.len(),
    })
}

/// Decompress the block in `src` into `dst`, returning the number of bytes written
///
/// A block whose output does not fit `dst` is indistinguishable from a corrupt
/// one; both surface as [`CodecError::InvalidData`].
pub fn decompress_into(src: &[u8], dst: &mut [u8]) -> Result<usize> {
    block::decompress_into(src, dst)
        .map_err(|e| CodecError::invalid_data(Codec::Lz4, e.to_string()))
}
