//! Engine boundary and drive loop
//!
//! Every compression engine wired into this crate is reduced to the same call
//! contract: hand it the unread part of a source buffer and the unwritten part
//! of a destination buffer, let it rewrite the remaining byte counts in place,
//! and classify the result. [`EncoderEngine`] and [`DecoderEngine`] describe
//! that contract; [`session`] runs the drive loop over it.
//!
//! # Features
//!
//! - `compression-brotli`: Brotli streaming engine
//! - `compression-zstd`: Zstandard streaming engine
//! - `compression-flate`: raw deflate and zlib streaming engines
//! - `compression-xz`: XZ (LZMA2) and legacy LZMA streaming engines
//! - `compression-lz4`: LZ4 block engine (one-shot only)

use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(feature = "compression-brotli")]
pub mod brotli;
#[cfg(feature = "compression-flate")]
pub mod flate;
#[cfg(feature = "compression-lz4")]
pub mod lz4;
#[cfg(feature = "compression-xz")]
pub mod lzma;
pub mod registry;
pub mod session;
#[cfg(feature = "compression-zstd")]
pub mod zstd;

pub use registry::{init, registry, EngineFactory, EngineRegistry};
pub use session::{DecoderSession, EncoderSession};

/// Compression algorithms known to the adapter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Brotli,
    Zstd,
    /// Raw deflate, no header or trailer
    Deflate,
    /// Deflate with the zlib header and adler32 trailer
    Zlib,
    /// LZMA2 inside the .xz container
    Xz,
    /// Legacy LZMA-alone (.lzma)
    ///
    /// The format has no sync flush: flushing a stream emits nothing, and
    /// buffered data only reaches the sink when the stream is completed.
    Lzma,
    /// LZ4 block format; one-shot only
    Lz4,
}

impl Codec {
    /// All codecs, in registry order
    pub const ALL: [Codec; 7] = [
        Codec::Brotli,
        Codec::Zstd,
        Codec::Deflate,
        Codec::Zlib,
        Codec::Xz,
        Codec::Lzma,
        Codec::Lz4,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Codec::Brotli => "brotli",
            Codec::Zstd => "zstd",
            Codec::Deflate => "deflate",
            Codec::Zlib => "zlib",
            Codec::Xz => "xz",
            Codec::Lzma => "lzma",
            Codec::Lz4 => "lz4",
        }
    }

    /// Whether this codec can drive the streaming adapters
    pub fn supports_streaming(self) -> bool {
        !matches!(self, Codec::Lz4)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one drive-loop invocation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// All available input was processed and nothing is pending for this operation
    Done,
    /// The destination filled up while the engine still had output to emit
    DestinationTooSmall,
    /// The decoder drained its source and needs more compressed bytes
    NeedMoreData,
    /// The engine reported corrupt input or an internal failure
    InvalidData,
}

/// What an encoder call should do with its input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushOp {
    /// Consume input; the engine may hold output back for better compression
    Process,
    /// Emit everything processable so far without ending the stream
    Flush,
    /// End the stream; no further input is accepted
    Finish,
}

/// Raw result of a single engine call, before drive-loop classification
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NativeCode {
    /// Progress was made (possibly zero bytes); consult the remaining counts
    Ok,
    /// The decoder consumed all input and wants more
    NeedsMoreInput,
    /// The engine has output it could not fit in the destination
    NeedsMoreOutput,
    /// The stream reached its terminal state
    StreamEnd,
    /// Hard failure with an engine-supplied description
    Error(String),
}

/// Tunable engine parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineParameter {
    /// Codec-native quality or preset value
    Quality(i32),
    /// Base-2 logarithm of the match window / dictionary size
    WindowLog(u32),
}

/// Identifies which engine implementation and library version backs a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecVersion {
    pub codec: Codec,
    /// Engine library name
    pub library: &'static str,
    /// Library version as reported by the engine (or pinned at build time)
    pub version: &'static str,
}

impl fmt::Display for CodecVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} {})", self.codec, self.library, self.version)
    }
}

/// Streaming encoder primitive
///
/// `input` is the unread source window and `output` the unwritten destination
/// window. On entry `available_in`/`available_out` equal their lengths; on
/// return they hold how much the engine did **not** consume or fill.
pub trait EncoderEngine: Send {
    fn set_parameter(&mut self, parameter: EngineParameter) -> bool;

    fn compress_stream(
        &mut self,
        op: FlushOp,
        available_in: &mut usize,
        input: &[u8],
        available_out: &mut usize,
        output: &mut [u8],
    ) -> NativeCode;

    /// Output is held inside the engine waiting for destination space
    fn has_more_output(&self) -> bool;

    /// A `Finish` operation has completed and the trailer was emitted
    fn is_finished(&self) -> bool;
}

/// Streaming decoder primitive; same counting contract as [`EncoderEngine`]
pub trait DecoderEngine: Send {
    fn set_parameter(&mut self, parameter: EngineParameter) -> bool;

    fn decompress_stream(
        &mut self,
        available_in: &mut usize,
        input: &[u8],
        available_out: &mut usize,
        output: &mut [u8],
    ) -> NativeCode;

    fn has_more_output(&self) -> bool;

    /// The end of the compressed stream has been decoded
    fn is_finished(&self) -> bool;
}

/// Bytes left in a window of `offered` bytes after an engine used `used` of them
///
/// Engines built on running totals report `used` as a `u64` delta; a value
/// larger than the window saturates to zero instead of underflowing.
pub(crate) fn left_after(offered: usize, used: u64) -> usize {
    offered.saturating_sub(usize::try_from(used).unwrap_or(usize::MAX))
}
