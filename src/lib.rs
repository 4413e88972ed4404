//! # embeddenator-codec
//!
//! Streaming byte I/O over block-oriented compression engines.
//!
//! Native engines only understand "here are N input bytes and M bytes of
//! output space; consume some, produce some, report a status". This crate
//! turns that contract into ordinary `Read`/`Write` streams (and their Tokio
//! counterparts) over arbitrarily long data:
//!
//! - [`CompressionBuffer`]: fixed-capacity byte region with read/write cursors
//! - [`codec`]: the engine traits, the engine registry and the drive loop
//! - [`StreamCompressor`] / [`StreamDecompressor`]: blocking stream adapters
//! - [`compress_block`] / [`decompress_block`]: one-shot slice-to-slice calls
//!
//! Engines are feature-gated: `compression-brotli`, `compression-zstd`,
//! `compression-flate`, `compression-xz` and `compression-lz4` (block only).
//! The `async` feature adds Tokio adapters with cancellation; `logging` adds
//! [`init_logging`].

pub mod codec;
pub mod error;
pub mod io;

pub use codec::{Codec, CodecVersion, FlushOp, Status};
pub use error::{CodecError, Result};
pub use io::*;

/// Install a global `tracing` subscriber filtered by `RUST_LOG` (default `info`)
///
/// Returns `false` if a global subscriber was already set.
#[cfg(feature = "logging")]
pub fn init_logging() -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_loads() {
        // Verify core types are accessible
        let _ = Codec::Brotli;
        let opts = StreamOptions::default();
        assert_eq!(opts.buffer_size, DEFAULT_BUFFER_SIZE);
        assert!(!opts.leave_open);
        assert_eq!(CodecOptions::new(Codec::Zstd).level, CompressionLevel::Default);
    }
}
