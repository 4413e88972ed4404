//! Process-wide engine registry
//!
//! Each compiled-in engine module contributes one [`EngineFactory`]. The
//! registry is assembled exactly once, on the first call to [`init`] or
//! [`registry`], and is read-only afterwards; concurrent first callers block
//! until the winner has finished.

use once_cell::sync::OnceCell;
use tracing::debug;

use super::{Codec, CodecVersion, DecoderEngine, EncoderEngine};
use crate::error::{CodecError, Result};
use crate::io::options::CodecOptions;

/// Creates engine handles for one codec
pub trait EngineFactory: Send + Sync {
    fn codec(&self) -> Codec;

    fn version(&self) -> CodecVersion;

    /// A fresh encoder with engine defaults; the session applies parameters afterwards
    fn new_encoder(&self, options: &CodecOptions) -> Result<Box<dyn EncoderEngine>>;

    fn new_decoder(&self, options: &CodecOptions) -> Result<Box<dyn DecoderEngine>>;
}

/// The set of engines available to this process
pub struct EngineRegistry {
    factories: Vec<&'static dyn EngineFactory>,
}

static REGISTRY: OnceCell<EngineRegistry> = OnceCell::new();

/// Build the registry if it has not been built yet
///
/// Calling this up front moves engine discovery out of the first
/// compression call; it is otherwise optional.
pub fn init() -> &'static EngineRegistry {
    REGISTRY.get_or_init(|| {
        let registry = EngineRegistry::discover();
        for version in registry.versions() {
            debug!(%version, "registered compression engine");
        }
        registry
    })
}

/// The process-wide registry, initialized on first access
pub fn registry() -> &'static EngineRegistry {
    init()
}

impl EngineRegistry {
    fn discover() -> Self {
        #[allow(unused_mut)]
        let mut factories: Vec<&'static dyn EngineFactory> = Vec::new();

        #[cfg(feature = "compression-brotli")]
        factories.push(&super::brotli::FACTORY);
        #[cfg(feature = "compression-zstd")]
        factories.push(&super::zstd::FACTORY);
        #[cfg(feature = "compression-flate")]
        {
            factories.push(&super::flate::DEFLATE_FACTORY);
            factories.push(&super::flate::ZLIB_FACTORY);
        }
        #[cfg(feature = "compression-xz")]
        {
            factories.push(&super::lzma::XZ_FACTORY);
            factories.push(&super::lzma::LZMA_FACTORY);
        }

        Self { factories }
    }

    /// The streaming factory for `codec`
    ///
    /// # Errors
    /// [`CodecError::Unsupported`] if the codec is not compiled in or is block-only.
    pub fn factory(&self, codec: Codec) -> Result<&'static dyn EngineFactory> {
        self.factories
            .iter()
            .copied()
            .find(|f| f.codec() == codec)
            .ok_or(CodecError::Unsupported(codec))
    }

    /// Whether a streaming engine for `codec` is available
    pub fn is_available(&self, codec: Codec) -> bool {
        self.factory(codec).is_ok()
    }

    /// Versions of every registered streaming engine
    pub fn versions(&self) -> impl Iterator<Item = CodecVersion> + '_ {
        self.factories.iter().map(|f| f.version())
    }
}
