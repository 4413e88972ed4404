//! Engine sessions and the compress/decompress drive loops
//!
//! A session owns exactly one engine handle in one role. The handle is
//! created lazily on first use through the [`registry`](super::registry),
//! tagged with the engine's [`CodecVersion`], and destroyed exactly once:
//! either by [`dispose`](EncoderSession::dispose) or when the session drops.
//!
//! The drive loops call the engine repeatedly, advancing the source and
//! destination cursors by the exact counts the engine reports, until the
//! operation completes, the destination fills, or the decoder runs out of
//! input.

use tracing::{debug, trace};

use super::registry::{registry, EngineFactory};
use super::{
    Codec, CodecVersion, DecoderEngine, EncoderEngine, EngineParameter, FlushOp, NativeCode,
    Status,
};
use crate::error::{CodecError, Result};
use crate::io::buffer::CompressionBuffer;
use crate::io::options::CodecOptions;

/// Consecutive calls without progress tolerated before the engine is declared stuck
const MAX_STALLED_CALLS: u32 = 2;

/// Encoder role: turns plain bytes into a compressed stream
pub struct EncoderSession {
    options: CodecOptions,
    factory: &'static dyn EngineFactory,
    engine: Option<Box<dyn EncoderEngine>>,
    disposed: bool,
    /// Input consumed since the last completed flush or finish
    dirty: bool,
    last_error: Option<String>,
    total_in: u64,
    total_out: u64,
}

impl EncoderSession {
    /// Create a session for `options.codec`; the engine itself is created on first use
    ///
    /// # Errors
    /// Fails if the options are out of range, the codec is not compiled in,
    /// or the codec has no streaming engine.
    pub fn new(options: CodecOptions) -> Result<Self> {
        options.validate()?;
        if !options.codec.supports_streaming() {
            return Err(CodecError::Unsupported(options.codec));
        }
        let factory = registry().factory(options.codec)?;
        Ok(Self {
            options,
            factory,
            engine: None,
            disposed: false,
            dirty: false,
            last_error: None,
            total_in: 0,
            total_out: 0,
        })
    }

    pub fn codec(&self) -> Codec {
        self.options.codec
    }

    pub fn version(&self) -> CodecVersion {
        self.factory.version()
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Detail reported by the engine for the most recent `InvalidData`
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Plain bytes consumed so far
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Compressed bytes produced so far
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Whether a `Finish` operation has completed
    pub fn is_finished(&self) -> bool {
        self.engine.as_ref().map_or(false, |e| e.is_finished())
    }

    /// Create the engine now instead of on first use
    pub fn open(&mut self) -> Result<()> {
        if self.disposed {
            return Err(CodecError::Disposed);
        }
        if self.engine.is_some() {
            return Ok(());
        }

        let mut engine = self.factory.new_encoder(&self.options)?;
        for parameter in self.options.encoder_parameters() {
            if !engine.set_parameter(parameter) {
                return Err(rejected(self.options.codec, parameter));
            }
        }
        debug!(
            codec = %self.options.codec,
            version = self.factory.version().version,
            level = ?self.options.level,
            "encoder engine created"
        );
        self.engine = Some(engine);
        Ok(())
    }

    /// Run the compress drive loop
    ///
    /// Consumes as much of `src` as the engine accepts and writes output into
    /// `dst`. Returns [`Status::DestinationTooSmall`] when `dst` filled up with
    /// output still pending; drain `dst` and call again with the same `op`.
    pub fn compress<S, D>(
        &mut self,
        src: &mut CompressionBuffer<S>,
        dst: &mut CompressionBuffer<D>,
        op: FlushOp,
    ) -> Result<Status>
    where
        S: AsRef<[u8]>,
        D: AsRef<[u8]> + AsMut<[u8]>,
    {
        self.open()?;
        let codec = self.options.codec;
        let engine = self.engine.as_deref_mut().ok_or(CodecError::Disposed)?;

        if engine.is_finished() {
            if src.is_empty() && op == FlushOp::Finish {
                return Ok(Status::Done);
            }
            return Err(CodecError::Completed);
        }

        // An empty flush on an idle encoder would make some engines emit an
        // empty block; skip the native call entirely.
        if src.is_empty() && op != FlushOp::Finish && !engine.has_more_output() {
            if op == FlushOp::Process || !self.dirty {
                return Ok(Status::Done);
            }
        }

        let mut stalled = 0;
        loop {
            if dst.available_write() == 0 {
                return Ok(Status::DestinationTooSmall);
            }

            let offered_in = src.available_read();
            let offered_out = dst.available_write();
            let mut available_in = offered_in;
            let mut available_out = offered_out;
            let code = engine.compress_stream(
                op,
                &mut available_in,
                src.unread(),
                &mut available_out,
                dst.unwritten_mut(),
            );

            let consumed = src.consume(offered_in.saturating_sub(available_in));
            let produced = dst.commit(offered_out.saturating_sub(available_out));
            self.total_in += consumed as u64;
            self.total_out += produced as u64;
            if consumed > 0 {
                self.dirty = true;
            }
            trace!(%codec, ?op, consumed, produced, ?code, "compress step");

            if let NativeCode::Error(detail) = code {
                self.last_error = Some(detail);
                return Ok(Status::InvalidData);
            }

            let pending = engine.has_more_output();
            let complete = match op {
                FlushOp::Finish => engine.is_finished(),
                FlushOp::Process | FlushOp::Flush => src.is_empty() && !pending,
            };
            if complete {
                if op != FlushOp::Process {
                    self.dirty = false;
                }
                return Ok(Status::Done);
            }
            if dst.available_write() == 0 {
                return Ok(Status::DestinationTooSmall);
            }

            if consumed == 0 && produced == 0 {
                if !pending && op == FlushOp::Process {
                    return Ok(Status::Done);
                }
                stalled += 1;
                if !pending || stalled >= MAX_STALLED_CALLS {
                    self.last_error = Some(format!("{codec} encoder made no progress"));
                    return Ok(Status::InvalidData);
                }
            } else {
                stalled = 0;
            }
        }
    }

    /// Release the engine handle; later operations fail with [`CodecError::Disposed`]
    ///
    /// Idempotent, and safe to call after a failed operation.
    pub fn dispose(&mut self) {
        if let Some(engine) = self.engine.take() {
            drop(engine);
            debug!(
                codec = %self.options.codec,
                total_in = self.total_in,
                total_out = self.total_out,
                "encoder engine released"
            );
        }
        self.disposed = true;
    }
}

impl Drop for EncoderSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Decoder role: turns a compressed stream back into plain bytes
pub struct DecoderSession {
    options: CodecOptions,
    factory: &'static dyn EngineFactory,
    engine: Option<Box<dyn DecoderEngine>>,
    disposed: bool,
    seen_input: bool,
    last_error: Option<String>,
    total_in: u64,
    total_out: u64,
}

impl DecoderSession {
    /// Create a decoding session for `codec` with default parameters
    pub fn new(codec: Codec) -> Result<Self> {
        Self::with_options(CodecOptions::new(codec))
    }

    /// Create a decoding session; `window_log` caps the window the decoder accepts
    pub fn with_options(options: CodecOptions) -> Result<Self> {
        options.validate()?;
        if !options.codec.supports_streaming() {
            return Err(CodecError::Unsupported(options.codec));
        }
        let factory = registry().factory(options.codec)?;
        Ok(Self {
            options,
            factory,
            engine: None,
            disposed: false,
            seen_input: false,
            last_error: None,
            total_in: 0,
            total_out: 0,
        })
    }

    pub fn codec(&self) -> Codec {
        self.options.codec
    }

    pub fn version(&self) -> CodecVersion {
        self.factory.version()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Compressed bytes consumed so far
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Plain bytes produced so far
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Whether any compressed byte has ever been handed to the engine
    pub fn has_seen_input(&self) -> bool {
        self.seen_input
    }

    /// Whether the end of the compressed stream has been decoded
    pub fn is_finished(&self) -> bool {
        self.engine.as_ref().map_or(false, |e| e.is_finished())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Create the engine now instead of on first use
    pub fn open(&mut self) -> Result<()> {
        if self.disposed {
            return Err(CodecError::Disposed);
        }
        if self.engine.is_some() {
            return Ok(());
        }

        let mut engine = self.factory.new_decoder(&self.options)?;
        if let Some(window_log) = self.options.window_log {
            let parameter = EngineParameter::WindowLog(window_log);
            if !engine.set_parameter(parameter) {
                return Err(rejected(self.options.codec, parameter));
            }
        }
        debug!(
            codec = %self.options.codec,
            version = self.factory.version().version,
            "decoder engine created"
        );
        self.engine = Some(engine);
        Ok(())
    }

    /// Run the decompress drive loop
    ///
    /// Returns [`Status::Done`] once the end of the stream has been decoded
    /// (and on every later call), [`Status::NeedMoreData`] when `src` is
    /// drained, [`Status::DestinationTooSmall`] when `dst` is full.
    pub fn decompress<S, D>(
        &mut self,
        src: &mut CompressionBuffer<S>,
        dst: &mut CompressionBuffer<D>,
    ) -> Result<Status>
    where
        S: AsRef<[u8]>,
        D: AsRef<[u8]> + AsMut<[u8]>,
    {
        self.open()?;
        let codec = self.options.codec;
        let engine = self.engine.as_deref_mut().ok_or(CodecError::Disposed)?;

        if engine.is_finished() {
            return Ok(Status::Done);
        }
        // Nothing has arrived yet; not an error, just nothing to do.
        if src.is_empty() && !self.seen_input {
            return Ok(Status::NeedMoreData);
        }

        let mut stalled = 0;
        loop {
            if dst.available_write() == 0 {
                return Ok(Status::DestinationTooSmall);
            }

            let offered_in = src.available_read();
            let offered_out = dst.available_write();
            let mut available_in = offered_in;
            let mut available_out = offered_out;
            let code = engine.decompress_stream(
                &mut available_in,
                src.unread(),
                &mut available_out,
                dst.unwritten_mut(),
            );

            let consumed = src.consume(offered_in.saturating_sub(available_in));
            let produced = dst.commit(offered_out.saturating_sub(available_out));
            self.total_in += consumed as u64;
            self.total_out += produced as u64;
            if consumed > 0 {
                self.seen_input = true;
            }
            trace!(%codec, consumed, produced, ?code, "decompress step");

            match code {
                NativeCode::Error(detail) => {
                    self.last_error = Some(detail);
                    return Ok(Status::InvalidData);
                }
                NativeCode::StreamEnd => return Ok(Status::Done),
                NativeCode::NeedsMoreOutput | NativeCode::NeedsMoreInput | NativeCode::Ok => {}
            }

            if dst.available_write() == 0 {
                return Ok(Status::DestinationTooSmall);
            }
            if src.is_empty() && !engine.has_more_output() {
                return Ok(Status::NeedMoreData);
            }

            if consumed == 0 && produced == 0 {
                if !engine.has_more_output() {
                    return Ok(Status::NeedMoreData);
                }
                stalled += 1;
                if stalled >= MAX_STALLED_CALLS {
                    self.last_error = Some(format!("{codec} decoder made no progress"));
                    return Ok(Status::InvalidData);
                }
            } else {
                stalled = 0;
            }
        }
    }

    /// Release the engine handle; idempotent
    pub fn dispose(&mut self) {
        if let Some(engine) = self.engine.take() {
            drop(engine);
            debug!(
                codec = %self.options.codec,
                total_in = self.total_in,
                total_out = self.total_out,
                "decoder engine released"
            );
        }
        self.disposed = true;
    }
}

impl Drop for DecoderSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn rejected(codec: Codec, parameter: EngineParameter) -> CodecError {
    let (name, value) = match parameter {
        EngineParameter::Quality(q) => ("quality", i64::from(q)),
        EngineParameter::WindowLog(w) => ("window_log", i64::from(w)),
    };
    CodecError::InvalidParameter { codec, name, value }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_INPUT: &[u8] = &[];

    #[cfg(feature = "compression-brotli")]
    #[test]
    fn test_encoder_roundtrip_through_small_buffers() {
        let data = b"drive loop data drive loop data drive loop data".repeat(50);

        let mut encoder = EncoderSession::new(CodecOptions::new(Codec::Brotli)).unwrap();
        let mut compressed = Vec::new();
        let mut out = CompressionBuffer::with_capacity(7);

        let mut src = CompressionBuffer::filled(&data[..]);
        for op in [FlushOp::Process, FlushOp::Finish] {
            loop {
                let status = encoder.compress(&mut src, &mut out, op).unwrap();
                compressed.extend_from_slice(out.unread());
                out.clear();
                match status {
                    Status::Done => break,
                    Status::DestinationTooSmall => continue,
                    other => panic!("unexpected status {other:?}"),
                }
            }
        }
        assert!(encoder.is_finished());
        assert_eq!(encoder.total_in(), data.len() as u64);

        let mut decoder = DecoderSession::new(Codec::Brotli).unwrap();
        let mut src = CompressionBuffer::filled(&compressed[..]);
        let mut plain = Vec::new();
        loop {
            let status = decoder.decompress(&mut src, &mut out).unwrap();
            plain.extend_from_slice(out.unread());
            out.clear();
            if status == Status::Done {
                break;
            }
            assert_eq!(status, Status::DestinationTooSmall);
        }
        assert_eq!(plain, data);
    }

    #[cfg(feature = "compression-brotli")]
    #[test]
    fn test_empty_flush_skips_engine() {
        let mut encoder = EncoderSession::new(CodecOptions::new(Codec::Brotli)).unwrap();
        let mut src = CompressionBuffer::filled(NO_INPUT);
        let mut out = CompressionBuffer::with_capacity(64);

        assert_eq!(
            encoder.compress(&mut src, &mut out, FlushOp::Flush).unwrap(),
            Status::Done
        );
        assert_eq!(out.available_read(), 0);
    }

    #[cfg(feature = "compression-brotli")]
    #[test]
    fn test_decoder_without_input_needs_data() {
        let mut decoder = DecoderSession::new(Codec::Brotli).unwrap();
        let mut src = CompressionBuffer::filled(NO_INPUT);
        let mut out = CompressionBuffer::with_capacity(64);

        assert_eq!(
            decoder.decompress(&mut src, &mut out).unwrap(),
            Status::NeedMoreData
        );
        assert!(!decoder.has_seen_input());
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn test_corrupt_input_is_invalid_data() {
        let mut decoder = DecoderSession::new(Codec::Zstd).unwrap();
        let garbage = [0xde, 0xad, 0xbe, 0xef, 0x00, 0x11, 0x22, 0x33];
        let mut src = CompressionBuffer::filled(&garbage[..]);
        let mut out = CompressionBuffer::with_capacity(64);

        assert_eq!(
            decoder.decompress(&mut src, &mut out).unwrap(),
            Status::InvalidData
        );
        assert!(decoder.last_error().is_some());
    }

    #[cfg(feature = "compression-zstd")]
    #[test]
    fn test_operations_after_dispose_fail() {
        let mut encoder = EncoderSession::new(CodecOptions::new(Codec::Zstd)).unwrap();
        encoder.open().unwrap();
        encoder.dispose();
        encoder.dispose();

        let mut src = CompressionBuffer::filled(&b"late"[..]);
        let mut out = CompressionBuffer::with_capacity(64);
        assert!(matches!(
            encoder.compress(&mut src, &mut out, FlushOp::Process),
            Err(CodecError::Disposed)
        ));
    }

    #[cfg(feature = "compression-lz4")]
    #[test]
    fn test_block_only_codec_has_no_session() {
        assert!(matches!(
            EncoderSession::new(CodecOptions::new(Codec::Lz4)),
            Err(CodecError::Unsupported(Codec::Lz4))
        ));
    }
}
