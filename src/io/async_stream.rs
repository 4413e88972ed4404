//! Tokio stream adapters with cooperative cancellation
//!
//! The async adapters run the same drive loop as their blocking counterparts;
//! engine calls stay synchronous and the only suspension points are reads
//! from the source and writes to the sink. Each of those races the caller's
//! [`CancellationToken`] and yields [`CodecError::Cancelled`] when it fires.
//!
//! A cancelled read leaves the decompressor usable: no compressed bytes were
//! taken from the source. A cancelled write may have pushed part of a chunk
//! into the sink, so the compressor is poisoned and every later call fails
//! with [`CodecError::OperationInProgress`]. The same holds for any operation
//! whose future is dropped before it resolves.
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! use embeddenator_codec::{AsyncStreamCompressor, Codec, CodecOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let mut compressor =
//!     AsyncStreamCompressor::new(Vec::new(), CodecOptions::new(Codec::Brotli)).unwrap();
//! compressor.write(b"async payload", &token).await.unwrap();
//! let compressed = compressor.finish(&token).await.unwrap();
//! assert!(!compressed.is_empty());
//! # });
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::buffer::CompressionBuffer;
use super::options::{CodecOptions, StreamOptions};
use crate::codec::{Codec, CodecVersion, DecoderSession, EncoderSession, FlushOp, Status};
use crate::error::{CodecError, Result};

const NO_INPUT: &[u8] = &[];

/// Async counterpart of [`StreamCompressor`](super::StreamCompressor)
pub struct AsyncStreamCompressor<W: AsyncWrite + Unpin> {
    session: EncoderSession,
    output: CompressionBuffer,
    writer: Option<W>,
    options: StreamOptions,
    completed: bool,
    in_flight: bool,
}

impl<W: AsyncWrite + Unpin> AsyncStreamCompressor<W> {
    pub fn new(writer: W, options: CodecOptions) -> Result<Self> {
        Self::with_options(writer, options, StreamOptions::default())
    }

    pub fn with_options(
        writer: W,
        codec_options: CodecOptions,
        stream_options: StreamOptions,
    ) -> Result<Self> {
        let mut session = EncoderSession::new(codec_options)?;
        session.open()?;
        Ok(Self {
            session,
            output: CompressionBuffer::with_capacity(stream_options.effective_buffer_size()),
            writer: Some(writer),
            options: stream_options,
            completed: false,
            in_flight: false,
        })
    }

    pub fn codec(&self) -> Codec {
        self.session.codec()
    }

    pub fn version(&self) -> CodecVersion {
        self.session.version()
    }

    pub fn total_in(&self) -> u64 {
        self.session.total_in()
    }

    pub fn total_out(&self) -> u64 {
        self.session.total_out()
    }

    pub fn get_ref(&self) -> Option<&W> {
        self.writer.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut W> {
        self.writer.as_mut()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Whether an earlier operation was cancelled or abandoned mid-write
    pub fn is_poisoned(&self) -> bool {
        self.in_flight
    }

    /// Compress `buf`, writing every produced chunk to the sink
    ///
    /// Returns the number of plain bytes accepted.
    pub async fn write(&mut self, buf: &[u8], token: &CancellationToken) -> Result<usize> {
        self.begin(token)?;
        if self.completed {
            self.in_flight = false;
            return Err(CodecError::Completed);
        }
        let mut src = CompressionBuffer::filled(buf);
        let result = self.drive(&mut src, FlushOp::Process, token).await;
        self.end(&result);
        result.map(|()| buf.len() - src.available_read())
    }

    /// Write all of `buf`
    pub async fn write_all(&mut self, mut buf: &[u8], token: &CancellationToken) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf, token).await?;
            if n == 0 {
                return Err(CodecError::invalid_data(
                    self.session.codec(),
                    "encoder stopped accepting input",
                ));
            }
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Push everything written so far through the engine and flush the sink
    ///
    /// [`Codec::Lzma`] cannot sync-flush; for it only the sink is flushed.
    pub async fn flush(&mut self, token: &CancellationToken) -> Result<()> {
        self.begin(token)?;
        let result = self.flush_inner(token).await;
        self.end(&result);
        result
    }

    /// Emit the end-of-stream trailer
    ///
    /// Idempotent on a live stream; fails with [`CodecError::Disposed`] after
    /// [`dispose`](Self::dispose).
    pub async fn complete(&mut self, token: &CancellationToken) -> Result<()> {
        if self.completed && !self.in_flight && !self.session.is_disposed() {
            return Ok(());
        }
        self.begin(token)?;
        let result = self.complete_inner(token).await;
        self.end(&result);
        result
    }

    /// Complete the stream and return the sink
    pub async fn finish(mut self, token: &CancellationToken) -> Result<W> {
        self.complete(token).await?;
        self.writer.take().ok_or(CodecError::Disposed)
    }

    /// Complete the stream; the sink is returned only when `leave_open` is set
    pub async fn close(mut self, token: &CancellationToken) -> Result<Option<W>> {
        self.complete(token).await?;
        let mut writer = self.writer.take().ok_or(CodecError::Disposed)?;
        if self.options.leave_open {
            Ok(Some(writer))
        } else {
            writer.shutdown().await?;
            Ok(None)
        }
    }

    /// Release the engine without completing the stream; idempotent
    ///
    /// Writing the trailer needs the sink, which cannot be awaited here. Use
    /// [`close`](Self::close) or [`finish`](Self::finish) to finalize the
    /// stream; after `dispose` every operation fails with
    /// [`CodecError::Disposed`].
    pub fn dispose(&mut self) {
        if !self.completed && !self.session.is_disposed() {
            warn!(codec = %self.session.codec(), "async compressor disposed before completion");
        }
        self.session.dispose();
        if !self.options.leave_open {
            self.writer = None;
        }
    }

    fn begin(&mut self, token: &CancellationToken) -> Result<()> {
        if self.in_flight {
            return Err(CodecError::OperationInProgress);
        }
        if self.session.is_disposed() {
            return Err(CodecError::Disposed);
        }
        if token.is_cancelled() {
            return Err(CodecError::Cancelled);
        }
        self.in_flight = true;
        Ok(())
    }

    /// A cancelled sink write leaves the guard set
    fn end<T>(&mut self, result: &Result<T>) {
        if !matches!(result, Err(CodecError::Cancelled)) {
            self.in_flight = false;
        }
    }

    async fn flush_inner(&mut self, token: &CancellationToken) -> Result<()> {
        if !self.completed {
            self.drive(&mut CompressionBuffer::filled(NO_INPUT), FlushOp::Flush, token)
                .await?;
        }
        let writer = self.writer.as_mut().ok_or(CodecError::Disposed)?;
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(CodecError::Cancelled),
            result = writer.flush() => Ok(result?),
        }
    }

    async fn complete_inner(&mut self, token: &CancellationToken) -> Result<()> {
        self.drive(&mut CompressionBuffer::filled(NO_INPUT), FlushOp::Finish, token)
            .await?;
        self.completed = true;
        debug!(
            codec = %self.session.codec(),
            total_in = self.session.total_in(),
            total_out = self.session.total_out(),
            "async compressed stream completed"
        );
        let writer = self.writer.as_mut().ok_or(CodecError::Disposed)?;
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(CodecError::Cancelled),
            result = writer.flush() => Ok(result?),
        }
    }

    async fn drive(
        &mut self,
        src: &mut CompressionBuffer<&[u8]>,
        op: FlushOp,
        token: &CancellationToken,
    ) -> Result<()> {
        loop {
            let status = self.session.compress(src, &mut self.output, op)?;
            self.drain_output(token).await?;
            match status {
                Status::Done | Status::NeedMoreData => return Ok(()),
                Status::DestinationTooSmall => continue,
                Status::InvalidData => {
                    let detail = self.session.last_error().unwrap_or("unknown failure");
                    return Err(CodecError::invalid_data(self.session.codec(), detail));
                }
            }
        }
    }

    async fn drain_output(&mut self, token: &CancellationToken) -> Result<()> {
        if self.output.is_empty() {
            return Ok(());
        }
        let writer = self.writer.as_mut().ok_or(CodecError::Disposed)?;
        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(CodecError::Cancelled),
            result = writer.write_all(self.output.unread()) => result?,
        }
        self.output.clear();
        Ok(())
    }
}

impl<W: AsyncWrite + Unpin> Drop for AsyncStreamCompressor<W> {
    fn drop(&mut self) {
        if self.writer.is_some() && !self.completed && !self.session.is_disposed() {
            warn!(
                codec = %self.session.codec(),
                "async compressor dropped before completion; stream has no trailer"
            );
        }
    }
}

/// Async counterpart of [`StreamDecompressor`](super::StreamDecompressor)
pub struct AsyncStreamDecompressor<R: AsyncRead + Unpin> {
    session: DecoderSession,
    input: CompressionBuffer,
    reader: R,
    options: StreamOptions,
    source_eof: bool,
    in_flight: bool,
}

impl<R: AsyncRead + Unpin> AsyncStreamDecompressor<R> {
    pub fn new(reader: R, codec: Codec) -> Result<Self> {
        Self::with_options(reader, CodecOptions::new(codec), StreamOptions::default())
    }

    pub fn with_options(
        reader: R,
        codec_options: CodecOptions,
        stream_options: StreamOptions,
    ) -> Result<Self> {
        let mut session = DecoderSession::with_options(codec_options)?;
        session.open()?;
        Ok(Self {
            session,
            input: CompressionBuffer::with_capacity(stream_options.effective_buffer_size()),
            reader,
            options: stream_options,
            source_eof: false,
            in_flight: false,
        })
    }

    pub fn codec(&self) -> Codec {
        self.session.codec()
    }

    pub fn version(&self) -> CodecVersion {
        self.session.version()
    }

    pub fn total_in(&self) -> u64 {
        self.session.total_in()
    }

    pub fn total_out(&self) -> u64 {
        self.session.total_out()
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn has_buffered_input(&self) -> bool {
        !self.input.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.session.is_finished()
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Release the engine; the reader is returned only when `leave_open` is set
    pub fn close(mut self) -> Option<R> {
        self.session.dispose();
        if self.options.leave_open {
            Some(self.reader)
        } else {
            None
        }
    }

    pub fn dispose(&mut self) {
        self.session.dispose();
    }

    /// Decompress into `dst`; `Ok(0)` marks the end of the stream
    pub async fn read(&mut self, dst: &mut [u8], token: &CancellationToken) -> Result<usize> {
        if self.in_flight {
            return Err(CodecError::OperationInProgress);
        }
        if self.session.is_disposed() {
            return Err(CodecError::Disposed);
        }
        if token.is_cancelled() {
            return Err(CodecError::Cancelled);
        }

        self.in_flight = true;
        let result = self.read_inner(dst, token).await;
        // Source reads are cancel-safe, so even a cancelled read releases the guard.
        self.in_flight = false;
        result
    }

    /// Read until the end of the stream, appending to `out`
    pub async fn read_to_end(
        &mut self,
        out: &mut Vec<u8>,
        token: &CancellationToken,
    ) -> Result<usize> {
        let mut chunk = vec![0u8; self.options.effective_buffer_size()];
        let mut total = 0;
        loop {
            let n = self.read(&mut chunk, token).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
    }

    async fn read_inner(&mut self, dst: &mut [u8], token: &CancellationToken) -> Result<usize> {
        if dst.is_empty() {
            if self.has_buffered_input() {
                return Ok(0);
            }
            // `ReadBuf` bounds what a source can report, so an empty read is always 0.
            tokio::select! {
                biased;
                _ = token.cancelled() => return Err(CodecError::Cancelled),
                result = self.reader.read(&mut []) => result?,
            };
            return Ok(0);
        }

        loop {
            let mut out = CompressionBuffer::empty(&mut *dst);
            let status = self.session.decompress(&mut self.input, &mut out)?;
            let produced = out.size();

            match status {
                Status::Done | Status::DestinationTooSmall => return Ok(produced),
                Status::InvalidData => {
                    let detail = self.session.last_error().unwrap_or("unknown failure");
                    return Err(CodecError::invalid_data(self.session.codec(), detail));
                }
                Status::NeedMoreData if produced > 0 => return Ok(produced),
                Status::NeedMoreData => {}
            }

            if self.source_eof {
                return if self.session.has_seen_input() {
                    Err(CodecError::Truncated {
                        codec: self.session.codec(),
                    })
                } else {
                    Ok(0)
                };
            }
            self.fill(token).await?;
        }
    }

    async fn fill(&mut self, token: &CancellationToken) -> Result<()> {
        self.input.compact();
        let capacity = self.input.available_write();
        if capacity == 0 {
            return Err(CodecError::invalid_data(
                self.session.codec(),
                "decoder made no progress on a full input buffer",
            ));
        }

        let n = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(CodecError::Cancelled),
            result = self.reader.read(self.input.unwritten_mut()) => result?,
        };
        if n == 0 {
            self.source_eof = true;
        } else {
            self.input.commit(n);
        }
        Ok(())
    }
}
