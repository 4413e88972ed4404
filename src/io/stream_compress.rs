//! Streaming compression over `std::io`
//!
//! [`StreamCompressor`] wraps a writer: plain bytes written to it come out of
//! the writer compressed. [`StreamDecompressor`] wraps a reader: compressed
//! bytes pulled from the reader come out of `read` decompressed. Both hold a
//! single engine session and one owned [`CompressionBuffer`], so memory use is
//! bounded by [`StreamOptions::buffer_size`] regardless of stream length.
//!
//! # Examples
//!
//! ## Streaming Compression
//! ```
//! use std::io::Write;
//! use embeddenator_codec::{Codec, CodecOptions, StreamCompressor};
//!
//! let mut compressor = StreamCompressor::new(Vec::new(), CodecOptions::new(Codec::Zstd)).unwrap();
//! compressor.write_all(b"hello hello hello hello").unwrap();
//! let compressed = compressor.finish().unwrap();
//! assert!(!compressed.is_empty());
//! ```
//!
//! ## Streaming Decompression
//! ```no_run
//! use embeddenator_codec::{Codec, StreamDecompressor};
//! use std::fs::File;
//! use std::io::Read;
//!
//! let input = File::open("large_file.bin.br").unwrap();
//! let mut decompressor = StreamDecompressor::new(input, Codec::Brotli).unwrap();
//! let mut chunk = vec![0u8; 64 * 1024];
//! let n = decompressor.read(&mut chunk).unwrap();
//! ```

use std::io::{self, Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use super::buffer::{CompressionBuffer, DEFAULT_BUFFER_SIZE};
use super::options::{CodecOptions, CompressionLevel, StreamOptions};
use crate::codec::{Codec, CodecVersion, DecoderSession, EncoderSession, FlushOp, Status};
use crate::error::{CodecError, Result};

const NO_INPUT: &[u8] = &[];

/// Streaming compressor that wraps a writer with compression
///
/// Allows writing uncompressed data which is automatically compressed
/// and written to the underlying writer in a streaming fashion. The stream
/// must be ended with [`complete`](Self::complete), [`finish`](Self::finish)
/// or [`close`](Self::close) to emit the trailer; dropping an unfinished
/// compressor completes it on a best-effort basis.
pub struct StreamCompressor<W: Write> {
    session: EncoderSession,
    output: CompressionBuffer,
    writer: Option<W>,
    options: StreamOptions,
    completed: bool,
}

impl<W: Write> StreamCompressor<W> {
    /// Create a compressor with the default buffer size
    ///
    /// # Errors
    /// Fails if the codec is not compiled in, is block-only, or rejects the
    /// level or window in `options`.
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
        })
    }

    /// Create a streaming Brotli compressor
    #[cfg(feature = "compression-brotli")]
    pub fn brotli(writer: W, level: CompressionLevel) -> Result<Self> {
        Self::new(writer, CodecOptions::new(Codec::Brotli).with_level(level))
    }

    /// Create a streaming zstd compressor
    #[cfg(feature = "compression-zstd")]
    pub fn zstd(writer: W, level: CompressionLevel) -> Result<Self> {
        Self::new(writer, CodecOptions::new(Codec::Zstd).with_level(level))
    }

    /// Create a streaming zlib compressor
    #[cfg(feature = "compression-flate")]
    pub fn zlib(writer: W, level: CompressionLevel) -> Result<Self> {
        Self::new(writer, CodecOptions::new(Codec::Zlib).with_level(level))
    }

    /// Create a streaming xz compressor
    #[cfg(feature = "compression-xz")]
    pub fn xz(writer: W, level: CompressionLevel) -> Result<Self> {
        Self::new(writer, CodecOptions::new(Codec::Xz).with_level(level))
    }

    /// Get the compression codec being used
    pub fn codec(&self) -> Codec {
        self.session.codec()
    }

    pub fn version(&self) -> CodecVersion {
        self.session.version()
    }

    /// Uncompressed bytes accepted so far
    pub fn total_in(&self) -> u64 {
        self.session.total_in()
    }

    /// Compressed bytes produced so far
    pub fn total_out(&self) -> u64 {
        self.session.total_out()
    }

    /// The underlying writer; `None` once it has been released by `dispose`
    pub fn get_ref(&self) -> Option<&W> {
        self.writer.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut W> {
        self.writer.as_mut()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Emit the end-of-stream trailer
    ///
    /// Idempotent on a live stream. Writes after completion fail with
    /// [`CodecError::Completed`]; any call after [`dispose`](Self::dispose)
    /// fails with [`CodecError::Disposed`].
    pub fn complete(&mut self) -> Result<()> {
        if self.session.is_disposed() {
            return Err(CodecError::Disposed);
        }
        if self.completed {
            return Ok(());
        }

        self.drive(&mut CompressionBuffer::filled(NO_INPUT), FlushOp::Finish)?;
        self.completed = true;
        self.writer_mut()?.flush()?;
        debug!(
            codec = %self.session.codec(),
            total_in = self.session.total_in(),
            total_out = self.session.total_out(),
            "compressed stream completed"
        );
        Ok(())
    }

    /// Finish compression and return the underlying writer
    ///
    /// This flushes any buffered data and finalizes the compression stream.
    pub fn finish(mut self) -> Result<W> {
        self.complete()?;
        self.writer.take().ok_or(CodecError::Disposed)
    }

    /// Complete the stream and release the writer
    ///
    /// Returns the writer when [`StreamOptions::leave_open`] is set; otherwise
    /// it is dropped and `None` is returned.
    pub fn close(mut self) -> Result<Option<W>> {
        self.complete()?;
        let writer = self.writer.take().ok_or(CodecError::Disposed)?;
        if self.options.leave_open {
            Ok(Some(writer))
        } else {
            drop(writer);
            Ok(None)
        }
    }

    /// Complete best-effort, then release the engine
    ///
    /// The writer is kept when `leave_open` is set and dropped otherwise.
    /// Idempotent; every later operation fails with [`CodecError::Disposed`].
    pub fn dispose(&mut self) {
        if self.session.is_disposed() {
            return;
        }
        if !self.completed {
            if let Err(err) = self.complete() {
                warn!(
                    codec = %self.session.codec(),
                    error = %err,
                    "failed to complete stream on dispose"
                );
            }
        }
        self.session.dispose();
        if !self.options.leave_open {
            self.writer = None;
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.session.is_disposed() {
            Err(CodecError::Disposed)
        } else if self.completed {
            Err(CodecError::Completed)
        } else {
            Ok(())
        }
    }

    fn writer_mut(&mut self) -> Result<&mut W> {
        self.writer.as_mut().ok_or(CodecError::Disposed)
    }

    /// Run the drive loop until `op` is done, draining output to the writer after each pass
    fn drive<S: AsRef<[u8]>>(&mut self, src: &mut CompressionBuffer<S>, op: FlushOp) -> Result<()> {
        loop {
            let status = self.session.compress(src, &mut self.output, op)?;
            self.drain_output()?;
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

    fn drain_output(&mut self) -> Result<()> {
        if self.output.is_empty() {
            return Ok(());
        }
        let writer = self.writer.as_mut().ok_or(CodecError::Disposed)?;
        writer.write_all(self.output.unread())?;
        self.output.clear();
        Ok(())
    }

    pub(crate) fn write_plain(&mut self, buf: &[u8]) -> Result<usize> {
        self.check_writable()?;
        let mut src = CompressionBuffer::filled(buf);
        self.drive(&mut src, FlushOp::Process)?;
        Ok(buf.len() - src.available_read())
    }

    fn flush_stream(&mut self) -> Result<()> {
        if self.session.is_disposed() {
            return Err(CodecError::Disposed);
        }
        if !self.completed {
            self.drive(&mut CompressionBuffer::filled(NO_INPUT), FlushOp::Flush)?;
        }
        self.writer_mut()?.flush()?;
        Ok(())
    }
}

impl<W: Write> Write for StreamCompressor<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_plain(buf)?)
    }

    /// Emit everything written so far as a decodable prefix, then flush the sink
    ///
    /// [`Codec::Lzma`] cannot sync-flush; for it only the sink is flushed.
    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_stream()?)
    }
}

impl<W: Write> Drop for StreamCompressor<W> {
    fn drop(&mut self) {
        if self.writer.is_some() && !self.completed && !std::thread::panicking() {
            self.dispose();
        }
    }
}

/// Streaming decompressor that wraps a reader with decompression
///
/// Allows reading compressed data which is automatically decompressed
/// in a streaming fashion. `read` returns `Ok(0)` once the end of the
/// compressed stream has been decoded; a source that ends early yields an
/// [`io::ErrorKind::UnexpectedEof`] error instead.
pub struct StreamDecompressor<R: Read> {
    session: DecoderSession,
    input: CompressionBuffer,
    reader: R,
    options: StreamOptions,
    source_eof: bool,
}

impl<R: Read> StreamDecompressor<R> {
    pub fn new(reader: R, codec: Codec) -> Result<Self> {
        Self::with_options(reader, CodecOptions::new(codec), StreamOptions::default())
    }

    /// `codec_options.window_log`, when set, caps the window the decoder accepts
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
        })
    }

    #[cfg(feature = "compression-brotli")]
    pub fn brotli(reader: R) -> Result<Self> {
        Self::new(reader, Codec::Brotli)
    }

    #[cfg(feature = "compression-zstd")]
    pub fn zstd(reader: R) -> Result<Self> {
        Self::new(reader, Codec::Zstd)
    }

    #[cfg(feature = "compression-flate")]
    pub fn zlib(reader: R) -> Result<Self> {
        Self::new(reader, Codec::Zlib)
    }

    #[cfg(feature = "compression-xz")]
    pub fn xz(reader: R) -> Result<Self> {
        Self::new(reader, Codec::Xz)
    }

    /// Get the compression codec being used
    pub fn codec(&self) -> Codec {
        self.session.codec()
    }

    pub fn version(&self) -> CodecVersion {
        self.session.version()
    }

    /// Compressed bytes consumed so far
    pub fn total_in(&self) -> u64 {
        self.session.total_in()
    }

    /// Decompressed bytes produced so far
    pub fn total_out(&self) -> u64 {
        self.session.total_out()
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Compressed bytes already pulled from the reader but not yet decoded
    pub fn has_buffered_input(&self) -> bool {
        !self.input.is_empty()
    }

    /// Whether the end of the compressed stream has been decoded
    pub fn is_finished(&self) -> bool {
        self.session.is_finished()
    }

    /// Get the inner reader (consumes the decompressor)
    ///
    /// Compressed bytes buffered past the end of the stream are discarded.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Release the engine and return the reader when `leave_open` is set
    pub fn close(mut self) -> Option<R> {
        self.session.dispose();
        if self.options.leave_open {
            Some(self.reader)
        } else {
            None
        }
    }

    /// Release the engine; later reads fail with [`CodecError::Disposed`]
    pub fn dispose(&mut self) {
        self.session.dispose();
    }

    fn read_plain(&mut self, dst: &mut [u8]) -> Result<usize> {
        if self.session.is_disposed() {
            return Err(CodecError::Disposed);
        }
        if dst.is_empty() {
            return self.zero_length_read();
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
            self.fill()?;
        }
    }

    /// Zero-length read: answer from the buffer when possible, else ask the source
    fn zero_length_read(&mut self) -> Result<usize> {
        if self.has_buffered_input() {
            return Ok(0);
        }
        let n = self.reader.read(&mut [])?;
        if n > 0 {
            return Err(CodecError::SourceOverrun {
                reported: n,
                capacity: 0,
            });
        }
        Ok(0)
    }

    /// Compact the input buffer and pull one chunk from the reader into it
    fn fill(&mut self) -> Result<()> {
        self.input.compact();
        let capacity = self.input.available_write();
        if capacity == 0 {
            return Err(CodecError::invalid_data(
                self.session.codec(),
                "decoder made no progress on a full input buffer",
            ));
        }

        let n = loop {
            match self.reader.read(self.input.unwritten_mut()) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => break other?,
            }
        };
        if n > capacity {
            return Err(CodecError::SourceOverrun {
                reported: n,
                capacity,
            });
        }
        if n == 0 {
            self.source_eof = true;
        } else {
            self.input.commit(n);
        }
        Ok(())
    }
}

impl<R: Read> Read for StreamDecompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_plain(buf)?)
    }
}

/// Stream-compress data from a reader to a writer
///
/// This function reads data in chunks, compresses it, and writes to the output
/// without loading the entire input into memory.
///
/// # Arguments
/// * `reader` - Source of uncompressed data
/// * `writer` - Destination for compressed data
/// * `options` - Codec, level and window to use
/// * `buffer_size` - Size of the read buffer and of the compressor's output buffer
///
/// # Returns
/// Total bytes written (compressed size)
///
/// # Examples
/// ```no_run
/// use embeddenator_codec::{stream_compress, Codec, CodecOptions, CompressionLevel};
/// use std::fs::File;
///
/// let input = File::open("large_file.bin").unwrap();
/// let output = File::create("large_file.bin.zst").unwrap();
///
/// let compressed_size = stream_compress(
///     input,
///     output,
///     CodecOptions::new(Codec::Zstd).with_level(CompressionLevel::Default),
///     64 * 1024,
/// ).unwrap();
///
/// println!("Compressed to {} bytes", compressed_size);
/// ```
pub fn stream_compress<R: Read, W: Write>(
    mut reader: R,
    writer: W,
    options: CodecOptions,
    buffer_size: usize,
) -> io::Result<u64> {
    let stream_options = StreamOptions::default().with_buffer_size(buffer_size);
    let mut compressor = StreamCompressor::with_options(writer, options, stream_options)?;
    let mut buffer = vec![0u8; stream_options.effective_buffer_size()];

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        compressor.write_all(&buffer[..bytes_read])?;
    }

    compressor.complete()?;
    let total_written = compressor.total_out();
    compressor.finish()?;
    Ok(total_written)
}

/// Stream-decompress data from a reader to a writer
///
/// This function reads compressed data in chunks, decompresses it, and writes
/// to the output without loading the entire input into memory.
///
/// # Returns
/// Total bytes written (uncompressed size)
pub fn stream_decompress<R: Read, W: Write>(
    reader: R,
    mut writer: W,
    codec: Codec,
    buffer_size: usize,
) -> io::Result<u64> {
    let stream_options = StreamOptions::default().with_buffer_size(buffer_size);
    let mut decompressor =
        StreamDecompressor::with_options(reader, CodecOptions::new(codec), stream_options)?;
    let mut buffer = vec![0u8; stream_options.effective_buffer_size()];
    let mut total_written = 0u64;

    loop {
        let bytes_read = decompressor.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write_all(&buffer[..bytes_read])?;
        total_written += bytes_read as u64;
    }

    writer.flush()?;
    Ok(total_written)
}

/// Stream-compress a file to another file
///
/// # Returns
/// Tuple of (uncompressed_size, compressed_size)
pub fn compress_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P,
    output_path: Q,
    options: CodecOptions,
) -> io::Result<(u64, u64)> {
    let input = std::fs::File::open(input_path)?;
    let input_size = input.metadata()?.len();
    let output = std::fs::File::create(output_path.as_ref())?;

    stream_compress(input, &output, options, DEFAULT_BUFFER_SIZE)?;
    output.sync_all()?;

    let output_size = std::fs::metadata(output_path)?.len();
    Ok((input_size, output_size))
}

/// Stream-decompress a file to another file
///
/// # Returns
/// Tuple of (compressed_size, uncompressed_size)
pub fn decompress_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input_path: P,
    output_path: Q,
    codec: Codec,
) -> io::Result<(u64, u64)> {
    let input = std::fs::File::open(input_path.as_ref())?;
    let input_size = input.metadata()?.len();
    let output = std::fs::File::create(output_path.as_ref())?;

    stream_decompress(input, &output, codec, DEFAULT_BUFFER_SIZE)?;

    let output_size = std::fs::metadata(output_path)?.len();
    Ok((input_size, output_size))
}
