//! XZ and legacy LZMA-alone engines backed by `xz2` (liblzma)

use xz2::stream::{Action, Check, Filters, LzmaOptions, Status, Stream};

use super::registry::EngineFactory;
use super::{
    left_after, Codec, CodecVersion, DecoderEngine, EncoderEngine, EngineParameter, FlushOp,
    NativeCode,
};
use crate::error::{CodecError, Result};
use crate::io::options::CodecOptions;

const DEFAULT_PRESET: u32 = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Container {
    /// `.xz` with CRC64 integrity check
    Xz,
    /// `.lzma` header followed by a raw LZMA1 stream
    Alone,
}

pub struct LzmaFactory {
    container: Container,
}

pub static XZ_FACTORY: LzmaFactory = LzmaFactory {
    container: Container::Xz,
};
pub static LZMA_FACTORY: LzmaFactory = LzmaFactory {
    container: Container::Alone,
};

impl LzmaFactory {
    fn codec_of(&self) -> Codec {
        match self.container {
            Container::Xz => Codec::Xz,
            Container::Alone => Codec::Lzma,
        }
    }
}

impl EngineFactory for LzmaFactory {
    fn codec(&self) -> Codec {
        self.codec_of()
    }

    fn version(&self) -> CodecVersion {
        CodecVersion {
            codec: self.codec_of(),
            library: "liblzma",
            version: "5",
        }
    }

    fn new_encoder(&self, _options: &CodecOptions) -> Result<Box<dyn EncoderEngine>> {
        Ok(Box::new(LzmaEncoder {
            container: self.container,
            preset: DEFAULT_PRESET,
            window_log: None,
            inner: None,
            more_output: false,
            finished: false,
        }))
    }

    fn new_decoder(&self, _options: &CodecOptions) -> Result<Box<dyn DecoderEngine>> {
        let codec = self.codec_of();
        let inner = match self.container {
            Container::Xz => Stream::new_stream_decoder(u64::MAX, 0),
            Container::Alone => Stream::new_lzma_decoder(u64::MAX),
        }
        .map_err(|e| CodecError::engine_creation(codec, e))?;
        Ok(Box::new(LzmaDecoder {
            inner,
            more_output: false,
            finished: false,
        }))
    }
}

/// Encoder whose native stream is built on first use, once preset and dictionary are known
pub struct LzmaEncoder {
    container: Container,
    preset: u32,
    window_log: Option<u32>,
    inner: Option<Stream>,
    more_output: bool,
    finished: bool,
}

impl LzmaEncoder {
    fn build(&self) -> std::result::Result<Stream, xz2::stream::Error> {
        let mut options = LzmaOptions::new_preset(self.preset)?;
        if let Some(log) = self.window_log {
            options.dict_size(1u32 << log);
        }
        match self.container {
            Container::Xz => {
                let mut filters = Filters::new();
                filters.lzma2(&options);
                Stream::new_stream_encoder(&filters, Check::Crc64)
            }
            Container::Alone => Stream::new_lzma_encoder(&options),
        }
    }
}

impl EncoderEngine for LzmaEncoder {
    fn set_parameter(&mut self, parameter: EngineParameter) -> bool {
        if self.inner.is_some() {
            return false;
        }
        match parameter {
            EngineParameter::Quality(preset @ 0..=9) => {
                self.preset = preset as u32;
                true
            }
            EngineParameter::WindowLog(log @ 12..=30) => {
                self.window_log = Some(log);
                true
            }
            _ => false,
        }
    }

    fn compress_stream(
        &mut self,
        op: FlushOp,
        available_in: &mut usize,
        input: &[u8],
        available_out: &mut usize,
        output: &mut [u8],
    ) -> NativeCode {
        if self.inner.is_none() {
            match self.build() {
                Ok(stream) => self.inner = Some(stream),
                Err(e) => return NativeCode::Error(e.to_string()),
            }
        }
        let Some(inner) = self.inner.as_mut() else {
            return NativeCode::Error("encoder stream missing".to_owned());
        };

        let finishing = op == FlushOp::Finish;
        // LZMA-alone cannot sync-flush; buffered data goes out on finish.
        let running = matches!(
            (op, self.container),
            (FlushOp::Process, _) | (FlushOp::Flush, Container::Alone)
        );
        let action = if finishing {
            Action::Finish
        } else if running {
            Action::Run
        } else {
            Action::SyncFlush
        };
        let in_len = *available_in;
        let out_len = *available_out;
        let before_in = inner.total_in();
        let before_out = inner.total_out();

        let result = inner.process(&input[..in_len], &mut output[..out_len], action);

        *available_in = left_after(in_len, inner.total_in() - before_in);
        *available_out = left_after(out_len, inner.total_out() - before_out);

        match result {
            Ok(Status::StreamEnd) if finishing => {
                self.finished = true;
                self.more_output = false;
                NativeCode::StreamEnd
            }
            // A completed sync flush also reports stream end.
            Ok(Status::StreamEnd) => {
                self.more_output = false;
                NativeCode::Ok
            }
            Ok(_) => {
                self.more_output = !running || *available_out == 0;
                if self.more_output {
                    NativeCode::NeedsMoreOutput
                } else {
                    NativeCode::Ok
                }
            }
            Err(e) => NativeCode::Error(e.to_string()),
        }
    }

    fn has_more_output(&self) -> bool {
        self.more_output
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

pub struct LzmaDecoder {
    inner: Stream,
    more_output: bool,
    finished: bool,
}

impl DecoderEngine for LzmaDecoder {
    fn set_parameter(&mut self, parameter: EngineParameter) -> bool {
        // Memory is unlimited, so any window the encoder chose decodes.
        matches!(parameter, EngineParameter::WindowLog(12..=30))
    }

    fn decompress_stream(
        &mut self,
        available_in: &mut usize,
        input: &[u8],
        available_out: &mut usize,
        output: &mut [u8],
    ) -> NativeCode {
        let in_len = *available_in;
        let out_len = *available_out;
        let before_in = self.inner.total_in();
        let before_out = self.inner.total_out();

        let result = self
            .inner
            .process(&input[..in_len], &mut output[..out_len], Action::Run);

        *available_in = left_after(in_len, self.inner.total_in() - before_in);
        *available_out = left_after(out_len, self.inner.total_out() - before_out);
        self.more_output = *available_out == 0;

        match result {
            Ok(Status::StreamEnd) => {
                self.finished = true;
                self.more_output = false;
                NativeCode::StreamEnd
            }
            Ok(_) if self.more_output => NativeCode::NeedsMoreOutput,
            Ok(_) => NativeCode::NeedsMoreInput,
            Err(e) => NativeCode::Error(e.to_string()),
        }
    }

    fn has_more_output(&self) -> bool {
        self.more_output
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
