//! Zstandard engine backed by `zstd`'s raw streaming API

use ::zstd::stream::raw::{Decoder, Encoder, InBuffer, Operation, OutBuffer};
use ::zstd::zstd_safe::{self, CParameter, DParameter};

use super::registry::EngineFactory;
use super::{
    Codec, CodecVersion, DecoderEngine, EncoderEngine, EngineParameter, FlushOp, NativeCode,
};
use crate::error::{CodecError, Result};
use crate::io::options::CodecOptions;

pub struct ZstdFactory;

pub static FACTORY: ZstdFactory = ZstdFactory;

impl EngineFactory for ZstdFactory {
    fn codec(&self) -> Codec {
        Codec::Zstd
    }

    fn version(&self) -> CodecVersion {
        CodecVersion {
            codec: Codec::Zstd,
            library: "libzstd",
            version: zstd_safe::version_string(),
        }
    }

    fn new_encoder(&self, _options: &CodecOptions) -> Result<Box<dyn EncoderEngine>> {
        let inner = Encoder::new(0).map_err(|e| CodecError::engine_creation(Codec::Zstd, e))?;
        Ok(Box::new(ZstdEncoder {
            inner,
            more_output: false,
            finished: false,
        }))
    }

    fn new_decoder(&self, _options: &CodecOptions) -> Result<Box<dyn DecoderEngine>> {
        let inner = Decoder::new().map_err(|e| CodecError::engine_creation(Codec::Zstd, e))?;
        Ok(Box::new(ZstdDecoder {
            inner,
            more_output: false,
            finished: false,
        }))
    }
}

pub struct ZstdEncoder {
    inner: Encoder<'static>,
    more_output: bool,
    finished: bool,
}

impl EncoderEngine for ZstdEncoder {
    fn set_parameter(&mut self, parameter: EngineParameter) -> bool {
        let parameter = match parameter {
            EngineParameter::Quality(level) => CParameter::CompressionLevel(level),
            EngineParameter::WindowLog(log) => CParameter::WindowLog(log),
        };
        self.inner.set_parameter(parameter).is_ok()
    }

    fn compress_stream(
        &mut self,
        op: FlushOp,
        available_in: &mut usize,
        input: &[u8],
        available_out: &mut usize,
        output: &mut [u8],
    ) -> NativeCode {
        let mut src = InBuffer::around(&input[..*available_in]);
        let out_len = (*available_out).min(output.len());
        let mut dst = OutBuffer::around(&mut output[..out_len]);

        let result = (|| -> std::io::Result<NativeCode> {
            while src.pos < src.src.len() && dst.pos() < out_len {
                self.inner.run(&mut src, &mut dst)?;
            }
            if src.pos < src.src.len() {
                // Output filled before the input was taken in.
                self.more_output = true;
                return Ok(NativeCode::NeedsMoreOutput);
            }

            match op {
                FlushOp::Process => {
                    self.more_output = dst.pos() == out_len;
                    Ok(NativeCode::Ok)
                }
                FlushOp::Flush => {
                    let remaining = self.inner.flush(&mut dst)?;
                    self.more_output = remaining > 0;
                    Ok(NativeCode::Ok)
                }
                FlushOp::Finish => {
                    let remaining = self.inner.finish(&mut dst, false)?;
                    self.more_output = remaining > 0;
                    if remaining == 0 {
                        self.finished = true;
                        Ok(NativeCode::StreamEnd)
                    } else {
                        Ok(NativeCode::NeedsMoreOutput)
                    }
                }
            }
        })();

        let consumed = src.pos;
        let produced = dst.pos();
        *available_in -= consumed;
        *available_out -= produced;

        result.unwrap_or_else(|e| NativeCode::Error(e.to_string()))
    }

    fn has_more_output(&self) -> bool {
        self.more_output
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

pub struct ZstdDecoder {
    inner: Decoder<'static>,
    more_output: bool,
    finished: bool,
}

impl DecoderEngine for ZstdDecoder {
    fn set_parameter(&mut self, parameter: EngineParameter) -> bool {
        match parameter {
            EngineParameter::WindowLog(log) => self
                .inner
                .set_parameter(DParameter::WindowLogMax(log))
                .is_ok(),
            EngineParameter::Quality(_) => false,
        }
    }

    fn decompress_stream(
        &mut self,
        available_in: &mut usize,
        input: &[u8],
        available_out: &mut usize,
        output: &mut [u8],
    ) -> NativeCode {
        let mut src = InBuffer::around(&input[..*available_in]);
        let out_len = (*available_out).min(output.len());
        let mut dst = OutBuffer::around(&mut output[..out_len]);

        let result = self.inner.run(&mut src, &mut dst);

        let consumed = src.pos;
        let produced = dst.pos();
        *available_in -= consumed;
        *available_out -= produced;

        match result {
            // A zero hint means the frame is fully decoded and flushed.
            Ok(0) => {
                self.finished = true;
                self.more_output = false;
                NativeCode::StreamEnd
            }
            Ok(_) => {
                self.more_output = produced == out_len;
                if self.more_output {
                    NativeCode::NeedsMoreOutput
                } else {
                    NativeCode::NeedsMoreInput
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
