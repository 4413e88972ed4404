//! Brotli engine backed by the pure-Rust `brotli` crate

use ::brotli::enc::encode::{
    BrotliEncoderOperation, BrotliEncoderParameter, BrotliEncoderStateStruct,
};
use ::brotli::enc::StandardAlloc;
use ::brotli::{BrotliDecompressStream, BrotliResult, BrotliState};

use super::registry::EngineFactory;
use super::{
    left_after, Codec, CodecVersion, DecoderEngine, EncoderEngine, EngineParameter, FlushOp,
    NativeCode,
};
use crate::error::Result;
use crate::io::options::CodecOptions;

const VERSION: CodecVersion = CodecVersion {
    codec: Codec::Brotli,
    library: "brotli",
    version: "8",
};

pub struct BrotliFactory;

pub static FACTORY: BrotliFactory = BrotliFactory;

impl EngineFactory for BrotliFactory {
    fn codec(&self) -> Codec {
        Codec::Brotli
    }

    fn version(&self) -> CodecVersion {
        VERSION
    }

    fn new_encoder(&self, _options: &CodecOptions) -> Result<Box<dyn EncoderEngine>> {
        Ok(Box::new(BrotliEncoder::new()))
    }

    fn new_decoder(&self, _options: &CodecOptions) -> Result<Box<dyn DecoderEngine>> {
        Ok(Box::new(BrotliDecoder::new()))
    }
}

pub struct BrotliEncoder {
    state: BrotliEncoderStateStruct<StandardAlloc>,
    more_output: bool,
    finished: bool,
}

impl BrotliEncoder {
    pub fn new() -> Self {
        Self {
            state: BrotliEncoderStateStruct::new(StandardAlloc::default()),
            more_output: false,
            finished: false,
        }
    }
}

impl Default for BrotliEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderEngine for BrotliEncoder {
    fn set_parameter(&mut self, parameter: EngineParameter) -> bool {
        match parameter {
            EngineParameter::Quality(quality) => match u32::try_from(quality) {
                Ok(q) => self
                    .state
                    .set_parameter(BrotliEncoderParameter::BROTLI_PARAM_QUALITY, q),
                Err(_) => false,
            },
            EngineParameter::WindowLog(lgwin) => self
                .state
                .set_parameter(BrotliEncoderParameter::BROTLI_PARAM_LGWIN, lgwin),
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
        let operation = match op {
            FlushOp::Process => BrotliEncoderOperation::BROTLI_OPERATION_PROCESS,
            FlushOp::Flush => BrotliEncoderOperation::BROTLI_OPERATION_FLUSH,
            FlushOp::Finish => BrotliEncoderOperation::BROTLI_OPERATION_FINISH,
        };
        let mut in_offset = 0;
        let mut out_offset = 0;
        let mut total_out = None;

        let ok = self.state.compress_stream(
            operation,
            available_in,
            input,
            &mut in_offset,
            available_out,
            output,
            &mut out_offset,
            &mut total_out,
            &mut |_, _, _, _| (),
        );

        self.more_output = self.state.has_more_output();
        self.finished = self.state.is_finished();

        if !ok {
            NativeCode::Error("encoder rejected the operation".to_owned())
        } else if self.finished {
            NativeCode::StreamEnd
        } else if self.more_output {
            NativeCode::NeedsMoreOutput
        } else {
            NativeCode::Ok
        }
    }

    fn has_more_output(&self) -> bool {
        self.more_output
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

pub struct BrotliDecoder {
    state: BrotliState<StandardAlloc, StandardAlloc, StandardAlloc>,
    more_output: bool,
    finished: bool,
}

impl BrotliDecoder {
    pub fn new() -> Self {
        Self {
            state: BrotliState::new(
                StandardAlloc::default(),
                StandardAlloc::default(),
                StandardAlloc::default(),
            ),
            more_output: false,
            finished: false,
        }
    }
}

impl Default for BrotliDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl DecoderEngine for BrotliDecoder {
    fn set_parameter(&mut self, parameter: EngineParameter) -> bool {
        // The decoder accepts any standard window; nothing to configure.
        matches!(parameter, EngineParameter::WindowLog(10..=24))
    }

    fn decompress_stream(
        &mut self,
        available_in: &mut usize,
        input: &[u8],
        available_out: &mut usize,
        output: &mut [u8],
    ) -> NativeCode {
        let mut in_offset = 0;
        let mut out_offset = 0;
        let mut written = 0;
        let offered_in = *available_in;

        let result = BrotliDecompressStream(
            available_in,
            &mut in_offset,
            input,
            available_out,
            &mut out_offset,
            output,
            &mut written,
            &mut self.state,
        );
        *available_in = left_after(offered_in, in_offset as u64);

        self.more_output = matches!(result, BrotliResult::NeedsMoreOutput);
        match result {
            BrotliResult::ResultSuccess => {
                self.finished = true;
                NativeCode::StreamEnd
            }
            BrotliResult::NeedsMoreInput => NativeCode::NeedsMoreInput,
            BrotliResult::NeedsMoreOutput => NativeCode::NeedsMoreOutput,
            BrotliResult::ResultFailure => NativeCode::Error("corrupt brotli stream".to_owned()),
        }
    }

    fn has_more_output(&self) -> bool {
        self.more_output
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoder_reports_finished_after_finish() {
        let mut encoder = BrotliEncoder::new();
        assert!(encoder.set_parameter(EngineParameter::Quality(5)));

        let input = b"hello brotli";
        let mut out = vec![0u8; 128];
        let mut avail_in = input.len();
        let mut avail_out = out.len();
        let code = encoder.compress_stream(
            FlushOp::Finish,
            &mut avail_in,
            input,
            &mut avail_out,
            &mut out,
        );

        assert_eq!(code, NativeCode::StreamEnd);
        assert_eq!(avail_in, 0);
        assert!(avail_out < 128);
        assert!(encoder.is_finished());
    }

    #[test]
    fn test_decoder_wants_more_input_on_truncated_stream() {
        let input = b"brotli brotli brotli brotli".repeat(8);
        let mut encoder = BrotliEncoder::new();
        let mut compressed = vec![0u8; 256];
        let mut avail_in = input.len();
        let mut avail_out = compressed.len();
        encoder.compress_stream(
            FlushOp::Finish,
            &mut avail_in,
            &input,
            &mut avail_out,
            &mut compressed,
        );
        let len = compressed.len() - avail_out;

        let mut decoder = BrotliDecoder::new();
        let half = &compressed[..len / 2];
        let mut out = vec![0u8; 512];
        let mut avail_in = half.len();
        let mut avail_out = out.len();
        let code = decoder.decompress_stream(&mut avail_in, half, &mut avail_out, &mut out);

        assert_eq!(code, NativeCode::NeedsMoreInput);
        assert_eq!(avail_in, 0);
        assert!(!decoder.is_finished());
    }
}
