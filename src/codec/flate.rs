//! Raw deflate and zlib engines backed by `flate2`
//!
//! The level is only known after the session applies its parameters, so the
//! native compressor is built on the first call.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

use super::registry::EngineFactory;
use super::{
    left_after, Codec, CodecVersion, DecoderEngine, EncoderEngine, EngineParameter, FlushOp,
    NativeCode,
};
use crate::error::Result;
use crate::io::options::CodecOptions;

/// Only window flate2's default backend supports
const WINDOW_LOG: u32 = 15;

const DEFAULT_LEVEL: u32 = 6;

pub struct FlateFactory {
    zlib_header: bool,
}

pub static DEFLATE_FACTORY: FlateFactory = FlateFactory { zlib_header: false };
pub static ZLIB_FACTORY: FlateFactory = FlateFactory { zlib_header: true };

impl FlateFactory {
    fn codec_of(&self) -> Codec {
        if self.zlib_header {
            Codec::Zlib
        } else {
            Codec::Deflate
        }
    }
}

impl EngineFactory for FlateFactory {
    fn codec(&self) -> Codec {
        self.codec_of()
    }

    fn version(&self) -> CodecVersion {
        CodecVersion {
            codec: self.codec_of(),
            library: "flate2",
            version: "1",
        }
    }

    fn new_encoder(&self, _options: &CodecOptions) -> Result<Box<dyn EncoderEngine>> {
        Ok(Box::new(FlateEncoder {
            zlib_header: self.zlib_header,
            level: DEFAULT_LEVEL,
            inner: None,
            more_output: false,
            draining: false,
            finished: false,
        }))
    }

    fn new_decoder(&self, _options: &CodecOptions) -> Result<Box<dyn DecoderEngine>> {
        Ok(Box::new(FlateDecoder {
            codec: self.codec_of(),
            inner: Decompress::new(self.zlib_header),
            more_output: false,
            finished: false,
        }))
    }
}

pub struct FlateEncoder {
    zlib_header: bool,
    level: u32,
    inner: Option<Compress>,
    more_output: bool,
    draining: bool,
    finished: bool,
}

impl EncoderEngine for FlateEncoder {
    fn set_parameter(&mut self, parameter: EngineParameter) -> bool {
        if self.inner.is_some() {
            return false;
        }
        match parameter {
            EngineParameter::Quality(level @ 0..=9) => {
                self.level = level as u32;
                true
            }
            EngineParameter::Quality(_) => false,
            EngineParameter::WindowLog(log) => log == WINDOW_LOG,
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
        let level = self.level;
        let zlib_header = self.zlib_header;
        let inner = self
            .inner
            .get_or_insert_with(|| Compress::new(Compression::new(level), zlib_header));

        // A sync flush that filled the output may still hold bytes; drain them
        // without asking for another (empty) sync block.
        let flush = match op {
            FlushOp::Flush if self.draining && *available_in == 0 => FlushCompress::None,
            FlushOp::Process => FlushCompress::None,
            FlushOp::Flush => FlushCompress::Sync,
            FlushOp::Finish => FlushCompress::Finish,
        };
        let in_len = *available_in;
        let out_len = *available_out;
        let before_in = inner.total_in();
        let before_out = inner.total_out();

        let result = inner.compress(&input[..in_len], &mut output[..out_len], flush);

        *available_in = left_after(in_len, inner.total_in() - before_in);
        *available_out = left_after(out_len, inner.total_out() - before_out);
        self.more_output = *available_out == 0;
        self.draining = op == FlushOp::Flush && *available_in == 0 && self.more_output;

        match result {
            Ok(Status::StreamEnd) => {
                self.finished = true;
                self.more_output = false;
                NativeCode::StreamEnd
            }
            Ok(_) if self.more_output => NativeCode::NeedsMoreOutput,
            Ok(_) => NativeCode::Ok,
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

pub struct FlateDecoder {
    codec: Codec,
    inner: Decompress,
    more_output: bool,
    finished: bool,
}

impl DecoderEngine for FlateDecoder {
    fn set_parameter(&mut self, parameter: EngineParameter) -> bool {
        matches!(parameter, EngineParameter::WindowLog(WINDOW_LOG))
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

        let result = self.inner.decompress(
            &input[..in_len],
            &mut output[..out_len],
            FlushDecompress::None,
        );

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
            Err(e) => NativeCode::Error(format!("{} stream: {e}", self.codec)),
        }
    }

    fn has_more_output(&self) -> bool {
        self.more_output
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
