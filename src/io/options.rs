//! Engine and adapter configuration
//!
//! [`CodecOptions`] selects and tunes an engine; [`StreamOptions`] sizes the
//! adapter's internal buffer and controls what happens to the underlying
//! stream on close. Both derive serde so they can be embedded in larger
//! configuration files.
//!
//! ## Level mapping
//!
//! | Level     | brotli | zstd | deflate/zlib | xz/lzma |
//! |-----------|--------|------|--------------|---------|
//! | `Fast`    | 1      | 1    | 1            | 1       |
//! | `Default` | 4      | 3    | 6            | 6       |
//! | `Best`    | 11     | 19   | 9            | 9       |
//!
//! LZ4 block compression has no level and ignores this setting.

use serde::{Deserialize, Serialize};

use super::buffer::DEFAULT_BUFFER_SIZE;
use crate::codec::{Codec, EngineParameter};
use crate::error::{CodecError, Result};

/// Compression level for streaming compression
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionLevel {
    /// Fastest compression, larger output
    Fast,
    /// Balanced compression/speed trade-off
    #[default]
    Default,
    /// Best compression, slower
    Best,
    /// Custom compression level (codec-specific)
    Custom(i32),
}

impl CompressionLevel {
    /// Convert to the codec's native quality or preset value
    pub fn to_native(self, codec: Codec) -> i32 {
        let (fast, default, best) = match codec {
            Codec::Brotli => (1, 4, 11),
            Codec::Zstd => (1, 3, 19),
            Codec::Deflate | Codec::Zlib => (1, 6, 9),
            Codec::Xz | Codec::Lzma => (1, 6, 9),
            Codec::Lz4 => (0, 0, 0),
        };
        match self {
            CompressionLevel::Fast => fast,
            CompressionLevel::Default => default,
            CompressionLevel::Best => best,
            CompressionLevel::Custom(level) => level,
        }
    }
}

/// Inclusive native quality range accepted by each codec
pub fn quality_range(codec: Codec) -> (i32, i32) {
    match codec {
        Codec::Brotli => (0, 11),
        Codec::Zstd => (-7, 22),
        Codec::Deflate | Codec::Zlib => (0, 9),
        Codec::Xz | Codec::Lzma => (0, 9),
        Codec::Lz4 => (0, 0),
    }
}

/// Inclusive window-log range accepted by each codec, if the window is tunable
pub fn window_log_range(codec: Codec) -> Option<(u32, u32)> {
    match codec {
        Codec::Brotli => Some((10, 24)),
        Codec::Zstd => Some((10, 30)),
        // flate2's default backend only supports the 32 KiB window
        Codec::Deflate | Codec::Zlib => Some((15, 15)),
        Codec::Xz | Codec::Lzma => Some((12, 30)),
        Codec::Lz4 => None,
    }
}

/// Engine selection and tuning
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecOptions {
    pub codec: Codec,
    #[serde(default)]
    pub level: CompressionLevel,
    /// Base-2 log of the window / dictionary size; `None` keeps the engine default
    #[serde(default)]
    pub window_log: Option<u32>,
}

impl CodecOptions {
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            level: CompressionLevel::Default,
            window_log: None,
        }
    }

    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_window_log(mut self, window_log: u32) -> Self {
        self.window_log = Some(window_log);
        self
    }

    /// Check the level and window against the codec's accepted ranges
    pub fn validate(&self) -> Result<()> {
        if self.codec != Codec::Lz4 {
            let quality = self.level.to_native(self.codec);
            let (min, max) = quality_range(self.codec);
            if !(min..=max).contains(&quality) {
                return Err(CodecError::InvalidParameter {
                    codec: self.codec,
                    name: "quality",
                    value: i64::from(quality),
                });
            }
        }

        if let Some(window_log) = self.window_log {
            let in_range = window_log_range(self.codec)
                .map(|(min, max)| (min..=max).contains(&window_log))
                .unwrap_or(false);
            if !in_range {
                return Err(CodecError::InvalidParameter {
                    codec: self.codec,
                    name: "window_log",
                    value: i64::from(window_log),
                });
            }
        }

        Ok(())
    }

    /// Parameters to apply to a freshly created encoder
    pub(crate) fn encoder_parameters(&self) -> Vec<EngineParameter> {
        let mut params = vec![EngineParameter::Quality(self.level.to_native(self.codec))];
        if let Some(window_log) = self.window_log {
            params.push(EngineParameter::WindowLog(window_log));
        }
        params
    }
}

/// Stream adapter configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Capacity of the adapter's internal buffer
    pub buffer_size: usize,
    /// Hand the underlying stream back on close instead of dropping it
    pub leave_open: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            leave_open: false,
        }
    }
}

impl StreamOptions {
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn leave_open(mut self, leave_open: bool) -> Self {
        self.leave_open = leave_open;
        self
    }

    /// Buffer capacity actually allocated; never zero
    pub(crate) fn effective_buffer_size(&self) -> usize {
        self.buffer_size.max(1)
    }
}
