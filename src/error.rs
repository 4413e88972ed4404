//! Error taxonomy for codec sessions and stream adapters.

use std::io;

use crate::codec::Codec;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised by engine sessions, stream adapters and the block adapter.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The engine rejected the input as corrupt or reported an internal failure.
    #[error("{codec} engine reported invalid data: {detail}")]
    InvalidData { codec: Codec, detail: String },

    /// A one-shot destination buffer cannot hold the result.
    #[error("{codec} destination buffer too small ({capacity} bytes)")]
    DestinationTooSmall { codec: Codec, capacity: usize },

    /// The source ended before the decoder reached the end of the stream.
    #[error("{codec} stream truncated before the end of compressed data")]
    Truncated { codec: Codec },

    /// The session or adapter has been disposed.
    #[error("codec session has been disposed")]
    Disposed,

    /// The compressed stream has already been completed; no more input is accepted.
    #[error("compressed stream already completed")]
    Completed,

    /// An earlier async operation was abandoned before it finished.
    #[error("another operation is in progress or was abandoned mid-flight")]
    OperationInProgress,

    /// The operation was cancelled at an I/O boundary.
    #[error("operation cancelled")]
    Cancelled,

    /// The engine handle could not be created.
    #[error("failed to create {codec} engine: {detail}")]
    EngineCreation { codec: Codec, detail: String },

    /// A codec parameter is outside the range the engine accepts.
    #[error("invalid {codec} parameter {name} = {value}")]
    InvalidParameter {
        codec: Codec,
        name: &'static str,
        value: i64,
    },

    /// The codec is not compiled in, or does not support the requested mode.
    #[error("{0} is not supported by this build")]
    Unsupported(Codec),

    /// The underlying source reported more bytes than it was offered room for.
    #[error("source reported {reported} bytes read into a {capacity} byte buffer")]
    SourceOverrun { reported: usize, capacity: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl CodecError {
    pub(crate) fn invalid_data(codec: Codec, detail: impl Into<String>) -> Self {
        CodecError::InvalidData {
            codec,
            detail: detail.into(),
        }
    }

    pub(crate) fn engine_creation(codec: Codec, detail: impl std::fmt::Display) -> Self {
        CodecError::EngineCreation {
            codec,
            detail: detail.to_string(),
        }
    }

    /// The `io::ErrorKind` this error maps to when surfaced through `Read`/`Write`.
    pub fn kind(&self) -> io::ErrorKind {
        match self {
            CodecError::InvalidData { .. } | CodecError::SourceOverrun { .. } => {
                io::ErrorKind::InvalidData
            }
            CodecError::DestinationTooSmall { .. } => io::ErrorKind::WriteZero,
            CodecError::Truncated { .. } => io::ErrorKind::UnexpectedEof,
            CodecError::InvalidParameter { .. } => io::ErrorKind::InvalidInput,
            CodecError::Unsupported(_) => io::ErrorKind::Unsupported,
            CodecError::Io(err) => err.kind(),
            CodecError::Disposed
            | CodecError::Completed
            | CodecError::OperationInProgress
            | CodecError::Cancelled
            | CodecError::EngineCreation { .. } => io::ErrorKind::Other,
        }
    }
}

impl From<CodecError> for io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(inner) => inner,
            other => io::Error::new(other.kind(), other),
        }
    }
}
