pub mod block;
pub mod buffer;
pub mod options;
pub mod stream_compress;

#[cfg(feature = "async")]
pub mod async_stream;

pub use block::*;
pub use buffer::*;
pub use options::*;
pub use stream_compress::*;

#[cfg(feature = "async")]
pub use async_stream::*;
