//! Request ingestion codec
//!
//! Turns raw connection bytes into a finished [`Environ`](crate::protocol::Environ).
//!
//! # Architecture
//!
//! - [`Tokenizer`]: incremental HTTP/1.x tokenizer reporting fragments through
//!   [`Callbacks`]
//! - [`RequestBuilder`]: assembles fragments into environment entries, copying
//!   each header once
//! - [`EnvironDecoder`]: [`tokio_util::codec::Decoder`] over a
//!   [`Request`](crate::Request), for use with `FramedRead`
//!
//! # Example
//!
//! ```no_run
//! use micro_environ::codec::EnvironDecoder;
//! use micro_environ::ConnectionId;
//! use tokio_util::codec::Decoder;
//! use bytes::BytesMut;
//!
//! let mut decoder = EnvironDecoder::new(ConnectionId::new(1), "127.0.0.1");
//! let mut buffer = BytesMut::new();
//! let environ = decoder.decode(&mut buffer);
//! ```

mod builder;
mod environ_decoder;
mod tokenizer;

pub use builder::ChunkCallbacks;
pub use builder::RequestBuilder;
pub use environ_decoder::EnvironDecoder;
pub use tokenizer::Callbacks;
pub use tokenizer::Tokenizer;
