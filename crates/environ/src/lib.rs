//! Incremental HTTP/1.x request ingestion into a CGI style environment
//!
//! This crate turns the raw bytes of a client connection into an [`Environ`]: a
//! key/value description of the request (`PATH_INFO`, `QUERY_STRING`, `HTTP_*`
//! headers, the body stream, ...) layered over a process-wide base environment.
//! Bytes arrive in arbitrary chunks; every header is copied exactly once, even when
//! it is split across chunks.
//!
//! # Example
//!
//! ```no_run
//! use micro_environ::{ConnectionId, Request};
//! use micro_environ::protocol::initialize;
//!
//! initialize("0.0.0.0", 8080);
//!
//! let mut request = Request::new(ConnectionId::new(1), "127.0.0.1");
//! let chunk = b"GET /hello?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n";
//! let consumed = request.feed(chunk);
//!
//! match request.error_code() {
//!     Some(code) => println!("answer with {}", code.status_code()),
//!     None if request.parse_finished() => {
//!         let environ = request.take_environ().unwrap();
//!         println!("path {:?}", environ.get_str("PATH_INFO"));
//!     }
//!     None => assert_eq!(consumed, chunk.len()),
//! }
//! ```
//!
//! With tokio, [`connection::EnvironConnection`] reads a connection through
//! `FramedRead` and yields one environment per request.
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`codec`]: tokenizer, request builder and the `tokio_util` decoder
//! - [`protocol`]: environment types, base environment and errors
//! - [`connection`]: async connection driver
//! - [`Request`]: per-request state fed by the connection
//!
//! # Error Handling
//!
//! A request that can't be parsed becomes terminal with an [`ErrorCode`]:
//!
//! - [`ErrorCode::BadRequest`]: malformed request text or path escapes
//! - [`ErrorCode::LengthRequired`]: body bytes without a non-zero `Content-Length`
//! - [`ErrorCode::ServerError`]: the body buffer could not be allocated
//!
//! # Limitations
//!
//! - HTTP/1.0 and HTTP/1.1 only
//! - No chunked request bodies, no pipelining
//! - The whole body is buffered before the environment is handed out
//!
//! [`Environ`]: protocol::Environ
//! [`ErrorCode`]: protocol::ErrorCode
//! [`ErrorCode::BadRequest`]: protocol::ErrorCode::BadRequest
//! [`ErrorCode::LengthRequired`]: protocol::ErrorCode::LengthRequired
//! [`ErrorCode::ServerError`]: protocol::ErrorCode::ServerError

pub mod codec;
pub mod connection;
pub mod protocol;

mod request;
pub use request::BoxError;
pub use request::ConnectionId;
pub use request::Request;
pub use request::ResponseBody;

mod utils;
pub(crate) use utils::ensure;
