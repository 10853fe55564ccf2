//! Environment decoder
//!
//! Adapts a [`Request`] to [`tokio_util::codec::Decoder`] so a connection can be
//! read through `FramedRead`, yielding one [`Environ`] per request.
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
//! let mut buffer = BytesMut::from(&b"GET / HTTP/1.1\r\n\r\n"[..]);
//! let environ = decoder.decode(&mut buffer);
//! ```

use std::sync::Arc;

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::debug;

use crate::protocol::{BaseEnviron, Environ, ParseError, RequestError};
use crate::request::{ConnectionId, Request};

/// A decoder turning the byte stream of a connection into environments.
///
/// Every buffered byte is fed to the current request and consumed. After a request
/// completes the decoder resets it, so bytes of the next request stay buffered
/// until the next `decode` call.
#[derive(Debug)]
pub struct EnvironDecoder {
    request: Request,
}

impl EnvironDecoder {
    pub fn new(connection: ConnectionId, client_addr: &str) -> Self {
        Self { request: Request::new(connection, client_addr) }
    }

    pub fn with_base(connection: ConnectionId, client_addr: &str, base: Arc<BaseEnviron>) -> Self {
        Self { request: Request::with_base(connection, client_addr, base) }
    }

    /// The request currently being received.
    pub fn request(&self) -> &Request {
        &self.request
    }
}

impl Decoder for EnvironDecoder {
    type Item = Environ;
    type Error = RequestError;

    /// Attempts to decode an environment from the provided buffer
    ///
    /// # Returns
    ///
    /// - `Ok(Some(_))`: a request was completed
    /// - `Ok(None)`: need more data to proceed
    /// - `Err(_)`: the request was rejected, the error carries its [`ErrorCode`]
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let consumed = self.request.feed(&src[..]);
        src.advance(consumed);

        if self.request.parse_finished() {
            // bytes after the message belong to the next request
            let environ = self.request.take_environ();
            self.request.reset();
            return Ok(environ);
        }

        match self.request.error_code() {
            Some(code) => {
                let cause = self.request.parse_error().map_or_else(|| format!("{code:?}"), ParseError::to_string);
                Err(RequestError::rejected(code, cause))
            }
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(environ) => Ok(Some(environ)),
            None => {
                if self.request.has_started() {
                    debug!(request_id = self.request.id(), "connection closed in the middle of a request");
                }
                buf.clear();
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::{PATH_INFO, REQUEST_METHOD};
    use crate::protocol::{ErrorCode, ServerConfig};
    use indoc::indoc;

    fn decoder() -> EnvironDecoder {
        let base = Arc::new(BaseEnviron::new(&ServerConfig::default()));
        EnvironDecoder::with_base(ConnectionId::new(1), "127.0.0.1", base)
    }

    #[test]
    fn need_more_data() {
        let mut decoder = decoder();
        let mut buffer = BytesMut::from(&b"GET /index.html HTTP/1.1\r\nHost: loc"[..]);

        assert!(decoder.decode(&mut buffer).unwrap().is_none());
        assert!(buffer.is_empty());
        assert!(decoder.request().has_started());

        buffer.extend_from_slice(b"alhost\r\n\r\n");
        let environ = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(environ.get_str("HTTP_HOST"), Some("localhost"));
        assert!(!decoder.request().has_started());
    }

    #[test]
    fn keep_alive_requests() {
        let mut decoder = decoder();
        let text = indoc! {r##"
        GET /first HTTP/1.1
        Host: localhost

        POST /second HTTP/1.1
        Content-Length: 3

        abc"##};
        let mut buffer = BytesMut::from(text.as_bytes());

        let first = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(first.get_str(PATH_INFO), Some("/first"));
        assert!(!buffer.is_empty());

        let second = decoder.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(second.get_str(PATH_INFO), Some("/second"));
        assert_eq!(second.get_str(REQUEST_METHOD), Some("POST"));
        assert!(buffer.is_empty());

        assert!(decoder.decode(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn rejected_request() {
        let mut decoder = decoder();
        let mut buffer = BytesMut::from(&b"GET / HTTP/1.1\r\nContent-Length: 1x\r\n\r\n"[..]);

        let error = decoder.decode(&mut buffer).unwrap_err();
        assert_eq!(error.error_code(), Some(ErrorCode::BadRequest));
    }

    #[test]
    fn eof_discards_partial_request() {
        let mut decoder = decoder();
        let mut buffer = BytesMut::from(&b"GET / HTT"[..]);

        assert!(decoder.decode_eof(&mut buffer).unwrap().is_none());
        assert!(buffer.is_empty());
    }
}
