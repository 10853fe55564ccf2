//! Per-connection request state.
//!
//! A [`Request`] owns everything needed to turn the bytes of one HTTP request into
//! an [`Environ`]: the tokenizer, the builder and the terminal error state. The
//! response fields are placeholders owned by the response writer; ingestion only
//! initializes them.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use http::StatusCode;
use http_body_util::combinators::BoxBody;
use tracing::{debug, trace, warn};

use crate::codec::{RequestBuilder, Tokenizer};
use crate::protocol::{BaseEnviron, Environ, ErrorCode, ParseError};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Error type of a response body.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Body produced by the application for the response writer.
pub type ResponseBody = BoxBody<Bytes, BoxError>;

/// Opaque identifier of the client connection a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The ingestion state of one HTTP request.
///
/// Fed chunk by chunk through [`Request::feed`]. Once [`Request::parse_finished`] is
/// true the environment can be taken; once [`Request::error_code`] is set the
/// request is terminal and further chunks are ignored until [`Request::reset`].
#[derive(Debug)]
pub struct Request {
    id: u64,
    connection: ConnectionId,
    client_addr: Bytes,
    tokenizer: Tokenizer,
    builder: RequestBuilder,
    error_code: Option<ErrorCode>,

    status: Option<StatusCode>,
    response_body: Option<ResponseBody>,
    response_length_unknown: bool,
    chunked_response: bool,
}

impl Request {
    /// Creates a request completed against the process-wide base environment.
    pub fn new(connection: ConnectionId, client_addr: &str) -> Self {
        Self::with_builder(connection, client_addr, RequestBuilder::new())
    }

    /// Creates a request completed against an explicit base environment.
    pub fn with_base(connection: ConnectionId, client_addr: &str, base: Arc<BaseEnviron>) -> Self {
        Self::with_builder(connection, client_addr, RequestBuilder::with_base(base))
    }

    fn with_builder(connection: ConnectionId, client_addr: &str, builder: RequestBuilder) -> Self {
        let mut request = Self {
            id: 0,
            connection,
            client_addr: Bytes::copy_from_slice(client_addr.as_bytes()),
            tokenizer: Tokenizer::new(),
            builder,
            error_code: None,
            status: None,
            response_body: None,
            response_length_unknown: true,
            chunked_response: false,
        };
        request.reset();
        request
    }

    /// Returns the request to its just-created state for the next request on the
    /// same connection. Connection and client address are kept.
    pub fn reset(&mut self) {
        self.id = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        self.tokenizer.reset();
        self.builder.reset();
        self.error_code = None;
        self.status = None;
        self.response_body = None;
        self.response_length_unknown = true;
        self.chunked_response = false;
        debug!(request_id = self.id, connection = %self.connection, "request reset");
    }

    /// Advances the request with the next chunk of bytes from the connection.
    ///
    /// Returns the number of bytes consumed. A short count means the request is now
    /// terminal and [`Request::error_code`] is set. A request that is already
    /// terminal consumes nothing.
    ///
    /// The chunk is only borrowed for the duration of the call.
    pub fn feed(&mut self, chunk: &[u8]) -> usize {
        debug_assert!(!chunk.is_empty(), "fed an empty chunk");
        if chunk.is_empty() || self.error_code.is_some() {
            return 0;
        }

        let mut callbacks = self.builder.callbacks(chunk, &self.client_addr);
        let consumed = self.tokenizer.execute(chunk, &mut callbacks);
        callbacks.finish();
        trace!(request_id = self.id, len = chunk.len(), consumed, "fed chunk");

        if consumed != chunk.len() {
            let cause = self.tokenizer.error();
            let code = cause.map_or(ErrorCode::BadRequest, ParseError::error_code);
            self.error_code = Some(code);

            match cause {
                Some(ParseError::TrailingData) => {
                    debug!(request_id = self.id, trailing = chunk.len() - consumed, "bytes after complete request");
                }
                _ => {
                    warn!(request_id = self.id, client = ?self.client_addr, ?code, cause = ?cause, "rejected request");
                }
            }
        }

        consumed
    }

    /// Releases the request and everything it holds.
    pub fn destroy(self) {
        trace!(request_id = self.id, "request destroyed");
    }

    /// Identifier used in logs, renewed on every reset.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn client_addr(&self) -> &Bytes {
        &self.client_addr
    }

    /// The terminal error, if any.
    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error_code
    }

    /// The failure behind [`Request::error_code`].
    pub fn parse_error(&self) -> Option<&ParseError> {
        self.tokenizer.error()
    }

    /// Returns true once bytes of the request were accepted.
    pub fn has_started(&self) -> bool {
        self.tokenizer.has_started()
    }

    /// Returns true once a whole request was received.
    pub fn parse_finished(&self) -> bool {
        self.builder.is_finished()
    }

    /// The finished environment, until taken.
    pub fn environ(&self) -> Option<&Environ> {
        self.builder.environ()
    }

    pub fn take_environ(&mut self) -> Option<Environ> {
        self.builder.take_environ()
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    pub fn set_response_body(&mut self, body: ResponseBody) {
        self.response_body = Some(body);
    }

    pub fn take_response_body(&mut self) -> Option<ResponseBody> {
        self.response_body.take()
    }

    /// True until the response writer learns the response length.
    pub fn response_length_unknown(&self) -> bool {
        self.response_length_unknown
    }

    pub fn set_response_length_unknown(&mut self, unknown: bool) {
        self.response_length_unknown = unknown;
    }

    pub fn chunked_response(&self) -> bool {
        self.chunked_response
    }

    pub fn set_chunked_response(&mut self, chunked: bool) {
        self.chunked_response = chunked;
    }
}
