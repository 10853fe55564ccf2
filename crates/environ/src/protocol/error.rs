use std::io;

use http::StatusCode;
use thiserror::Error;

/// Terminal state of a request that could not be parsed.
///
/// A [`Request`](crate::Request) carries at most one of these; it is set once and
/// never overwritten.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The tokenizer could not consume all supplied bytes, or the path was badly escaped.
    BadRequest,
    /// Body bytes arrived without a prior, non-zero `Content-Length`.
    LengthRequired,
    /// The body buffer could not grow.
    ServerError,
}

impl ErrorCode {
    /// Status line the response pipeline should answer with.
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::LengthRequired => StatusCode::LENGTH_REQUIRED,
            ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid http method")]
    InvalidMethod,

    #[error("invalid request target: {reason}")]
    InvalidTarget { reason: &'static str },

    #[error("invalid http version")]
    InvalidVersion,

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: &'static str },

    #[error("invalid content-length header: {reason}")]
    InvalidContentLength { reason: &'static str },

    #[error("invalid percent-encoding in request path")]
    InvalidPath,

    #[error("body received without a declared content-length")]
    LengthRequired,

    #[error("can't grow body buffer to {requested} bytes")]
    BodyBuffer { requested: usize },

    #[error("unexpected data after a complete message")]
    TrailingData,
}

impl ParseError {
    pub fn invalid_target(reason: &'static str) -> Self {
        Self::InvalidTarget { reason }
    }

    pub fn invalid_header(reason: &'static str) -> Self {
        Self::InvalidHeader { reason }
    }

    pub fn invalid_content_length(reason: &'static str) -> Self {
        Self::InvalidContentLength { reason }
    }

    /// The [`ErrorCode`] this failure terminates a request with.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ParseError::LengthRequired => ErrorCode::LengthRequired,
            ParseError::BodyBuffer { .. } => ErrorCode::ServerError,
            _ => ErrorCode::BadRequest,
        }
    }
}

/// Error surfaced by the [`EnvironDecoder`](crate::codec::EnvironDecoder) and the
/// [`EnvironConnection`](crate::connection::EnvironConnection).
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("request rejected with {}: {cause}", .code.status_code())]
    Rejected { code: ErrorCode, cause: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl RequestError {
    pub fn rejected<S: ToString>(code: ErrorCode, cause: S) -> Self {
        Self::Rejected { code, cause: cause.to_string() }
    }

    /// The terminal code of a rejected request, `None` for transport failures.
    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            RequestError::Rejected { code, .. } => Some(*code),
            RequestError::Io { .. } => None,
        }
    }
}
