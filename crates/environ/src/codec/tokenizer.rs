//! Incremental HTTP/1.x request tokenizer.
//!
//! The tokenizer is a byte level state machine fed with arbitrary sized chunks. It
//! never buffers request text: every syntactic unit is reported through a
//! [`Callbacks`] method as a slice borrowing the chunk currently being executed. A
//! unit interrupted by a chunk boundary is reported once per chunk it touches, so a
//! single header name may arrive as several fragments.
//!
//! # State Machine
//!
//! ```text
//! Start -> Method -> Target(Path/Query/Fragment) -> Version -> HeaderFieldStart
//!     HeaderFieldStart -> HeaderField -> HeaderValueStart -> HeaderValue -> HeaderFieldStart
//!     HeaderFieldStart -> (headers complete) -> Body | BodyUnframed | Done
//! ```
//!
//! Message framing only looks at `Content-Length`. A `Transfer-Encoding` header turns
//! every following byte into body bytes of unknown length, which is left to the
//! callbacks to reject.

use std::cmp;

use http::{Method, Version};
use tracing::trace;

use crate::ensure;
use crate::protocol::ParseError;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

const MAX_METHOD_LEN: usize = 16;
const HTTP_SLASH: &[u8] = b"HTTP/";
const CONTENT_LENGTH: &[u8] = b"content-length";
const TRANSFER_ENCODING: &[u8] = b"transfer-encoding";

/// Receiver of tokenizer events.
///
/// Fragments borrow the chunk passed to [`Tokenizer::execute`] and live exactly as
/// long as it. Returning an error stops the tokenizer: the current `execute` call
/// reports fewer consumed bytes than supplied and the tokenizer stays dead until
/// [`Tokenizer::reset`].
///
/// Every method defaults to doing nothing.
pub trait Callbacks<'a> {
    fn on_message_begin(&mut self, _parser: &Tokenizer) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_path(&mut self, _parser: &Tokenizer, _fragment: &'a [u8]) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_query_string(&mut self, _parser: &Tokenizer, _fragment: &'a [u8]) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_fragment(&mut self, _parser: &Tokenizer, _fragment: &'a [u8]) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_header_field(&mut self, _parser: &Tokenizer, _fragment: &'a [u8]) -> Result<(), ParseError> {
        Ok(())
    }

    /// Called at least once per header, with an empty fragment for an empty value.
    fn on_header_value(&mut self, _parser: &Tokenizer, _fragment: &'a [u8]) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_headers_complete(&mut self, _parser: &Tokenizer) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_body(&mut self, _parser: &Tokenizer, _fragment: &'a [u8]) -> Result<(), ParseError> {
        Ok(())
    }

    fn on_message_complete(&mut self, _parser: &Tokenizer) -> Result<(), ParseError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Method,
    TargetStart,
    Scheme,
    SchemeSlash,
    SchemeSlashSlash,
    Authority,
    Path,
    Query,
    Fragment,
    /// Matching `HTTP/`, holds the index of the next expected byte
    Version(usize),
    VersionMajor,
    VersionDot,
    VersionMinor,
    VersionEnd,
    RequestLineLf,
    HeaderFieldStart,
    HeaderField,
    HeaderValueStart,
    HeaderValue,
    HeaderValueLf,
    HeadersLf,
    /// Content-Length delimited body
    Body,
    /// Body of unknown length
    BodyUnframed,
    /// Message complete, nothing more is consumed until reset
    Done,
    Dead,
}

/// A unit of request text reported through [`Callbacks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Path,
    Query,
    Fragment,
    HeaderField,
    HeaderValue,
}

impl State {
    fn token(self) -> Option<Token> {
        match self {
            State::Path => Some(Token::Path),
            State::Query => Some(Token::Query),
            State::Fragment => Some(Token::Fragment),
            State::HeaderField => Some(Token::HeaderField),
            State::HeaderValue => Some(Token::HeaderValue),
            _ => None,
        }
    }
}

/// Headers the tokenizer interprets itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    General,
    ContentLength,
    TransferEncoding,
}

/// Case-insensitive matcher of a header name against the [`FieldKind`]s, fed byte
/// by byte so names split across chunks are still recognized.
#[derive(Debug, Clone, Copy)]
struct FieldMatcher {
    candidate: FieldKind,
    index: usize,
}

impl FieldMatcher {
    fn start(b: u8) -> Self {
        let candidate = match b.to_ascii_lowercase() {
            b'c' => FieldKind::ContentLength,
            b't' => FieldKind::TransferEncoding,
            _ => FieldKind::General,
        };
        Self { candidate, index: 1 }
    }

    fn push(&mut self, b: u8) {
        let name = match self.candidate {
            FieldKind::ContentLength => CONTENT_LENGTH,
            FieldKind::TransferEncoding => TRANSFER_ENCODING,
            FieldKind::General => return,
        };

        if name.get(self.index) == Some(&b.to_ascii_lowercase()) {
            self.index += 1;
        } else {
            self.candidate = FieldKind::General;
        }
    }

    fn finish(self) -> FieldKind {
        let matched = match self.candidate {
            FieldKind::ContentLength => self.index == CONTENT_LENGTH.len(),
            FieldKind::TransferEncoding => self.index == TRANSFER_ENCODING.len(),
            FieldKind::General => false,
        };
        if matched { self.candidate } else { FieldKind::General }
    }
}

/// Incremental tokenizer for a single HTTP/1.0 or HTTP/1.1 request.
#[derive(Debug)]
pub struct Tokenizer {
    state: State,
    method_buf: [u8; MAX_METHOD_LEN],
    method_len: usize,
    method: Option<Method>,
    major: u8,
    version: Option<Version>,
    matcher: FieldMatcher,
    field_kind: FieldKind,
    // a fragment of the current header value was reported
    value_seen: bool,
    // Content-Length value being read
    length_digits: Option<u64>,
    length_trailing: bool,
    content_length: Option<u64>,
    transfer_encoding: bool,
    body_remaining: u64,
    error: Option<ParseError>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self {
            state: State::Start,
            method_buf: [0; MAX_METHOD_LEN],
            method_len: 0,
            method: None,
            major: 0,
            version: None,
            matcher: FieldMatcher { candidate: FieldKind::General, index: 0 },
            field_kind: FieldKind::General,
            value_seen: false,
            length_digits: None,
            length_trailing: false,
            content_length: None,
            transfer_encoding: false,
            body_remaining: 0,
            error: None,
        }
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Default::default()
    }

    /// Prepares the tokenizer for the next request on the same connection.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The request method, known once the request line's first space was seen.
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    /// The protocol version, known once the request line was read.
    pub fn version(&self) -> Option<Version> {
        self.version
    }

    /// The declared `Content-Length`, if any header declared one so far.
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Returns true once the first byte of a message was seen.
    pub fn has_started(&self) -> bool {
        self.state != State::Start
    }

    /// Returns true once a whole message was tokenized.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }

    /// Returns true after a failure, until reset.
    pub fn is_dead(&self) -> bool {
        self.state == State::Dead
    }

    /// The failure that stopped the tokenizer.
    pub fn error(&self) -> Option<&ParseError> {
        self.error.as_ref()
    }

    /// Runs the state machine over `data`, reporting tokens to `callbacks`.
    ///
    /// Returns the number of bytes consumed. Anything less than `data.len()` means the
    /// request is malformed, a callback failed, or bytes followed a complete message;
    /// [`Tokenizer::error`] tells which.
    pub fn execute<'a, C: Callbacks<'a>>(&mut self, data: &'a [u8], callbacks: &mut C) -> usize {
        macro_rules! try_callback {
            ($result:expr, $position:expr) => {
                if let Err(e) = $result {
                    return self.fail(e, $position);
                }
            };
        }

        let len = data.len();
        // start of the token being read inside this chunk
        let mut mark = self.state.token().map(|_| 0);
        let mut index = 0;

        while index < len {
            match self.state {
                State::Body => {
                    let n = cmp::min(self.body_remaining, (len - index) as u64) as usize;
                    try_callback!(callbacks.on_body(self, &data[index..index + n]), index);
                    self.body_remaining -= n as u64;
                    index += n;

                    if self.body_remaining == 0 {
                        trace!("finished reading body");
                        self.state = State::Done;
                        try_callback!(callbacks.on_message_complete(self), index - 1);
                    }
                    continue;
                }
                State::BodyUnframed => {
                    try_callback!(callbacks.on_body(self, &data[index..]), index);
                    index = len;
                    continue;
                }
                State::Done => return self.fail(ParseError::TrailingData, index),
                State::Dead => return index,
                _ => {}
            }

            try_callback!(self.step(data, index, &mut mark, callbacks), index);
            index += 1;
        }

        // the token goes on in the next chunk, hand over what this one holds
        if let (Some(token), Some(start)) = (self.state.token(), mark) {
            if start < len {
                try_callback!(self.emit(token, &data[start..], callbacks), start);
            }
        }

        len
    }

    fn fail(&mut self, e: ParseError, position: usize) -> usize {
        trace!(cause = %e, position, "tokenizer stopped");
        self.state = State::Dead;
        self.error = Some(e);
        position
    }

    fn step<'a, C: Callbacks<'a>>(
        &mut self,
        data: &'a [u8],
        index: usize,
        mark: &mut Option<usize>,
        callbacks: &mut C,
    ) -> Result<(), ParseError> {
        let byte = data[index];

        match self.state {
            State::Start => match byte {
                CR | LF => {}
                b if is_token(b) => {
                    callbacks.on_message_begin(self)?;
                    self.method_buf[0] = b;
                    self.method_len = 1;
                    self.state = State::Method;
                }
                _ => return Err(ParseError::InvalidMethod),
            },

            State::Method => match byte {
                b' ' => {
                    let method =
                        Method::from_bytes(&self.method_buf[..self.method_len]).map_err(|_e| ParseError::InvalidMethod)?;
                    trace!(%method, "parsed method");
                    self.method = Some(method);
                    self.state = State::TargetStart;
                }
                b if is_token(b) => {
                    ensure!(self.method_len < MAX_METHOD_LEN, ParseError::InvalidMethod);
                    self.method_buf[self.method_len] = b;
                    self.method_len += 1;
                }
                _ => return Err(ParseError::InvalidMethod),
            },

            State::TargetStart => match byte {
                b'/' | b'*' => {
                    *mark = Some(index);
                    self.state = State::Path;
                }
                b if b.is_ascii_alphabetic() => self.state = State::Scheme,
                _ => return Err(ParseError::invalid_target("unexpected start of request target")),
            },

            State::Scheme => match byte {
                b':' => self.state = State::SchemeSlash,
                b if b.is_ascii_alphanumeric() || matches!(b, b'+' | b'-' | b'.') => {}
                _ => return Err(ParseError::invalid_target("invalid scheme")),
            },

            State::SchemeSlash => {
                ensure!(byte == b'/', ParseError::invalid_target("expected '//' after scheme"));
                self.state = State::SchemeSlashSlash;
            }

            State::SchemeSlashSlash => {
                ensure!(byte == b'/', ParseError::invalid_target("expected '//' after scheme"));
                self.state = State::Authority;
            }

            State::Authority => match byte {
                b'/' => {
                    *mark = Some(index);
                    self.state = State::Path;
                }
                b'?' => {
                    *mark = Some(index + 1);
                    self.state = State::Query;
                }
                b'#' => {
                    *mark = Some(index + 1);
                    self.state = State::Fragment;
                }
                b' ' => self.state = State::Version(0),
                b if is_target_byte(b) => {}
                _ => return Err(ParseError::invalid_target("invalid character in authority")),
            },

            State::Path | State::Query | State::Fragment => {
                let current = self.state;
                match byte {
                    b'?' if current == State::Path => {
                        self.end_token(Token::Path, data, index, mark, callbacks)?;
                        *mark = Some(index + 1);
                        self.state = State::Query;
                    }
                    b'#' if current != State::Fragment => {
                        self.end_token(self.current_token(), data, index, mark, callbacks)?;
                        *mark = Some(index + 1);
                        self.state = State::Fragment;
                    }
                    b' ' => {
                        self.end_token(self.current_token(), data, index, mark, callbacks)?;
                        self.state = State::Version(0);
                    }
                    // a request line without version is HTTP/0.9
                    CR | LF => return Err(ParseError::InvalidVersion),
                    b if is_target_byte(b) => {}
                    _ => return Err(ParseError::invalid_target("invalid character in request target")),
                }
            }

            State::Version(position) => {
                ensure!(byte == HTTP_SLASH[position], ParseError::InvalidVersion);
                self.state = if position + 1 == HTTP_SLASH.len() { State::VersionMajor } else { State::Version(position + 1) };
            }

            State::VersionMajor => {
                ensure!(byte.is_ascii_digit(), ParseError::InvalidVersion);
                self.major = byte - b'0';
                self.state = State::VersionDot;
            }

            State::VersionDot => {
                ensure!(byte == b'.', ParseError::InvalidVersion);
                self.state = State::VersionMinor;
            }

            State::VersionMinor => {
                ensure!(byte.is_ascii_digit(), ParseError::InvalidVersion);
                // HTTP/2 and HTTP/3 don't use this syntax, HTTP/0.9 has no version
                let version = match (self.major, byte - b'0') {
                    (1, 0) => Version::HTTP_10,
                    (1, 1) => Version::HTTP_11,
                    _ => return Err(ParseError::InvalidVersion),
                };
                self.version = Some(version);
                self.state = State::VersionEnd;
            }

            State::VersionEnd => match byte {
                CR => self.state = State::RequestLineLf,
                LF => self.state = State::HeaderFieldStart,
                _ => return Err(ParseError::InvalidVersion),
            },

            State::RequestLineLf => {
                ensure!(byte == LF, ParseError::InvalidVersion);
                self.state = State::HeaderFieldStart;
            }

            State::HeaderFieldStart => match byte {
                CR => self.state = State::HeadersLf,
                LF => self.headers_complete(callbacks)?,
                b' ' | b'\t' => return Err(ParseError::invalid_header("obsolete line folding")),
                b if is_token(b) => {
                    *mark = Some(index);
                    self.matcher = FieldMatcher::start(b);
                    self.state = State::HeaderField;
                }
                _ => return Err(ParseError::invalid_header("invalid character in header name")),
            },

            State::HeaderField => match byte {
                b':' => {
                    self.end_token(Token::HeaderField, data, index, mark, callbacks)?;
                    self.field_kind = self.matcher.finish();
                    self.value_seen = false;
                    self.length_digits = None;
                    self.length_trailing = false;
                    self.state = State::HeaderValueStart;
                }
                b if is_token(b) => self.matcher.push(b),
                _ => return Err(ParseError::invalid_header("invalid character in header name")),
            },

            State::HeaderValueStart => match byte {
                b' ' | b'\t' => {}
                CR | LF => {
                    *mark = Some(index);
                    self.end_header_value(data, index, mark, callbacks)?;
                    self.state = if byte == CR { State::HeaderValueLf } else { State::HeaderFieldStart };
                }
                b if is_value_byte(b) => {
                    *mark = Some(index);
                    self.value_byte(b)?;
                    self.state = State::HeaderValue;
                }
                _ => return Err(ParseError::invalid_header("invalid character in header value")),
            },

            State::HeaderValue => match byte {
                CR | LF => {
                    self.end_header_value(data, index, mark, callbacks)?;
                    self.state = if byte == CR { State::HeaderValueLf } else { State::HeaderFieldStart };
                }
                b if is_value_byte(b) => self.value_byte(b)?,
                _ => return Err(ParseError::invalid_header("invalid character in header value")),
            },

            State::HeaderValueLf => {
                ensure!(byte == LF, ParseError::invalid_header("expected LF after header value"));
                self.state = State::HeaderFieldStart;
            }

            State::HeadersLf => {
                ensure!(byte == LF, ParseError::invalid_header("expected LF after headers"));
                self.headers_complete(callbacks)?;
            }

            // handled by execute without stepping byte by byte
            State::Body | State::BodyUnframed | State::Done | State::Dead => {}
        }

        Ok(())
    }

    fn current_token(&self) -> Token {
        self.state.token().unwrap_or(Token::Path)
    }

    fn end_token<'a, C: Callbacks<'a>>(
        &mut self,
        token: Token,
        data: &'a [u8],
        index: usize,
        mark: &mut Option<usize>,
        callbacks: &mut C,
    ) -> Result<(), ParseError> {
        let start = mark.take().unwrap_or(index);
        self.emit(token, &data[start..index], callbacks)
    }

    fn emit<'a, C: Callbacks<'a>>(&mut self, token: Token, fragment: &'a [u8], callbacks: &mut C) -> Result<(), ParseError> {
        if token == Token::HeaderValue {
            // an empty value is still reported once, so every field gets its value
            if fragment.is_empty() && self.value_seen {
                return Ok(());
            }
            self.value_seen = true;
        }

        trace!(?token, len = fragment.len(), "emit token");
        match token {
            Token::HeaderValue => callbacks.on_header_value(self, fragment),
            // empty url parts carry no information, header names always start with a byte
            _ if fragment.is_empty() => Ok(()),
            Token::Path => callbacks.on_path(self, fragment),
            Token::Query => callbacks.on_query_string(self, fragment),
            Token::Fragment => callbacks.on_fragment(self, fragment),
            Token::HeaderField => callbacks.on_header_field(self, fragment),
        }
    }

    fn end_header_value<'a, C: Callbacks<'a>>(
        &mut self,
        data: &'a [u8],
        index: usize,
        mark: &mut Option<usize>,
        callbacks: &mut C,
    ) -> Result<(), ParseError> {
        self.end_token(Token::HeaderValue, data, index, mark, callbacks)?;

        match self.field_kind {
            FieldKind::ContentLength => {
                let length = self.length_digits.ok_or(ParseError::invalid_content_length("empty value"))?;
                match self.content_length {
                    Some(declared) if declared != length => {
                        return Err(ParseError::invalid_content_length("conflicting values"));
                    }
                    _ => self.content_length = Some(length),
                }
            }
            FieldKind::TransferEncoding => self.transfer_encoding = true,
            FieldKind::General => {}
        }

        self.field_kind = FieldKind::General;
        Ok(())
    }

    fn value_byte(&mut self, b: u8) -> Result<(), ParseError> {
        if self.field_kind != FieldKind::ContentLength {
            return Ok(());
        }

        match b {
            b'0'..=b'9' => {
                ensure!(!self.length_trailing, ParseError::invalid_content_length("value is not a number"));
                let length = self
                    .length_digits
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|length| length.checked_add(u64::from(b - b'0')))
                    .ok_or(ParseError::invalid_content_length("value overflows"))?;
                self.length_digits = Some(length);
            }
            b' ' | b'\t' => self.length_trailing = true,
            _ => return Err(ParseError::invalid_content_length("value is not a number")),
        }

        Ok(())
    }

    fn headers_complete<'a, C: Callbacks<'a>>(&mut self, callbacks: &mut C) -> Result<(), ParseError> {
        // refer: https://www.rfc-editor.org/rfc/rfc9112.html#name-transfer-encoding
        ensure!(
            !(self.transfer_encoding && self.content_length.is_some()),
            ParseError::invalid_content_length("transfer_encoding and content_length both present in headers")
        );

        trace!(content_length = ?self.content_length, transfer_encoding = self.transfer_encoding, "headers complete");
        callbacks.on_headers_complete(self)?;

        if self.transfer_encoding {
            self.state = State::BodyUnframed;
            return Ok(());
        }

        match self.content_length {
            Some(length) if length > 0 => {
                self.body_remaining = length;
                self.state = State::Body;
                Ok(())
            }
            _ => {
                self.state = State::Done;
                callbacks.on_message_complete(self)
            }
        }
    }
}

#[inline]
fn is_token(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^' | b'_' | b'`' | b'|' | b'~')
}

#[inline]
fn is_target_byte(b: u8) -> bool {
    b > b' ' && b != 0x7f
}

#[inline]
fn is_value_byte(b: u8) -> bool {
    b == b'\t' || (b >= b' ' && b != 0x7f)
}
