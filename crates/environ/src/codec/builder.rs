//! Assembles tokenizer callbacks into a finished [`Environ`].
//!
//! # Fragment tracking
//!
//! A header name, a header value or a part of the request target may reach the
//! builder as several fragments. Pending tokens are tracked as `(start, len)`
//! offsets into the chunk being executed; a continuation fragment from the same
//! chunk only grows the length:
//!
//! ```text
//!   [ first fragment ] ...stuff... [ continuation ]
//!   ^---------- A -----------------^------ B ------^
//!   len = A + B
//! ```
//!
//! Bytes are copied once, when the token is materialized. The only exception is a
//! token still pending when a chunk ends: its range is spilled into an owned buffer
//! so the chunk can be released, and later fragments append to that buffer.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::{Method, Version};
use tracing::trace;

use crate::codec::tokenizer::{Callbacks, Tokenizer};
use crate::protocol::header::{
    HTTP_FRAGMENT, PATH_INFO, QUERY_STRING, REMOTE_ADDR, REQUEST_METHOD, SERVER_PROTOCOL, WSGI_INPUT,
};
use crate::protocol::{BaseEnviron, EnvKey, EnvValue, Environ, Input, ParseError, base_environ, normalize_header_name};
use crate::utils::unquote_path;

const HTTP_1_1: &str = "HTTP/1.1";
const HTTP_1_0: &str = "HTTP/1.0";
const GET: &str = "GET";

/// A token that may span several fragments.
#[derive(Debug, Default)]
struct PendingToken {
    pending: bool,
    /// `(start, len)` inside the current chunk
    range: Option<(usize, usize)>,
    /// bytes of earlier chunks
    spilled: BytesMut,
}

impl PendingToken {
    fn is_pending(&self) -> bool {
        self.pending
    }

    fn start(&mut self, offset: usize, len: usize) {
        self.spilled.clear();
        self.range = Some((offset, len));
        self.pending = true;
    }

    fn extend(&mut self, offset: usize, len: usize) {
        self.range = match self.range {
            Some((start, _)) => Some((start, (offset - start) + len)),
            // first fragment inside a new chunk
            None => Some((offset, len)),
        };
    }

    fn spill(&mut self, chunk: &[u8]) {
        if let Some((start, len)) = self.range.take() {
            self.spilled.extend_from_slice(&chunk[start..start + len]);
        }
    }

    fn take(&mut self, chunk: &[u8]) -> Bytes {
        self.pending = false;
        if self.spilled.is_empty() {
            return match self.range.take() {
                Some((start, len)) => Bytes::copy_from_slice(&chunk[start..start + len]),
                None => Bytes::new(),
            };
        }

        self.spill(chunk);
        self.spilled.split().freeze()
    }

}

/// Per-request accumulator behind the tokenizer callbacks.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    entries: HashMap<EnvKey, EnvValue>,
    field: PendingToken,
    value: PendingToken,
    path: PendingToken,
    query: PendingToken,
    fragment: PendingToken,
    target_done: bool,
    body: Option<Vec<u8>>,
    base: Option<Arc<BaseEnviron>>,
    environ: Option<Environ>,
    parse_finished: bool,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Completes environments with `base` instead of the process-wide snapshot.
    pub fn with_base(base: Arc<BaseEnviron>) -> Self {
        Self { base: Some(base), ..Default::default() }
    }

    /// Drops every per-message state, keeping the configured base.
    pub fn reset(&mut self) {
        let base = self.base.take();
        *self = Self { base, ..Default::default() };
    }

    pub fn is_finished(&self) -> bool {
        self.parse_finished
    }

    pub fn environ(&self) -> Option<&Environ> {
        self.environ.as_ref()
    }

    pub fn take_environ(&mut self) -> Option<Environ> {
        self.environ.take()
    }

    /// Binds the builder to one chunk for the duration of a tokenizer run.
    pub fn callbacks<'c, 'b>(&'b mut self, chunk: &'c [u8], client_addr: &'b Bytes) -> ChunkCallbacks<'c, 'b> {
        ChunkCallbacks { builder: self, chunk, client_addr }
    }
}

/// The [`Callbacks`] of a [`RequestBuilder`] bound to the chunk being executed.
#[derive(Debug)]
pub struct ChunkCallbacks<'c, 'b> {
    builder: &'b mut RequestBuilder,
    chunk: &'c [u8],
    client_addr: &'b Bytes,
}

impl ChunkCallbacks<'_, '_> {
    /// Moves pending ranges out of the chunk; must run before the chunk is released.
    pub fn finish(self) {
        let builder = self.builder;
        for token in [&mut builder.field, &mut builder.value, &mut builder.path, &mut builder.query, &mut builder.fragment] {
            token.spill(self.chunk);
        }
    }

    fn offset_of(&self, fragment: &[u8]) -> usize {
        let offset = fragment.as_ptr() as usize - self.chunk.as_ptr() as usize;
        debug_assert!(offset + fragment.len() <= self.chunk.len(), "fragment outside of the chunk");
        offset
    }

    fn track(&self, token: &mut PendingToken, fragment: &[u8]) {
        let offset = self.offset_of(fragment);
        if token.is_pending() {
            token.extend(offset, fragment.len());
        } else {
            token.start(offset, fragment.len());
        }
    }

    /// Materializes the request target once it is complete.
    fn finish_target(&mut self) -> Result<(), ParseError> {
        if self.builder.target_done {
            return Ok(());
        }
        self.builder.target_done = true;

        let path = if self.builder.path.is_pending() {
            let raw = self.builder.path.take(self.chunk);
            Bytes::from(unquote_path(&raw).ok_or(ParseError::InvalidPath)?)
        } else {
            // absolute-form target without a path
            Bytes::from_static(b"/")
        };
        self.builder.entries.insert(Cow::Borrowed(PATH_INFO), EnvValue::Str(path));

        let query = if self.builder.query.is_pending() { self.builder.query.take(self.chunk) } else { Bytes::new() };
        self.builder.entries.insert(Cow::Borrowed(QUERY_STRING), EnvValue::Str(query));

        if self.builder.fragment.is_pending() {
            let fragment = self.builder.fragment.take(self.chunk);
            self.builder.entries.insert(Cow::Borrowed(HTTP_FRAGMENT), EnvValue::Str(fragment));
        }

        Ok(())
    }

    /// Stores the pending (field, value) pair.
    fn flush_header(&mut self) {
        let name = self.builder.field.take(self.chunk);
        let value = self.builder.value.take(self.chunk);
        // trailing whitespace is not part of the value
        let end = value.iter().rposition(|&b| !matches!(b, b' ' | b'\t')).map_or(0, |last| last + 1);
        let value = value.slice(..end);
        let key = normalize_header_name(&name);
        trace!(%key, value_len = value.len(), "flush header");

        // a repeated header replaces the earlier value
        self.builder.entries.insert(key, EnvValue::Str(value));
    }
}

impl<'c> Callbacks<'c> for ChunkCallbacks<'c, '_> {
    fn on_message_begin(&mut self, _parser: &Tokenizer) -> Result<(), ParseError> {
        let base = self.builder.base.take();
        *self.builder = RequestBuilder { base, ..Default::default() };
        Ok(())
    }

    fn on_path(&mut self, _parser: &Tokenizer, fragment: &'c [u8]) -> Result<(), ParseError> {
        let mut path = std::mem::take(&mut self.builder.path);
        self.track(&mut path, fragment);
        self.builder.path = path;
        Ok(())
    }

    fn on_query_string(&mut self, _parser: &Tokenizer, fragment: &'c [u8]) -> Result<(), ParseError> {
        let mut query = std::mem::take(&mut self.builder.query);
        self.track(&mut query, fragment);
        self.builder.query = query;
        Ok(())
    }

    fn on_fragment(&mut self, _parser: &Tokenizer, fragment: &'c [u8]) -> Result<(), ParseError> {
        let mut url_fragment = std::mem::take(&mut self.builder.fragment);
        self.track(&mut url_fragment, fragment);
        self.builder.fragment = url_fragment;
        Ok(())
    }

    fn on_header_field(&mut self, _parser: &Tokenizer, fragment: &'c [u8]) -> Result<(), ParseError> {
        self.finish_target()?;

        let offset = self.offset_of(fragment);
        if self.builder.value.is_pending() {
            // a new header starts, store the previous one
            self.flush_header();
            self.builder.field.start(offset, fragment.len());
        } else if self.builder.field.is_pending() {
            self.builder.field.extend(offset, fragment.len());
        } else {
            self.builder.field.start(offset, fragment.len());
        }
        Ok(())
    }

    fn on_header_value(&mut self, _parser: &Tokenizer, fragment: &'c [u8]) -> Result<(), ParseError> {
        let offset = self.offset_of(fragment);
        if self.builder.value.is_pending() {
            self.builder.value.extend(offset, fragment.len());
        } else {
            self.builder.value.start(offset, fragment.len());
        }
        Ok(())
    }

    fn on_headers_complete(&mut self, _parser: &Tokenizer) -> Result<(), ParseError> {
        self.finish_target()?;

        if self.builder.field.is_pending() {
            self.flush_header();
        }
        Ok(())
    }

    fn on_body(&mut self, parser: &Tokenizer, fragment: &'c [u8]) -> Result<(), ParseError> {
        if self.builder.body.is_none() {
            let length = match parser.content_length() {
                Some(length) if length > 0 => length,
                _ => return Err(ParseError::LengthRequired),
            };
            let requested = usize::try_from(length).map_err(|_e| ParseError::BodyBuffer { requested: usize::MAX })?;

            let mut buffer = Vec::new();
            buffer.try_reserve_exact(requested).map_err(|_e| ParseError::BodyBuffer { requested })?;
            trace!(capacity = requested, "created body buffer");
            self.builder.body = Some(buffer);
        }

        let body = self.builder.body.get_or_insert_with(Vec::new);
        body.try_reserve(fragment.len()).map_err(|_e| ParseError::BodyBuffer { requested: body.len() + fragment.len() })?;
        body.extend_from_slice(fragment);
        Ok(())
    }

    fn on_message_complete(&mut self, parser: &Tokenizer) -> Result<(), ParseError> {
        let protocol = if parser.version() == Some(Version::HTTP_11) { HTTP_1_1 } else { HTTP_1_0 };
        let method = match parser.method() {
            Some(method) if *method != Method::GET => Bytes::copy_from_slice(method.as_str().as_bytes()),
            _ => Bytes::from_static(GET.as_bytes()),
        };
        let input = self.builder.body.take().map_or_else(Input::empty, |body| Input::new(Bytes::from(body)));

        let entries = &mut self.builder.entries;
        entries.insert(Cow::Borrowed(SERVER_PROTOCOL), EnvValue::from_static(protocol));
        entries.insert(Cow::Borrowed(REQUEST_METHOD), EnvValue::Str(method));
        entries.insert(Cow::Borrowed(REMOTE_ADDR), EnvValue::Str(self.client_addr.clone()));
        entries.insert(Cow::Borrowed(WSGI_INPUT), EnvValue::Input(input));

        let base = self.builder.base.clone().unwrap_or_else(base_environ);
        let entries = std::mem::take(&mut self.builder.entries);
        self.builder.environ = Some(Environ::new(entries, base));
        self.builder.parse_finished = true;

        trace!("message complete");
        Ok(())
    }
}
