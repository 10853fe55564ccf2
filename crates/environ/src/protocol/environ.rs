//! The finished environment handed to the application layer.

use std::borrow::Cow;
use std::collections::HashMap;
use std::collections::hash_map;
use std::io::{self, BufRead, Read, Write};
use std::iter::FusedIterator;
use std::sync::Arc;

use bytes::{Buf, Bytes};
use http_body_util::Full;

use crate::protocol::BaseEnviron;

pub type EnvKey = Cow<'static, str>;

/// A single environment value.
#[derive(Debug, Clone)]
pub enum EnvValue {
    /// Opaque byte string: paths, header values, addresses, protocol names.
    Str(Bytes),
    /// Calling convention version as `(major, minor)`.
    Version(u8, u8),
    Bool(bool),
    /// The request body stream.
    Input(Input),
    /// The error output stream.
    Errors(ErrorStream),
}

impl EnvValue {
    pub fn from_static(value: &'static str) -> Self {
        EnvValue::Str(Bytes::from_static(value.as_bytes()))
    }

    /// Returns the bytes of a [`EnvValue::Str`] value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            EnvValue::Str(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns a [`EnvValue::Str`] value as utf-8 text.
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            EnvValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_input(&self) -> Option<&Input> {
        match self {
            EnvValue::Input(input) => Some(input),
            _ => None,
        }
    }
}

impl PartialEq<&str> for EnvValue {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == Some(other.as_bytes())
    }
}

/// Readable stream over a fully received request body.
///
/// Cloning is cheap: clones share the body bytes but read independently.
#[derive(Debug, Clone, Default)]
pub struct Input {
    body: Bytes,
}

impl Input {
    pub fn new(body: Bytes) -> Self {
        Self { body }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Bytes not read yet.
    pub fn remaining(&self) -> &Bytes {
        &self.body
    }

    pub fn is_empty(&self) -> bool {
        !self.body.has_remaining()
    }

    /// Converts the unread part of the stream into an `http_body::Body`.
    pub fn into_body(self) -> Full<Bytes> {
        Full::new(self.body)
    }
}

impl Read for Input {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(self.body.remaining());
        self.body.copy_to_slice(&mut buf[..len]);
        Ok(len)
    }
}

impl BufRead for Input {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        Ok(self.body.chunk())
    }

    fn consume(&mut self, amt: usize) {
        self.body.advance(amt);
    }
}

/// Error output stream shared by every environment; writes go to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorStream;

impl Write for ErrorStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

/// The finished key/value description of one request.
///
/// Request specific entries shadow the shared [`BaseEnviron`] snapshot; lookups
/// and iteration see the union of both.
#[derive(Debug, Clone)]
pub struct Environ {
    entries: HashMap<EnvKey, EnvValue>,
    base: Arc<BaseEnviron>,
}

impl Environ {
    pub(crate) fn new(entries: HashMap<EnvKey, EnvValue>, base: Arc<BaseEnviron>) -> Self {
        Self { entries, base }
    }

    pub fn get(&self, key: &str) -> Option<&EnvValue> {
        self.entries.get(key).or_else(|| self.base.get(key))
    }

    /// Shortcut for the utf-8 text of a string entry.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(EnvValue::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key) || self.base.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.base.iter().filter(|(key, _)| !self.entries.contains_key(&**key)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The base snapshot this environment was completed with.
    pub fn base(&self) -> &Arc<BaseEnviron> {
        &self.base
    }

    /// Takes the body stream out of the environment, leaving an empty one behind.
    pub fn take_input(&mut self) -> Input {
        match self.entries.get_mut(crate::protocol::header::WSGI_INPUT) {
            Some(EnvValue::Input(input)) => std::mem::replace(input, Input::empty()),
            _ => Input::empty(),
        }
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter { entries: self.entries.iter(), base: self.base.iter(), shadow: &self.entries }
    }
}

impl<'a> IntoIterator for &'a Environ {
    type Item = (&'a str, &'a EnvValue);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over every entry of an [`Environ`], request entries first.
#[derive(Debug)]
pub struct Iter<'a> {
    entries: hash_map::Iter<'a, EnvKey, EnvValue>,
    base: std::slice::Iter<'a, (EnvKey, EnvValue)>,
    shadow: &'a HashMap<EnvKey, EnvValue>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a EnvValue);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((key, value)) = self.entries.next() {
            return Some((&**key, value));
        }

        let shadow = self.shadow;
        self.base.by_ref().map(|(key, value)| (&**key, value)).find(|(key, _)| !shadow.contains_key(*key))
    }
}

impl FusedIterator for Iter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::header::*;
    use crate::protocol::ServerConfig;

    fn sample() -> Environ {
        let mut entries = HashMap::new();
        entries.insert(Cow::Borrowed(PATH_INFO), EnvValue::from_static("/index"));
        entries.insert(Cow::Borrowed(WSGI_INPUT), EnvValue::Input(Input::new(Bytes::from_static(b"hello"))));
        entries.insert(Cow::Borrowed(SERVER_NAME), EnvValue::from_static("shadowed"));
        Environ::new(entries, Arc::new(BaseEnviron::new(&ServerConfig::new("example.org", 8080))))
    }

    #[test]
    fn lookups_prefer_request_entries() {
        let environ = sample();
        assert_eq!(environ.get_str(PATH_INFO), Some("/index"));
        assert_eq!(environ.get_str(SERVER_NAME), Some("shadowed"));
        assert_eq!(environ.get_str(SERVER_PORT), Some("8080"));
        assert_eq!(environ.get(WSGI_RUN_ONCE).and_then(EnvValue::as_bool), Some(false));
        assert!(environ.get("HTTP_HOST").is_none());
    }

    #[test]
    fn iteration_yields_union_once() {
        let environ = sample();
        let keys: Vec<_> = environ.iter().map(|(key, _)| key).collect();

        assert_eq!(keys.len(), environ.len());
        assert_eq!(keys.iter().filter(|key| **key == SERVER_NAME).count(), 1);
        assert!(keys.contains(&WSGI_VERSION));
        assert!(keys.contains(&PATH_INFO));
    }

    #[test]
    fn input_reads_body() {
        let mut environ = sample();
        let mut input = environ.take_input();

        let mut body = String::new();
        input.read_to_string(&mut body).unwrap();
        assert_eq!(body, "hello");
        assert!(input.is_empty());

        assert!(environ.take_input().is_empty());
    }

    #[tokio::test]
    async fn input_into_body() {
        use http_body_util::BodyExt;

        use http_body::Body;

        let input = Input::new(Bytes::from_static(b"payload"));
        let body = input.into_body();
        assert_eq!(body.size_hint().exact(), Some(7));

        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"payload");
    }
}
