//! Environment keys and header name normalization.
//!
//! Client headers land in the environment as `HTTP_<UPPER_SNAKE_NAME>`, except
//! `Content-Length` and `Content-Type` which keep their spelling and are handed
//! out as shared constants.

use std::borrow::Cow;

pub const PATH_INFO: &str = "PATH_INFO";
pub const QUERY_STRING: &str = "QUERY_STRING";
pub const HTTP_FRAGMENT: &str = "HTTP_FRAGMENT";
pub const SERVER_PROTOCOL: &str = "SERVER_PROTOCOL";
pub const REQUEST_METHOD: &str = "REQUEST_METHOD";
pub const REMOTE_ADDR: &str = "REMOTE_ADDR";
pub const SERVER_NAME: &str = "SERVER_NAME";
pub const SERVER_PORT: &str = "SERVER_PORT";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";

pub const WSGI_VERSION: &str = "wsgi.version";
pub const WSGI_URL_SCHEME: &str = "wsgi.url_scheme";
pub const WSGI_ERRORS: &str = "wsgi.errors";
pub const WSGI_MULTITHREAD: &str = "wsgi.multithread";
pub const WSGI_MULTIPROCESS: &str = "wsgi.multiprocess";
pub const WSGI_RUN_ONCE: &str = "wsgi.run_once";
pub const WSGI_INPUT: &str = "wsgi.input";

const HTTP_PREFIX: &[u8] = b"HTTP_";

/// Maps a raw header name to its environment key.
///
/// Allocates once for every name except the two content headers; callers invoke
/// it once per logical header, never per fragment.
pub fn normalize_header_name(raw: &[u8]) -> Cow<'static, str> {
    if raw.eq_ignore_ascii_case(CONTENT_LENGTH.as_bytes()) {
        return Cow::Borrowed(CONTENT_LENGTH);
    }
    if raw.eq_ignore_ascii_case(CONTENT_TYPE.as_bytes()) {
        return Cow::Borrowed(CONTENT_TYPE);
    }

    let mut key = Vec::with_capacity(raw.len() + HTTP_PREFIX.len());
    key.extend_from_slice(HTTP_PREFIX);
    key.extend(raw.iter().map(|&b| match b {
        b'-' => b'_',
        b => b.to_ascii_uppercase(),
    }));

    // the tokenizer only hands over token characters, so this is ascii in practice
    match String::from_utf8(key) {
        Ok(key) => Cow::Owned(key),
        Err(e) => Cow::Owned(String::from_utf8_lossy(e.as_bytes()).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_headers_keep_spelling() {
        for raw in ["content-length", "CONTENT-LENGTH", "Content-Length", "cOnTeNt-LeNgTh"] {
            let key = normalize_header_name(raw.as_bytes());
            assert!(matches!(key, Cow::Borrowed(CONTENT_LENGTH)), "{raw}");
        }

        for raw in ["content-type", "CONTENT-TYPE", "Content-Type"] {
            let key = normalize_header_name(raw.as_bytes());
            assert!(matches!(key, Cow::Borrowed(CONTENT_TYPE)), "{raw}");
        }
    }

    #[test]
    fn other_headers_become_upper_snake() {
        assert_eq!(normalize_header_name(b"X-Forwarded-For"), "HTTP_X_FORWARDED_FOR");
        assert_eq!(normalize_header_name(b"host"), "HTTP_HOST");
        assert_eq!(normalize_header_name(b"sec-ch-ua-mobile"), "HTTP_SEC_CH_UA_MOBILE");
        assert_eq!(normalize_header_name(b"X_Already_Snake"), "HTTP_X_ALREADY_SNAKE");
        assert_eq!(normalize_header_name(b"Accept-Encoding2"), "HTTP_ACCEPT_ENCODING2");
    }

    #[test]
    fn near_misses_are_prefixed() {
        assert_eq!(normalize_header_name(b"Content-Lengths"), "HTTP_CONTENT_LENGTHS");
        assert_eq!(normalize_header_name(b"Content_Type"), "HTTP_CONTENT_TYPE");
    }

    #[test]
    fn key_length_is_prefix_plus_name() {
        let raw = b"User-Agent";
        assert_eq!(normalize_header_name(raw).len(), raw.len() + 5);
    }
}
