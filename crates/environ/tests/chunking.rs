use std::collections::BTreeMap;
use std::sync::Arc;

use indoc::indoc;
use micro_environ::protocol::header::{CONTENT_LENGTH, CONTENT_TYPE, HTTP_FRAGMENT, PATH_INFO, QUERY_STRING, REQUEST_METHOD};
use micro_environ::protocol::{BaseEnviron, EnvValue, Environ, ErrorCode, ServerConfig};
use micro_environ::{ConnectionId, Request};

fn request() -> Request {
    let base = Arc::new(BaseEnviron::new(&ServerConfig::new("chunking.test", 8000)));
    Request::with_base(ConnectionId::new(42), "203.0.113.9", base)
}

/// Every string entry plus the body, comparable across runs.
fn snapshot(environ: &Environ) -> BTreeMap<String, Vec<u8>> {
    environ
        .iter()
        .filter_map(|(key, value)| match value {
            EnvValue::Str(bytes) => Some((key.to_string(), bytes.to_vec())),
            EnvValue::Input(input) => Some((key.to_string(), input.remaining().to_vec())),
            _ => None,
        })
        .collect()
}

fn feed_all<'a, I: IntoIterator<Item = &'a [u8]>>(request: &mut Request, chunks: I) -> BTreeMap<String, Vec<u8>> {
    for chunk in chunks {
        assert_eq!(request.feed(chunk), chunk.len());
    }
    assert!(request.parse_finished());
    assert_eq!(request.error_code(), None);
    snapshot(request.environ().unwrap())
}

const POST: &str = indoc! {r##"
    POST /form/submit%21?x=1&y=%20 HTTP/1.1
    Host: 127.0.0.1:8080
    User-Agent: curl/7.79.1
    X-Forwarded-For: 10.0.0.1, 10.0.0.2
    content-type: application/x-www-form-urlencoded
    CONTENT-LENGTH: 19
    X-Empty:
    Accept: */*

    name=micro&age=1234"##};

#[test]
fn every_two_way_split_builds_the_same_environ() {
    let bytes = POST.as_bytes();
    let expected = feed_all(&mut request(), [bytes]);

    assert_eq!(expected[PATH_INFO], b"/form/submit!");
    assert_eq!(expected[QUERY_STRING], b"x=1&y=%20");
    assert_eq!(expected[CONTENT_TYPE], b"application/x-www-form-urlencoded");
    assert_eq!(expected[CONTENT_LENGTH], b"19");
    assert_eq!(expected["HTTP_X_FORWARDED_FOR"], b"10.0.0.1, 10.0.0.2");
    assert_eq!(expected["HTTP_X_EMPTY"], b"");
    assert_eq!(expected["wsgi.input"], b"name=micro&age=1234");

    for split in 1..bytes.len() {
        let (left, right) = bytes.split_at(split);
        assert_eq!(feed_all(&mut request(), [left, right]), expected, "split at {split}");
    }
}

#[test]
fn three_way_splits_and_single_bytes() {
    let bytes = POST.as_bytes();
    let expected = feed_all(&mut request(), [bytes]);

    for first in (1..bytes.len() - 1).step_by(7) {
        for second in (first + 1..bytes.len()).step_by(5) {
            let chunks = [&bytes[..first], &bytes[first..second], &bytes[second..]];
            assert_eq!(feed_all(&mut request(), chunks), expected, "split at {first} and {second}");
        }
    }

    assert_eq!(feed_all(&mut request(), bytes.chunks(1)), expected);
}

#[test]
fn request_line_with_fragment() {
    let mut request = request();
    let environ = feed_all(&mut request, [&b"GET /a?b=c#d HTTP/1.1\r\n\r\n"[..]]);

    assert_eq!(environ[PATH_INFO], b"/a");
    assert_eq!(environ[QUERY_STRING], b"b=c");
    assert_eq!(environ[HTTP_FRAGMENT], b"d");
    assert_eq!(environ[REQUEST_METHOD], b"GET");
}

#[test]
fn content_length_keys_ignore_case() {
    for name in ["content-length", "CONTENT-LENGTH", "Content-Length"] {
        let text = format!("PUT /x HTTP/1.1\r\n{name}: 2\r\n\r\nok");
        let environ = feed_all(&mut request(), [text.as_bytes()]);
        assert_eq!(environ[CONTENT_LENGTH], b"2");
        assert!(!environ.contains_key("HTTP_CONTENT_LENGTH"));
    }
}

#[test]
fn incomplete_body_never_finishes() {
    let mut request = request();
    let text = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nabc";

    assert_eq!(request.feed(text), text.len());
    assert!(!request.parse_finished());
    assert!(request.environ().is_none());
    assert_eq!(request.error_code(), None);

    // the connection closes here, the request is dropped unseen
    request.destroy();
}

#[test]
fn body_without_declared_length() {
    let mut request = request();

    assert_eq!(request.feed(b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n"), 47);
    assert_eq!(request.feed(b"3\r\nabc\r\n0\r\n\r\n"), 0);
    assert_eq!(request.error_code(), Some(ErrorCode::LengthRequired));
}

#[test]
fn rejected_request_freezes_environ() {
    let mut request = request();
    request.feed(b"GET / HTTP/1.1\r\nX-First: 1\r\n");

    let text = b"Bad Header: 2\r\n\r\n";
    assert!(request.feed(text) < text.len());
    assert_eq!(request.error_code(), Some(ErrorCode::BadRequest));

    assert_eq!(request.feed(b"X-Later: 3\r\n\r\n"), 0);
    assert_eq!(request.error_code(), Some(ErrorCode::BadRequest));
    assert!(!request.parse_finished());
}

#[test]
fn reset_does_not_leak_previous_request() {
    let mut request = request();
    let first = feed_all(&mut request, [POST.as_bytes()]);
    assert!(first.contains_key("HTTP_USER_AGENT"));

    request.reset();
    let second = feed_all(&mut request, [&b"GET /next HTTP/1.1\r\nHost: other\r\n\r\n"[..]]);

    assert_eq!(second[PATH_INFO], b"/next");
    assert_eq!(second[QUERY_STRING], b"");
    assert_eq!(second["HTTP_HOST"], b"other");
    assert_eq!(second["wsgi.input"], b"");
    assert!(!second.contains_key("HTTP_USER_AGENT"));
    assert!(!second.contains_key(CONTENT_LENGTH));
    assert!(!second.contains_key(CONTENT_TYPE));
}

#[test]
fn absolute_form_target() {
    let with_path = feed_all(&mut request(), [&b"GET http://example.com/p%41th?q=1 HTTP/1.1\r\n\r\n"[..]]);
    assert_eq!(with_path[PATH_INFO], b"/pAth");
    assert_eq!(with_path[QUERY_STRING], b"q=1");

    let without_path = feed_all(&mut request(), [&b"GET http://example.com HTTP/1.0\r\n\r\n"[..]]);
    assert_eq!(without_path[PATH_INFO], b"/");
    assert_eq!(without_path[QUERY_STRING], b"");
}

#[test]
fn conflicting_content_length() {
    let mut request = request();
    let text = b"POST / HTTP/1.1\r\nContent-Length: 3\r\nContent-Length: 4\r\n\r\nabcd";

    assert!(request.feed(text) < text.len());
    assert_eq!(request.error_code(), Some(ErrorCode::BadRequest));
}
