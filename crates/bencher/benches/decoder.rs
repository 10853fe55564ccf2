use std::hint::black_box;
use bencher::{TestCase, TestFile};
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use micro_environ::codec::EnvironDecoder;
use micro_environ::protocol::{BaseEnviron, ServerConfig};
use micro_environ::{ConnectionId, Request};
use std::sync::Arc;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::Decoder;

static SMALL_HEADER: TestFile = TestFile::new("get_small.txt", include_str!("../resources/request/get_small.txt"));
static LARGE_HEADER: TestFile = TestFile::new("get_large.txt", include_str!("../resources/request/get_large.txt"));
static POST_BODY: TestFile = TestFile::new("post_body.txt", include_str!("../resources/request/post_body.txt"));

fn create_test_cases() -> Vec<TestCase> {
    vec![
        TestCase::whole("small_header", SMALL_HEADER),
        TestCase::whole("large_header", LARGE_HEADER),
        TestCase::whole("post_body", POST_BODY),
        TestCase::chunked("large_header_chunk_16", LARGE_HEADER, 16),
        TestCase::chunked("post_body_chunk_7", POST_BODY, 7),
    ]
}

fn base() -> Arc<BaseEnviron> {
    Arc::new(BaseEnviron::new(&ServerConfig::new("127.0.0.1", 8080)))
}

fn benchmark_request_feed(criterion: &mut Criterion) {
    let test_cases = create_test_cases();
    let mut group = criterion.benchmark_group("request_feed");

    for case in test_cases {
        group.throughput(Throughput::Bytes(case.file().content().len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &case, |b, case| {
            let mut request = Request::with_base(ConnectionId::new(1), "127.0.0.1", base());
            b.iter(|| {
                request.reset();
                for chunk in case.chunks() {
                    black_box(request.feed(chunk));
                }
                black_box(request.take_environ().expect("input should be a complete http request"));
            });
        });
    }

    group.finish();
}

fn benchmark_environ_decoder(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("environ_decoder");

    for case in [TestCase::whole("small_header", SMALL_HEADER), TestCase::whole("large_header", LARGE_HEADER)] {
        group.throughput(Throughput::Bytes(case.file().content().len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(case.name()), &case, |b, case| {
            let mut decoder = EnvironDecoder::with_base(ConnectionId::new(1), "127.0.0.1", base());
            b.iter_batched_ref(
                || BytesMut::from(case.file().content()),
                |bytes_mut| {
                    let environ = decoder.decode(bytes_mut).expect("input should be valid http request").unwrap();
                    black_box(environ);
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(decoder, benchmark_request_feed, benchmark_environ_decoder);
criterion_main!(decoder);
