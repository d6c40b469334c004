use criterion::{black_box, criterion_group, criterion_main, Criterion};
use smtp_toolkit::codec::{decode::Decoder, ResponseCodec};

fn criterion_benchmark(c: &mut Criterion) {
    let codec = ResponseCodec::default();

    c.bench_function("parse_response_single", |b| {
        b.iter(|| codec.decode(black_box(b"250 OK\r\n")))
    });

    c.bench_function("parse_response_ehlo_keywords", |b| {
        b.iter(|| {
            codec.decode(black_box(
                b"250-example.com\r\n250-PIPELINING\r\n250-8BITMIME\r\n250 SIZE 10485760\r\n",
            ))
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
