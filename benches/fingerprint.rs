//! Request hot-path benchmarks
//!
//! Every request normalizes and fingerprints its source before the cache is
//! consulted, so these costs are paid even on a cache hit.
//!
//! Run with: `cargo bench --bench fingerprint`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::time::Duration;

use plantuml_server::diagram::{encoding, fingerprint, Normalizer, OutputFormat, RenderedDiagram};
use plantuml_server::render::{CacheConfig, RenderCache};

/// Sequence diagram with `messages` arrows and Windows line endings
fn sequence_source(messages: usize) -> String {
    let mut source = String::from("@startuml\r\nparticipant Alice\r\nparticipant Bob\r\n");
    for i in 0..messages {
        source.push_str(&format!("Alice -> Bob : message {}   \r\n", i));
        source.push_str(&format!("Bob --> Alice : reply {}\r\n", i));
    }
    source.push_str("@enduml\r\n");
    source
}

fn bench_normalize_and_fingerprint(c: &mut Criterion) {
    let normalizer = Normalizer::default();
    let mut group = c.benchmark_group("normalize_fingerprint");

    for messages in [10, 100, 1000] {
        let source = sequence_source(messages);
        group.throughput(Throughput::Bytes(source.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(messages), &source, |b, source| {
            b.iter(|| {
                let normalized = normalizer
                    .normalize(black_box(source.as_bytes()), OutputFormat::Svg)
                    .unwrap();
                black_box(fingerprint(&normalized, "PlantUML version 1.2024.7"))
            })
        });
    }

    group.finish();
}

fn bench_cache(c: &mut Criterion) {
    let normalizer = Normalizer::default();
    let cache = RenderCache::new(CacheConfig::default());
    let fingerprints: Vec<_> = (0..256)
        .map(|i| {
            let source = normalizer
                .normalize(format!("A -> B : {}", i).as_bytes(), OutputFormat::Svg)
                .unwrap();
            fingerprint(&source, "bench")
        })
        .collect();

    let artifact = Arc::new(RenderedDiagram::new(
        vec![b'x'; 8 * 1024],
        OutputFormat::Svg,
        Duration::from_millis(40),
    ));
    for fp in &fingerprints {
        cache.put(*fp, Arc::clone(&artifact));
    }

    let mut group = c.benchmark_group("render_cache");
    group.bench_function("get_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % fingerprints.len();
            black_box(cache.get(&fingerprints[i]))
        })
    });
    group.bench_function("put_replace", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % fingerprints.len();
            black_box(cache.put(fingerprints[i], Arc::clone(&artifact)))
        })
    });
    group.finish();
}

fn bench_url_decoding(c: &mut Criterion) {
    let encoded = encoding::encode(&sequence_source(100)).unwrap();

    let mut group = c.benchmark_group("encoded_url");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("decode", |b| {
        b.iter(|| black_box(encoding::decode(black_box(&encoded), 1024 * 1024).unwrap()))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_normalize_and_fingerprint,
    bench_cache,
    bench_url_decoding
);
criterion_main!(benches);
