use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flapjack_suggest::query::similarity::prefix_edit_distance;
use flapjack_suggest::{
    build_suggester, IndexBackend, SuggestConfig, SuggestData, SuggestRecord, Suggester, TagFilter,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const WORDS: &[&str] = &[
    "wireless", "headphones", "charger", "laptop", "gaming", "keyboard", "mouse", "monitor",
    "speaker", "camera", "running", "shoes", "jacket", "backpack", "bottle", "coffee", "grinder",
    "desk", "lamp", "phone", "case", "cable", "adapter", "organic", "green", "tea",
];

fn records(count: usize) -> Vec<SuggestRecord> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|i| {
            let words: Vec<&str> = (0..rng.gen_range(2..=4))
                .map(|_| WORDS[rng.gen_range(0..WORDS.len())])
                .collect();
            SuggestRecord::new(format!("{} {}", words.join(" "), i), rng.gen_range(0..10_000))
                .with_tag(if i % 3 == 0 { "sale" } else { "regular" })
        })
        .collect()
}

fn suggester(backend: IndexBackend, count: usize) -> Suggester {
    let config = SuggestConfig {
        index_backend: backend,
        ..SuggestConfig::default()
    };
    build_suggester(
        "bench",
        vec![SuggestData::from_records("bench", records(count))],
        config,
    )
    .unwrap()
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    group.sample_size(10);
    for backend in [IndexBackend::Trie, IndexBackend::Tantivy] {
        group.throughput(Throughput::Elements(20_000));
        group.bench_with_input(
            BenchmarkId::new(format!("{:?}", backend), 20_000),
            &backend,
            |b, backend| b.iter(|| suggester(*backend, 20_000)),
        );
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let filter = TagFilter::new(["sale"]);
    for backend in [IndexBackend::Trie, IndexBackend::Tantivy] {
        let s = suggester(backend, 20_000);
        let name = format!("{:?}", backend);
        group.bench_function(format!("{}/prefix", name), |b| {
            b.iter(|| s.query("wire", &TagFilter::default(), 10).unwrap())
        });
        group.bench_function(format!("{}/prefix_filtered", name), |b| {
            b.iter(|| s.query("gam", &filter, 10).unwrap())
        });
        group.bench_function(format!("{}/fuzzy", name), |b| {
            b.iter(|| s.query("wirless headphnes", &TagFilter::default(), 10).unwrap())
        });
    }
    group.finish();
}

fn bench_similarity(c: &mut Criterion) {
    c.bench_function("prefix_edit_distance", |b| {
        b.iter(|| prefix_edit_distance("wirless", "wireless headphones with charger"))
    });
}

criterion_group!(benches, bench_build, bench_query, bench_similarity);
criterion_main!(benches);
