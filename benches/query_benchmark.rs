use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use pagedex::core::config::Config;
use pagedex::fs::memory::MemoryFileSystem;
use pagedex::page::{Mount, PageCache};
use pagedex::query::parser::parse_statement;
use pagedex::IndexEngine;
use rand::Rng;
use std::sync::Arc;

/// Helper to build a site of `count` pages with a few attributes each
fn create_site(count: usize) -> Arc<MemoryFileSystem> {
    let mut rng = rand::thread_rng();
    let fs = Arc::new(MemoryFileSystem::new("bench"));
    let sections = ["blog", "news", "docs", "guides"];
    for i in 0..count {
        let section = sections[i % sections.len()];
        let kind = if i % 3 == 0 { "page" } else { "post" };
        let raw = format!(
            "---\ntype: {}\nweight: {}\ntags: [t{}, t{}]\n---\nPage {} body text.",
            kind,
            rng.gen_range(0..100),
            i % 7,
            i % 11,
            i
        );
        fs.insert(&format!("{}/page{}.md", section, i), raw.into_bytes());
    }
    fs
}

fn create_engine(count: usize) -> Arc<IndexEngine> {
    let engine = Arc::new(IndexEngine::open(Config::default()).unwrap());
    let cache = PageCache::new(engine.formats().clone(), "en")
        .with_mount(Mount::new("/", create_site(count)))
        .with_indexer(engine.clone());
    cache.rebuild();
    engine
}

/// Benchmark statement compilation without the cache
fn bench_parse(c: &mut Criterion) {
    let text = r#"((.Type == "post") AND ((.Section != "blog") OR (.Title =~ m/^Page 1/i))) LIMIT 10 OFFSET 5 ORDER BY .Weight DESC"#;
    c.bench_function("parse_statement", |b| {
        b.iter(|| parse_statement(black_box(text)).unwrap());
    });
}

/// Benchmark matching at growing index sizes
fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("perform_query");

    for count in [100, 1000, 5000].iter() {
        let engine = create_engine(*count);
        group.bench_with_input(BenchmarkId::new("equality", count), count, |b, _| {
            b.iter(|| engine.perform_query(black_box(r#"(.Type == "post")"#)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("and_or", count), count, |b, _| {
            b.iter(|| {
                engine
                    .perform_query(black_box(r#"((.Type == "post") AND ((.Section == "blog") OR (.Tags == "t3")))"#))
                    .unwrap()
            });
        });
        group.bench_with_input(BenchmarkId::new("regex_sorted_window", count), count, |b, _| {
            b.iter(|| {
                engine
                    .perform_query(black_box(r#"(.Url =~ m/page1/) LIMIT 10 OFFSET 10 ORDER BY .Weight DESC"#))
                    .unwrap()
            });
        });
    }

    group.finish();
}

/// Benchmark projections
fn bench_select(c: &mut Criterion) {
    let engine = create_engine(1000);
    let mut group = c.benchmark_group("perform_select");

    group.bench_function("distinct_count", |b| {
        b.iter(|| engine.perform_select(black_box("SELECT DISTINCT .Section, COUNT .Tags")).unwrap());
    });
    group.bench_function("within_columns", |b| {
        b.iter(|| {
            engine
                .perform_select(black_box(r#"SELECT .Weight, .Type WITHIN (.Section == "docs") LIMIT 50"#))
                .unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_parse, bench_query, bench_select);
criterion_main!(benches);
