//! Benchmarks for parsing and indexing pages of growing size

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use livesite_core::sections::SectionIndexer;
use livesite_core::{Config, Document};

/// A page with `sections` containers, each holding a heading run.
fn create_page(sections: usize) -> String {
    let mut body = String::new();
    for i in 0..sections {
        body.push_str(&format!(
            r#"<div id="block-{i}" class="row">
    <h2>Section {i}</h2>
    <p>Mathematics, technology and human progress, part {i}.</p>
    <p>Simple rules create complex systems &amp; surprising results.</p>
    <h3>Detail {i}</h3>
    <ul><li>one</li><li>two</li><li>three</li></ul>
</div>
"#
        ));
    }
    format!(
        r#"<!DOCTYPE html><html><head><title>Bench</title>
<meta name="description" content="benchmark page"></head>
<body>{body}<div class="modifications"><h2>Evolving Thoughts</h2></div>
<footer><span id="last-update">Never</span></footer></body></html>"#
    )
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for sections in [10, 100, 1000] {
        let page = create_page(sections);
        group.throughput(Throughput::Bytes(page.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sections), &page, |b, page| {
            b.iter(|| Document::parse(black_box(page)));
        });
    }
    group.finish();
}

fn bench_index(c: &mut Criterion) {
    let config = Config::default();
    let Ok(indexer) = SectionIndexer::from_config(&config) else {
        return;
    };
    let mut group = c.benchmark_group("index");
    for sections in [10, 100, 1000] {
        let Ok(doc) = Document::parse(&create_page(sections)) else {
            continue;
        };
        group.bench_with_input(BenchmarkId::from_parameter(sections), &doc, |b, doc| {
            b.iter(|| indexer.index(black_box(doc)));
        });
    }
    group.finish();
}

fn bench_serialize(c: &mut Criterion) {
    let Ok(doc) = Document::parse(&create_page(1000)) else {
        return;
    };
    c.bench_function("serialize_1000", |b| b.iter(|| black_box(&doc).serialize()));
}

criterion_group!(benches, bench_parse, bench_index, bench_serialize);
criterion_main!(benches);
