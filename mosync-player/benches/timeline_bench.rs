//! Timeline Query Performance Benchmark
//!
//! Measures the queries the player runs on every position report and seek
//! against a large, nested publication.
//!
//! **Goal:** Lookups stay cheap enough to run on every audio position tick
//! **Shape:** 40 chapters x 25 sections x 20 units (20,000 units, ~11 hours)

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mosync_player::{TimelineAggregate, TimelineCursor};
use serde_json::{json, Value};

const CHAPTERS: usize = 40;
const SECTIONS: usize = 25;
const UNITS: usize = 20;
const UNIT_SECS: f64 = 2.0;

fn chapter(c: usize) -> Value {
    let href = format!("c{}.xhtml", c);
    let audio = format!("c{}.mp3", c);
    let sections: Vec<Value> = (0..SECTIONS)
        .map(|s| {
            let units: Vec<Value> = (0..UNITS)
                .map(|u| {
                    let begin = ((s * UNITS + u) as f64) * UNIT_SECS;
                    json!({
                        "nodeType": "par",
                        "children": [
                            {"nodeType": "text", "src": format!("{}#s{}u{}", href, s, u)},
                            {"nodeType": "audio", "src": audio, "clipBegin": begin, "clipEnd": begin + UNIT_SECS}
                        ]
                    })
                })
                .collect();
            json!({"nodeType": "seq", "epubType": "section", "children": units})
        })
        .collect();

    json!({
        "documentId": format!("c{}", c),
        "documentHref": href,
        "root": {"nodeType": "seq", "children": sections}
    })
}

fn publication() -> TimelineAggregate {
    let timelines: Vec<Value> = (0..CHAPTERS).map(chapter).collect();
    TimelineAggregate::from_json(&json!({ "timelines": timelines }).to_string())
        .expect("benchmark publication should load")
}

fn bench_time_queries(c: &mut Criterion) {
    let aggregate = publication();
    let total = aggregate.duration_ms();
    let mut group = c.benchmark_group("time_queries");

    group.bench_function("parallel_at", |b| {
        let mut t = 0.0;
        b.iter(|| {
            t = (t + 7_919.0) % total;
            black_box(aggregate.parallel_at(black_box(t)))
        });
    });

    group.bench_function("percent_round_trip", |b| {
        let mut percent = 0.0;
        b.iter(|| {
            percent = (percent + 3.7) % 100.0;
            let position = aggregate.percent_to_position(black_box(percent)).unwrap();
            black_box(aggregate.position_to_percent(position.tree, position.ordinal, position.offset_ms))
        });
    });

    group.finish();
}

fn bench_linearization(c: &mut Criterion) {
    let aggregate = publication();
    let tree = aggregate.tree(0).unwrap().clone();
    let mut group = c.benchmark_group("linearization");

    group.bench_function("walk_chapter_forward", |b| {
        b.iter(|| {
            let mut cursor = TimelineCursor::new(tree.clone(), 0);
            let mut count = 1;
            while cursor.next().is_some() {
                count += 1;
            }
            black_box(count)
        });
    });

    group.bench_function("find_last_fragment", |b| {
        let target = format!("s{}u{}", SECTIONS - 1, UNITS - 1);
        b.iter(|| {
            let mut cursor = TimelineCursor::new(tree.clone(), 0);
            black_box(cursor.find_by_fragment_id(black_box(&target)))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_time_queries, bench_linearization);
criterion_main!(benches);
