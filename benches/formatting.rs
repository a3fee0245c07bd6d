use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use crdt_formatting::{Anchor, Formatting, Position, TimestampMark};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct BenchPos(u64);

impl Position for BenchPos {
    fn min_pos() -> Self {
        BenchPos(0)
    }

    fn max_pos() -> Self {
        BenchPos(u64::MAX)
    }
}

fn positions(count: u64) -> Vec<BenchPos> {
    let step = u64::MAX / (count + 1);
    (1..=count).map(|i| BenchPos(i * step)).collect()
}

fn overlapping_marks(positions: &[BenchPos]) -> Vec<TimestampMark<BenchPos>> {
    let keys = ["bold", "italic", "url", "comment"];
    (0..512usize)
        .map(|i| {
            let start = (i * 37) % (positions.len() - 1);
            let end = (start + 1 + (i * 13) % 40).min(positions.len() - 1);
            TimestampMark {
                start: Anchor::before(positions[start]),
                end: Anchor::before(positions[end]),
                key: keys[i % keys.len()].into(),
                value: json!(i),
                creator: "bench".into(),
                timestamp: (i + 1) as u32,
            }
        })
        .collect()
}

fn populated(marks: &[TimestampMark<BenchPos>]) -> Formatting<TimestampMark<BenchPos>> {
    let mut formatting = Formatting::new();
    for mark in marks.iter().cloned() {
        formatting.add_mark(mark).unwrap();
    }
    formatting
}

pub fn bench(c: &mut Criterion) {
    let positions = positions(1024);
    let marks = overlapping_marks(&positions);

    c.bench_function("add 512 overlapping marks", |b| {
        b.iter(|| black_box(populated(&marks).len()))
    });

    c.bench_function("enumerate formatted spans", |b| {
        let formatting = populated(&marks);
        b.iter(|| black_box(formatting.formatted_spans().len()))
    });

    c.bench_function("resolve every position", |b| {
        let formatting = populated(&marks);
        b.iter(|| {
            let mut keys = 0;
            for pos in &positions {
                keys += formatting.get_format(pos).unwrap().len();
            }
            black_box(keys)
        })
    });
}

criterion_group!(benches, bench);
criterion_main!(benches);
