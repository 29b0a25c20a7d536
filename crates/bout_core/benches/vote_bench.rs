use bout_core::engine::{Vote, VoteBuffer};
use bout_core::{Color, ConnectionId};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_millis(1_300);

fn filled_buffer(referees: usize, votes_each: usize, origin: Instant) -> VoteBuffer {
    let mut buf = VoteBuffer::new();
    for i in 0..votes_each {
        for r in 0..referees {
            buf.push(Vote {
                voter: ConnectionId::new(format!("ref-{r}")),
                color: if (r + i) % 2 == 0 { Color::Red } else { Color::Blue },
                points: ((r + i) % 3 + 1) as u8,
                cast_at: origin + Duration::from_millis((i * 40 + r) as u64),
            });
        }
    }
    buf
}

fn bench_take_award(c: &mut Criterion) {
    let mut group = c.benchmark_group("take_award");
    let origin = Instant::now();
    for referees in [3usize, 5, 7] {
        let template = filled_buffer(referees, 8, origin);
        let now = origin + Duration::from_millis(400);
        group.bench_with_input(BenchmarkId::from_parameter(referees), &referees, |b, &n| {
            b.iter(|| {
                let mut buf = template.clone();
                black_box(buf.take_award(now, WINDOW, n))
            })
        });
    }
    group.finish();
}

fn bench_groups(c: &mut Criterion) {
    let origin = Instant::now();
    let buf = filled_buffer(7, 16, origin);
    c.bench_function("groups_7x16", |b| b.iter(|| black_box(buf.groups())));
}

criterion_group!(benches, bench_take_award, bench_groups);
criterion_main!(benches);
