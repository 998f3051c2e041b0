//! Aggregation kernel benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;

use vector_agg::{
    new_aggregate, AggOp, ColumnChunk, GroupByExecutor, GroupedChunk, KeyKind, UngroupedChunk,
};

const ROWS: usize = 1 << 20;
const CHUNK_ROWS: usize = 1 << 16;

fn make_doubles(rows: usize) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..rows)
        .map(|_| {
            if rng.gen_bool(0.05) {
                f64::NAN
            } else {
                rng.gen_range(-1000.0..1000.0)
            }
        })
        .collect()
}

fn make_timestamps(rows: usize) -> Vec<i64> {
    let mut rng = StdRng::seed_from_u64(43);
    (0..rows).map(|_| rng.gen_range(0..86_400_000_000i64)).collect()
}

fn benchmark_ungrouped(c: &mut Criterion) {
    let data = make_doubles(ROWS);
    let mut group = c.benchmark_group("ungrouped");
    group.sample_size(20);

    for (name, op) in [
        ("sum", AggOp::SumDouble),
        ("avg", AggOp::AvgDouble),
        ("min", AggOp::MinDouble),
    ] {
        for workers in [1usize, 4] {
            group.bench_with_input(
                BenchmarkId::new(name, workers),
                &workers,
                |b, &workers| {
                    b.iter(|| {
                        let funcs =
                            vec![new_aggregate(op, KeyKind::RawInt, 0, workers).unwrap()];
                        let mut exec = GroupByExecutor::new(funcs, workers).unwrap();
                        let chunks: Vec<UngroupedChunk> = data
                            .chunks(CHUNK_ROWS)
                            .map(|chunk| UngroupedChunk {
                                values: vec![ColumnChunk::from_f64s(chunk)],
                                size_hint: 8,
                            })
                            .collect();
                        exec.run_ungrouped(&chunks).unwrap();
                        black_box(exec.ungrouped_value(0).unwrap());
                    });
                },
            );
        }
    }

    group.finish();
}

fn benchmark_grouped_by_hour(c: &mut Criterion) {
    let stamps = make_timestamps(ROWS);
    let values = make_doubles(ROWS);
    let mut group = c.benchmark_group("grouped_hour");
    group.sample_size(10);

    for workers in [1usize, 4] {
        group.bench_with_input(
            BenchmarkId::new("avg", workers),
            &workers,
            |b, &workers| {
                b.iter(|| {
                    let funcs = vec![
                        new_aggregate(AggOp::AvgDouble, KeyKind::HourBucket, 0, workers).unwrap(),
                    ];
                    let mut exec = GroupByExecutor::new(funcs, workers).unwrap();
                    let chunks: Vec<GroupedChunk> = stamps
                        .chunks(CHUNK_ROWS)
                        .zip(values.chunks(CHUNK_ROWS))
                        .map(|(k, v)| GroupedChunk {
                            keys: ColumnChunk::from_i64s(k),
                            key_width_shift: 3,
                            values: vec![ColumnChunk::from_f64s(v)],
                        })
                        .collect();
                    exec.run_grouped(&chunks).unwrap();
                    black_box(exec.result_table().unwrap().size());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_ungrouped, benchmark_grouped_by_hour);
criterion_main!(benches);
