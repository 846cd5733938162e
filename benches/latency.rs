//! Criterion benchmarks for the hot paths.
//!
//! Measures:
//! - Submit order (no match)
//! - Submit order (full match) at varying depth
//! - Cancel order
//! - Mixed workload
//! - ITCH message parsing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pulsebook::itch::{MessageHandler, Parser};
use pulsebook::{EngineConfig, ItchFeed, MatchEngine, OrderType, Side};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

fn engine(pool_size: u32) -> MatchEngine {
    MatchEngine::new(EngineConfig {
        pool_size,
        ..EngineConfig::default()
    })
}

/// Benchmark: order that rests (no matching)
fn bench_submit_no_match(c: &mut Criterion) {
    let mut engine = engine(4_000_000);
    let mut order_id = 0u64;

    c.bench_function("submit_no_match", |b| {
        b.iter(|| {
            order_id += 1;
            black_box(engine.submit_order(
                order_id,
                9_000, // below any asks
                100,
                Side::Buy,
                OrderType::Limit,
                0,
                0,
            ))
        })
    });
}

/// Benchmark: order that fully matches against pre-seeded depth
fn bench_submit_full_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_full_match");

    for depth in [1u64, 10, 100].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            let mut engine = engine(1_000_000);
            let mut maker_id = 0u64;
            let mut taker_id = 1_000_000_000u64;

            b.iter(|| {
                // Re-seed the asks consumed by the previous iteration
                for _ in 0..depth {
                    maker_id += 1;
                    engine.submit_order(maker_id, 10_000, 100, Side::Sell, OrderType::Limit, 0, 0);
                }
                taker_id += 1;
                let result = engine.submit_order(
                    taker_id,
                    10_000,
                    100 * depth,
                    Side::Buy,
                    OrderType::Limit,
                    0,
                    0,
                );
                engine.get_trades();
                black_box(result)
            })
        });
    }
    group.finish();
}

/// Benchmark: cancel of a resting order
fn bench_cancel(c: &mut Criterion) {
    let mut engine = engine(4_000_000);
    let mut next_id = 0u64;

    c.bench_function("cancel_order", |b| {
        b.iter(|| {
            next_id += 1;
            engine.submit_order(next_id, 9_500, 100, Side::Buy, OrderType::Limit, 0, 0);
            black_box(engine.cancel_order(next_id))
        })
    });
}

/// Benchmark: realistic mixed workload (70% place / 30% cancel)
fn bench_mixed_workload(c: &mut Criterion) {
    c.bench_function("mixed_workload", |b| {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut engine = engine(1_000_000);
        let mut live: Vec<u64> = Vec::with_capacity(100_000);
        let mut next_id = 0u64;

        b.iter(|| {
            if rng.gen_bool(0.7) || live.is_empty() {
                next_id += 1;
                let side = if rng.gen_bool(0.5) { Side::Buy } else { Side::Sell };
                let price = rng.gen_range(9_900..10_100) * 100;
                let qty = rng.gen_range(1..1_000);
                let result =
                    engine.submit_order(next_id, price, qty, side, OrderType::Limit, 0, 0);
                if result.is_accepted() && !result.is_filled() {
                    live.push(next_id);
                }
                engine.get_trades();
            } else {
                let pick = rng.gen_range(0..live.len());
                let id = live.swap_remove(pick);
                black_box(engine.cancel_order(id));
            }
        })
    });
}

struct NullHandler;
impl MessageHandler for NullHandler {}

fn add_order_bytes(order_ref: u64) -> Vec<u8> {
    let mut buf = vec![b'A', 0, 1, 0, 0, 0, 0, 0, 0, 0, 1];
    buf.extend_from_slice(&order_ref.to_be_bytes());
    buf.push(b'B');
    buf.extend_from_slice(&100u32.to_be_bytes());
    buf.extend_from_slice(b"AAPL    ");
    buf.extend_from_slice(&1_500_000u32.to_be_bytes());
    buf
}

/// Benchmark: raw decode throughput over a pre-built message stream
fn bench_itch_parse(c: &mut Criterion) {
    let mut stream = Vec::new();
    for i in 0..1_000u64 {
        stream.extend(add_order_bytes(i + 1));
    }

    let mut group = c.benchmark_group("itch_parse");
    group.throughput(Throughput::Bytes(stream.len() as u64));
    group.bench_function("parse_1000_adds", |b| {
        b.iter(|| {
            let mut parser = Parser::new();
            let mut handler = NullHandler;
            black_box(parser.parse_messages(&stream, &mut handler))
        })
    });
    group.finish();
}

/// Benchmark: decode + apply through per-symbol books
fn bench_itch_apply(c: &mut Criterion) {
    let mut stream = Vec::new();
    for i in 0..1_000u64 {
        stream.extend(add_order_bytes(i + 1));
    }

    let mut group = c.benchmark_group("itch_apply");
    group.throughput(Throughput::Elements(1_000));
    group.bench_function("apply_1000_adds", |b| {
        b.iter(|| {
            let mut feed = ItchFeed::with_pool_size(4_096);
            black_box(feed.process(&stream))
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_submit_no_match,
    bench_submit_full_match,
    bench_cancel,
    bench_mixed_workload,
    bench_itch_parse,
    bench_itch_apply
);
criterion_main!(benches);
