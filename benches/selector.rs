//! Selector benchmarks
//!
//! Measures compilation, evaluation against message fields and JSON
//! payloads, and cumulative acknowledgement.
//!
//! Run with: cargo bench --bench selector

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use vibemq_delivery::delivery::{AckMode, AcknowledgementController, CreditHandler};
use vibemq_delivery::message::{Message, QoS};
use vibemq_delivery::selector::{compile, SelectorCache};

const SELECTORS: &[&str] = &[
    "temperature > 20",
    "temperature > 20 AND humidity IS NOT NULL",
    "region IN ('eu', 'us', 'apac') AND level BETWEEN 3 AND 7",
    "name LIKE 'sensor-%' OR (a + b * 2) / 3 <> 4",
    "PARSER('json', 'reading.value') >= 40.5",
];

fn random_messages(count: usize) -> Vec<Message> {
    let mut rng = StdRng::seed_from_u64(7);
    let regions = ["eu", "us", "apac", "latam"];
    (0..count as u64)
        .map(|id| {
            let reading: f64 = rng.gen_range(0.0..80.0);
            let mut builder = Message::builder(id)
                .data("level", rng.gen_range(0i64..10))
                .data("temperature", rng.gen_range(-10i64..45))
                .data("region", regions[rng.gen_range(0..regions.len())])
                .data("name", format!("sensor-{}", rng.gen_range(0..1000)))
                .data("a", rng.gen_range(0i64..100))
                .data("b", rng.gen_range(0i64..100))
                .json_payload(format!(r#"{{"reading":{{"value":{:.2}}}}}"#, reading));
            if rng.gen_bool(0.5) {
                builder = builder.data("humidity", rng.gen_range(0i64..100));
            }
            builder.build()
        })
        .collect()
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("selector_compile");
    for (i, text) in SELECTORS.iter().enumerate() {
        group.bench_with_input(BenchmarkId::from_parameter(i), text, |b, text| {
            b.iter(|| black_box(compile(text).unwrap()));
        });
    }
    group.finish();
}

fn bench_cache_hit(c: &mut Criterion) {
    let cache = SelectorCache::default();
    let held: Vec<_> = SELECTORS
        .iter()
        .map(|s| cache.get_or_compile(s).unwrap())
        .collect();

    c.bench_function("selector_cache_hit", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % SELECTORS.len();
            black_box(cache.get_or_compile(SELECTORS[i]).unwrap())
        });
    });
    drop(held);
}

fn bench_evaluate(c: &mut Criterion) {
    let messages = random_messages(1024);
    let mut group = c.benchmark_group("selector_evaluate");
    group.throughput(Throughput::Elements(messages.len() as u64));

    for (i, text) in SELECTORS.iter().enumerate() {
        let selector = compile(text).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(i), &selector, |b, selector| {
            b.iter(|| {
                let mut selected = 0usize;
                for message in &messages {
                    if selector.evaluate(message) {
                        selected += 1;
                    }
                }
                black_box(selected)
            });
        });
    }
    group.finish();
}

fn bench_cumulative_ack(c: &mut Criterion) {
    let messages: Vec<Message> = (1..=256u64)
        .map(|id| Message::builder(id).qos(QoS::AtLeastOnce).build())
        .collect();

    c.bench_function("cumulative_ack_256", |b| {
        b.iter(|| {
            let controller =
                AcknowledgementController::new(AckMode::Cumulative, CreditHandler::Fixed.create(512));
            for message in &messages {
                controller.sent(message);
            }
            black_box(controller.ack(128));
            black_box(controller.ack(256))
        });
    });
}

criterion_group!(
    benches,
    bench_compile,
    bench_cache_hit,
    bench_evaluate,
    bench_cumulative_ack,
);
criterion_main!(benches);
