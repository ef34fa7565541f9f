//! Benchmarks for the hot paths of the engine
//!
//! Run with: cargo bench

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pointflow::bus::PointListener;
use pointflow::check::{CheckContext, CheckWindow};
use pointflow::derived::{AggregateContext, ExpressionAggregator};
use pointflow::point::ListenerId;
use pointflow::{
    EventBus, LimitCheck, PointBuffer, PointDefinition, PointRegistry, PointValue, Tristate,
    ValueEvent,
};
use std::sync::Arc;
use std::time::Duration;

struct Sink(ListenerId);

impl PointListener for Sink {
    fn listener_id(&self) -> ListenerId {
        self.0
    }

    fn on_point_event(&self, event: &ValueEvent) -> pointflow::Result<()> {
        black_box(event.value.alarm);
        Ok(())
    }
}

fn bench_window_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("check_window");

    for len in [3usize, 10, 100].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("push_all_bad", len), len, |b, &len| {
            let mut window = CheckWindow::new(len);
            let mut i = 0u64;
            b.iter(|| {
                let state = if i % 7 == 0 { Tristate::Good } else { Tristate::Bad };
                window.push(black_box(state));
                i = i.wrapping_add(1);
                black_box(window.all_bad())
            });
        });
    }

    group.finish();
}

fn bench_limit_check_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("limit_check");

    for inputs in [1usize, 8, 64].iter() {
        let registry = PointRegistry::new();
        let buffer = PointBuffer::new();
        let now = Utc::now();
        let names: Vec<String> = (0..*inputs).map(|i| format!("rx.ch{}", i)).collect();
        for (i, name) in names.iter().enumerate() {
            registry
                .register(&PointDefinition::new(name, "rx", Duration::from_secs(1)))
                .unwrap();
            buffer.update(name, &PointValue::new(i as f64, now).with_alarm(i % 5 == 0));
        }
        let mut check = LimitCheck::new("rx.ok", Duration::from_secs(1), 3, "OK", "ALARM", names);

        group.throughput(Throughput::Elements(*inputs as u64));
        group.bench_function(BenchmarkId::new("tick", inputs), |b| {
            let mut tick = 0;
            b.iter(|| {
                let ctx = CheckContext {
                    registry: &registry,
                    lookup: &buffer,
                    now,
                    tick,
                };
                tick += 1;
                black_box(check.on_tick(&ctx))
            });
        });
    }

    group.finish();
}

fn bench_bus_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_bus");

    for listeners in [1usize, 16, 256].iter() {
        let registry = PointRegistry::new();
        let point = registry
            .register(&PointDefinition::new("rx.power", "rx", Duration::ZERO))
            .unwrap();
        let bus = EventBus::new();
        for _ in 0..*listeners {
            bus.subscribe(point.id(), Arc::new(Sink(ListenerId::next())));
        }

        group.throughput(Throughput::Elements(*listeners as u64));
        group.bench_function(BenchmarkId::new("publish", listeners), |b| {
            b.iter(|| black_box(bus.publish(&point, PointValue::now(1.0), true)));
        });
    }

    group.finish();
}

fn bench_expression(c: &mut Criterion) {
    let mut group = c.benchmark_group("expression");

    let registry = PointRegistry::new();
    let owner = registry
        .register(&PointDefinition::new("rx.power", "rx", Duration::ZERO))
        .unwrap();
    let inputs = vec![PointValue::now(48.0), PointValue::now(1.5)];

    for source in ["x0 * x1", "if x0 > 50.0 { \"HIGH\" } else { \"OK\" }"].iter() {
        let mut agg = ExpressionAggregator::compile(source).unwrap();
        group.bench_with_input(BenchmarkId::new("calculate", source), source, |b, _| {
            b.iter(|| {
                let ctx = AggregateContext {
                    owner: &owner,
                    timestamp: Utc::now(),
                };
                black_box(agg.calculate(&ctx, &inputs).unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_window_push,
    bench_limit_check_tick,
    bench_bus_fan_out,
    bench_expression,
);

criterion_main!(benches);
