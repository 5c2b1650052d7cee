//! # Event Core Benchmarks
//!
//! Hot paths on every event:
//!
//! | Crate | Path |
//! |-------|------|
//! | ev-01 Schema Validation | cached validator, valid and invalid payloads |
//! | ev-02 Event Publisher | validate + append on the in-memory broker |
//! | ev-06 Webhook Ingress | HMAC verification, idempotency key derivation |
//! | shared-bus | TTL store insert-if-absent |

use axum::http::HeaderMap;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ev_01_schema_validation::{SchemaRegistry, SchemaValidation};
use ev_02_event_publisher::{EventPublisher, EventPublishing};
use ev_06_webhook_ingress::{sign, verify, IdempotencyCache};
use event_runtime::handlers::register_builtin_schemas;
use event_runtime::handlers::schemas::HRV_RAW_RECEIVED;
use serde_json::json;
use shared_bus::{InMemoryStreamBroker, StreamBroker, StreamResolver, TtlStore};
use shared_types::{EventEnvelope, Topic};
use std::sync::Arc;
use std::time::Duration;

fn registry() -> Arc<SchemaRegistry> {
    let registry = Arc::new(SchemaRegistry::new());
    register_builtin_schemas(&registry).expect("built-in schemas");
    registry
}

fn bench_schema_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("ev-01-schema-validation");
    let registry = registry();

    let valid = json!({"rmssd": 42.5, "measuredAt": "2024-05-01T06:30:00Z", "source": "chest-strap"});
    let invalid = json!({"rmssd": "high"});

    // Warm the compiled validator cache.
    registry.validate(HRV_RAW_RECEIVED, &valid);

    group.bench_function("validate_valid", |b| {
        b.iter(|| black_box(registry.validate(HRV_RAW_RECEIVED, black_box(&valid)).valid))
    });
    group.bench_function("validate_invalid", |b| {
        b.iter(|| black_box(registry.validate(HRV_RAW_RECEIVED, black_box(&invalid)).valid))
    });
    group.finish();
}

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("ev-02-event-publisher");
    group.measurement_time(Duration::from_secs(10));

    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");
    let broker = InMemoryStreamBroker::new();
    let resolver = StreamResolver::shared("BENCH_EVENTS");
    rt.block_on(broker.ensure_stream(&resolver.stream_spec("BENCH_EVENTS")))
        .expect("stream");
    let publisher = EventPublisher::new(Arc::new(broker), registry(), resolver);
    let topic = Topic::new(HRV_RAW_RECEIVED).expect("topic");

    group.throughput(Throughput::Elements(1));
    group.bench_function("publish_valid", |b| {
        b.iter(|| {
            let event = EventEnvelope::new(
                &topic,
                "athlete-1",
                json!({"rmssd": 42.5, "measuredAt": "2024-05-01T06:30:00Z"}),
            );
            rt.block_on(publisher.publish(&topic, &event)).expect("publish")
        })
    });
    group.finish();
}

fn bench_webhook_signature(c: &mut Criterion) {
    let mut group = c.benchmark_group("ev-06-webhook-ingress");
    let secret = b"whsec_benchmark";

    for size in [256usize, 4 * 1024, 64 * 1024] {
        let body = vec![b'x'; size];
        let header = sign(secret, &body);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("hmac_verify", size), &body, |b, body| {
            b.iter(|| black_box(verify(secret, black_box(body), &header)))
        });
        group.bench_with_input(BenchmarkId::new("content_hash_key", size), &body, |b, body| {
            b.iter(|| black_box(IdempotencyCache::key_for(&HeaderMap::new(), secret, body)))
        });
    }
    group.finish();
}

fn bench_ttl_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("shared-bus-ttl-store");

    group.bench_function("insert_if_absent_fresh", |b| {
        let store = TtlStore::new(Duration::from_secs(300));
        let mut n = 0u64;
        b.iter(|| {
            n += 1;
            black_box(store.insert_if_absent(&format!("id:{n}")))
        })
    });

    group.bench_function("insert_if_absent_duplicate", |b| {
        let store = TtlStore::new(Duration::from_secs(300));
        store.insert_if_absent("id:dup");
        b.iter(|| black_box(store.insert_if_absent(black_box("id:dup"))))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_schema_validation,
    bench_publish,
    bench_webhook_signature,
    bench_ttl_store,
);
criterion_main!(benches);
