use common::OrderId;
use criterion::{Criterion, criterion_group, criterion_main};
use event_bus::{DomainEvent, Envelope, EventBus, EventPayload, InMemoryEventBus, OrderCreated};

fn order_created() -> OrderCreated {
    OrderCreated {
        order_id: OrderId::new(),
        customer_id: "bench-customer".to_string(),
        item_name: "Benchmark Widget".to_string(),
        quantity: 3,
        total_price: 29.97,
    }
}

fn bench_encode(c: &mut Criterion) {
    let payload = order_created();

    c.bench_function("envelope/encode", |b| {
        b.iter(|| {
            Envelope::new(OrderCreated::EVENT_TYPE, &payload)
                .unwrap()
                .to_bytes()
                .unwrap()
        });
    });
}

fn bench_decode(c: &mut Criterion) {
    let bytes = Envelope::new(OrderCreated::EVENT_TYPE, &order_created())
        .unwrap()
        .to_bytes()
        .unwrap();

    c.bench_function("envelope/decode_typed", |b| {
        b.iter(|| {
            let envelope = Envelope::from_bytes(&bytes).unwrap();
            DomainEvent::from_envelope(&envelope)
        });
    });
}

fn bench_in_memory_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let bus = InMemoryEventBus::new();
    let envelope = Envelope::new(OrderCreated::EVENT_TYPE, &order_created()).unwrap();

    c.bench_function("bus/in_memory_publish_unbound", |b| {
        b.iter(|| {
            rt.block_on(async { bus.publish(envelope.clone()).await.unwrap() });
        });
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_in_memory_publish);
criterion_main!(benches);
