use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::collections::BTreeMap;
use std::sync::Arc;

use portico_core::Verb;
use portico_infra::{
    InMemoryCacheStore, InMemoryServiceStore, Payload, ServiceDescriptor, ServiceRegistry,
    ServiceTypeRegistry,
};

fn setup_registry(services: u64) -> ServiceRegistry {
    let store = InMemoryServiceStore::with_services(
        (1..=services).map(|id| ServiceDescriptor::new(id, format!("svc{id}"), "echo")),
    )
    .unwrap();
    ServiceRegistry::new(
        Arc::new(store),
        Arc::new(InMemoryCacheStore::new()),
        Arc::new(ServiceTypeRegistry::with_builtin_types()),
    )
}

/// Warm lookups: everything served from the instance map and cache.
fn bench_get_service(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_service");

    group.bench_function("warm", |b| {
        let registry = setup_registry(10);
        registry.get_service("svc1").unwrap();
        b.iter(|| registry.get_service(black_box("svc1")).unwrap());
    });

    group.bench_function("after_purge", |b| {
        let registry = setup_registry(10);
        b.iter(|| {
            registry.purge("svc1").unwrap();
            registry.get_service(black_box("svc1")).unwrap()
        });
    });

    group.finish();
}

fn bench_id_name_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("id_name_map");

    for services in [10u64, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*services));
        group.bench_with_input(
            BenchmarkId::new("name_by_id", services),
            services,
            |b, &n| {
                let registry = setup_registry(n);
                let id = portico_core::ServiceId::new(n);
                b.iter(|| registry.service_name_by_id(black_box(id)).unwrap());
            },
        );
    }

    group.finish();
}

fn bench_handle_request(c: &mut Criterion) {
    let registry = setup_registry(10);
    c.bench_function("handle_request_echo", |b| {
        b.iter(|| {
            registry
                .handle_request(
                    "svc3",
                    Verb::Get,
                    black_box("ping"),
                    BTreeMap::new(),
                    BTreeMap::new(),
                    Payload::Empty,
                    None,
                )
                .unwrap()
        });
    });
}

criterion_group!(benches, bench_get_service, bench_id_name_map, bench_handle_request);
criterion_main!(benches);
