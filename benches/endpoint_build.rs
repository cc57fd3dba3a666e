use criterion::{black_box, criterion_group, criterion_main, Criterion};
use handlerbridge::aggregator::{EndpointSource, HandlerEndpointSource};
use handlerbridge::session::SessionBehavior;
use handlerbridge::source::HandlerRegistry;
use std::sync::Arc;

fn build_registry(routes: usize) -> Arc<HandlerRegistry> {
    let registry = Arc::new(HandlerRegistry::new());
    for i in 0..routes {
        registry.register_sync(
            &format!("/bench/{i}/items/{{id}}"),
            SessionBehavior::NotApplicable,
            |ctx| ctx.response().write_str("ok"),
        );
    }
    registry.map_named_route("/bench/alias", "/bench/0/items/{id}");
    registry
}

fn bench_snapshot_rebuild(c: &mut Criterion) {
    let registry = build_registry(64);
    c.bench_function("endpoint_snapshot_rebuild_64", |b| {
        b.iter(|| {
            let source = HandlerEndpointSource::new();
            source.add_source(registry.clone());
            black_box(source.endpoints().unwrap())
        })
    });
}

fn bench_cached_read(c: &mut Criterion) {
    let source = HandlerEndpointSource::new();
    source.add_source(build_registry(64));
    let _ = source.endpoints().unwrap();
    c.bench_function("endpoint_cached_read_64", |b| {
        b.iter(|| black_box(source.endpoints().unwrap()))
    });
}

fn bench_pattern_match(c: &mut Criterion) {
    let source = HandlerEndpointSource::new();
    source.add_source(build_registry(64));
    let endpoints = source.endpoints().unwrap();
    c.bench_function("route_pattern_match_64", |b| {
        b.iter(|| {
            for endpoint in &endpoints {
                if let Some(pattern) = endpoint.pattern() {
                    black_box(pattern.matches("/bench/32/items/abc123"));
                }
            }
        })
    });
}

criterion_group!(
    benches,
    bench_snapshot_rebuild,
    bench_cached_read,
    bench_pattern_match
);
criterion_main!(benches);
