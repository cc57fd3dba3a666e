//! Tests for route metadata aggregation.
//!
//! Covers alias resolution (including the deliberate silent drops),
//! duplicate-key detection, change-token composition, snapshot caching,
//! conventions, and the request-filter rejection.


use handlerbridge::aggregator::{EndpointSource, HandlerEndpointSource};
use handlerbridge::context::RequestContext;
use handlerbridge::endpoint::{Endpoint, EndpointBuilder, EndpointConvention};
use handlerbridge::session::{endpoint_session_behavior, original_metadata, SessionBehavior};
use handlerbridge::source::HandlerRegistry;
use std::sync::Arc;
use tracing_util::TestTracing;

fn registry_with_direct_route(route: &str, session: SessionBehavior) -> Arc<HandlerRegistry> {
    let registry = Arc::new(HandlerRegistry::new());
    registry.register_sync(route, session, |ctx| ctx.response().write_str("Hello world!"));
    registry
}

fn find_endpoint<'a>(endpoints: &'a [Arc<Endpoint>], route: &str) -> Option<&'a Arc<Endpoint>> {
    endpoints
        .iter()
        .find(|e| e.pattern().map(|p| p.raw()) == Some(route))
}

#[test]
fn alias_exposes_both_routes_and_recovers_original() {
    let _tracing = TestTracing::init();
    let registry = registry_with_direct_route("/a", SessionBehavior::ReadWrite);
    registry.map_named_route("/b", "/a");

    let source = HandlerEndpointSource::new();
    source.add_source(registry);

    let endpoints = source.endpoints().unwrap();
    assert_eq!(endpoints.len(), 2);

    let direct = find_endpoint(&endpoints, "/a").expect("endpoint at /a");
    assert_eq!(direct.metadata().len(), 1);
    assert_eq!(direct.handler_metadata().unwrap().route(), "/a");

    let alias = find_endpoint(&endpoints, "/b").expect("endpoint at /b");
    assert_eq!(alias.metadata().len(), 2, "alias carries original + copy");
    let effective = alias.handler_metadata().unwrap();
    assert_eq!(effective.route(), "/b");
    assert_eq!(effective.session_behavior(), SessionBehavior::ReadWrite);
    assert_eq!(
        endpoint_session_behavior(alias),
        Some(SessionBehavior::ReadWrite)
    );

    let original = original_metadata(alias).expect("original recoverable through alias");
    assert_eq!(original.route(), "/a");
}

#[test]
fn alias_to_missing_target_is_silently_dropped() {
    let _tracing = TestTracing::init();
    let registry = registry_with_direct_route("/a", SessionBehavior::NotApplicable);
    registry.map_named_route("/c", "/missing");

    let source = HandlerEndpointSource::new();
    source.add_source(registry);

    let endpoints = source.endpoints().unwrap();
    assert_eq!(endpoints.len(), 1);
    assert!(find_endpoint(&endpoints, "/c").is_none());
}

#[test]
fn alias_to_already_aliased_target_is_silently_dropped() {
    let _tracing = TestTracing::init();
    let registry = registry_with_direct_route("/a", SessionBehavior::NotApplicable);
    registry.map_named_route("/b", "/a");
    // /b is itself an alias; aliases never chain
    registry.map_named_route("/c", "/b");

    let source = HandlerEndpointSource::new();
    source.add_source(registry);

    let endpoints = source.endpoints().unwrap();
    assert_eq!(endpoints.len(), 2);
    assert!(find_endpoint(&endpoints, "/c").is_none());
}

#[test]
fn alias_colliding_with_direct_registration_is_dropped() {
    let _tracing = TestTracing::init();
    let registry = registry_with_direct_route("/a", SessionBehavior::NotApplicable);
    registry.register_sync("/b", SessionBehavior::NotApplicable, |ctx| {
        ctx.response().write_str("direct b")
    });
    registry.map_named_route("/b", "/a");

    let source = HandlerEndpointSource::new();
    source.add_source(registry);

    let endpoints = source.endpoints().unwrap();
    assert_eq!(endpoints.len(), 2);
    let b = find_endpoint(&endpoints, "/b").unwrap();
    assert_eq!(b.metadata().len(), 1, "direct registration wins");
}

#[test]
fn duplicate_route_key_is_a_configuration_error() {
    let _tracing = TestTracing::init();
    let source = HandlerEndpointSource::new();
    source.add_source(registry_with_direct_route("/a", SessionBehavior::NotApplicable));
    source.add_source(registry_with_direct_route("/a", SessionBehavior::NotApplicable));

    let err = source.endpoints().unwrap_err();
    assert!(
        err.to_string().contains("duplicate handler registration"),
        "unexpected error: {err}"
    );
}

#[test]
fn change_token_fires_on_source_mutation_and_triggers_rebuild() {
    let _tracing = TestTracing::init();
    let registry = registry_with_direct_route("/a", SessionBehavior::NotApplicable);
    let source = HandlerEndpointSource::new();
    source.add_source(registry.clone());

    assert_eq!(source.endpoints().unwrap().len(), 1);
    let token = source.change_token();
    assert!(!token.has_changed());

    registry.register_sync("/late", SessionBehavior::NotApplicable, |ctx| {
        ctx.response().write_str("late")
    });

    assert!(token.has_changed(), "source mutation must fire the composite");
    let rebuilt = source.endpoints().unwrap();
    assert_eq!(rebuilt.len(), 2);
    assert!(find_endpoint(&rebuilt, "/late").is_some());
}

#[test]
fn snapshot_is_cached_between_reads() {
    let _tracing = TestTracing::init();
    let source = HandlerEndpointSource::new();
    source.add_source(registry_with_direct_route("/a", SessionBehavior::NotApplicable));

    let first = source.endpoints().unwrap();
    let second = source.endpoints().unwrap();
    assert!(Arc::ptr_eq(&first[0], &second[0]), "unchanged reads reuse the snapshot");
}

#[test]
fn conventions_apply_to_every_endpoint() {
    let _tracing = TestTracing::init();
    let registry = registry_with_direct_route("/a", SessionBehavior::NotApplicable);
    registry.map_named_route("/b", "/a");

    let source = HandlerEndpointSource::new();
    source.add_source(registry);
    let convention: EndpointConvention = Arc::new(|builder: &mut EndpointBuilder| {
        builder.order(5);
    });
    source.add_convention(convention);

    let endpoints = source.endpoints().unwrap();
    assert_eq!(endpoints.len(), 2);
    assert!(endpoints.iter().all(|e| e.order() == 5));
}

#[test]
fn request_filters_are_rejected_on_handler_backed_endpoints() {
    let _tracing = TestTracing::init();
    let source = HandlerEndpointSource::new();
    source.add_source(registry_with_direct_route("/a", SessionBehavior::NotApplicable));

    let convention: EndpointConvention = Arc::new(|builder: &mut EndpointBuilder| {
        builder.add_request_filter(Arc::new(|_ctx: &Arc<RequestContext>| Ok(())));
    });
    source.add_convention(convention);

    let err = source.endpoints().unwrap_err();
    assert!(
        err.to_string().contains("request filters are not supported"),
        "unexpected error: {err}"
    );
}

#[test]
fn endpoints_preserve_registration_order() {
    let _tracing = TestTracing::init();
    let registry = Arc::new(HandlerRegistry::new());
    for route in ["/first", "/second", "/third"] {
        registry.register_sync(route, SessionBehavior::NotApplicable, |ctx| {
            ctx.response().write_str("ok")
        });
    }
    registry.map_named_route("/fourth", "/second");

    let source = HandlerEndpointSource::new();
    source.add_source(registry);

    // deterministic order: direct registrations first, aliases appended
    let endpoints = source.endpoints().unwrap();
    let keys: Vec<String> = endpoints
        .iter()
        .map(|e| e.pattern().unwrap().raw().to_string())
        .collect();
    assert_eq!(keys, ["/first", "/second", "/third", "/fourth"]);
}
