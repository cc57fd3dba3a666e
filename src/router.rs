//! Minimal hosting router.
//!
//! Stands in for the modern host's routing pipeline: it consumes
//! [`EndpointSource`] snapshots, matches request paths against endpoint
//! patterns, and falls back to the default dispatch delegate when routing
//! produces no statically known endpoint. Real hosts with their own routers
//! only need the [`EndpointSource`] contract; this router exists so the
//! bridge is runnable and testable end to end on its own.

use crate::aggregator::{EndpointSource, HandlerEndpointSource};
use crate::context::{MatchedEndpoint, RequestContext};
use crate::endpoint::{Endpoint, ParamVec};
use crate::pipeline::{default_dispatch, RequestDelegate};
use anyhow::Result;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Routes requests across the endpoint sets of its registered sources.
pub struct EndpointRouter {
    sources: Mutex<Vec<Arc<dyn EndpointSource>>>,
    handler_source: Mutex<Option<Arc<HandlerEndpointSource>>>,
    fallback: RequestDelegate,
}

impl EndpointRouter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: Mutex::new(Vec::new()),
            handler_source: Mutex::new(None),
            fallback: default_dispatch(),
        }
    }

    pub fn add_source(&self, source: Arc<dyn EndpointSource>) {
        lock(&self.sources).push(source);
    }

    /// Wire legacy handler routing into this router.
    ///
    /// Idempotent: the first call creates and registers the aggregator,
    /// subsequent calls return the same one instead of adding a second
    /// source. Callers hang their [`crate::source::HandlerSource`]s off the
    /// returned aggregator.
    pub fn map_handlers(&self) -> Arc<HandlerEndpointSource> {
        let mut slot = lock(&self.handler_source);
        if let Some(existing) = slot.as_ref() {
            return Arc::clone(existing);
        }
        let source = Arc::new(HandlerEndpointSource::new());
        let endpoint_source: Arc<dyn EndpointSource> = source.clone();
        lock(&self.sources).push(endpoint_source);
        *slot = Some(Arc::clone(&source));
        source
    }

    /// Route and execute one request.
    ///
    /// On a match the selected endpoint is installed as the
    /// [`MatchedEndpoint`] feature and its delegate runs; otherwise the
    /// fallback delegate handles the request.
    pub fn dispatch(&self, ctx: &Arc<RequestContext>) -> Result<()> {
        match self.match_endpoint(ctx.path())? {
            Some((endpoint, params)) => {
                debug!(
                    request_id = %ctx.request_id(),
                    method = %ctx.method(),
                    path = %ctx.path(),
                    endpoint = %endpoint.display_name(),
                    "endpoint matched"
                );
                ctx.set_route_params(params);
                ctx.features().set(MatchedEndpoint(Arc::clone(&endpoint)));
                endpoint.invoke(ctx)
            }
            None => {
                debug!(
                    request_id = %ctx.request_id(),
                    method = %ctx.method(),
                    path = %ctx.path(),
                    "no endpoint matched, using fallback"
                );
                (self.fallback)(ctx)
            }
        }
    }

    /// Match a path against every routable endpoint, lowest order winning.
    pub fn match_endpoint(&self, path: &str) -> Result<Option<(Arc<Endpoint>, ParamVec)>> {
        let sources = lock(&self.sources).clone();
        let mut best: Option<(Arc<Endpoint>, ParamVec)> = None;
        for source in &sources {
            for endpoint in source.endpoints()? {
                let Some(pattern) = endpoint.pattern() else {
                    continue;
                };
                if let Some(params) = pattern.matches(path) {
                    let better = match &best {
                        None => true,
                        Some((current, _)) => endpoint.order() < current.order(),
                    };
                    if better {
                        best = Some((endpoint, params));
                    }
                }
            }
        }
        Ok(best)
    }
}

impl Default for EndpointRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
