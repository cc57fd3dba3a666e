//! Endpoint materialization.
//!
//! Converts between the legacy handler world and the endpoint world, in both
//! directions:
//!
//! - [`materialize_endpoint`] turns a handler instance or a piece of handler
//!   metadata into a routable endpoint whose execution funnels through the
//!   execution adapter;
//! - [`handler_for_endpoint`] recovers a handler for an endpoint, so routed
//!   requests can populate the current-handler slot legacy code reads.
//!
//! Opaque handlers with no metadata go through the injected
//! [`EndpointFactory`] capability, which caches by handler identity.

use crate::context::RequestContext;
use crate::endpoint::{Endpoint, EndpointBuilder};
use crate::exec::run_handler;
use crate::handler::Handler;
use crate::metadata::HandlerMetadata;
use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Injected endpoint-construction capability for handlers that carry no
/// metadata. Installed as a context feature and looked up get-or-fail.
pub trait EndpointFactory: Send + Sync {
    fn create_endpoint(&self, handler: &Handler) -> Result<Arc<Endpoint>>;
}

/// Feature key under which the endpoint factory is stored.
pub type EndpointFactoryFeature = Arc<dyn EndpointFactory>;

/// Default factory: synthesizes a pattern-less generic endpoint per handler
/// and caches it by handler identity, so repeated requests through the same
/// handler instance reuse one endpoint.
pub struct CachingEndpointFactory {
    cache: DashMap<usize, Arc<Endpoint>>,
}

impl CachingEndpointFactory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }
}

impl Default for CachingEndpointFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointFactory for CachingEndpointFactory {
    fn create_endpoint(&self, handler: &Handler) -> Result<Arc<Endpoint>> {
        if let Some(endpoint) = self.cache.get(&handler.identity()) {
            return Ok(Arc::clone(&endpoint));
        }
        let endpoint = generic_endpoint(handler.clone())?;
        debug!(
            identity = handler.identity(),
            variant = handler.variant_name(),
            "synthesized generic endpoint for opaque handler"
        );
        self.cache.insert(handler.identity(), Arc::clone(&endpoint));
        Ok(endpoint)
    }
}

fn generic_endpoint(handler: Handler) -> Result<Arc<Endpoint>> {
    let mut builder = EndpointBuilder::new();
    builder
        .display_name("legacy handler")
        .delegate(Arc::new(move |ctx| run_handler(&handler, ctx)));
    builder.build()
}

/// Input to [`materialize_endpoint`].
pub enum EndpointInput {
    /// A live handler instance. If it was derived from an endpoint, that
    /// endpoint is returned unchanged; otherwise the injected factory
    /// synthesizes one.
    Handler(Handler),
    /// Registration metadata; its factory produces the handler for this
    /// request and the result is wrapped in a minimal endpoint adapter.
    Metadata(Arc<dyn HandlerMetadata>),
}

/// Convert a handler instance or handler metadata into a routable endpoint.
///
/// Whatever the input shape, the produced endpoint's execution path funnels
/// through [`run_handler`], so calling-convention normalization and the
/// synchronous-I/O relaxation apply uniformly.
pub fn materialize_endpoint(
    ctx: &Arc<RequestContext>,
    input: EndpointInput,
) -> Result<Arc<Endpoint>> {
    match input {
        EndpointInput::Handler(handler) => {
            if let Some(endpoint) = handler.origin_endpoint() {
                // Already endpoint-shaped; hand the original back untouched.
                return Ok(Arc::clone(endpoint));
            }
            let factory: EndpointFactoryFeature =
                ctx.features().require::<EndpointFactoryFeature>()?;
            factory.create_endpoint(&handler)
        }
        EndpointInput::Metadata(metadata) => {
            let handler = metadata.create(ctx)?;
            let mut builder = EndpointBuilder::new();
            builder
                .display_name(metadata.route())
                .add_metadata(Arc::clone(&metadata))
                .delegate(Arc::new(move |ctx| run_handler(&handler, ctx)));
            builder.build()
        }
    }
}

/// Recover a handler for an endpoint.
///
/// Endpoints carrying handler metadata produce their registered handler;
/// any other endpoint is adapted into a task-async handler that records its
/// origin, so an endpoint→handler→endpoint round trip is the identity.
pub fn handler_for_endpoint(ctx: &Arc<RequestContext>, endpoint: &Arc<Endpoint>) -> Result<Handler> {
    if let Some(metadata) = endpoint.handler_metadata() {
        return metadata.create(ctx);
    }
    Ok(Handler::from_endpoint(Arc::clone(endpoint)))
}
