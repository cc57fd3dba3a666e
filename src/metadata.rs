//! Registration-time handler metadata.
//!
//! [`HandlerMetadata`] describes how to obtain a handler for a logical route:
//! the route key, the session hint, and a factory invoked once per matching
//! request. Metadata is immutable after registration and its factory must be
//! a pure function of the request context, because the route table is rebuilt
//! and re-invoked freely.

use crate::context::RequestContext;
use crate::handler::Handler;
use crate::session::SessionBehavior;
use anyhow::Result;
use serde::Deserialize;
use std::sync::Arc;

/// Produces a handler instance for a live request.
pub type HandlerFactory = Arc<dyn Fn(&Arc<RequestContext>) -> Result<Handler> + Send + Sync>;

/// Describes how to obtain a [`Handler`] for one route key.
pub trait HandlerMetadata: Send + Sync {
    /// The route key this metadata answers for.
    fn route(&self) -> &str;

    fn session_behavior(&self) -> SessionBehavior;

    /// Produce a handler for the given request. Called once per matching
    /// request; implementations must not carry per-call state.
    fn create(&self, ctx: &Arc<RequestContext>) -> Result<Handler>;

    /// For alias copies, the metadata of the registration being delegated
    /// to. `None` for direct registrations.
    fn delegated_from(&self) -> Option<Arc<dyn HandlerMetadata>> {
        None
    }
}

/// Direct registration: a route key, a session hint, and a factory.
pub struct RouteHandlerMetadata {
    route: String,
    session: SessionBehavior,
    factory: HandlerFactory,
}

impl RouteHandlerMetadata {
    #[must_use]
    pub fn new(route: &str, session: SessionBehavior, factory: HandlerFactory) -> Self {
        Self {
            route: route.to_string(),
            session,
            factory,
        }
    }
}

impl HandlerMetadata for RouteHandlerMetadata {
    fn route(&self) -> &str {
        &self.route
    }

    fn session_behavior(&self) -> SessionBehavior {
        self.session
    }

    fn create(&self, ctx: &Arc<RequestContext>) -> Result<Handler> {
        (self.factory)(ctx)
    }
}

/// Alias copy produced when a named route mapping resolves.
///
/// Reports the alias as its route but delegates everything else (session
/// hint and handler production) to the original registration, which stays
/// recoverable through [`HandlerMetadata::delegated_from`].
pub struct MappedHandlerMetadata {
    alias: String,
    original: Arc<dyn HandlerMetadata>,
}

impl MappedHandlerMetadata {
    #[must_use]
    pub fn new(alias: &str, original: Arc<dyn HandlerMetadata>) -> Self {
        Self {
            alias: alias.to_string(),
            original,
        }
    }
}

impl HandlerMetadata for MappedHandlerMetadata {
    fn route(&self) -> &str {
        &self.alias
    }

    fn session_behavior(&self) -> SessionBehavior {
        self.original.session_behavior()
    }

    fn create(&self, ctx: &Arc<RequestContext>) -> Result<Handler> {
        self.original.create(ctx)
    }

    fn delegated_from(&self) -> Option<Arc<dyn HandlerMetadata>> {
        Some(Arc::clone(&self.original))
    }
}

/// A named route mapping: expose the `target` registration under the
/// additional `route` key.
///
/// Only resolvable when the target key is already registered exactly once;
/// aliases never chain.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NamedRoute {
    pub route: String,
    pub target: String,
}

impl NamedRoute {
    #[must_use]
    pub fn new(route: &str, target: &str) -> Self {
        Self {
            route: route.to_string(),
            target: target.to_string(),
        }
    }
}
