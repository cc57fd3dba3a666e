//! Route metadata sources.
//!
//! A [`HandlerSource`] contributes handler metadata and named route mappings
//! to the aggregator, and signals mutations through a change token. The
//! crate ships [`HandlerRegistry`] for direct programmatic registration;
//! declarative registration lives in [`crate::config`], and legacy
//! module-driven sources implement the trait themselves.

use crate::change::{ChangeNotifier, ChangeToken};
use crate::context::RequestContext;
use crate::handler::Handler;
use crate::metadata::{HandlerFactory, HandlerMetadata, NamedRoute, RouteHandlerMetadata};
use crate::session::SessionBehavior;
use anyhow::Result;
use std::sync::{Arc, Mutex};
use tracing::info;

/// A registration source the aggregator queries for its current entries.
///
/// One aggregator read takes one snapshot of each source; the change token
/// is the only staleness signal between reads.
pub trait HandlerSource: Send + Sync {
    /// Current handler metadata entries, in registration order.
    fn handler_metadata(&self) -> Vec<Arc<dyn HandlerMetadata>>;

    /// Current named route mappings, in registration order.
    fn named_routes(&self) -> Vec<NamedRoute>;

    /// Fires when this source's registrations change.
    fn change_token(&self) -> ChangeToken;
}

/// Direct, programmatic registration source.
///
/// Every mutation fires the outstanding change token, so routers that cached
/// an endpoint set recompute on their next read.
pub struct HandlerRegistry {
    entries: Mutex<Vec<Arc<dyn HandlerMetadata>>>,
    named: Mutex<Vec<NamedRoute>>,
    notifier: ChangeNotifier,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            named: Mutex::new(Vec::new()),
            notifier: ChangeNotifier::new(),
        }
    }

    /// Register prepared metadata.
    pub fn register(&self, metadata: Arc<dyn HandlerMetadata>) {
        info!(
            route = metadata.route(),
            session = %metadata.session_behavior(),
            "handler route registered"
        );
        lock(&self.entries).push(metadata);
        self.notifier.notify();
    }

    /// Register a route key with a session hint and a handler factory.
    pub fn register_route(&self, route: &str, session: SessionBehavior, factory: HandlerFactory) {
        self.register(Arc::new(RouteHandlerMetadata::new(route, session, factory)));
    }

    /// Register a synchronous closure handler under a route key.
    pub fn register_sync<F>(&self, route: &str, session: SessionBehavior, handler: F)
    where
        F: Fn(&Arc<RequestContext>) -> Result<()> + Send + Sync + Clone + 'static,
    {
        self.register_route(
            route,
            session,
            Arc::new(move |_ctx| Ok(Handler::sync_fn(handler.clone()))),
        );
    }

    /// Expose a previously registered route under an additional key.
    pub fn map_named_route(&self, route: &str, target: &str) {
        info!(route, target, "named route mapped");
        lock(&self.named).push(NamedRoute::new(route, target));
        self.notifier.notify();
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerSource for HandlerRegistry {
    fn handler_metadata(&self) -> Vec<Arc<dyn HandlerMetadata>> {
        lock(&self.entries).clone()
    }

    fn named_routes(&self) -> Vec<NamedRoute> {
        lock(&self.named).clone()
    }

    fn change_token(&self) -> ChangeToken {
        self.notifier.token()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
