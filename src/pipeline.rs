//! Request pipeline assembly.
//!
//! A [`RequestDelegate`] is the executable form of "the rest of the
//! pipeline". [`PipelineBuilder`] folds wrapping layers around a terminal
//! stage; it is deliberately minimal: enough to assemble the default
//! dispatch delegate and to host tests, not a general middleware framework.
//!
//! This module also ships the two stock pipeline pieces the bridge needs:
//! the handler-resolution layer and the default dispatch fallback.

use crate::context::{MatchedEndpoint, RequestContext};
use crate::exec::run_handler;
use crate::materializer::handler_for_endpoint;
use crate::termination::end_emulation_layer;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error};

/// Executable request-processing stage.
pub type RequestDelegate = Arc<dyn Fn(&Arc<RequestContext>) -> Result<()> + Send + Sync>;

/// Builds a delegate from wrapping layers around a terminal stage.
///
/// Layers run outermost-first in the order they were added.
pub struct PipelineBuilder {
    layers: Vec<Box<dyn FnOnce(RequestDelegate) -> RequestDelegate>>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Add a wrapping layer.
    #[must_use]
    pub fn layer<F>(mut self, layer: F) -> Self
    where
        F: FnOnce(RequestDelegate) -> RequestDelegate + 'static,
    {
        self.layers.push(Box::new(layer));
        self
    }

    /// Set the terminal stage and assemble the delegate.
    #[must_use]
    pub fn run<F>(self, terminal: F) -> RequestDelegate
    where
        F: Fn(&Arc<RequestContext>) -> Result<()> + Send + Sync + 'static,
    {
        let mut delegate: RequestDelegate = Arc::new(terminal);
        for layer in self.layers.into_iter().rev() {
            delegate = layer(delegate);
        }
        delegate
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Fill the current-handler slot from the matched endpoint.
///
/// When routing selected an endpoint but upstream compatibility middleware
/// has not resolved a handler, this layer materializes one from the
/// endpoint's metadata (or adapts the endpoint itself) so downstream legacy
/// code always sees a current handler.
pub fn resolve_handler_layer(next: RequestDelegate) -> RequestDelegate {
    Arc::new(move |ctx: &Arc<RequestContext>| {
        if ctx.current_handler().is_none() {
            if let Some(MatchedEndpoint(endpoint)) = ctx.features().get::<MatchedEndpoint>() {
                let handler = handler_for_endpoint(ctx, &endpoint)?;
                debug!(
                    request_id = %ctx.request_id(),
                    endpoint = %endpoint.display_name(),
                    variant = handler.variant_name(),
                    "resolved handler from matched endpoint"
                );
                ctx.set_current_handler(handler);
            }
        }
        next(ctx)
    })
}

/// The default dispatch delegate: termination boundary, handler resolution,
/// then the catch-all execution stage.
///
/// The terminal stage reads the current-handler slot and runs it through the
/// execution adapter. Reaching it with no handler resolved is a pipeline
/// misconfiguration, surfaced as a 500 with a short diagnostic body rather
/// than treated as a normal outcome.
#[must_use]
pub fn default_dispatch() -> RequestDelegate {
    PipelineBuilder::new()
        .layer(end_emulation_layer)
        .layer(resolve_handler_layer)
        .run(|ctx| match ctx.current_handler() {
            Some(handler) => run_handler(&handler, ctx),
            None => {
                error!(
                    request_id = %ctx.request_id(),
                    method = %ctx.method(),
                    path = %ctx.path(),
                    "request reached the dispatch fallback with no handler resolved"
                );
                ctx.response().write_diagnostic(500, "Invalid handler");
                Ok(())
            }
        })
}
