//! Handler execution adapter.
//!
//! The one place the three handler calling conventions are executed. Every
//! path that runs a legacy handler (routed endpoints, synthesized generic
//! endpoints, and the dispatch fallback) funnels through
//! [`run_handler`], so calling-convention normalization and the
//! synchronous-I/O relaxation apply uniformly.

use crate::context::{BodyControl, RequestContext};
use crate::handler::{Completion, Handler, HandlerKind};
use anyhow::Result;
use std::sync::Arc;
use tracing::debug;

/// Run a handler to logical completion, suspending the calling flow until it
/// signals done.
///
/// Before dispatch the response's synchronous-write gate is relaxed for the
/// rest of the request: legacy handlers assume synchronous writes are always
/// permitted, unlike the modern host default. Any failure raised by the
/// handler propagates unchanged: no retry, no translation.
pub fn run_handler(handler: &Handler, ctx: &Arc<RequestContext>) -> Result<()> {
    let body_control: BodyControl = ctx.features().require::<BodyControl>()?;
    body_control.allow_sync_io();

    debug!(
        request_id = %ctx.request_id(),
        variant = handler.variant_name(),
        path = %ctx.path(),
        "dispatching legacy handler"
    );

    match handler.kind() {
        HandlerKind::Task(task) => task.process(ctx)?.wait(),
        HandlerKind::Callback(callback) => {
            let (signal, completion) = Completion::channel();
            let pending = callback.begin(ctx, Box::new(move || signal.complete(Ok(()))))?;
            completion.wait()?;
            callback.end(pending)
        }
        HandlerKind::Sync(sync) => sync.process(ctx),
    }
}
