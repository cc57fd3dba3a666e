//! Response-termination emulation.
//!
//! Legacy handlers call an `end()`-style primitive and expect it to abort all
//! further processing immediately, unwinding to the top of the request. The
//! host's native termination is non-throwing: it marks state and returns.
//! The emulator bridges the two by swapping in, for one request, a
//! termination feature whose first `end()` raises a private unwind signal,
//! and catching exactly that signal at a single boundary.
//!
//! The signal type never leaves this module; anything else that unwinds
//! through the boundary is resumed untouched, so a genuine handler panic is
//! never confused with a termination request.

use crate::context::RequestContext;
use crate::pipeline::RequestDelegate;
use anyhow::Result;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Per-request termination feature.
///
/// Installed on the [`crate::context::FeatureMap`] as
/// [`ResponseEndFeature`]; `is_ended` must stay true for the rest of the
/// request once termination has been requested.
pub trait ResponseEnd: Send + Sync {
    fn is_ended(&self) -> bool;

    /// Request termination. Host implementations mark and return; the
    /// emulated implementation unwinds on the first call.
    fn end(&self);
}

/// Feature key under which the current termination feature is stored.
pub type ResponseEndFeature = Arc<dyn ResponseEnd>;

/// The host's own non-throwing termination contract: mark a flag, return.
#[derive(Default)]
pub struct HostResponseEnd {
    ended: AtomicBool,
}

impl ResponseEnd for HostResponseEnd {
    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    fn end(&self) {
        self.ended.store(true, Ordering::Release);
    }
}

/// Private unwind payload. Must never be observable outside this module.
struct TerminationSignal;

/// Emulated termination feature layered over the previously installed one.
///
/// `is_ended` reads true if either the local flag or the prior feature's
/// flag is set; `end` is idempotent: only the first call transitions and
/// raises the signal, a second call returns normally.
pub struct EmulatedResponseEnd {
    local: AtomicBool,
    prior: ResponseEndFeature,
}

impl EmulatedResponseEnd {
    #[must_use]
    pub fn new(prior: ResponseEndFeature) -> Self {
        Self {
            local: AtomicBool::new(false),
            prior,
        }
    }

    /// Whether termination was requested within the current scope, as
    /// opposed to inherited from the prior feature.
    #[must_use]
    pub fn locally_ended(&self) -> bool {
        self.local.load(Ordering::Acquire)
    }
}

impl ResponseEnd for EmulatedResponseEnd {
    fn is_ended(&self) -> bool {
        self.locally_ended() || self.prior.is_ended()
    }

    fn end(&self) {
        if !self.local.swap(true, Ordering::AcqRel) {
            // Deliberate panic: the one place the crate unwinds on purpose.
            // Caught and swallowed only by `end_emulation_layer`.
            panic::panic_any(TerminationSignal);
        }
    }
}

/// The single install/catch boundary for termination emulation.
///
/// Wrap the rest of the pipeline in this layer at the outermost point. For
/// each request it installs the emulated feature, catches exactly the
/// private signal, and on every exit path (normal return, handler error,
/// swallowed signal, or foreign panic) restores the prior feature and
/// forwards a real `end()` to it if one was requested locally.
pub fn end_emulation_layer(next: RequestDelegate) -> RequestDelegate {
    Arc::new(move |ctx: &Arc<RequestContext>| {
        let prior: ResponseEndFeature = ctx.features().require::<ResponseEndFeature>()?;
        let emulated = Arc::new(EmulatedResponseEnd::new(Arc::clone(&prior)));
        let emulated_feature: ResponseEndFeature = emulated.clone();
        ctx.features().set::<ResponseEndFeature>(emulated_feature);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| next(ctx)));

        // Teardown happens before the outcome is decided so the swap is
        // reverted even when a foreign panic is about to be resumed.
        ctx.features().set::<ResponseEndFeature>(Arc::clone(&prior));
        if emulated.locally_ended() {
            prior.end();
        }

        match outcome {
            Ok(result) => result,
            Err(payload) => {
                if payload.is::<TerminationSignal>() {
                    debug!(
                        request_id = %ctx.request_id(),
                        path = %ctx.path(),
                        "response terminated by handler"
                    );
                    Ok(())
                } else {
                    panic::resume_unwind(payload)
                }
            }
        }
    })
}

/// Request immediate termination of the current response.
///
/// Under the emulation layer this does not return on the first call; the
/// `Result` only reports the configuration defect of a missing termination
/// feature.
pub fn end_response(ctx: &Arc<RequestContext>) -> Result<()> {
    let end: ResponseEndFeature = ctx.features().require::<ResponseEndFeature>()?;
    end.end();
    Ok(())
}

/// Whether termination has been requested for the current response.
#[must_use]
pub fn response_ended(ctx: &Arc<RequestContext>) -> bool {
    ctx.features()
        .get::<ResponseEndFeature>()
        .map(|end| end.is_ended())
        .unwrap_or(false)
}
