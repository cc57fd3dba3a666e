//! Tests for response-termination emulation.
//!
//! The emulator must let a handler's `end()` unwind to the boundary without
//! the private signal ever being observable outside it, stay idempotent
//! within one request, and restore the prior termination feature on every
//! exit path.


use handlerbridge::context::{BodyControl, RequestContext};
use handlerbridge::pipeline::PipelineBuilder;
use handlerbridge::termination::{
    end_emulation_layer, end_response, response_ended, ResponseEnd, ResponseEndFeature,
};
use http::Method;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_util::TestTracing;

fn relax_writes(ctx: &Arc<RequestContext>) {
    ctx.features()
        .require::<BodyControl>()
        .unwrap()
        .allow_sync_io();
}

/// Host-side termination double that counts real `end()` invocations.
#[derive(Default)]
struct CountingEnd {
    ends: AtomicUsize,
    ended: AtomicBool,
}

impl ResponseEnd for CountingEnd {
    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    fn end(&self) {
        self.ends.fetch_add(1, Ordering::SeqCst);
        self.ended.store(true, Ordering::SeqCst);
    }
}

#[test]
fn end_unwinds_to_boundary_and_marks_response() {
    let _tracing = TestTracing::init();
    let ctx = RequestContext::new(Method::POST, "/form");

    let pipeline = PipelineBuilder::new()
        .layer(end_emulation_layer)
        .run(|ctx| {
            relax_writes(ctx);
            ctx.response().write_str("before")?;
            end_response(ctx)?;
            ctx.response().write_str("after")?;
            Ok(())
        });

    pipeline(&ctx).unwrap();
    assert_eq!(ctx.response().body_string(), "before");
    assert!(response_ended(&ctx), "response must read as ended after teardown");
}

#[test]
fn termination_is_idempotent_and_ends_underlying_once() {
    let _tracing = TestTracing::init();
    let ctx = RequestContext::new(Method::GET, "/");

    let counting = Arc::new(CountingEnd::default());
    let prior: ResponseEndFeature = counting.clone();
    ctx.features().set::<ResponseEndFeature>(prior);

    let pipeline = PipelineBuilder::new()
        .layer(end_emulation_layer)
        .run(|ctx| {
            let end = ctx.features().require::<ResponseEndFeature>().unwrap();
            let first = std::panic::catch_unwind(AssertUnwindSafe(|| end.end()));
            assert!(first.is_err(), "first end() must raise the signal");
            assert!(end.is_ended());
            // second call must not raise a second observable signal
            end.end();
            assert!(end.is_ended());
            Ok(())
        });

    pipeline(&ctx).unwrap();
    assert_eq!(
        counting.ends.load(Ordering::SeqCst),
        1,
        "underlying termination must be invoked exactly once"
    );
    assert!(counting.is_ended());
}

#[test]
fn prior_feature_restored_after_termination() {
    let _tracing = TestTracing::init();
    let ctx = RequestContext::new(Method::GET, "/");
    let before = ctx.features().get::<ResponseEndFeature>().unwrap();

    let pipeline = PipelineBuilder::new()
        .layer(end_emulation_layer)
        .run(|ctx| {
            end_response(ctx)?;
            unreachable!("end_response must unwind under the emulation layer");
        });

    pipeline(&ctx).unwrap();
    let after = ctx.features().get::<ResponseEndFeature>().unwrap();
    assert!(
        Arc::ptr_eq(&before, &after),
        "prior termination feature must be reinstalled"
    );
}

#[test]
fn foreign_panic_is_resumed_not_swallowed() {
    let _tracing = TestTracing::init();
    let ctx = RequestContext::new(Method::GET, "/");
    let before = ctx.features().get::<ResponseEndFeature>().unwrap();

    let pipeline = PipelineBuilder::new()
        .layer(end_emulation_layer)
        .run(|_ctx| panic!("genuine handler bug"));

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| pipeline(&ctx)));
    assert!(outcome.is_err(), "foreign panics must pass the boundary");

    // the swap is still reverted and no termination was forwarded
    let after = ctx.features().get::<ResponseEndFeature>().unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    assert!(!response_ended(&ctx));
}

#[test]
fn handler_error_passes_through_layer_unchanged() {
    let _tracing = TestTracing::init();
    let ctx = RequestContext::new(Method::GET, "/");

    let pipeline = PipelineBuilder::new()
        .layer(end_emulation_layer)
        .run(|_ctx| anyhow::bail!("kaput"));

    let err = pipeline(&ctx).unwrap_err();
    assert_eq!(err.to_string(), "kaput");
    assert!(!response_ended(&ctx));
}

#[test]
fn is_ended_falls_back_to_underlying_layer() {
    let _tracing = TestTracing::init();
    let ctx = RequestContext::new(Method::GET, "/");

    // lower-level host machinery already terminated the response
    end_response(&ctx).unwrap();

    let pipeline = PipelineBuilder::new()
        .layer(end_emulation_layer)
        .run(|ctx| {
            assert!(
                response_ended(ctx),
                "emulated feature must report the prior layer's flag"
            );
            Ok(())
        });

    pipeline(&ctx).unwrap();
    assert!(response_ended(&ctx));
}
