//! # handlerbridge
//!
//! **handlerbridge** is a compatibility layer that lets legacy request
//! handlers (synchronous, begin/end callback-async, or task-async) run
//! unmodified inside a modern, endpoint-based web host.
//!
//! ## Overview
//!
//! Legacy handler code assumes three things a modern host no longer gives
//! it: a single "process this request" call regardless of calling
//! convention, synchronous response writes that always succeed, and a
//! `response.end()` primitive that aborts processing by unwinding. The
//! bridge supplies all three, and turns legacy route registrations into
//! first-class routable endpoints along the way.
//!
//! ## Architecture
//!
//! - **[`handler`]** - the closed variant type over the three handler
//!   calling conventions, resolved once at construction time
//! - **[`exec`]** - the execution adapter: one asynchronous call contract
//!   over all three conventions
//! - **[`termination`]** - "terminate this response now" emulated as a
//!   private unwind caught at a single boundary
//! - **[`metadata`]** / **[`source`]** / **[`config`]** - registration-time
//!   handler metadata and the sources that contribute it, programmatic or
//!   declarative
//! - **[`aggregator`]** - merges every source into one endpoint set with
//!   deterministic conflict resolution and change-token invalidation
//! - **[`materializer`]** - converts handlers to endpoints and back
//! - **[`pipeline`]** / **[`router`]** - minimal delegate pipeline, the
//!   default dispatch fallback, and a small hosting router for standalone
//!   use and tests
//! - **[`context`]** - the per-request contract: feature map, buffered
//!   response, current-handler slot
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use handlerbridge::context::RequestContext;
//! use handlerbridge::router::EndpointRouter;
//! use handlerbridge::session::SessionBehavior;
//! use handlerbridge::source::HandlerRegistry;
//! use std::sync::Arc;
//!
//! let router = EndpointRouter::new();
//! let handlers = router.map_handlers();
//!
//! let registry = Arc::new(HandlerRegistry::new());
//! registry.register_sync("/hello", SessionBehavior::NotApplicable, |ctx| {
//!     ctx.response().write_str("Hello world!")
//! });
//! handlers.add_source(registry);
//!
//! let ctx = RequestContext::new(http::Method::GET, "/hello");
//! router.dispatch(&ctx)?;
//! assert_eq!(ctx.response().body_string(), "Hello world!");
//! ```
//!
//! ## Runtime considerations
//!
//! Waiting on asynchronous handler completions uses `may` channels, so under
//! the `may` runtime a wait suspends only the current coroutine. Response
//! termination relies on stack unwinding; do not build dependents with
//! `panic = "abort"`.

pub mod aggregator;
pub mod change;
pub mod config;
pub mod context;
pub mod endpoint;
pub mod exec;
pub mod handler;
pub mod ids;
pub mod materializer;
pub mod metadata;
pub mod pipeline;
pub mod router;
pub mod session;
pub mod source;
pub mod termination;

pub use aggregator::{EndpointSource, HandlerEndpointSource};
pub use change::{ChangeNotifier, ChangeToken};
pub use context::{BodyControl, FeatureMap, MatchedEndpoint, RequestContext};
pub use endpoint::{Endpoint, EndpointBuilder, RoutePattern};
pub use exec::run_handler;
pub use handler::{CallbackHandler, Completion, Handler, HandlerKind, SyncHandler, TaskHandler};
pub use materializer::{materialize_endpoint, EndpointFactory, EndpointInput};
pub use metadata::{HandlerMetadata, NamedRoute, RouteHandlerMetadata};
pub use pipeline::{default_dispatch, PipelineBuilder, RequestDelegate};
pub use router::EndpointRouter;
pub use session::SessionBehavior;
pub use source::{HandlerRegistry, HandlerSource};
pub use termination::{end_response, response_ended, ResponseEnd, ResponseEndFeature};
