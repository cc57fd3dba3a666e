//! Legacy handler model.
//!
//! A legacy handler is one of three incompatible calling conventions for
//! "process this one request":
//!
//! - **synchronous**: runs to completion on the calling flow,
//! - **callback-async**: a begin/end continuation pair with an opaque
//!   pending token,
//! - **task-async**: returns a [`Completion`] handle the caller waits on.
//!
//! The convention is resolved once, when the [`Handler`] is constructed, into
//! a closed variant type; nothing downstream re-inspects the handler's shape
//! per call. [`crate::exec::run_handler`] is the single place the three
//! variants are executed.

use crate::context::RequestContext;
use crate::endpoint::Endpoint;
use anyhow::Result;
use may::sync::mpsc;
use std::any::Any;
use std::sync::Arc;

/// A handler that runs to completion without suspending.
pub trait SyncHandler: Send + Sync {
    fn process(&self, ctx: &Arc<RequestContext>) -> Result<()>;
}

/// A handler that completes through a [`Completion`] handle.
pub trait TaskHandler: Send + Sync {
    fn process(&self, ctx: &Arc<RequestContext>) -> Result<Completion>;
}

/// Opaque in-flight state handed back by [`CallbackHandler::begin`] and
/// consumed by [`CallbackHandler::end`].
pub type PendingCall = Box<dyn Any + Send>;

/// A handler using the begin/end continuation convention.
///
/// `begin` starts the work and must eventually invoke `done` exactly once;
/// the caller then passes the pending token to `end` to observe the outcome.
pub trait CallbackHandler: Send + Sync {
    fn begin(
        &self,
        ctx: &Arc<RequestContext>,
        done: Box<dyn FnOnce() + Send>,
    ) -> Result<PendingCall>;

    fn end(&self, pending: PendingCall) -> Result<()>;
}

/// Completion handle for task-async handlers.
///
/// Backed by a `may` channel so waiting suspends only the current coroutine,
/// not an OS thread, when run under the `may` runtime.
pub struct Completion {
    inner: CompletionInner,
}

enum CompletionInner {
    Ready(Result<()>),
    Pending(mpsc::Receiver<Result<()>>),
}

impl Completion {
    /// A completion that is already resolved.
    #[must_use]
    pub fn ready(result: Result<()>) -> Self {
        Self {
            inner: CompletionInner::Ready(result),
        }
    }

    /// A pending completion plus the signal that resolves it.
    #[must_use]
    pub fn channel() -> (CompletionSignal, Completion) {
        let (tx, rx) = mpsc::channel();
        (
            CompletionSignal { tx },
            Completion {
                inner: CompletionInner::Pending(rx),
            },
        )
    }

    /// Block the calling flow until the handler signals done.
    ///
    /// A signal that is dropped without completing is a handler contract
    /// breach and surfaces as an error, never as a silent success.
    pub fn wait(self) -> Result<()> {
        match self.inner {
            CompletionInner::Ready(result) => result,
            CompletionInner::Pending(rx) => rx
                .recv()
                .map_err(|_| anyhow::anyhow!("handler completion was dropped without signaling"))?,
        }
    }
}

/// Resolves the paired [`Completion`] exactly once.
pub struct CompletionSignal {
    tx: mpsc::Sender<Result<()>>,
}

impl CompletionSignal {
    pub fn complete(self, result: Result<()>) {
        // The receiver may already be gone (request aborted); nothing to do.
        let _ = self.tx.send(result);
    }
}

/// The resolved calling convention of a handler.
#[derive(Clone)]
pub enum HandlerKind {
    Sync(Arc<dyn SyncHandler>),
    Callback(Arc<dyn CallbackHandler>),
    Task(Arc<dyn TaskHandler>),
}

/// A legacy request handler, convention resolved at construction time.
///
/// Handlers have reference identity only: two `Handler` values are the same
/// handler when they share the inner trait object. A handler derived from an
/// endpoint remembers that endpoint, so materializing it again returns the
/// original endpoint unchanged.
#[derive(Clone)]
pub struct Handler {
    kind: HandlerKind,
    origin: Option<Arc<Endpoint>>,
}

impl Handler {
    #[must_use]
    pub fn sync<H>(handler: H) -> Self
    where
        H: SyncHandler + 'static,
    {
        Self::from_kind(HandlerKind::Sync(Arc::new(handler)))
    }

    #[must_use]
    pub fn callback<H>(handler: H) -> Self
    where
        H: CallbackHandler + 'static,
    {
        Self::from_kind(HandlerKind::Callback(Arc::new(handler)))
    }

    #[must_use]
    pub fn task<H>(handler: H) -> Self
    where
        H: TaskHandler + 'static,
    {
        Self::from_kind(HandlerKind::Task(Arc::new(handler)))
    }

    /// A synchronous handler from a plain closure.
    #[must_use]
    pub fn sync_fn<F>(f: F) -> Self
    where
        F: Fn(&Arc<RequestContext>) -> Result<()> + Send + Sync + 'static,
    {
        Self::sync(SyncFn(f))
    }

    #[must_use]
    pub fn from_kind(kind: HandlerKind) -> Self {
        Self { kind, origin: None }
    }

    /// Adapt an endpoint into a task-async handler that remembers its origin.
    ///
    /// Used when a request routed to an ordinary endpoint must be exposed to
    /// legacy code as the "current handler" for that request.
    #[must_use]
    pub fn from_endpoint(endpoint: Arc<Endpoint>) -> Self {
        Self {
            kind: HandlerKind::Task(Arc::new(EndpointTaskHandler {
                endpoint: Arc::clone(&endpoint),
            })),
            origin: Some(endpoint),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &HandlerKind {
        &self.kind
    }

    /// The endpoint this handler was derived from, if any.
    #[must_use]
    pub fn origin_endpoint(&self) -> Option<&Arc<Endpoint>> {
        self.origin.as_ref()
    }

    /// Reference identity of the inner handler object.
    ///
    /// Stable for the lifetime of the handler; used as the endpoint factory
    /// cache key.
    #[must_use]
    pub fn identity(&self) -> usize {
        match &self.kind {
            HandlerKind::Sync(h) => Arc::as_ptr(h) as *const () as usize,
            HandlerKind::Callback(h) => Arc::as_ptr(h) as *const () as usize,
            HandlerKind::Task(h) => Arc::as_ptr(h) as *const () as usize,
        }
    }

    #[must_use]
    pub fn variant_name(&self) -> &'static str {
        match &self.kind {
            HandlerKind::Sync(_) => "sync",
            HandlerKind::Callback(_) => "callback",
            HandlerKind::Task(_) => "task",
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("variant", &self.variant_name())
            .field("identity", &self.identity())
            .field("origin", &self.origin.as_ref().map(|e| e.display_name()))
            .finish()
    }
}

struct SyncFn<F>(F);

impl<F> SyncHandler for SyncFn<F>
where
    F: Fn(&Arc<RequestContext>) -> Result<()> + Send + Sync,
{
    fn process(&self, ctx: &Arc<RequestContext>) -> Result<()> {
        (self.0)(ctx)
    }
}

struct EndpointTaskHandler {
    endpoint: Arc<Endpoint>,
}

impl TaskHandler for EndpointTaskHandler {
    fn process(&self, ctx: &Arc<RequestContext>) -> Result<Completion> {
        Ok(Completion::ready(self.endpoint.invoke(ctx)))
    }
}
