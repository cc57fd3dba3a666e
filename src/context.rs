//! Per-request context.
//!
//! The bridge does not own an HTTP stack; [`RequestContext`] is the narrow
//! contract it consumes instead. It carries the request line, a buffered
//! response, a typed feature map, and the "current legacy handler" slot that
//! upstream compatibility middleware fills in.
//!
//! Features are looked up by type. Required lookups go through
//! [`FeatureMap::require`], which fails fast with the feature type name when
//! the pipeline is miswired, a configuration defect rather than a runtime
//! condition to recover from.

use crate::endpoint::{Endpoint, ParamVec};
use crate::handler::Handler;
use crate::ids::RequestId;
use crate::materializer::CachingEndpointFactory;
use crate::termination::{HostResponseEnd, ResponseEndFeature};
use anyhow::{bail, Result};
use http::Method;
use smallvec::SmallVec;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

/// Maximum inline response headers before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Stack-allocated header storage; most responses carry well under 16
/// headers, so the common case never touches the heap.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Typed per-request feature collection.
///
/// Stored values must be cheaply cloneable; trait-object features are stored
/// as `Arc<dyn Trait>` so replacing one (e.g. the termination feature swap)
/// is a pointer write, not a deep copy.
pub struct FeatureMap {
    entries: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl FeatureMap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Install or replace a feature.
    pub fn set<T>(&self, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut entries = lock(&self.entries);
        entries.insert(TypeId::of::<T>(), Box::new(value));
    }

    #[must_use]
    pub fn get<T>(&self) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let entries = lock(&self.entries);
        entries
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<T>())
            .cloned()
    }

    /// Get-or-fail lookup for features the caller cannot proceed without.
    pub fn require<T>(&self) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        match self.get::<T>() {
            Some(value) => Ok(value),
            None => bail!(
                "required feature `{}` is not installed on this request",
                std::any::type_name::<T>()
            ),
        }
    }
}

impl Default for FeatureMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Gate controlling whether synchronous body writes are permitted.
///
/// The modern host default is restrictive; the execution adapter relaxes the
/// gate before dispatching a legacy handler, because legacy handlers assume
/// synchronous writes are always allowed.
#[derive(Clone)]
pub struct BodyControl {
    sync_io: Arc<AtomicBool>,
}

impl BodyControl {
    #[must_use]
    pub fn sync_io_allowed(&self) -> bool {
        self.sync_io.load(Ordering::Acquire)
    }

    /// Allow synchronous body writes for the rest of the request.
    pub fn allow_sync_io(&self) {
        self.sync_io.store(true, Ordering::Release);
    }
}

/// The endpoint routing selected for the current request, installed as a
/// feature by the router before the endpoint's delegate runs.
#[derive(Clone)]
pub struct MatchedEndpoint(pub Arc<Endpoint>);

/// Buffered response state for one request.
pub struct ResponseState {
    status: AtomicU16,
    headers: Mutex<HeaderVec>,
    body: Mutex<Vec<u8>>,
    sync_io: Arc<AtomicBool>,
}

impl ResponseState {
    fn new(sync_io: Arc<AtomicBool>) -> Self {
        Self {
            status: AtomicU16::new(200),
            headers: Mutex::new(HeaderVec::new()),
            body: Mutex::new(Vec::new()),
            sync_io,
        }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status.load(Ordering::Acquire)
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::Release);
    }

    pub fn set_header(&self, name: &str, value: String) {
        let mut headers = lock(&self.headers);
        headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        headers.push((Arc::from(name), value));
    }

    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<String> {
        let headers = lock(&self.headers);
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    /// Append bytes to the response body.
    ///
    /// Fails when synchronous writes are still gated off; see
    /// [`BodyControl`].
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.sync_io.load(Ordering::Acquire) {
            bail!("synchronous body writes are disabled for this response");
        }
        let mut body = lock(&self.body);
        body.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_str(&self, text: &str) -> Result<()> {
        self.write(text.as_bytes())
    }

    /// Misconfiguration path: set the status and a short plain-text body.
    ///
    /// Bypasses the synchronous-write gate; diagnostics must come out even
    /// when no handler ever ran.
    pub fn write_diagnostic(&self, status: u16, message: &str) {
        self.set_status(status);
        self.set_header("content-type", "text/plain; charset=utf-8".to_string());
        let mut body = lock(&self.body);
        body.clear();
        body.extend_from_slice(message.as_bytes());
    }

    #[must_use]
    pub fn body_bytes(&self) -> Vec<u8> {
        lock(&self.body).clone()
    }

    #[must_use]
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body_bytes()).into_owned()
    }
}

/// Context for one in-flight request.
///
/// Created by the hosting server per request; every bridge component takes it
/// as `&Arc<RequestContext>`. State behind it is guarded for cross-thread use
/// because `may` coroutines may migrate between worker threads, but a single
/// logical request flow is the only writer.
pub struct RequestContext {
    request_id: RequestId,
    method: Method,
    path: String,
    features: FeatureMap,
    response: ResponseState,
    current_handler: Mutex<Option<Handler>>,
    route_params: Mutex<ParamVec>,
}

impl RequestContext {
    /// Build a context with the default feature set installed: a restrictive
    /// [`BodyControl`] gate, the host's non-throwing termination feature, and
    /// a caching endpoint factory.
    #[must_use]
    pub fn new(method: Method, path: &str) -> Arc<Self> {
        let sync_io = Arc::new(AtomicBool::new(false));
        let ctx = Arc::new(Self {
            request_id: RequestId::new(),
            method,
            path: path.to_string(),
            features: FeatureMap::new(),
            response: ResponseState::new(Arc::clone(&sync_io)),
            current_handler: Mutex::new(None),
            route_params: Mutex::new(ParamVec::new()),
        });
        ctx.features.set(BodyControl { sync_io });
        ctx.features
            .set::<ResponseEndFeature>(Arc::new(HostResponseEnd::default()));
        ctx.features
            .set::<crate::materializer::EndpointFactoryFeature>(Arc::new(
                CachingEndpointFactory::new(),
            ));
        ctx
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn features(&self) -> &FeatureMap {
        &self.features
    }

    #[must_use]
    pub fn response(&self) -> &ResponseState {
        &self.response
    }

    /// The legacy handler resolved for this request, if any.
    #[must_use]
    pub fn current_handler(&self) -> Option<Handler> {
        lock(&self.current_handler).clone()
    }

    pub fn set_current_handler(&self, handler: Handler) {
        *lock(&self.current_handler) = Some(handler);
    }

    pub fn set_route_params(&self, params: ParamVec) {
        *lock(&self.route_params) = params;
    }

    /// Route parameter by name, last occurrence winning on duplicates.
    #[must_use]
    pub fn route_param(&self, name: &str) -> Option<String> {
        lock(&self.route_params)
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.clone())
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("status", &self.response.status())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
