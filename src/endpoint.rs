//! Routable endpoints.
//!
//! An [`Endpoint`] is the unit the hosting router consumes: a route pattern,
//! an execution delegate, and attached handler metadata. Endpoints are
//! immutable once published; they are assembled through [`EndpointBuilder`]
//! so route-building conventions can adjust them before they freeze.

use crate::metadata::HandlerMetadata;
use crate::pipeline::RequestDelegate;
use anyhow::{bail, Context, Result};
use regex::Regex;
use smallvec::SmallVec;
use std::sync::Arc;

/// Maximum inline route parameters before heap allocation. Legacy route
/// tables rarely nest deeper than a handful of `{param}` segments.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage for the match hot path.
///
/// Names come from the route table built at registration time, so they are
/// shared `Arc<str>`; values are per-request strings sliced from the URL.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// A parsed route key: `/files/{name}` style, matched with an anchored regex.
#[derive(Clone)]
pub struct RoutePattern {
    raw: Arc<str>,
    regex: Regex,
    param_names: Vec<Arc<str>>,
}

impl RoutePattern {
    /// Parse a route key into a matchable pattern.
    ///
    /// `{param}` segments capture one path segment each. Keys must be
    /// absolute; a relative key is a registration defect. A trailing slash
    /// is significant: `/a/` matches only `/a/`, never `/a`.
    pub fn parse(path: &str) -> Result<Self> {
        if !path.starts_with('/') {
            bail!("route key must start with '/': `{path}`");
        }
        if path == "/" {
            return Ok(Self {
                raw: Arc::from(path),
                regex: Regex::new(r"^/$").context("compiling root route pattern")?,
                param_names: Vec::new(),
            });
        }

        let mut pattern = String::with_capacity(path.len() + 8);
        pattern.push('^');
        let mut param_names = Vec::with_capacity(path.matches('{').count());

        for segment in path.split('/') {
            if segment.starts_with('{') && segment.ends_with('}') && segment.len() > 2 {
                let name = &segment[1..segment.len() - 1];
                pattern.push_str("/([^/]+)");
                param_names.push(Arc::from(name));
            } else if !segment.is_empty() {
                pattern.push('/');
                pattern.push_str(&regex::escape(segment));
            }
        }
        if path.ends_with('/') {
            pattern.push('/');
        }
        pattern.push('$');

        let regex = Regex::new(&pattern)
            .with_context(|| format!("compiling route pattern for `{path}`"))?;
        Ok(Self {
            raw: Arc::from(path),
            regex,
            param_names,
        })
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Match a request path, returning the extracted parameters on success.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<ParamVec> {
        let captures = self.regex.captures(path)?;
        let mut params = ParamVec::new();
        for (idx, name) in self.param_names.iter().enumerate() {
            if let Some(value) = captures.get(idx + 1) {
                params.push((Arc::clone(name), value.as_str().to_string()));
            }
        }
        Some(params)
    }
}

impl std::fmt::Debug for RoutePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutePattern").field("raw", &self.raw).finish()
    }
}

/// The routable unit published to the hosting router.
pub struct Endpoint {
    pattern: Option<RoutePattern>,
    order: i32,
    display_name: String,
    delegate: RequestDelegate,
    metadata: Vec<Arc<dyn HandlerMetadata>>,
}

impl Endpoint {
    /// The route pattern, if this endpoint is routable by path. Synthesized
    /// generic endpoints are pattern-less and only executed directly.
    #[must_use]
    pub fn pattern(&self) -> Option<&RoutePattern> {
        self.pattern.as_ref()
    }

    #[must_use]
    pub fn order(&self) -> i32 {
        self.order
    }

    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The full attached metadata sequence, oldest first. Alias endpoints
    /// carry two entries: the original registration and the alias copy.
    #[must_use]
    pub fn metadata(&self) -> &[Arc<dyn HandlerMetadata>] {
        &self.metadata
    }

    /// The effective handler metadata: the last attached entry, so an alias
    /// copy shadows the registration it delegates to.
    #[must_use]
    pub fn handler_metadata(&self) -> Option<&Arc<dyn HandlerMetadata>> {
        self.metadata.last()
    }

    /// Run the endpoint's execution delegate for one request.
    pub fn invoke(&self, ctx: &Arc<crate::context::RequestContext>) -> Result<()> {
        (self.delegate)(ctx)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("display_name", &self.display_name)
            .field("pattern", &self.pattern.as_ref().map(RoutePattern::raw))
            .field("order", &self.order)
            .field("metadata_len", &self.metadata.len())
            .finish()
    }
}

/// Mutable endpoint under construction; conventions receive it before
/// [`build`](EndpointBuilder::build) freezes the endpoint.
pub struct EndpointBuilder {
    pattern: Option<RoutePattern>,
    order: i32,
    display_name: String,
    delegate: Option<RequestDelegate>,
    metadata: Vec<Arc<dyn HandlerMetadata>>,
    request_filters: Vec<RequestDelegate>,
}

impl EndpointBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pattern: None,
            order: 0,
            display_name: String::new(),
            delegate: None,
            metadata: Vec::new(),
            request_filters: Vec::new(),
        }
    }

    pub fn pattern(&mut self, pattern: RoutePattern) -> &mut Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn order(&mut self, order: i32) -> &mut Self {
        self.order = order;
        self
    }

    pub fn display_name(&mut self, name: &str) -> &mut Self {
        self.display_name = name.to_string();
        self
    }

    pub fn delegate(&mut self, delegate: RequestDelegate) -> &mut Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn add_metadata(&mut self, metadata: Arc<dyn HandlerMetadata>) -> &mut Self {
        self.metadata.push(metadata);
        self
    }

    /// Attach a request-short-circuiting filter.
    ///
    /// Handler-backed endpoints reject filters at aggregation time; the hook
    /// exists so conventions written for ordinary endpoints fail loudly
    /// instead of being silently ignored.
    pub fn add_request_filter(&mut self, filter: RequestDelegate) -> &mut Self {
        self.request_filters.push(filter);
        self
    }

    #[must_use]
    pub fn has_request_filters(&self) -> bool {
        !self.request_filters.is_empty()
    }

    pub fn build(&self) -> Result<Arc<Endpoint>> {
        let delegate = match &self.delegate {
            Some(delegate) => Arc::clone(delegate),
            None => bail!(
                "endpoint `{}` was built without an execution delegate",
                self.display_name
            ),
        };
        Ok(Arc::new(Endpoint {
            pattern: self.pattern.clone(),
            order: self.order,
            display_name: self.display_name.clone(),
            delegate,
            metadata: self.metadata.clone(),
        }))
    }
}

impl Default for EndpointBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A route-building convention applied to every endpoint the aggregator
/// produces, in registration order.
pub type EndpointConvention = Arc<dyn Fn(&mut EndpointBuilder) + Send + Sync>;
