//! Route metadata aggregation.
//!
//! [`HandlerEndpointSource`] collects handler metadata and named route
//! mappings from every registered [`HandlerSource`], merges them into one
//! route table with deterministic conflict resolution, and publishes the
//! resulting endpoint set behind the [`EndpointSource`] contract the hosting
//! router consumes.
//!
//! The endpoint set is rebuilt lazily: a snapshot stays valid until the
//! composite of the source change tokens observed at build time fires, or a
//! convention is added. One read is one consistent (possibly one change
//! stale) snapshot.

use crate::change::ChangeToken;
use crate::endpoint::{Endpoint, EndpointBuilder, EndpointConvention, RoutePattern};
use crate::metadata::{HandlerMetadata, MappedHandlerMetadata};
use crate::pipeline::{default_dispatch, RequestDelegate};
use crate::source::HandlerSource;
use anyhow::{bail, Result};
use smallvec::{smallvec, SmallVec};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Router-facing endpoint provider: a snapshot of endpoints plus a change
/// token that fires when the snapshot is stale.
pub trait EndpointSource: Send + Sync {
    /// The current endpoint set.
    ///
    /// Errors are configuration defects (duplicate route keys, unsupported
    /// endpoint extensions) and should fail the hosting application fast.
    fn endpoints(&self) -> Result<Vec<Arc<Endpoint>>>;

    /// Fires when any contributing source changes.
    fn change_token(&self) -> ChangeToken;
}

type MetadataSeq = SmallVec<[Arc<dyn HandlerMetadata>; 2]>;

struct Snapshot {
    endpoints: Vec<Arc<Endpoint>>,
    observed: ChangeToken,
}

/// Aggregates handler registrations from every source into one endpoint set.
pub struct HandlerEndpointSource {
    sources: Mutex<Vec<Arc<dyn HandlerSource>>>,
    conventions: Mutex<Vec<EndpointConvention>>,
    default_delegate: RequestDelegate,
    cache: Mutex<Option<Snapshot>>,
}

impl HandlerEndpointSource {
    /// Aggregator whose endpoints execute through the stock default dispatch
    /// pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_delegate(default_dispatch())
    }

    /// Aggregator with a caller-supplied shared execution delegate.
    #[must_use]
    pub fn with_default_delegate(delegate: RequestDelegate) -> Self {
        Self {
            sources: Mutex::new(Vec::new()),
            conventions: Mutex::new(Vec::new()),
            default_delegate: delegate,
            cache: Mutex::new(None),
        }
    }

    /// Register a contributing metadata source.
    pub fn add_source(&self, source: Arc<dyn HandlerSource>) {
        lock(&self.sources).push(source);
        self.invalidate();
    }

    /// Register a route-building convention applied to every endpoint.
    pub fn add_convention(&self, convention: EndpointConvention) {
        lock(&self.conventions).push(convention);
        self.invalidate();
    }

    fn invalidate(&self) {
        *lock(&self.cache) = None;
    }

    fn build_snapshot(&self) -> Result<Snapshot> {
        let sources = lock(&self.sources).clone();
        // Capture the tokens before reading the sources: a mutation racing
        // with the build then invalidates the snapshot it may have missed.
        let observed = ChangeToken::composite(sources.iter().map(|s| s.change_token()));

        let mut table: Vec<(String, MetadataSeq)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        // Pass 1: direct registrations, insertion-ordered, unique keys.
        for source in &sources {
            for metadata in source.handler_metadata() {
                let key = metadata.route().to_string();
                if index.contains_key(&key) {
                    bail!("duplicate handler registration for route `{key}`");
                }
                index.insert(key.clone(), table.len());
                table.push((key, smallvec![metadata]));
            }
        }

        // Pass 2: named route mappings. An alias materializes only when its
        // target key holds exactly one entry and the alias key is free; any
        // other mapping is dropped silently so registration order across
        // sources does not matter.
        for source in &sources {
            for named in source.named_routes() {
                let Some(&target_idx) = index.get(&named.target) else {
                    debug!(
                        route = %named.route,
                        target = %named.target,
                        "dropping named route: target not registered"
                    );
                    continue;
                };
                if table[target_idx].1.len() != 1 {
                    debug!(
                        route = %named.route,
                        target = %named.target,
                        "dropping named route: target is already an alias"
                    );
                    continue;
                }
                if index.contains_key(&named.route) {
                    debug!(
                        route = %named.route,
                        target = %named.target,
                        "dropping named route: alias key already registered"
                    );
                    continue;
                }
                let original = Arc::clone(&table[target_idx].1[0]);
                let mapped: Arc<dyn HandlerMetadata> =
                    Arc::new(MappedHandlerMetadata::new(&named.route, Arc::clone(&original)));
                index.insert(named.route.clone(), table.len());
                table.push((named.route, smallvec![original, mapped]));
            }
        }

        // Pass 3: build one endpoint per table entry.
        let conventions = lock(&self.conventions).clone();
        let mut endpoints = Vec::with_capacity(table.len());
        for (key, entries) in table {
            let pattern = RoutePattern::parse(&key)?;
            let mut builder = EndpointBuilder::new();
            builder
                .pattern(pattern)
                .order(0)
                .display_name(&key)
                .delegate(Arc::clone(&self.default_delegate));
            for metadata in &entries {
                builder.add_metadata(Arc::clone(metadata));
            }
            for convention in &conventions {
                convention(&mut builder);
            }
            if builder.has_request_filters() {
                bail!(
                    "request filters are not supported on handler-backed endpoints (route `{key}`)"
                );
            }
            endpoints.push(builder.build()?);
        }

        info!(
            endpoint_count = endpoints.len(),
            source_count = sources.len(),
            "handler endpoint set rebuilt"
        );
        Ok(Snapshot {
            endpoints,
            observed,
        })
    }
}

impl Default for HandlerEndpointSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointSource for HandlerEndpointSource {
    fn endpoints(&self) -> Result<Vec<Arc<Endpoint>>> {
        let mut cache = lock(&self.cache);
        if let Some(snapshot) = cache.as_ref() {
            if !snapshot.observed.has_changed() {
                return Ok(snapshot.endpoints.clone());
            }
        }
        let snapshot = self.build_snapshot()?;
        let endpoints = snapshot.endpoints.clone();
        *cache = Some(snapshot);
        Ok(endpoints)
    }

    fn change_token(&self) -> ChangeToken {
        ChangeToken::composite(lock(&self.sources).iter().map(|s| s.change_token()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
