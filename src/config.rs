//! Declarative handler mapping.
//!
//! Routes can be declared in a YAML handler map instead of programmatic
//! registration:
//!
//! ```yaml
//! handlers:
//!   - route: /reports/{name}
//!     handler: report_handler
//!     session: read_only
//! named_routes:
//!   - route: /legacy/reports/{name}
//!     target: /reports/{name}
//! ```
//!
//! Declared handler names resolve through an explicit constructor table at
//! load time; an unknown name is a configuration defect and fails the load.

use crate::change::{ChangeNotifier, ChangeToken};
use crate::metadata::{HandlerFactory, HandlerMetadata, NamedRoute, RouteHandlerMetadata};
use crate::session::SessionBehavior;
use crate::source::HandlerSource;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Named handler constructors the map file resolves against.
pub type ConstructorTable = HashMap<String, HandlerFactory>;

/// On-disk shape of a handler map file.
#[derive(Debug, Deserialize)]
pub struct HandlerMapFile {
    #[serde(default)]
    pub handlers: Vec<HandlerMapEntry>,
    #[serde(default)]
    pub named_routes: Vec<NamedRoute>,
}

#[derive(Debug, Deserialize)]
pub struct HandlerMapEntry {
    pub route: String,
    pub handler: String,
    #[serde(default)]
    pub session: SessionBehavior,
}

/// Handler source backed by a parsed handler map.
///
/// Reloading replaces the declared entries wholesale and fires the change
/// token, mirroring programmatic registration.
pub struct DeclaredHandlerSource {
    entries: Mutex<Vec<Arc<dyn HandlerMetadata>>>,
    named: Mutex<Vec<NamedRoute>>,
    notifier: ChangeNotifier,
}

impl std::fmt::Debug for DeclaredHandlerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeclaredHandlerSource").finish_non_exhaustive()
    }
}

impl DeclaredHandlerSource {
    pub fn from_yaml(yaml: &str, constructors: &ConstructorTable) -> Result<Self> {
        let file: HandlerMapFile =
            serde_yaml::from_str(yaml).context("failed to parse handler map")?;
        Self::from_file(file, constructors)
    }

    pub fn from_path<P: AsRef<Path>>(path: P, constructors: &ConstructorTable) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read handler map `{}`", path.display()))?;
        Self::from_yaml(&yaml, constructors)
    }

    pub fn from_file(file: HandlerMapFile, constructors: &ConstructorTable) -> Result<Self> {
        let source = Self {
            entries: Mutex::new(Vec::new()),
            named: Mutex::new(Vec::new()),
            notifier: ChangeNotifier::new(),
        };
        source.apply(file, constructors)?;
        Ok(source)
    }

    /// Replace the declared entries with a newly parsed map.
    pub fn reload(&self, file: HandlerMapFile, constructors: &ConstructorTable) -> Result<()> {
        self.apply(file, constructors)
    }

    fn apply(&self, file: HandlerMapFile, constructors: &ConstructorTable) -> Result<()> {
        let mut entries: Vec<Arc<dyn HandlerMetadata>> = Vec::with_capacity(file.handlers.len());
        for declared in &file.handlers {
            let Some(factory) = constructors.get(&declared.handler) else {
                bail!(
                    "no constructor registered for handler `{}` (route `{}`)",
                    declared.handler,
                    declared.route
                );
            };
            entries.push(Arc::new(RouteHandlerMetadata::new(
                &declared.route,
                declared.session,
                Arc::clone(factory),
            )));
        }

        info!(
            handler_count = entries.len(),
            named_route_count = file.named_routes.len(),
            "handler map applied"
        );
        *lock(&self.entries) = entries;
        *lock(&self.named) = file.named_routes;
        self.notifier.notify();
        Ok(())
    }
}

impl HandlerSource for DeclaredHandlerSource {
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
