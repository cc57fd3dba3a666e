//! Session-state requirement hints.
//!
//! The bridge does not implement session storage. Handlers only declare how
//! they would use session state, and hosting code inspects that hint on the
//! materialized endpoint to decide what to acquire before running the
//! handler.

use crate::endpoint::Endpoint;
use crate::metadata::HandlerMetadata;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// How a handler intends to use session state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionBehavior {
    /// The handler never touches session state.
    Disabled,
    /// The handler reads session state but never writes it.
    ReadOnly,
    /// The handler reads and writes session state.
    ReadWrite,
    /// The handler made no statement about session state.
    #[default]
    NotApplicable,
}

impl Display for SessionBehavior {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionBehavior::Disabled => "disabled",
            SessionBehavior::ReadOnly => "read_only",
            SessionBehavior::ReadWrite => "read_write",
            SessionBehavior::NotApplicable => "not_applicable",
        };
        f.write_str(name)
    }
}

/// Session hint attached to an endpoint, if the endpoint is handler-backed.
///
/// Alias endpoints report the behavior of the registration they delegate to,
/// so inspecting `/alias` yields the same answer as inspecting its target.
#[must_use]
pub fn endpoint_session_behavior(endpoint: &Endpoint) -> Option<SessionBehavior> {
    endpoint
        .handler_metadata()
        .map(|metadata| metadata.session_behavior())
}

/// The registration an endpoint ultimately executes.
///
/// For a direct registration this is the endpoint's own metadata; for an
/// alias it is the metadata of the aliased route. Aliases do not chain, so
/// one hop is always enough.
#[must_use]
pub fn original_metadata(endpoint: &Endpoint) -> Option<Arc<dyn HandlerMetadata>> {
    let metadata = endpoint.handler_metadata()?;
    match metadata.delegated_from() {
        Some(original) => Some(original),
        None => Some(Arc::clone(metadata)),
    }
}
