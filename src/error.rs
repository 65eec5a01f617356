//! Error taxonomy for the control plane.
//!
//! Only [`ControlError`] ever reaches a caller as a failed call. Node-level
//! [`FetchError`]s are absorbed by the fleet aggregator and surface as
//! `failed_nodes` entries in an otherwise successful response.

use serde::Serialize;
use thiserror::Error;

/// Call-level failures returned to the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// A host failed validation. `field` is the API (camelCase) field name.
    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfiguration { field: &'static str, reason: String },

    /// The secure random source could not produce key material.
    #[error("entropy unavailable: {0}")]
    EntropyUnavailable(String),
}

impl ControlError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field,
            reason: reason.into(),
        }
    }

    /// The offending field, if this is a validation failure.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::InvalidConfiguration { field, .. } => Some(field),
            Self::EntropyUnavailable(_) => None,
        }
    }
}

/// Per-node fetch failure, recorded inside a `NodeSnapshot`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FetchError {
    /// Transport failure, including a per-fetch timeout.
    #[error("node {node_id} unreachable: {detail}")]
    NodeUnreachable { node_id: String, detail: String },

    /// The node answered with a payload that could not be decoded.
    #[error("node {node_id} returned a malformed payload: {detail}")]
    Upstream { node_id: String, detail: String },

    /// The overall aggregation deadline elapsed before the node finished.
    #[error("node {node_id} did not finish before the aggregation deadline")]
    AggregationTimeout { node_id: String },
}

/// Failures raised by the Node Transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("unknown node {0}")]
    UnknownNode(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("node responded with status {0}")]
    Status(u16),
}

/// Host persistence failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("host {0} not found")]
    NotFound(uuid::Uuid),

    #[error("host {0} already exists")]
    AlreadyExists(uuid::Uuid),

    /// The host still carries a routing association; detach `routeId` first.
    #[error("host {id} is referenced by route {route_id}; detach the route before deleting")]
    StillRouted { id: uuid::Uuid, route_id: i64 },

    #[error(transparent)]
    Invalid(#[from] ControlError),
}
