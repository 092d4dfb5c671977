//! Error taxonomy of the control core.
//!
//! Every variant except [`CoreError::Storage`] is raised before any entity is
//! touched, so a failed call leaves the inventory unchanged. Storage failures
//! abort the mutation before the in-memory state is updated.

use thiserror::Error as ThisError;

use crate::model::HostStatus;

/// Uniform message for authorization failures, independent of the action.
pub const PERMISSION_DENIED_MESSAGE: &str = "Permission denied.";

#[derive(Debug, ThisError)]
pub enum CoreError {
    /// Malformed CIDR, address or range input.
    #[error("{0}")]
    Validation(String),
    #[error("Permission denied.")]
    PermissionDenied,
    #[error("{0} not found")]
    NotFound(String),
    #[error("Host in state {from} cannot handle event '{event}'")]
    InvalidTransition { from: HostStatus, event: String },
    /// Exclusivity or overlap violation, or a lost compare-and-set race.
    #[error("{message}")]
    Conflict { message: String, retryable: bool },
    #[error("Discovered addresses can only be recorded by network observation")]
    ForbiddenOrigin,
    #[error("Only IPv4 scanning is supported")]
    UnsupportedFamily,
    #[error("Subnet must be configured on a rack controller")]
    NoAgentAvailable,
    #[error("Storage failure")]
    Storage(#[from] sqlx::Error),
}

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            retryable: false,
        }
    }

    /// A compare-and-set lost against a concurrent writer; the caller may re-read and retry.
    pub(crate) fn stale(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            retryable: true,
        }
    }

    /// Stable machine-readable name used in API error bodies.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match *self {
            Self::Validation(_) => "validation_error",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound(_) => "not_found",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Conflict { .. } => "conflict",
            Self::ForbiddenOrigin => "forbidden_origin",
            Self::UnsupportedFamily => "unsupported_family",
            Self::NoAgentAvailable => "no_agent_available",
            Self::Storage(_) => "storage_error",
        }
    }
}

impl From<ipnet::AddrParseError> for CoreError {
    fn from(e: ipnet::AddrParseError) -> Self {
        Self::Validation(format!("Invalid CIDR: {e}"))
    }
}

impl From<core::net::AddrParseError> for CoreError {
    fn from(e: core::net::AddrParseError) -> Self {
        Self::Validation(format!("Invalid IP address: {e}"))
    }
}
