//! Error types for the share control plane
//!
//! Provides one structured error type for the scheduler, the share manager,
//! the backend drivers and the in-process collaborators (ledger, quota,
//! network allocation, dispatch).

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the control plane
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Ledger Errors
    // =========================================================================
    #[error("Resource not found: {kind}/{id}")]
    NotFound { kind: String, id: String },

    #[error("Snapshot {snapshot_id} is not available (status: {status})")]
    InvalidSnapshot { snapshot_id: String, status: String },

    #[error("Share network {share_network_id} cannot start {operation} from status {status}")]
    InvalidShareNetworkState {
        share_network_id: String,
        operation: String,
        status: String,
    },

    // =========================================================================
    // Scheduling Errors
    // =========================================================================
    #[error("Host {host} is not up or does not exist")]
    HostUnavailable { host: String },

    #[error(
        "Not enough allocatable share gigabytes remaining on {host}: \
         requested {requested_gb} GB, allocated {allocated_gb} GB, max {max_gb} GB"
    )]
    InsufficientCapacity {
        host: String,
        requested_gb: u64,
        allocated_gb: u64,
        max_gb: u64,
    },

    #[error("No valid host was found: {reason}")]
    NoEligibleHost { reason: String },

    // =========================================================================
    // Driver Errors
    // =========================================================================
    #[error("Driver operation failed: {backend} - {operation}: {reason}")]
    Driver {
        backend: String,
        operation: String,
        reason: String,
    },

    #[error("Snapshot {snapshot_id} is busy")]
    SnapshotIsBusy { snapshot_id: String },

    #[error("Access rule {access_type}:{access_to} already exists")]
    AccessRuleAlreadyExists {
        access_type: String,
        access_to: String,
    },

    #[error("Invalid share access: {reason}")]
    InvalidShareAccess { reason: String },

    #[error("GlusterFS error: {0}")]
    Glusterfs(String),

    #[error("Command failed: {command} (exit code {exit_code:?}): {stderr}")]
    ProcessExecution {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    // =========================================================================
    // Quota Errors
    // =========================================================================
    #[error(
        "Quota exceeded for project {project_id}: {resource} requested {requested}, \
         in use {in_use}, reserved {reserved}, limit {limit}"
    )]
    QuotaExceeded {
        project_id: String,
        resource: String,
        requested: i64,
        in_use: i64,
        reserved: i64,
        limit: i64,
    },

    #[error("Quota reservation not found: {reservation_id}")]
    ReservationNotFound { reservation_id: String },

    // =========================================================================
    // Network Errors
    // =========================================================================
    #[error("Network allocation failed for share network {share_network_id}: {reason}")]
    NetworkAllocation {
        share_network_id: String,
        reason: String,
    },

    // =========================================================================
    // Dispatch Errors
    // =========================================================================
    #[error("Dispatch to host {host} failed: {reason}")]
    Dispatch { host: String, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Advice handed to the dispatch layer when an operation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Retry with exponential backoff
    RetryWithBackoff,
    /// Retry after a specific duration
    RetryAfter(Duration),
    /// Do not retry automatically; needs operator or user action
    Abandon,
}

impl Error {
    /// Build a not-found error for a ledger entity
    pub fn not_found(kind: &str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind: kind.to_string(),
            id: id.into(),
        }
    }

    /// Build a generic driver failure
    pub fn driver(backend: &str, operation: &str, reason: impl Into<String>) -> Self {
        Error::Driver {
            backend: backend.to_string(),
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }

    /// Determine what the retry layer should do with this error
    pub fn action(&self) -> ErrorAction {
        match self {
            // Transient errors - retry with backoff
            Error::Dispatch { .. } | Error::Io(_) | Error::ProcessExecution { .. } => {
                ErrorAction::RetryWithBackoff
            }

            // Busy backend resources clear on their own
            Error::SnapshotIsBusy { .. } => ErrorAction::RetryAfter(Duration::from_secs(30)),

            // Fleet may gain capacity or hosts may come back
            Error::HostUnavailable { .. }
            | Error::InsufficientCapacity { .. }
            | Error::NoEligibleHost { .. } => ErrorAction::RetryAfter(Duration::from_secs(60)),

            // Configuration/validation errors - don't retry automatically
            Error::Configuration(_)
            | Error::NotFound { .. }
            | Error::InvalidSnapshot { .. }
            | Error::InvalidShareNetworkState { .. }
            | Error::InvalidShareAccess { .. }
            | Error::QuotaExceeded { .. }
            | Error::AccessRuleAlreadyExists { .. }
            | Error::JsonParse(_)
            | Error::YamlParse(_) => ErrorAction::Abandon,

            // Driver failures leave the entity in an error status; a retry
            // is a new request from the caller
            Error::Driver { .. } | Error::Glusterfs(_) => ErrorAction::Abandon,

            _ => ErrorAction::RetryWithBackoff,
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::Abandon)
    }

    /// Check if this error is transient
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Dispatch { .. } | Error::Io(_) | Error::ProcessExecution { .. }
        )
    }
}

/// Result type alias for the control plane
pub type Result<T> = std::result::Result<T, Error>;
