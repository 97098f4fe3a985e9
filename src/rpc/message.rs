//! Share Manager Messages

use crate::domain::{FilterProperties, NetworkMetadata, RequestContext, RequestSpec};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One share manager operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ShareMessage {
    CreateShare {
        share_id: String,
        #[serde(default)]
        request_spec: Option<RequestSpec>,
        #[serde(default)]
        filter_properties: Option<FilterProperties>,
        #[serde(default)]
        snapshot_id: Option<String>,
    },
    DeleteShare {
        share_id: String,
    },
    CreateSnapshot {
        share_id: String,
        snapshot_id: String,
    },
    DeleteSnapshot {
        snapshot_id: String,
    },
    AllowAccess {
        access_id: String,
    },
    DenyAccess {
        access_id: String,
    },
    ActivateNetwork {
        share_network_id: String,
        #[serde(default)]
        metadata: Option<NetworkMetadata>,
    },
    DeactivateNetwork {
        share_network_id: String,
    },
}

impl ShareMessage {
    /// Operation name used in logs and metrics
    pub fn operation(&self) -> &'static str {
        match self {
            ShareMessage::CreateShare { .. } => "create_share",
            ShareMessage::DeleteShare { .. } => "delete_share",
            ShareMessage::CreateSnapshot { .. } => "create_snapshot",
            ShareMessage::DeleteSnapshot { .. } => "delete_snapshot",
            ShareMessage::AllowAccess { .. } => "allow_access",
            ShareMessage::DenyAccess { .. } => "deny_access",
            ShareMessage::ActivateNetwork { .. } => "activate_network",
            ShareMessage::DeactivateNetwork { .. } => "deactivate_network",
        }
    }
}

/// A message together with the context of the caller that sent it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ctx: RequestContext,
    pub message: ShareMessage,
    pub sent_at: DateTime<Utc>,
}

impl Envelope {
    pub fn new(ctx: RequestContext, message: ShareMessage) -> Self {
        Self {
            ctx,
            message,
            sent_at: Utc::now(),
        }
    }
}
