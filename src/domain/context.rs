//! Request Context
//!
//! Tenant-scoped caller identity carried with every dispatched operation.

use serde::{Deserialize, Serialize};

/// Identity and privilege of the caller of a control plane operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Correlation ID for logs
    pub request_id: String,
    /// Calling user
    pub user_id: Option<String>,
    /// Calling project (tenant); empty for service-internal contexts
    pub project_id: Option<String>,
    /// Whether the caller holds elevated privileges
    pub is_admin: bool,
}

impl RequestContext {
    /// Create a tenant context
    pub fn new(user_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            request_id: new_request_id(),
            user_id: Some(user_id.into()),
            project_id: Some(project_id.into()),
            is_admin: false,
        }
    }

    /// Service-internal admin context with no project
    pub fn admin() -> Self {
        Self {
            request_id: new_request_id(),
            user_id: None,
            project_id: None,
            is_admin: true,
        }
    }

    /// Copy of this context with elevated privileges
    pub fn elevated(&self) -> Self {
        Self {
            is_admin: true,
            ..self.clone()
        }
    }

    /// Whether this context may read or write records owned by `project_id`
    pub fn can_access(&self, project_id: &str) -> bool {
        self.is_admin || self.project_id.as_deref() == Some(project_id)
    }

    /// Project that usage changes are billed to.
    ///
    /// An elevated context may carry no project at all, so the owner of the
    /// record wins whenever it differs from the caller.
    pub fn billing_project(&self, owner_project_id: &str) -> String {
        match self.project_id.as_deref() {
            Some(own) if own == owner_project_id => own.to_string(),
            _ => owner_project_id.to_string(),
        }
    }
}

fn new_request_id() -> String {
    format!("req-{}", uuid::Uuid::new_v4())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevated_keeps_identity() {
        let ctx = RequestContext::new("user-1", "project-1");
        let elevated = ctx.elevated();

        assert!(!ctx.is_admin);
        assert!(elevated.is_admin);
        assert_eq!(elevated.request_id, ctx.request_id);
        assert_eq!(elevated.project_id.as_deref(), Some("project-1"));
    }

    #[test]
    fn test_can_access() {
        let ctx = RequestContext::new("user-1", "project-1");
        assert!(ctx.can_access("project-1"));
        assert!(!ctx.can_access("project-2"));
        assert!(RequestContext::admin().can_access("project-2"));
    }

    #[test]
    fn test_billing_project_prefers_owner() {
        let admin = RequestContext::admin();
        assert_eq!(admin.billing_project("project-9"), "project-9");

        let tenant = RequestContext::new("user-1", "project-1");
        assert_eq!(tenant.billing_project("project-1"), "project-1");
        assert_eq!(tenant.elevated().billing_project("project-2"), "project-2");
    }
}
