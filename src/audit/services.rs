use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use super::repo;
use super::repo_types::AuditAction;
use crate::auth::extractors::{ClientIp, CurrentUser};

/// A pending operation-log row.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub actor: Option<Uuid>,
    pub action: AuditAction,
    pub object_type: &'static str,
    pub object_id: String,
    pub object_name: String,
    pub ip_address: String,
    pub description: String,
}

impl AuditEntry {
    pub fn by(actor: &CurrentUser, ip: &ClientIp, action: AuditAction) -> Self {
        Self::by_id(actor.id, ip, action)
    }

    pub fn by_id(actor_id: Uuid, ip: &ClientIp, action: AuditAction) -> Self {
        Self {
            actor: Some(actor_id),
            action,
            object_type: "",
            object_id: String::new(),
            object_name: String::new(),
            ip_address: ip.0.clone(),
            description: String::new(),
        }
    }

    pub fn target(
        mut self,
        object_type: &'static str,
        object_id: impl ToString,
        object_name: impl Into<String>,
    ) -> Self {
        self.object_type = object_type;
        self.object_id = object_id.to_string();
        self.object_name = object_name.into();
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Append an operation-log row. Best effort: a failed write is logged and
/// swallowed so the primary action still succeeds.
pub async fn record(db: &PgPool, entry: AuditEntry) {
    match repo::insert(db, &entry).await {
        Ok(id) => debug!(log_id = id, action = %entry.action, object_type = entry.object_type, "audit recorded"),
        Err(e) => warn!(
            error = ?e,
            action = %entry.action,
            object_type = entry.object_type,
            object_id = %entry.object_id,
            "audit write failed"
        ),
    }
}
