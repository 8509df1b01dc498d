use serde::Deserialize;
use uuid::Uuid;

use super::repo_types::AuditAction;
use crate::db::empty_string_as_none;

#[derive(Debug, Default, Deserialize)]
pub struct LogFilter {
    pub search: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub action: Option<AuditAction>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub user: Option<Uuid>,
    /// `YYYY-MM-DD`, inclusive.
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`, inclusive.
    pub end_date: Option<String>,
}
