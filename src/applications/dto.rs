use serde::Deserialize;

use crate::db::empty_string_as_none;

#[derive(Debug, Default, Deserialize)]
pub struct ApplicationFilter {
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub status: Option<String>,
}

/// Approve/reject body. On reject the remarks become the rejection reason.
#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    #[serde(default)]
    pub remarks: Option<String>,
}

impl DecisionRequest {
    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}
