use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "application_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
    Withdrawn,
}

impl ApplicationStatus {
    /// Pending and approved applications block a new one on the same order.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Withdrawn => "withdrawn",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "withdrawn" => Ok(Self::Withdrawn),
            other => Err(format!("unknown application status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SalaryApplication {
    pub id: Uuid,
    pub application_number: String,
    pub order_id: Uuid,
    pub order_number: String,
    pub order_total: Decimal,
    pub teacher_id: Uuid,
    pub teacher_username: String,
    pub apply_amount: Decimal,
    #[serde(skip_serializing)]
    pub proof_key: String,
    pub proof_name: String,
    pub proof_content_type: String,
    pub status: ApplicationStatus,
    pub approved_by: Option<Uuid>,
    pub reviewer_username: Option<String>,
    pub remarks: Option<String>,
    pub rejection_reason: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub approved_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub rejected_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub withdrawn_at: Option<OffsetDateTime>,
}

/// Expects `salary_applications a JOIN orders o JOIN users t LEFT JOIN users r`.
pub(crate) const APPLICATION_COLUMNS: &str = r#"
    a.id, a.application_number, a.order_id, o.order_number, o.total_amount AS order_total,
    a.teacher_id, t.username AS teacher_username, a.apply_amount,
    a.proof_key, a.proof_name, a.proof_content_type, a.status,
    a.approved_by, r.username AS reviewer_username, a.remarks, a.rejection_reason,
    a.created_at, a.approved_at, a.rejected_at, a.withdrawn_at
"#;

pub(crate) const APPLICATION_FROM: &str = r#"
    salary_applications a
    JOIN orders o ON o.id = a.order_id
    JOIN users t ON t.id = a.teacher_id
    LEFT JOIN users r ON r.id = a.approved_by
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_statuses() {
        assert!(ApplicationStatus::Pending.is_active());
        assert!(ApplicationStatus::Approved.is_active());
        assert!(!ApplicationStatus::Rejected.is_active());
        assert!(!ApplicationStatus::Withdrawn.is_active());
    }

    #[test]
    fn parse_round_trips_display() {
        for s in ["pending", "approved", "rejected", "withdrawn"] {
            assert_eq!(s.parse::<ApplicationStatus>().unwrap().to_string(), s);
        }
        assert!("cancelled".parse::<ApplicationStatus>().is_err());
    }
}
