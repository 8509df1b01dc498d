use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Forward-only lifecycle: pending → ongoing → completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "order_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Ongoing,
    Completed,
}

impl OrderStatus {
    /// The only status this one may move to, if any.
    pub fn next(self) -> Option<OrderStatus> {
        match self {
            Self::Pending => Some(Self::Ongoing),
            Self::Ongoing => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    pub fn can_transition_to(self, to: OrderStatus) -> bool {
        self.next() == Some(to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "ongoing" => Ok(Self::Ongoing),
            "completed" => Ok(Self::Completed),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "service_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    OneToOne,
    OneToTwo,
    Custom,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub name: String,
    pub student_count: i32,
    pub service_type: ServiceType,
    pub unit_price: Decimal,
    pub total_hours: Decimal,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub teacher_id: Uuid,
    pub teacher_username: String,
    pub created_by: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Column list shared by every order query; expects `orders o JOIN users t`.
pub(crate) const ORDER_COLUMNS: &str = r#"
    o.id, o.order_number, o.name, o.student_count, o.service_type,
    o.unit_price, o.total_hours, o.total_amount, o.status,
    o.teacher_id, t.username AS teacher_username, o.created_by,
    o.created_at, o.updated_at
"#;
