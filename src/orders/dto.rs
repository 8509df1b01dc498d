use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::{Order, OrderStatus, ServiceType};
use crate::applications::repo_types::SalaryApplication;
use crate::db::empty_string_as_none;

/// Admin create/edit body. `status` defaults to pending on create and to the
/// current status on edit.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderInput {
    pub name: String,
    pub student_count: i32,
    pub service_type: ServiceType,
    pub unit_price: Decimal,
    pub total_hours: Decimal,
    pub teacher_id: Uuid,
    #[serde(default)]
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub search: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub status: Option<String>,
}

/// Teacher status change. Kept as a raw string so an unknown value is a
/// validation error rather than a body rejection.
#[derive(Debug, Deserialize)]
pub struct StatusChangeRequest {
    pub new_status: String,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub applications: Vec<SalaryApplication>,
}

#[derive(Debug, Serialize)]
pub struct TeacherOrderDetail {
    pub order: Order,
    /// Next allowed status, if any.
    pub next_status: Option<OrderStatus>,
    pub latest_application: Option<SalaryApplication>,
}
