//! Database fixtures for `#[sqlx::test]` cases. Each test gets a fresh
//! database with `./migrations` applied.

use std::str::FromStr;

use bytes::Bytes;
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    accounts::{repo as accounts, repo_types::Role},
    applications::services::ProofFile,
    orders::{
        dto::OrderInput,
        repo as orders_repo,
        repo_types::{Order, OrderStatus, ServiceType},
        services as orders,
    },
};

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).expect("decimal literal")
}

/// Inserts a user with a throwaway hash; these tests never log in with it.
pub async fn user(db: &PgPool, username: &str, role: Role) -> Uuid {
    accounts::create_user(db, username, "not-a-real-hash", role, role.is_admin())
        .await
        .expect("insert user")
        .id
}

pub fn order_input(teacher_id: Uuid, price: &str, hours: &str) -> OrderInput {
    OrderInput {
        name: "Grade 9 maths".into(),
        student_count: 1,
        service_type: ServiceType::OneToOne,
        unit_price: dec(price),
        total_hours: dec(hours),
        teacher_id,
        status: None,
    }
}

/// Order created through the service, then walked forward to `status`.
pub async fn order(
    db: &PgPool,
    teacher_id: Uuid,
    admin_id: Uuid,
    price: &str,
    hours: &str,
    status: OrderStatus,
) -> Order {
    let created = orders::create_order(db, &order_input(teacher_id, price, hours), admin_id)
        .await
        .expect("create order");
    if status != OrderStatus::Pending {
        orders_repo::set_status(db, created.id, status)
            .await
            .expect("set order status");
    }
    orders_repo::find_by_id(db, created.id)
        .await
        .expect("reload order")
        .expect("order exists")
}

pub fn pdf_proof() -> ProofFile {
    ProofFile {
        file_name: "timesheet.pdf".into(),
        content_type: "application/pdf".into(),
        body: Bytes::from_static(b"%PDF-1.4 timesheet"),
    }
}

pub async fn audit_rows(db: &PgPool, object_type: &str, object_id: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM operation_logs WHERE object_type = $1 AND object_id = $2",
    )
    .bind(object_type)
    .bind(object_id)
    .fetch_one(db)
    .await
    .expect("count audit rows");
    n
}
