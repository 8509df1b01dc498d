use bytes::Bytes;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use super::repo::{self, NewApplication};
use super::repo_types::{ApplicationStatus, SalaryApplication};
use crate::{
    auth::extractors::CurrentUser,
    error::{is_unique_violation, AppError, AppResult},
    numbering::{self, DocumentKind},
    orders::{
        repo as orders,
        repo_types::{Order, OrderStatus},
    },
    state::AppState,
    storage::{ProofKind, MAX_PROOF_BYTES},
};

/// Uploaded proof document as received from the multipart form.
#[derive(Debug, Clone)]
pub struct ProofFile {
    pub file_name: String,
    pub content_type: String,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct CreateApplication {
    pub order_id: Uuid,
    pub apply_amount: Decimal,
    pub remarks: Option<String>,
    pub proof: ProofFile,
}

pub fn validate_proof(proof: &ProofFile) -> AppResult<ProofKind> {
    if proof.body.is_empty() {
        return Err(AppError::validation("proof_file is empty"));
    }
    if proof.body.len() > MAX_PROOF_BYTES {
        return Err(AppError::validation("proof_file must be at most 3 MB"));
    }
    ProofKind::from_content_type(&proof.content_type).ok_or_else(|| {
        AppError::validation("proof_file must be a JPG or PNG image or a PDF document")
    })
}

pub fn check_amount(amount: Decimal, order_total: Decimal) -> AppResult<()> {
    if amount <= Decimal::ZERO {
        return Err(AppError::validation("apply_amount must be greater than 0"));
    }
    if amount.normalize().scale() > 2 {
        return Err(AppError::validation("apply_amount must have at most 2 decimal places"));
    }
    if amount > order_total {
        return Err(AppError::validation(format!(
            "apply_amount must not exceed the order total ({})",
            order_total
        )));
    }
    Ok(())
}

/// Only the assigned teacher's completed orders can be claimed.
pub fn check_eligible(order: &Order, teacher_id: Uuid) -> AppResult<()> {
    if order.teacher_id != teacher_id {
        return Err(AppError::NotFound("Order"));
    }
    if order.status != OrderStatus::Completed {
        return Err(AppError::validation(
            "salary can only be requested for a completed order",
        ));
    }
    Ok(())
}

/// Admins see everything; teachers only their own applications.
pub fn ensure_visible(user: &CurrentUser, app: &SalaryApplication) -> AppResult<()> {
    if user.role.is_admin() || app.teacher_id == user.id {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn active_exists() -> AppError {
    AppError::Conflict("this order already has a pending or approved salary application".into())
}

/// Store the proof, then number and insert the application. The upload runs
/// before any transaction opens; the object is removed again if the insert
/// does not commit.
pub async fn create_application(
    state: &AppState,
    teacher_id: Uuid,
    req: CreateApplication,
) -> AppResult<SalaryApplication> {
    let kind = validate_proof(&req.proof)?;
    let order = orders::find_by_id(&state.db, req.order_id)
        .await?
        .ok_or(AppError::NotFound("Order"))?;
    check_eligible(&order, teacher_id)?;
    check_amount(req.apply_amount, order.total_amount)?;
    if repo::has_active(&state.db, order.id).await? {
        return Err(active_exists());
    }

    let key = state
        .proofs
        .upload(teacher_id, kind, req.proof.body.clone())
        .await?;
    let new = NewApplication {
        order_id: order.id,
        teacher_id,
        apply_amount: req.apply_amount,
        proof_key: key.clone(),
        proof_name: req.proof.file_name.clone(),
        proof_content_type: kind.content_type().to_string(),
        remarks: req.remarks.clone(),
    };
    let id = match insert_numbered(&state.db, &new).await {
        Ok(id) => id,
        Err(e) => {
            state.proofs.discard(&key).await;
            return Err(e);
        }
    };

    let app = repo::find_by_id(&state.db, id)
        .await?
        .ok_or(AppError::NotFound("Salary application"))?;
    info!(
        application_id = %app.id,
        application_number = %app.application_number,
        order_id = %app.order_id,
        amount = %app.apply_amount,
        "salary application created"
    );
    Ok(app)
}

/// Short transaction: re-check the locked order, take the next number, insert.
async fn insert_numbered(db: &PgPool, new: &NewApplication) -> AppResult<Uuid> {
    let mut tx = db.begin().await?;
    let order = orders::lock(&mut *tx, new.order_id)
        .await?
        .ok_or(AppError::NotFound("Order"))?;
    check_eligible(&order, new.teacher_id)?;
    check_amount(new.apply_amount, order.total_amount)?;

    let number = numbering::next_number(&mut *tx, DocumentKind::SalaryApplication).await?;
    let inserted = repo::insert(&mut *tx, &number, new).await;
    match inserted {
        Ok(id) => {
            tx.commit().await?;
            Ok(id)
        }
        Err(e) if is_unique_violation(&e) => Err(active_exists()),
        Err(e) => {
            error!(error = ?e, order_id = %new.order_id, "salary application insert failed");
            Err(e.into())
        }
    }
}

fn ensure_pending(app: &SalaryApplication, verb: &str) -> AppResult<()> {
    if app.status == ApplicationStatus::Pending {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "only pending applications can be {} (current status: {})",
            verb, app.status
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

/// Reviewer decision on a pending application.
pub async fn decide(
    db: &PgPool,
    id: Uuid,
    reviewer: Uuid,
    decision: Decision,
    remarks: Option<&str>,
) -> AppResult<SalaryApplication> {
    let mut tx = db.begin().await?;
    let app = repo::lock(&mut *tx, id)
        .await?
        .ok_or(AppError::NotFound("Salary application"))?;
    match decision {
        Decision::Approve => {
            ensure_pending(&app, "approved")?;
            // the order total may have been edited since the teacher applied
            let order = orders::lock(&mut *tx, app.order_id)
                .await?
                .ok_or(AppError::NotFound("Order"))?;
            check_amount(app.apply_amount, order.total_amount)?;
            repo::mark_approved(&mut *tx, id, reviewer, remarks).await?;
        }
        Decision::Reject => {
            ensure_pending(&app, "rejected")?;
            repo::mark_rejected(&mut *tx, id, reviewer, remarks).await?;
        }
    }
    let after = repo::find_by_id(&mut *tx, id)
        .await?
        .ok_or(AppError::NotFound("Salary application"))?;
    tx.commit().await?;

    info!(application_id = %id, reviewer = %reviewer, decision = ?decision, "salary application decided");
    Ok(after)
}

/// Owner withdraws a pending application.
pub async fn withdraw(db: &PgPool, id: Uuid, teacher_id: Uuid) -> AppResult<SalaryApplication> {
    let mut tx = db.begin().await?;
    let app = repo::lock(&mut *tx, id)
        .await?
        .filter(|a| a.teacher_id == teacher_id)
        .ok_or(AppError::NotFound("Salary application"))?;
    ensure_pending(&app, "withdrawn")?;
    repo::mark_withdrawn(&mut *tx, id).await?;
    let after = repo::find_by_id(&mut *tx, id)
        .await?
        .ok_or(AppError::NotFound("Salary application"))?;
    tx.commit().await?;

    info!(application_id = %id, "salary application withdrawn");
    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{accounts::repo_types::Role, orders::repo_types::ServiceType};
    use std::str::FromStr;
    use time::OffsetDateTime;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn proof(ct: &str, len: usize) -> ProofFile {
        ProofFile {
            file_name: "proof".into(),
            content_type: ct.into(),
            body: Bytes::from(vec![1u8; len]),
        }
    }

    fn order(teacher_id: Uuid, status: OrderStatus) -> Order {
        let now = OffsetDateTime::now_utc();
        Order {
            id: Uuid::new_v4(),
            order_number: "ORD20250301000001".into(),
            name: "Maths".into(),
            student_count: 1,
            service_type: ServiceType::OneToOne,
            unit_price: dec("100"),
            total_hours: dec("10"),
            total_amount: dec("1000.00"),
            status,
            teacher_id,
            teacher_username: "t1".into(),
            created_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        }
    }

    fn application(teacher_id: Uuid) -> SalaryApplication {
        SalaryApplication {
            id: Uuid::new_v4(),
            application_number: "APP20250301000001".into(),
            order_id: Uuid::new_v4(),
            order_number: "ORD20250301000001".into(),
            order_total: dec("1000.00"),
            teacher_id,
            teacher_username: "t1".into(),
            apply_amount: dec("500"),
            proof_key: "proofs/x.pdf".into(),
            proof_name: "x.pdf".into(),
            proof_content_type: "application/pdf".into(),
            status: ApplicationStatus::Pending,
            approved_by: None,
            reviewer_username: None,
            remarks: None,
            rejection_reason: None,
            created_at: OffsetDateTime::now_utc(),
            approved_at: None,
            rejected_at: None,
            withdrawn_at: None,
        }
    }

    #[test]
    fn proof_types_and_size() {
        assert_eq!(validate_proof(&proof("image/jpeg", 10)).unwrap(), ProofKind::Jpeg);
        assert_eq!(validate_proof(&proof("image/png", 10)).unwrap(), ProofKind::Png);
        assert_eq!(
            validate_proof(&proof("application/pdf", MAX_PROOF_BYTES)).unwrap(),
            ProofKind::Pdf
        );
        assert!(validate_proof(&proof("application/pdf", MAX_PROOF_BYTES + 1)).is_err());
        assert!(validate_proof(&proof("image/gif", 10)).is_err());
        assert!(validate_proof(&proof("application/pdf", 0)).is_err());
    }

    #[test]
    fn amount_cannot_exceed_order_total() {
        let total = dec("1000.00");
        assert!(check_amount(dec("1000"), total).is_ok());
        assert!(check_amount(dec("0.01"), total).is_ok());
        let err = check_amount(dec("1000.01"), total).unwrap_err();
        assert!(err.to_string().contains("1000.00"));
        assert!(check_amount(dec("0"), total).is_err());
        assert!(check_amount(dec("-5"), total).is_err());
        assert!(check_amount(dec("1.001"), total).is_err());
    }

    #[test]
    fn only_own_completed_orders_are_eligible() {
        let me = Uuid::new_v4();
        assert!(check_eligible(&order(me, OrderStatus::Completed), me).is_ok());
        for status in [OrderStatus::Pending, OrderStatus::Ongoing] {
            let err = check_eligible(&order(me, status), me).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        let err = check_eligible(&order(Uuid::new_v4(), OrderStatus::Completed), me).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn teachers_only_see_their_own_applications() {
        let owner = Uuid::new_v4();
        let app = application(owner);
        let teacher = |id| CurrentUser {
            id,
            username: "t".into(),
            role: Role::Teacher,
        };
        assert!(ensure_visible(&teacher(owner), &app).is_ok());
        assert!(matches!(
            ensure_visible(&teacher(Uuid::new_v4()), &app),
            Err(AppError::Forbidden)
        ));
        let admin = CurrentUser {
            id: Uuid::new_v4(),
            username: "a".into(),
            role: Role::Admin,
        };
        assert!(ensure_visible(&admin, &app).is_ok());
    }

    #[test]
    fn decisions_need_a_pending_application() {
        let mut app = application(Uuid::new_v4());
        assert!(ensure_pending(&app, "approved").is_ok());
        for status in [
            ApplicationStatus::Approved,
            ApplicationStatus::Rejected,
            ApplicationStatus::Withdrawn,
        ] {
            app.status = status;
            let err = ensure_pending(&app, "withdrawn").unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    mod with_db {
        use std::{
            sync::{
                atomic::{AtomicUsize, Ordering},
                Arc, Mutex,
            },
            time::{Duration, Instant},
        };

        use async_trait::async_trait;
        use sqlx::PgPool;

        use super::super::*;
        use crate::{
            accounts::repo_types::Role,
            orders::repo_types::OrderStatus,
            storage::ObjectStore,
            test_support::{self as fx, dec},
        };

        /// Bucket whose uploads take `delay`; counts puts and records deletes.
        struct SlowBucket {
            delay: Duration,
            puts: AtomicUsize,
            deletes: Mutex<Vec<String>>,
        }

        impl SlowBucket {
            fn new(delay: Duration) -> Arc<Self> {
                Arc::new(Self {
                    delay,
                    puts: AtomicUsize::new(0),
                    deletes: Mutex::new(Vec::new()),
                })
            }
        }

        #[async_trait]
        impl ObjectStore for SlowBucket {
            async fn put(&self, _key: &str, _body: Bytes, _ct: &str) -> anyhow::Result<()> {
                tokio::time::sleep(self.delay).await;
                self.puts.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            async fn delete(&self, key: &str) -> anyhow::Result<()> {
                self.deletes.lock().unwrap().push(key.to_string());
                Ok(())
            }
            async fn signed_url(&self, key: &str, _ttl: Duration) -> anyhow::Result<String> {
                Ok(format!("https://bucket.local/{}", key))
            }
        }

        fn request(order_id: Uuid, amount: &str) -> CreateApplication {
            CreateApplication {
                order_id,
                apply_amount: dec(amount),
                remarks: None,
                proof: fx::pdf_proof(),
            }
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn uploads_do_not_hold_the_number_sequence(pool: PgPool) {
            let admin = fx::user(&pool, "admin1", Role::Admin).await;
            let t1 = fx::user(&pool, "teacher1", Role::Teacher).await;
            let t2 = fx::user(&pool, "teacher2", Role::Teacher).await;
            let o1 = fx::order(&pool, t1, admin, "100", "10", OrderStatus::Completed).await;
            let o2 = fx::order(&pool, t2, admin, "100", "10", OrderStatus::Completed).await;

            let bucket = SlowBucket::new(Duration::from_secs(1));
            let state = AppState::with_pool(pool.clone(), bucket.clone());

            let started = Instant::now();
            let (a, b) = tokio::join!(
                create_application(&state, t1, request(o1.id, "500")),
                create_application(&state, t2, request(o2.id, "500")),
            );
            let elapsed = started.elapsed();

            let (a, b) = (a.unwrap(), b.unwrap());
            assert_ne!(a.application_number, b.application_number);
            assert_eq!(bucket.puts.load(Ordering::SeqCst), 2);
            assert!(elapsed < Duration::from_millis(1900), "uploads ran one after another: {:?}", elapsed);
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn losing_a_duplicate_race_is_a_conflict_and_drops_the_upload(pool: PgPool) {
            let admin = fx::user(&pool, "admin1", Role::Admin).await;
            let teacher = fx::user(&pool, "teacher1", Role::Teacher).await;
            let order = fx::order(&pool, teacher, admin, "100", "10", OrderStatus::Completed).await;

            let bucket = SlowBucket::new(Duration::from_millis(300));
            let state = AppState::with_pool(pool.clone(), bucket.clone());

            let (a, b) = tokio::join!(
                create_application(&state, teacher, request(order.id, "400")),
                create_application(&state, teacher, request(order.id, "600")),
            );
            let (won, lost) = match (a, b) {
                (Ok(app), Err(e)) | (Err(e), Ok(app)) => (app, e),
                (a, b) => panic!("expected one success and one failure: {:?} / {:?}", a.is_ok(), b.is_ok()),
            };
            assert!(matches!(lost, AppError::Conflict(_)));
            assert_eq!(won.status, ApplicationStatus::Pending);

            let deleted = bucket.deletes.lock().unwrap().clone();
            assert_eq!(deleted.len(), 1);
            assert_ne!(deleted[0], won.proof_key);
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn one_active_application_per_order(pool: PgPool) {
            let admin = fx::user(&pool, "admin1", Role::Admin).await;
            let teacher = fx::user(&pool, "teacher1", Role::Teacher).await;
            let order = fx::order(&pool, teacher, admin, "100", "10", OrderStatus::Completed).await;
            let state = AppState::with_pool(pool.clone(), SlowBucket::new(Duration::ZERO));

            let first = create_application(&state, teacher, request(order.id, "1000")).await.unwrap();
            let err = create_application(&state, teacher, request(order.id, "10")).await.unwrap_err();
            assert!(matches!(err, AppError::Conflict(_)));

            // the partial unique index backs the up-front check
            let new = NewApplication {
                order_id: order.id,
                teacher_id: teacher,
                apply_amount: dec("10"),
                proof_key: "proofs/x/y.pdf".into(),
                proof_name: "y.pdf".into(),
                proof_content_type: "application/pdf".into(),
                remarks: None,
            };
            let mut conn = pool.acquire().await.unwrap();
            let dup = repo::insert(&mut *conn, "APP20990101000001", &new).await.unwrap_err();
            assert!(is_unique_violation(&dup));

            withdraw(&pool, first.id, teacher).await.unwrap();
            let again = create_application(&state, teacher, request(order.id, "10")).await.unwrap();
            assert_eq!(again.status, ApplicationStatus::Pending);
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn incomplete_orders_and_excess_amounts_are_refused(pool: PgPool) {
            let admin = fx::user(&pool, "admin1", Role::Admin).await;
            let teacher = fx::user(&pool, "teacher1", Role::Teacher).await;
            let ongoing = fx::order(&pool, teacher, admin, "100", "10", OrderStatus::Ongoing).await;
            let done = fx::order(&pool, teacher, admin, "100", "10", OrderStatus::Completed).await;
            let bucket = SlowBucket::new(Duration::ZERO);
            let state = AppState::with_pool(pool.clone(), bucket.clone());

            let err = create_application(&state, teacher, request(ongoing.id, "10")).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
            let err = create_application(&state, teacher, request(done.id, "1000.01")).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
            assert_eq!(bucket.puts.load(Ordering::SeqCst), 0);
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn approval_checks_the_current_order_total(pool: PgPool) {
            let admin = fx::user(&pool, "admin1", Role::Admin).await;
            let teacher = fx::user(&pool, "teacher1", Role::Teacher).await;
            let order = fx::order(&pool, teacher, admin, "100", "10", OrderStatus::Completed).await;
            let state = AppState::with_pool(pool.clone(), SlowBucket::new(Duration::ZERO));
            let app = create_application(&state, teacher, request(order.id, "900")).await.unwrap();

            sqlx::query("UPDATE orders SET total_hours = 1, total_amount = 100.00 WHERE id = $1")
                .bind(order.id)
                .execute(&pool)
                .await
                .unwrap();

            let err = decide(&pool, app.id, admin, Decision::Approve, None).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
            assert!(err.to_string().contains("100.00"));
            let after = repo::find_by_id(&pool, app.id).await.unwrap().unwrap();
            assert_eq!(after.status, ApplicationStatus::Pending);

            // rejection is still possible
            let rejected = decide(&pool, app.id, admin, Decision::Reject, Some("hours changed"))
                .await
                .unwrap();
            assert_eq!(rejected.status, ApplicationStatus::Rejected);
            assert_eq!(rejected.rejection_reason.as_deref(), Some("hours changed"));
        }

        #[sqlx::test(migrations = "./migrations")]
        async fn decisions_only_apply_to_pending_applications(pool: PgPool) {
            let admin = fx::user(&pool, "admin1", Role::Admin).await;
            let teacher = fx::user(&pool, "teacher1", Role::Teacher).await;
            let order = fx::order(&pool, teacher, admin, "100", "10", OrderStatus::Completed).await;
            let state = AppState::with_pool(pool.clone(), SlowBucket::new(Duration::ZERO));
            let app = create_application(&state, teacher, request(order.id, "1000")).await.unwrap();

            let approved = decide(&pool, app.id, admin, Decision::Approve, None).await.unwrap();
            assert_eq!(approved.status, ApplicationStatus::Approved);
            assert_eq!(approved.approved_by, Some(admin));

            let err = decide(&pool, app.id, admin, Decision::Reject, None).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
            let err = withdraw(&pool, app.id, teacher).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }
}
