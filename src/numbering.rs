//! Business document numbers: `ORD20250301000001`, `APP20250301000017`.
//!
//! The per-day sequence lives in `document_counters`, bumped with a single
//! upsert so concurrent creators never observe the same value.

use anyhow::Context;
use sqlx::PgConnection;
use time::{Date, OffsetDateTime};

pub const MAX_SEQUENCE: i64 = 999_999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Order,
    SalaryApplication,
}

impl DocumentKind {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Order => "ORD",
            Self::SalaryApplication => "APP",
        }
    }
}

/// Counter key for one kind on one UTC day, e.g. `ORD20250301`.
pub fn day_prefix(kind: DocumentKind, day: Date) -> String {
    format!(
        "{}{:04}{:02}{:02}",
        kind.prefix(),
        day.year(),
        u8::from(day.month()),
        day.day()
    )
}

pub fn format_number(day_prefix: &str, seq: i64) -> anyhow::Result<String> {
    if !(1..=MAX_SEQUENCE).contains(&seq) {
        anyhow::bail!("document sequence {} out of range for {}", seq, day_prefix);
    }
    Ok(format!("{}{:06}", day_prefix, seq))
}

/// Allocate the next number for today. Call inside the transaction that
/// inserts the document so a rolled-back insert also returns the sequence.
pub async fn next_number(conn: &mut PgConnection, kind: DocumentKind) -> anyhow::Result<String> {
    next_number_on(conn, kind, OffsetDateTime::now_utc().date()).await
}

pub async fn next_number_on(
    conn: &mut PgConnection,
    kind: DocumentKind,
    day: Date,
) -> anyhow::Result<String> {
    let prefix = day_prefix(kind, day);
    let (seq,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO document_counters (prefix, last_seq)
        VALUES ($1, 1)
        ON CONFLICT (prefix)
        DO UPDATE SET last_seq = document_counters.last_seq + 1
        RETURNING last_seq
        "#,
    )
    .bind(&prefix)
    .fetch_one(&mut *conn)
    .await
    .with_context(|| format!("allocate sequence for {}", prefix))?;
    format_number(&prefix, seq)
}
