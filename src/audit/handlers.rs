use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use time::{macros::format_description, Date};
use tracing::instrument;

use super::dto::LogFilter;
use super::repo::{self, LogQuery};
use super::repo_types::OperationLog;
use crate::{
    auth::extractors::CurrentUser,
    db::Pagination,
    error::{AppError, AppResult},
    state::AppState,
};

/// Mounted under `/admin`.
pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/logs", get(list_logs))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_logs(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(filter): Query<LogFilter>,
    Query(page): Query<Pagination>,
) -> AppResult<Json<Vec<OperationLog>>> {
    let q = LogQuery {
        search: filter.search,
        action: filter.action,
        user_id: filter.user,
        start_date: parse_day("start_date", filter.start_date.as_deref())?,
        end_date: parse_day("end_date", filter.end_date.as_deref())?,
    };
    let logs = repo::list(&state.db, &q, page).await?;
    Ok(Json(logs))
}

fn parse_day(field: &str, raw: Option<&str>) -> AppResult<Option<Date>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => Date::parse(s, format_description!("[year]-[month]-[day]"))
            .map(Some)
            .map_err(|_| AppError::validation(format!("{} must be a date in YYYY-MM-DD form", field))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn parses_iso_days() {
        assert_eq!(parse_day("start_date", Some("2025-02-28")).unwrap(), Some(date!(2025 - 02 - 28)));
        assert_eq!(parse_day("start_date", Some("")).unwrap(), None);
        assert_eq!(parse_day("start_date", None).unwrap(), None);
    }

    #[test]
    fn rejects_malformed_days() {
        let err = parse_day("end_date", Some("28/02/2025")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("end_date"));
    }
}
