use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::time::Duration;

use crate::cache;
use crate::errors::AppError;
use crate::models::{
    ApprovalCounts, ApprovalStats, AuthUser, PendingApproval, PendingApprovalParams,
    RejectRequest, RejectedRecord, Role,
};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:kind/:id/approve", post(approve_record))
        .route("/:kind/:id/reject", post(reject_record))
        .route("/pending", get(get_pending_approvals))
        .route("/rejected", get(get_rejected_records))
        .route("/stats", get(get_approval_stats))
}

const STATS_CACHE_KEY: &str = "approvals:stats";
const STATS_CACHE_TTL: Duration = Duration::from_secs(60);

/// Maps the URL segment to the evidence table and its type tag. The three
/// tables have disjoint id spaces; the tag is what disambiguates a record id.
fn evidence_table(kind: &str) -> Option<(&'static str, &'static str)> {
    match kind {
        "osa" => Some(("osa_records", "OSA")),
        "display" => Some(("displays", "DISPLAY")),
        "survey" => Some(("surveys", "SURVEY")),
        _ => None,
    }
}

fn require_reviewer(user: &AuthUser) -> Result<(), AppError> {
    if !user.role.is_reviewer() {
        return Err(AppError::Forbidden(
            "Only supervisors review evidence".to_string(),
        ));
    }
    Ok(())
}

/// A rejection must carry a non-empty reason; it is recorded verbatim.
fn validate_rejection_reason(reason: Option<&str>) -> Result<String, AppError> {
    match reason {
        Some(r) if !r.trim().is_empty() => Ok(r.to_string()),
        _ => Err(AppError::Validation(
            "Rejection requires a non-empty reason".to_string(),
        )),
    }
}

/// POST /api/approvals/:kind/:id/approve: PENDING → APPROVED (terminal).
async fn approve_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path((kind, id)): Path<(String, i32)>,
) -> Result<Json<Value>, AppError> {
    require_reviewer(&user)?;
    let (table, tag) = evidence_table(&kind)
        .ok_or_else(|| AppError::NotFound(format!("Unknown evidence type: {kind}")))?;

    let result = sqlx::query(&format!(
        "UPDATE {table} \
         SET status = 'APPROVED', reviewed_by = $2, reviewed_at = CURRENT_TIMESTAMP \
         WHERE id = $1 AND status = 'PENDING'"
    ))
    .bind(id)
    .bind(user.id)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "No pending {tag} record with id {id}"
        )));
    }

    cache::invalidate(STATS_CACHE_KEY);
    tracing::info!("Reviewer {} approved {} record {}", user.id, tag, id);

    Ok(Json(json!({ "success": true, "id": id, "status": "APPROVED" })))
}

/// POST /api/approvals/:kind/:id/reject: PENDING → REJECTED (terminal),
/// reason mandatory. A blank reason fails before any row is touched.
async fn reject_record(
    State(state): State<AppState>,
    user: AuthUser,
    Path((kind, id)): Path<(String, i32)>,
    Json(payload): Json<RejectRequest>,
) -> Result<Json<Value>, AppError> {
    require_reviewer(&user)?;
    let (table, tag) = evidence_table(&kind)
        .ok_or_else(|| AppError::NotFound(format!("Unknown evidence type: {kind}")))?;
    let reason = validate_rejection_reason(payload.reason.as_deref())?;

    let result = sqlx::query(&format!(
        "UPDATE {table} \
         SET status = 'REJECTED', reviewed_by = $2, reviewed_at = CURRENT_TIMESTAMP, \
             rejection_reason = $3 \
         WHERE id = $1 AND status = 'PENDING'"
    ))
    .bind(id)
    .bind(user.id)
    .bind(&reason)
    .execute(&state.db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!(
            "No pending {tag} record with id {id}"
        )));
    }

    cache::invalidate(STATS_CACHE_KEY);
    tracing::info!("Reviewer {} rejected {} record {}", user.id, tag, id);

    Ok(Json(json!({
        "success": true,
        "id": id,
        "status": "REJECTED",
        "reason": reason
    })))
}

async fn fetch_pending(
    state: &AppState,
    table: &str,
    tag: &str,
    pc_id: Option<i32>,
    store_id: Option<i32>,
) -> Result<Vec<PendingApproval>, AppError> {
    let rows = sqlx::query_as::<_, PendingApproval>(&format!(
        "SELECT r.id, '{tag}' AS record_type, r.store_id, s.name AS store_name, \
                s.code AS store_code, r.pc_id, u.name AS pc_name, r.visit_id, \
                r.photo_url, r.created_at \
         FROM {table} r \
         JOIN stores s ON s.id = r.store_id \
         JOIN users u ON u.id = r.pc_id \
         WHERE r.status = 'PENDING' \
           AND ($1::int IS NULL OR r.pc_id = $1) \
           AND ($2::int IS NULL OR r.store_id = $2)"
    ))
    .bind(pc_id)
    .bind(store_id)
    .fetch_all(&state.db)
    .await?;

    Ok(rows)
}

/// GET /api/approvals/pending: the supervisor review queue across all three
/// evidence types, newest first.
async fn get_pending_approvals(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<PendingApprovalParams>,
) -> Result<Json<Vec<PendingApproval>>, AppError> {
    require_reviewer(&user)?;

    let mut records = Vec::new();
    for (table, tag) in [
        ("osa_records", "OSA"),
        ("displays", "DISPLAY"),
        ("surveys", "SURVEY"),
    ] {
        records.extend(fetch_pending(&state, table, tag, params.pc_id, params.store_id).await?);
    }

    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(Json(records))
}

/// GET /api/approvals/rejected: the acting PC's own rejected records, with
/// the reviewer's name and reason, to drive the resubmission flow.
async fn get_rejected_records(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<RejectedRecord>>, AppError> {
    if user.role != Role::Pc {
        return Err(AppError::Forbidden(
            "Rejected-record listing is for field agents".to_string(),
        ));
    }

    let mut records = Vec::new();
    for (table, tag) in [
        ("osa_records", "OSA"),
        ("displays", "DISPLAY"),
        ("surveys", "SURVEY"),
    ] {
        let rows = sqlx::query_as::<_, RejectedRecord>(&format!(
            "SELECT r.id, '{tag}' AS record_type, r.store_id, s.name AS store_name, \
                    r.photo_url, r.rejection_reason, rv.name AS reviewed_by_name, \
                    r.reviewed_at, r.created_at \
             FROM {table} r \
             JOIN stores s ON s.id = r.store_id \
             LEFT JOIN users rv ON rv.id = r.reviewed_by \
             WHERE r.status = 'REJECTED' AND r.pc_id = $1"
        ))
        .bind(user.id)
        .fetch_all(&state.db)
        .await?;
        records.extend(rows);
    }

    records.sort_by(|a, b| b.reviewed_at.cmp(&a.reviewed_at));

    Ok(Json(records))
}

async fn count_statuses(
    state: &AppState,
    table: &str,
    pc_id: Option<i32>,
) -> Result<ApprovalCounts, AppError> {
    let rows = sqlx::query_as::<_, (String, i64)>(&format!(
        "SELECT status, COUNT(*) FROM {table} \
         WHERE ($1::int IS NULL OR pc_id = $1) \
         GROUP BY status"
    ))
    .bind(pc_id)
    .fetch_all(&state.db)
    .await?;

    let mut counts = ApprovalCounts::default();
    for (status, count) in rows {
        match status.as_str() {
            "PENDING" => counts.pending = count,
            "APPROVED" => counts.approved = count,
            "REJECTED" => counts.rejected = count,
            _ => {}
        }
    }
    Ok(counts)
}

/// GET /api/approvals/stats: per-type counts. Supervisors see global
/// numbers (cached briefly); a PC sees their own.
async fn get_approval_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApprovalStats>, AppError> {
    let pc_id = if user.role.is_reviewer() {
        None
    } else if user.role == Role::Pc {
        Some(user.id)
    } else {
        return Err(AppError::Forbidden(
            "No approval statistics for this role".to_string(),
        ));
    };

    if pc_id.is_none() {
        if let Some(cached) = cache::get::<ApprovalStats>(STATS_CACHE_KEY) {
            return Ok(Json(cached));
        }
    }

    let stats = ApprovalStats {
        osa: count_statuses(&state, "osa_records", pc_id).await?,
        displays: count_statuses(&state, "displays", pc_id).await?,
        surveys: count_statuses(&state, "surveys", pc_id).await?,
    };

    if pc_id.is_none() {
        cache::set(STATS_CACHE_KEY, &stats, STATS_CACHE_TTL);
    }

    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_table_whitelist() {
        assert_eq!(evidence_table("osa"), Some(("osa_records", "OSA")));
        assert_eq!(evidence_table("display"), Some(("displays", "DISPLAY")));
        assert_eq!(evidence_table("survey"), Some(("surveys", "SURVEY")));
        assert_eq!(evidence_table("promotion"), None);
        assert_eq!(evidence_table("osa_records; DROP TABLE users"), None);
    }

    #[test]
    fn rejection_reason_must_be_non_empty() {
        assert!(validate_rejection_reason(None).is_err());
        assert!(validate_rejection_reason(Some("")).is_err());
        assert!(validate_rejection_reason(Some("   ")).is_err());
        assert_eq!(
            validate_rejection_reason(Some("photo is blurry")).unwrap(),
            "photo is blurry"
        );
    }
}
