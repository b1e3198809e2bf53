use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::FromRow;

use crate::checklist;
use crate::errors::AppError;
use crate::geo;
use crate::models::{
    AuthUser, CheckInRequest, CheckOutRequest, CurrentVisitResponse, Location, Role, Store,
    StoreVisit, VisitHistoryParams,
};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/check-in", post(check_in))
        .route("/check-out", post(check_out))
        .route("/:id/cancel", post(cancel_check_in))
        .route("/current", get(get_current_visit))
        .route("/", get(get_visit_history))
}

const VISIT_COLUMNS: &str = "id, store_id, pc_id, check_in_time, check_in_latitude, \
     check_in_longitude, check_out_time, check_out_latitude, check_out_longitude, status";

/// POST /api/store-visits/check-in
///
/// GPS-gated: when the store has a stored geolocation, the caller must be
/// within the configured radius. Visit insert and default checklist creation
/// run in one transaction.
async fn check_in(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckInRequest>,
) -> Result<(StatusCode, Json<StoreVisit>), AppError> {
    require_pc(&user)?;
    validate_location(&payload.location)?;

    let store = sqlx::query_as::<_, Store>(
        "SELECT id, name, code, latitude, longitude, store_type, assigned_pc_id, \
         created_at, updated_at FROM stores WHERE id = $1",
    )
    .bind(payload.store_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Store {} not found", payload.store_id)))?;

    if let (Some(lat), Some(lon)) = (store.latitude, store.longitude) {
        let distance = geo::distance_meters(
            payload.location.latitude,
            payload.location.longitude,
            lat,
            lon,
        );
        if let Err(distance) = geo::within_radius(distance, state.config.gps_max_distance_m) {
            return Err(AppError::ValidationWithDetail(
                "Too far from the store to check in".to_string(),
                json!({
                    "distance": distance,
                    "max_distance": state.config.gps_max_distance_m,
                }),
            ));
        }
    }

    // Friendly pre-check; the partial unique index on open visits is what
    // actually closes the concurrent-check-in race.
    let already_open = sqlx::query_scalar::<_, i32>(
        "SELECT id FROM store_visits \
         WHERE pc_id = $1 AND store_id = $2 AND status = 'CHECKED_IN' \
           AND check_in_time::date = CURRENT_DATE",
    )
    .bind(user.id)
    .bind(store.id)
    .fetch_optional(&state.db)
    .await?;

    if already_open.is_some() {
        return Err(already_checked_in());
    }

    let mut tx = state.db.begin().await?;

    let visit = sqlx::query_as::<_, StoreVisit>(&format!(
        "INSERT INTO store_visits \
             (store_id, pc_id, check_in_time, check_in_latitude, check_in_longitude, status) \
         VALUES ($1, $2, CURRENT_TIMESTAMP, $3, $4, 'CHECKED_IN') \
         RETURNING {VISIT_COLUMNS}"
    ))
    .bind(store.id)
    .bind(user.id)
    .bind(payload.location.latitude)
    .bind(payload.location.longitude)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_checkin_conflict)?;

    checklist::create_default_assignments(&mut tx, visit.id).await?;

    tx.commit().await?;

    tracing::info!(
        "PC {} checked in at store {} (visit {})",
        user.id,
        store.code,
        visit.id
    );

    Ok((StatusCode::CREATED, Json(visit)))
}

/// POST /api/store-visits/check-out
///
/// Rejected while any required checklist item is incomplete; the response
/// itemizes the unmet task types. An already-checked-out visit no longer
/// matches the CHECKED_IN filter and reports not-found.
async fn check_out(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckOutRequest>,
) -> Result<Json<StoreVisit>, AppError> {
    require_pc(&user)?;
    validate_location(&payload.location)?;

    let visit_id = sqlx::query_scalar::<_, i32>(
        "SELECT id FROM store_visits WHERE id = $1 AND pc_id = $2 AND status = 'CHECKED_IN'",
    )
    .bind(payload.visit_id)
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("No open visit with that id".to_string()))?;

    let mut conn = state.db.acquire().await?;
    let assignments = checklist::assignments_for_visit(&mut conn, visit_id).await?;
    let incomplete = checklist::incomplete_required(&assignments);
    if !incomplete.is_empty() {
        return Err(AppError::ValidationWithDetail(
            "Required tasks are not complete".to_string(),
            json!({ "incomplete_tasks": incomplete }),
        ));
    }

    let visit = sqlx::query_as::<_, StoreVisit>(&format!(
        "UPDATE store_visits \
         SET check_out_time = CURRENT_TIMESTAMP, \
             check_out_latitude = $2, \
             check_out_longitude = $3, \
             status = 'CHECKED_OUT' \
         WHERE id = $1 AND status = 'CHECKED_IN' \
         RETURNING {VISIT_COLUMNS}"
    ))
    .bind(visit_id)
    .bind(payload.location.latitude)
    .bind(payload.location.longitude)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("No open visit with that id".to_string()))?;

    tracing::info!("PC {} checked out of visit {}", user.id, visit.id);

    Ok(Json(visit))
}

/// POST /api/store-visits/:id/cancel
///
/// Full undo for "checked in at the wrong store": deletes the checklist and
/// the visit row. No audit trail is kept.
async fn cancel_check_in(
    State(state): State<AppState>,
    user: AuthUser,
    Path(visit_id): Path<i32>,
) -> Result<Json<Value>, AppError> {
    require_pc(&user)?;

    let mut tx = state.db.begin().await?;

    let owned = sqlx::query_scalar::<_, i32>(
        "SELECT id FROM store_visits WHERE id = $1 AND pc_id = $2 AND status = 'CHECKED_IN'",
    )
    .bind(visit_id)
    .bind(user.id)
    .fetch_optional(&mut *tx)
    .await?;

    if owned.is_none() {
        return Err(AppError::NotFound("No open visit with that id".to_string()));
    }

    sqlx::query("DELETE FROM task_assignments WHERE visit_id = $1")
        .bind(visit_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query("DELETE FROM store_visits WHERE id = $1")
        .bind(visit_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!("PC {} cancelled visit {}", user.id, visit_id);

    Ok(Json(json!({ "success": true, "cancelled_visit_id": visit_id })))
}

/// GET /api/store-visits/current
async fn get_current_visit(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Value>, AppError> {
    require_pc(&user)?;

    let visit = sqlx::query_as::<_, StoreVisit>(&format!(
        "SELECT {VISIT_COLUMNS} FROM store_visits \
         WHERE pc_id = $1 AND status = 'CHECKED_IN' \
           AND check_in_time::date = CURRENT_DATE \
         ORDER BY check_in_time DESC \
         LIMIT 1"
    ))
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?;

    let visit = match visit {
        Some(v) => v,
        None => return Ok(Json(json!({ "visit": null }))),
    };

    let mut conn = state.db.acquire().await?;
    let tasks = checklist::assignments_for_visit(&mut conn, visit.id).await?;
    let stats = checklist::stats(&tasks);

    Ok(Json(json!(CurrentVisitResponse {
        visit,
        tasks,
        stats,
    })))
}

#[derive(Debug, Serialize, FromRow)]
struct VisitHistoryRow {
    id: i32,
    store_id: i32,
    store_name: String,
    store_code: String,
    pc_id: i32,
    pc_name: Option<String>,
    check_in_time: NaiveDateTime,
    check_out_time: Option<NaiveDateTime>,
    status: String,
}

/// GET /api/store-visits: role-scoped history, newest first, capped at 100.
async fn get_visit_history(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<VisitHistoryParams>,
) -> Result<Json<Vec<VisitHistoryRow>>, AppError> {
    // A PC only ever sees their own visits regardless of the filter.
    let pc_filter = if user.role == Role::Pc {
        Some(user.id)
    } else {
        params.pc_id
    };

    let visits = sqlx::query_as::<_, VisitHistoryRow>(
        "SELECT v.id, v.store_id, s.name AS store_name, s.code AS store_code, \
                v.pc_id, u.name AS pc_name, v.check_in_time, v.check_out_time, v.status \
         FROM store_visits v \
         JOIN stores s ON s.id = v.store_id \
         JOIN users u ON u.id = v.pc_id \
         WHERE ($1::int IS NULL OR v.pc_id = $1) \
           AND ($2::int IS NULL OR v.store_id = $2) \
           AND ($3::date IS NULL OR v.check_in_time::date >= $3) \
           AND ($4::date IS NULL OR v.check_in_time::date <= $4) \
         ORDER BY v.check_in_time DESC \
         LIMIT 100",
    )
    .bind(pc_filter)
    .bind(params.store_id)
    .bind(params.date_from)
    .bind(params.date_to)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(visits))
}

fn require_pc(user: &AuthUser) -> Result<(), AppError> {
    if user.role != Role::Pc {
        return Err(AppError::Forbidden(
            "Only field agents manage store visits".to_string(),
        ));
    }
    Ok(())
}

fn validate_location(location: &Location) -> Result<(), AppError> {
    if !location.latitude.is_finite()
        || !location.longitude.is_finite()
        || location.latitude.abs() > 90.0
        || location.longitude.abs() > 180.0
    {
        return Err(AppError::Validation(
            "Location must contain a valid latitude and longitude".to_string(),
        ));
    }
    Ok(())
}

fn already_checked_in() -> AppError {
    AppError::Validation("Already checked in at this store today".to_string())
}

fn map_checkin_conflict(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            // Lost the race against a concurrent check-in for the same
            // (pc, store, day); report it like the pre-check would have.
            return already_checked_in();
        }
    }
    AppError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(latitude: f64, longitude: f64) -> Location {
        Location {
            latitude,
            longitude,
        }
    }

    #[test]
    fn location_bounds_are_enforced() {
        assert!(validate_location(&location(52.52, 13.405)).is_ok());
        assert!(validate_location(&location(90.0, 180.0)).is_ok());
        assert!(validate_location(&location(90.1, 0.0)).is_err());
        assert!(validate_location(&location(0.0, -180.5)).is_err());
        assert!(validate_location(&location(f64::NAN, 0.0)).is_err());
        assert!(validate_location(&location(0.0, f64::INFINITY)).is_err());
    }

    #[test]
    fn non_unique_errors_stay_database_errors() {
        let err = map_checkin_conflict(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::Database(_)));
    }
}
