use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use std::time::Duration;
use validator::Validate;

use crate::cache;
use crate::errors::{AppError, Result};
use crate::models::{AuthUser, CreateStoreRequest, Store, StoreListParams, UpdateStoreRequest};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_stores).post(create_store))
        .route("/:id", get(get_store).patch(update_store))
}

const STORE_COLUMNS: &str =
    "id, name, code, latitude, longitude, store_type, assigned_pc_id, created_at, updated_at";
const LIST_CACHE_KEY: &str = "stores:list";
const LIST_CACHE_TTL: Duration = Duration::from_secs(60);

/// GET /api/stores: reference data; the unfiltered listing is cached
/// briefly since every check-in screen loads it.
async fn list_stores(
    State(state): State<AppState>,
    _user: AuthUser,
    Query(params): Query<StoreListParams>,
) -> Result<Json<Vec<Store>>> {
    let unfiltered =
        params.assigned_pc_id.is_none() && params.store_type.is_none() && params.search.is_none();

    if unfiltered {
        if let Some(cached) = cache::get::<Vec<Store>>(LIST_CACHE_KEY) {
            return Ok(Json(cached));
        }
    }

    let search = params.search.as_ref().map(|s| format!("%{s}%"));

    let stores = sqlx::query_as::<_, Store>(&format!(
        "SELECT {STORE_COLUMNS} FROM stores \
         WHERE ($1::int IS NULL OR assigned_pc_id = $1) \
           AND ($2::text IS NULL OR store_type = $2) \
           AND ($3::text IS NULL OR name ILIKE $3 OR code ILIKE $3) \
         ORDER BY name \
         LIMIT 500"
    ))
    .bind(params.assigned_pc_id)
    .bind(&params.store_type)
    .bind(&search)
    .fetch_all(&state.db)
    .await?;

    if unfiltered {
        cache::set(LIST_CACHE_KEY, &stores, LIST_CACHE_TTL);
    }

    Ok(Json(stores))
}

async fn get_store(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(store_id): Path<i32>,
) -> Result<Json<Store>> {
    let store =
        sqlx::query_as::<_, Store>(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE id = $1"))
            .bind(store_id)
            .fetch_optional(&state.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Store {store_id} not found")))?;

    Ok(Json(store))
}

/// POST /api/stores: ADMIN/SUPERVISOR only.
async fn create_store(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateStoreRequest>,
) -> Result<(StatusCode, Json<Store>)> {
    require_store_manager(&user)?;
    payload
        .validate()
        .map_err(|e| AppError::Validation(format!("Validation error: {e}")))?;

    let store = sqlx::query_as::<_, Store>(&format!(
        "INSERT INTO stores (name, code, latitude, longitude, store_type, assigned_pc_id) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING {STORE_COLUMNS}"
    ))
    .bind(&payload.name)
    .bind(&payload.code)
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(&payload.store_type)
    .bind(payload.assigned_pc_id)
    .fetch_one(&state.db)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            AppError::Validation(format!("Store code {} already exists", payload.code))
        }
        _ => AppError::Database(e),
    })?;

    cache::invalidate(LIST_CACHE_KEY);
    tracing::info!("User {} created store {} ({})", user.id, store.id, store.code);

    Ok((StatusCode::CREATED, Json(store)))
}

/// PATCH /api/stores/:id. Partial update; the code is immutable.
async fn update_store(
    State(state): State<AppState>,
    user: AuthUser,
    Path(store_id): Path<i32>,
    Json(payload): Json<UpdateStoreRequest>,
) -> Result<Json<Store>> {
    require_store_manager(&user)?;

    let store = sqlx::query_as::<_, Store>(&format!(
        "UPDATE stores \
         SET name = COALESCE($2, name), \
             latitude = COALESCE($3, latitude), \
             longitude = COALESCE($4, longitude), \
             store_type = COALESCE($5, store_type), \
             assigned_pc_id = COALESCE($6, assigned_pc_id), \
             updated_at = CURRENT_TIMESTAMP \
         WHERE id = $1 \
         RETURNING {STORE_COLUMNS}"
    ))
    .bind(store_id)
    .bind(&payload.name)
    .bind(payload.latitude)
    .bind(payload.longitude)
    .bind(&payload.store_type)
    .bind(payload.assigned_pc_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Store {store_id} not found")))?;

    cache::invalidate(LIST_CACHE_KEY);

    Ok(Json(store))
}

fn require_store_manager(user: &AuthUser) -> Result<()> {
    if !user.role.can_manage_stores() {
        return Err(AppError::Forbidden(
            "Only supervisors and admins manage stores".to_string(),
        ));
    }
    Ok(())
}
