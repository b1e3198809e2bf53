use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, patch, post},
    Router,
};

use crate::errors::{AppError, Result};
use crate::middleware::AuthIdentity;
use crate::models::{AuthUser, Role, SyncUserRequest, UpdateRoleRequest, User};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sync", post(sync_user))
        .route("/me", get(get_me))
}

pub fn users_router() -> Router<AppState> {
    Router::new().route("/:id/role", patch(update_role))
}

const USER_COLUMNS: &str = "id, external_id, name, role, created_at, updated_at";

/// POST /api/auth/sync: create-on-first-sync. The identity provider has
/// already vouched for the subject; this materializes (or refreshes) the
/// matching user row. New users default to the PC role.
async fn sync_user(
    State(state): State<AppState>,
    identity: AuthIdentity,
    Json(payload): Json<SyncUserRequest>,
) -> Result<Json<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "INSERT INTO users (external_id, name, role) \
         VALUES ($1, $2, 'PC') \
         ON CONFLICT (external_id) \
         DO UPDATE SET name = COALESCE(EXCLUDED.name, users.name), \
                       updated_at = CURRENT_TIMESTAMP \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(&identity.subject)
    .bind(&payload.name)
    .fetch_one(&state.db)
    .await?;

    tracing::info!("Synced user {} (role {})", user.id, user.role);

    Ok(Json(user))
}

/// GET /api/auth/me
async fn get_me(State(state): State<AppState>, user: AuthUser) -> Result<Json<User>> {
    let row = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(user.id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(row))
}

/// PATCH /api/users/:id/role: ADMIN only.
async fn update_role(
    State(state): State<AppState>,
    user: AuthUser,
    Path(user_id): Path<i32>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<User>> {
    if user.role != Role::Admin {
        return Err(AppError::Forbidden("Only admins change roles".to_string()));
    }

    let role = Role::parse(&payload.role)
        .ok_or_else(|| AppError::Validation(format!("Unknown role: {}", payload.role)))?;

    let updated = sqlx::query_as::<_, User>(&format!(
        "UPDATE users SET role = $2, updated_at = CURRENT_TIMESTAMP \
         WHERE id = $1 \
         RETURNING {USER_COLUMNS}"
    ))
    .bind(user_id)
    .bind(role.as_str())
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;

    tracing::info!("Admin {} set user {} role to {}", user.id, user_id, updated.role);

    Ok(Json(updated))
}
