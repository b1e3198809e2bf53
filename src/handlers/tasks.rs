use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::errors::AppError;
use crate::models::{
    AuthUser, CreateTaskBatchRequest, EligibleTask, Role, StoreEligibility, Task, TaskBatch,
    TaskListParams, TaskStatus, UpdateTaskStatusRequest, SCHEDULED_TASK_TYPES,
    status_change_allowed,
};
use crate::AppState;

pub fn batches_router() -> Router<AppState> {
    Router::new().route("/", post(create_task_batch).get(list_task_batches))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tasks))
        .route("/eligibility", get(get_checkin_eligibility))
        .route("/:id/status", patch(update_task_status))
}

const TASK_COLUMNS: &str = "id, batch_id, task_type, title, description, task_date, active_from, \
     active_to, due_date, priority, status, assigned_by, assigned_to, attachments, \
     reviewed_by, reviewed_at, rejection_reason, created_at, updated_at";

/// POST /api/task-batches: batch plus its tasks, all-or-nothing.
async fn create_task_batch(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateTaskBatchRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if !user.role.is_reviewer() {
        return Err(AppError::Forbidden(
            "Only supervisors assign scheduled tasks".to_string(),
        ));
    }

    payload
        .validate()
        .map_err(|e| AppError::Validation(format!("Validation error: {e}")))?;

    for task in &payload.tasks {
        if !SCHEDULED_TASK_TYPES.contains(&task.task_type.as_str()) {
            return Err(AppError::Validation(format!(
                "Unknown task type: {}",
                task.task_type
            )));
        }
        if !task.has_valid_schedule() {
            return Err(AppError::Validation(format!(
                "Task {:?} needs a task_date or an active_from/active_to window",
                task.title
            )));
        }
    }

    let assignee_role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = $1")
        .bind(payload.assigned_to_pc_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("User {} not found", payload.assigned_to_pc_id))
        })?;
    if assignee_role != Role::Pc.as_str() {
        return Err(AppError::Validation(
            "Tasks can only be assigned to a PC".to_string(),
        ));
    }

    let store_exists = sqlx::query_scalar::<_, i32>("SELECT id FROM stores WHERE id = $1")
        .bind(payload.store_id)
        .fetch_optional(&state.db)
        .await?;
    if store_exists.is_none() {
        return Err(AppError::NotFound(format!(
            "Store {} not found",
            payload.store_id
        )));
    }

    let mut tx = state.db.begin().await?;

    let batch = sqlx::query_as::<_, TaskBatch>(
        "INSERT INTO task_batches (assigned_by, assigned_to_pc_id, store_id, note) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, assigned_by, assigned_to_pc_id, store_id, note, created_at",
    )
    .bind(user.id)
    .bind(payload.assigned_to_pc_id)
    .bind(payload.store_id)
    .bind(&payload.note)
    .fetch_one(&mut *tx)
    .await?;

    let mut tasks = Vec::with_capacity(payload.tasks.len());
    for task in &payload.tasks {
        let row = sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO tasks \
                 (batch_id, task_type, title, description, task_date, active_from, active_to, \
                  due_date, priority, status, assigned_by, assigned_to, attachments) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'PENDING', $10, $11, $12) \
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(batch.id)
        .bind(&task.task_type)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.task_date)
        .bind(task.active_from)
        .bind(task.active_to)
        .bind(task.due_date)
        .bind(task.priority.unwrap_or(0))
        .bind(user.id)
        .bind(payload.assigned_to_pc_id)
        .bind(&task.attachments)
        .fetch_one(&mut *tx)
        .await?;
        tasks.push(row);
    }

    tx.commit().await?;

    tracing::info!(
        "Supervisor {} assigned batch {} ({} tasks) to PC {}",
        user.id,
        batch.id,
        tasks.len(),
        payload.assigned_to_pc_id
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({ "batch": batch, "tasks": tasks })),
    ))
}

/// GET /api/task-batches: supervisors see what they assigned, PCs what was
/// assigned to them, admins everything.
async fn list_task_batches(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<TaskBatch>>, AppError> {
    let (assigned_by, assigned_to) = match user.role {
        Role::Admin => (None, None),
        Role::Supervisor => (Some(user.id), None),
        Role::Pc => (None, Some(user.id)),
        _ => {
            return Err(AppError::Forbidden(
                "No task batches for this role".to_string(),
            ))
        }
    };

    let batches = sqlx::query_as::<_, TaskBatch>(
        "SELECT id, assigned_by, assigned_to_pc_id, store_id, note, created_at \
         FROM task_batches \
         WHERE ($1::int IS NULL OR assigned_by = $1) \
           AND ($2::int IS NULL OR assigned_to_pc_id = $2) \
         ORDER BY created_at DESC \
         LIMIT 100",
    )
    .bind(assigned_by)
    .bind(assigned_to)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(batches))
}

/// GET /api/tasks: role-scoped listing with optional status/date filters.
async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<TaskListParams>,
) -> Result<Json<Vec<Task>>, AppError> {
    let assigned_to = match user.role {
        Role::Pc => Some(user.id),
        Role::Supervisor | Role::Admin => params.assigned_to,
        _ => return Err(AppError::Forbidden("No tasks for this role".to_string())),
    };

    if let Some(ref status) = params.status {
        if TaskStatus::parse(status).is_none() {
            return Err(AppError::Validation(format!("Unknown status: {status}")));
        }
    }

    let tasks = sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks \
         WHERE ($1::int IS NULL OR assigned_to = $1) \
           AND ($2::text IS NULL OR status = $2) \
           AND ($3::date IS NULL OR COALESCE(task_date, active_from) >= $3) \
           AND ($4::date IS NULL OR COALESCE(task_date, active_to) <= $4) \
         ORDER BY priority, created_at DESC \
         LIMIT 100"
    ))
    .bind(assigned_to)
    .bind(&params.status)
    .bind(params.date_from)
    .bind(params.date_to)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(tasks))
}

/// GET /api/tasks/eligibility: the acting PC's workable tasks for today,
/// grouped by store. This is the "which stores can I check into" signal,
/// independent of the per-visit checklist.
async fn get_checkin_eligibility(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<StoreEligibility>>, AppError> {
    if user.role != Role::Pc {
        return Err(AppError::Forbidden(
            "Eligibility is computed for field agents".to_string(),
        ));
    }

    let tasks = sqlx::query_as::<_, EligibleTask>(
        "SELECT t.id, t.batch_id, t.task_type, t.title, t.status, t.task_date, \
                t.active_from, t.active_to, t.due_date, t.priority, \
                b.store_id, s.name AS store_name, s.code AS store_code \
         FROM tasks t \
         JOIN task_batches b ON b.id = t.batch_id \
         JOIN stores s ON s.id = b.store_id \
         WHERE t.assigned_to = $1 \
           AND t.status NOT IN ('APPROVED', 'REJECTED', 'CANCELLED') \
           AND (t.task_date = CURRENT_DATE \
                OR (t.active_from <= CURRENT_DATE AND t.active_to >= CURRENT_DATE)) \
         ORDER BY b.store_id, t.priority, t.id",
    )
    .bind(user.id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(group_by_store(tasks)))
}

fn group_by_store(tasks: Vec<EligibleTask>) -> Vec<StoreEligibility> {
    let mut groups: Vec<StoreEligibility> = Vec::new();
    for task in tasks {
        let start_new = groups.last().map_or(true, |g| g.store_id != task.store_id);
        if start_new {
            groups.push(StoreEligibility {
                store_id: task.store_id,
                store_name: task.store_name.clone(),
                store_code: task.store_code.clone(),
                tasks: Vec::new(),
            });
        }
        if let Some(group) = groups.last_mut() {
            group.tasks.push(task);
        }
    }
    groups
}

/// PATCH /api/tasks/:id/status: role-gated transition. PCs work their own
/// tasks forward; supervisors settle submitted work.
async fn update_task_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<i32>,
    Json(payload): Json<UpdateTaskStatusRequest>,
) -> Result<Json<Task>, AppError> {
    let new_status = TaskStatus::parse(&payload.status)
        .ok_or_else(|| AppError::Validation(format!("Unknown status: {}", payload.status)))?;

    let (assigned_to, current_status) = sqlx::query_as::<_, (i32, String)>(
        "SELECT assigned_to, status FROM tasks WHERE id = $1",
    )
    .bind(task_id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Task {task_id} not found")))?;

    if !status_change_allowed(user.role, assigned_to == user.id, new_status) {
        return Err(AppError::Forbidden(format!(
            "Role {} may not set status {}",
            user.role.as_str(),
            new_status.as_str()
        )));
    }

    if TaskStatus::parse(&current_status).is_some_and(|s| s.is_terminal()) {
        return Err(AppError::Validation(format!(
            "Task {task_id} is already {current_status}"
        )));
    }

    let (reviewed_by, rejection_reason) = match new_status {
        TaskStatus::Rejected => {
            let reason = match payload.rejection_reason.as_deref() {
                Some(r) if !r.trim().is_empty() => r.to_string(),
                _ => {
                    return Err(AppError::Validation(
                        "Rejection requires a non-empty rejection_reason".to_string(),
                    ))
                }
            };
            (Some(user.id), Some(reason))
        }
        TaskStatus::Approved => (Some(user.id), None),
        _ => (None, None),
    };

    let task = sqlx::query_as::<_, Task>(&format!(
        "UPDATE tasks \
         SET status = $2, \
             reviewed_by = COALESCE($3, reviewed_by), \
             reviewed_at = CASE WHEN $3::int IS NOT NULL THEN CURRENT_TIMESTAMP ELSE reviewed_at END, \
             rejection_reason = COALESCE($4, rejection_reason), \
             updated_at = CURRENT_TIMESTAMP \
         WHERE id = $1 \
         RETURNING {TASK_COLUMNS}"
    ))
    .bind(task_id)
    .bind(new_status.as_str())
    .bind(reviewed_by)
    .bind(&rejection_reason)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        "User {} moved task {} from {} to {}",
        user.id,
        task_id,
        current_status,
        new_status.as_str()
    );

    Ok(Json(task))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eligible(id: i32, store_id: i32) -> EligibleTask {
        EligibleTask {
            id,
            batch_id: 1,
            task_type: "OSA".to_string(),
            title: format!("task {id}"),
            status: "PENDING".to_string(),
            task_date: None,
            active_from: None,
            active_to: None,
            due_date: None,
            priority: 0,
            store_id,
            store_name: format!("Store {store_id}"),
            store_code: format!("S{store_id:03}"),
        }
    }

    #[test]
    fn eligibility_groups_consecutive_store_runs() {
        let groups = group_by_store(vec![
            eligible(1, 10),
            eligible(2, 10),
            eligible(3, 20),
        ]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].store_id, 10);
        assert_eq!(groups[0].tasks.len(), 2);
        assert_eq!(groups[1].store_id, 20);
        assert_eq!(groups[1].tasks.len(), 1);
    }

    #[test]
    fn eligibility_with_no_tasks_is_empty() {
        assert!(group_by_store(Vec::new()).is_empty());
    }
}
