use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Json,
    routing::post,
    Router,
};
use std::collections::HashMap;

use crate::checklist;
use crate::errors::AppError;
use crate::models::{
    AssignmentType, AuthUser, DisplayRecord, OsaRecord, Promotion, Role, SurveyRecord,
};
use crate::storage;
use crate::AppState;

pub fn osa_router() -> Router<AppState> {
    Router::new().route("/", post(submit_osa))
}

pub fn displays_router() -> Router<AppState> {
    Router::new().route("/", post(submit_display))
}

pub fn surveys_router() -> Router<AppState> {
    Router::new().route("/", post(submit_survey))
}

pub fn promotions_router() -> Router<AppState> {
    Router::new().route("/", post(submit_promotion))
}

struct UploadPart {
    file_name: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

/// A parsed multipart submission: text fields plus the optional photo part.
struct SubmissionForm {
    fields: HashMap<String, String>,
    photo: Option<UploadPart>,
}

async fn parse_submission(mut multipart: Multipart) -> Result<SubmissionForm, AppError> {
    let mut fields = HashMap::new();
    let mut photo = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "photo" {
            let file_name = field.file_name().unwrap_or("photo").to_string();
            let content_type = field.content_type().map(|s| s.to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read photo: {e}")))?
                .to_vec();
            photo = Some(UploadPart {
                file_name,
                content_type,
                data,
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("Failed to read field {name}: {e}")))?;
            fields.insert(name, value);
        }
    }

    Ok(SubmissionForm { fields, photo })
}

fn required_field<'a>(form: &'a SubmissionForm, name: &str) -> Result<&'a str, AppError> {
    form.fields
        .get(name)
        .map(|s| s.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AppError::Validation(format!("Missing required field: {name}")))
}

fn parse_store_id(form: &SubmissionForm) -> Result<i32, AppError> {
    required_field(form, "store_id")?
        .trim()
        .parse()
        .map_err(|_| AppError::Validation("store_id must be an integer".to_string()))
}

fn parse_json_field(form: &SubmissionForm, name: &str) -> Result<serde_json::Value, AppError> {
    let raw = required_field(form, name)?;
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| AppError::Validation(format!("Field {name} is not valid JSON: {e}")))?;
    if !value.is_object() && !value.is_array() {
        return Err(AppError::Validation(format!(
            "Field {name} must be a JSON object or array"
        )));
    }
    Ok(value)
}

fn parse_cost(form: &SubmissionForm) -> Result<Option<rust_decimal::Decimal>, AppError> {
    match form.fields.get("cost").map(|s| s.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<rust_decimal::Decimal>()
            .map(Some)
            .map_err(|_| AppError::Validation("cost must be a decimal number".to_string())),
    }
}

fn require_pc(user: &AuthUser) -> Result<(), AppError> {
    if user.role != Role::Pc {
        return Err(AppError::Forbidden(
            "Only field agents submit evidence".to_string(),
        ));
    }
    Ok(())
}

async fn ensure_store_exists(state: &AppState, store_id: i32) -> Result<(), AppError> {
    let exists = sqlx::query_scalar::<_, i32>("SELECT id FROM stores WHERE id = $1")
        .bind(store_id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound(format!("Store {store_id} not found")));
    }
    Ok(())
}

async fn save_photo(state: &AppState, form: &SubmissionForm) -> Result<Option<String>, AppError> {
    match &form.photo {
        Some(part) => {
            let url = storage::save_upload(
                &state.config,
                &part.file_name,
                part.content_type.as_deref(),
                &part.data,
            )
            .await?;
            Ok(Some(url))
        }
        None => Ok(None),
    }
}

/// Resolve the caller's open visit at this store today. Whether a missing
/// visit is tolerated (record lands with visit_id NULL, no checklist update)
/// is the configured visitless-evidence policy.
async fn resolve_submission_visit(
    state: &AppState,
    pc_id: i32,
    store_id: i32,
) -> Result<Option<i32>, AppError> {
    let visit_id = sqlx::query_scalar::<_, i32>(
        "SELECT id FROM store_visits \
         WHERE pc_id = $1 AND store_id = $2 AND status = 'CHECKED_IN' \
           AND check_in_time::date = CURRENT_DATE \
         ORDER BY check_in_time DESC \
         LIMIT 1",
    )
    .bind(pc_id)
    .bind(store_id)
    .fetch_optional(&state.db)
    .await?;

    if visit_id.is_none() && !state.config.allow_visitless_evidence {
        return Err(AppError::Validation(
            "No open visit at this store; check in before submitting evidence".to_string(),
        ));
    }

    Ok(visit_id)
}

/// POST /api/osa: on-shelf-availability check with availability map + photo.
async fn submit_osa(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<OsaRecord>), AppError> {
    require_pc(&user)?;
    let form = parse_submission(multipart).await?;
    let store_id = parse_store_id(&form)?;
    ensure_store_exists(&state, store_id).await?;
    let availability = parse_json_field(&form, "availability")?;

    let photo_url = save_photo(&state, &form).await?;
    let visit_id = resolve_submission_visit(&state, user.id, store_id).await?;

    let mut tx = state.db.begin().await?;

    let record = sqlx::query_as::<_, OsaRecord>(
        "INSERT INTO osa_records (store_id, pc_id, visit_id, photo_url, availability, status) \
         VALUES ($1, $2, $3, $4, $5, 'PENDING') \
         RETURNING id, store_id, pc_id, visit_id, photo_url, availability, status, \
                   reviewed_by, reviewed_at, rejection_reason, created_at",
    )
    .bind(store_id)
    .bind(user.id)
    .bind(visit_id)
    .bind(&photo_url)
    .bind(&availability)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(visit_id) = visit_id {
        checklist::complete_assignment(&mut tx, visit_id, AssignmentType::Osa, record.id).await?;
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /api/displays: special display with type, optional cost, photo.
async fn submit_display(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<DisplayRecord>), AppError> {
    require_pc(&user)?;
    let form = parse_submission(multipart).await?;
    let store_id = parse_store_id(&form)?;
    ensure_store_exists(&state, store_id).await?;
    let display_type = required_field(&form, "display_type")?.trim().to_string();
    let cost = parse_cost(&form)?;

    let photo_url = save_photo(&state, &form).await?;
    let visit_id = resolve_submission_visit(&state, user.id, store_id).await?;

    let mut tx = state.db.begin().await?;

    let record = sqlx::query_as::<_, DisplayRecord>(
        "INSERT INTO displays (store_id, pc_id, visit_id, photo_url, display_type, cost, status) \
         VALUES ($1, $2, $3, $4, $5, $6, 'PENDING') \
         RETURNING id, store_id, pc_id, visit_id, photo_url, display_type, cost, status, \
                   reviewed_by, reviewed_at, rejection_reason, created_at",
    )
    .bind(store_id)
    .bind(user.id)
    .bind(visit_id)
    .bind(&photo_url)
    .bind(&display_type)
    .bind(cost)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(visit_id) = visit_id {
        checklist::complete_assignment(&mut tx, visit_id, AssignmentType::Display, record.id)
            .await?;
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /api/surveys: market survey with JSON payload + optional photo/PDF.
async fn submit_survey(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<SurveyRecord>), AppError> {
    require_pc(&user)?;
    let form = parse_submission(multipart).await?;
    let store_id = parse_store_id(&form)?;
    ensure_store_exists(&state, store_id).await?;
    let data = parse_json_field(&form, "data")?;

    let photo_url = save_photo(&state, &form).await?;
    let visit_id = resolve_submission_visit(&state, user.id, store_id).await?;

    let mut tx = state.db.begin().await?;

    let record = sqlx::query_as::<_, SurveyRecord>(
        "INSERT INTO surveys (store_id, pc_id, visit_id, photo_url, data, status) \
         VALUES ($1, $2, $3, $4, $5, 'PENDING') \
         RETURNING id, store_id, pc_id, visit_id, photo_url, data, status, \
                   reviewed_by, reviewed_at, rejection_reason, created_at",
    )
    .bind(store_id)
    .bind(user.id)
    .bind(visit_id)
    .bind(&photo_url)
    .bind(&data)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(visit_id) = visit_id {
        checklist::complete_assignment(&mut tx, visit_id, AssignmentType::Survey, record.id)
            .await?;
    }

    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// POST /api/promotions: promotion photo with a note. No visit coupling and
/// no checklist side effect.
async fn submit_promotion(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Promotion>), AppError> {
    require_pc(&user)?;
    let form = parse_submission(multipart).await?;
    let store_id = parse_store_id(&form)?;
    ensure_store_exists(&state, store_id).await?;
    let description = form.fields.get("description").cloned();

    let photo_url = save_photo(&state, &form).await?;

    let record = sqlx::query_as::<_, Promotion>(
        "INSERT INTO promotions (store_id, pc_id, photo_url, description) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id, store_id, pc_id, photo_url, description, created_at",
    )
    .bind(store_id)
    .bind(user.id)
    .bind(&photo_url)
    .bind(&description)
    .fetch_one(&state.db)
    .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form_with(fields: &[(&str, &str)]) -> SubmissionForm {
        SubmissionForm {
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            photo: None,
        }
    }

    #[test]
    fn store_id_must_be_present_and_numeric() {
        assert_eq!(parse_store_id(&form_with(&[("store_id", "42")])).unwrap(), 42);
        assert!(parse_store_id(&form_with(&[])).is_err());
        assert!(parse_store_id(&form_with(&[("store_id", "abc")])).is_err());
        assert!(parse_store_id(&form_with(&[("store_id", "  ")])).is_err());
    }

    #[test]
    fn json_fields_must_parse_as_containers() {
        let form = form_with(&[("availability", r#"{"sku-1": true, "sku-2": false}"#)]);
        let value = parse_json_field(&form, "availability").unwrap();
        assert!(value.is_object());

        assert!(parse_json_field(&form_with(&[("availability", "not json")]), "availability").is_err());
        assert!(parse_json_field(&form_with(&[("availability", "42")]), "availability").is_err());
        assert!(parse_json_field(&form_with(&[]), "availability").is_err());
    }

    #[test]
    fn cost_is_optional_but_must_be_decimal() {
        assert_eq!(parse_cost(&form_with(&[])).unwrap(), None);
        assert_eq!(parse_cost(&form_with(&[("cost", "")])).unwrap(), None);
        assert_eq!(
            parse_cost(&form_with(&[("cost", "1250.50")])).unwrap(),
            Some("1250.50".parse().unwrap())
        );
        assert!(parse_cost(&form_with(&[("cost", "lots")])).is_err());
    }
}
