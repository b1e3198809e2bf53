use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Store {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub store_type: Option<String>,
    pub assigned_pc_id: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateStoreRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub store_type: Option<String>,
    pub assigned_pc_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStoreRequest {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub store_type: Option<String>,
    pub assigned_pc_id: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct StoreListParams {
    pub assigned_pc_id: Option<i32>,
    pub store_type: Option<String>,
    /// Partial match on name or code.
    pub search: Option<String>,
}

/// A latitude/longitude pair as submitted by the mobile client.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}
