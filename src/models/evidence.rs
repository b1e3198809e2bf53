use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// On-shelf-availability check: photo plus an availability map keyed by SKU.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct OsaRecord {
    pub id: i32,
    pub store_id: i32,
    pub pc_id: i32,
    pub visit_id: Option<i32>,
    pub photo_url: Option<String>,
    pub availability: serde_json::Value,
    pub status: String,
    pub reviewed_by: Option<i32>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct DisplayRecord {
    pub id: i32,
    pub store_id: i32,
    pub pc_id: i32,
    pub visit_id: Option<i32>,
    pub photo_url: Option<String>,
    pub display_type: String,
    pub cost: Option<rust_decimal::Decimal>,
    pub status: String,
    pub reviewed_by: Option<i32>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct SurveyRecord {
    pub id: i32,
    pub store_id: i32,
    pub pc_id: i32,
    pub visit_id: Option<i32>,
    pub photo_url: Option<String>,
    pub data: serde_json::Value,
    pub status: String,
    pub reviewed_by: Option<i32>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Promotion submissions have no review lifecycle and no visit coupling.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Promotion {
    pub id: i32,
    pub store_id: i32,
    pub pc_id: i32,
    pub photo_url: Option<String>,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PendingApprovalParams {
    pub pc_id: Option<i32>,
    pub store_id: Option<i32>,
}

/// One row of the supervisor's review queue, normalized across the three
/// evidence tables.
#[derive(Debug, Serialize, FromRow)]
pub struct PendingApproval {
    pub id: i32,
    pub record_type: String,
    pub store_id: i32,
    pub store_name: String,
    pub store_code: String,
    pub pc_id: i32,
    pub pc_name: Option<String>,
    pub visit_id: Option<i32>,
    pub photo_url: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A rejected record shown back to its submitter for resubmission.
#[derive(Debug, Serialize, FromRow)]
pub struct RejectedRecord {
    pub id: i32,
    pub record_type: String,
    pub store_id: i32,
    pub store_name: String,
    pub photo_url: Option<String>,
    pub rejection_reason: Option<String>,
    pub reviewed_by_name: Option<String>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ApprovalCounts {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApprovalStats {
    pub osa: ApprovalCounts,
    pub displays: ApprovalCounts,
    pub surveys: ApprovalCounts,
}
