use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::assignments::TaskAssignment;
use super::stores::Location;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct StoreVisit {
    pub id: i32,
    pub store_id: i32,
    pub pc_id: i32,
    pub check_in_time: NaiveDateTime,
    pub check_in_latitude: f64,
    pub check_in_longitude: f64,
    pub check_out_time: Option<NaiveDateTime>,
    pub check_out_latitude: Option<f64>,
    pub check_out_longitude: Option<f64>,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckInRequest {
    pub store_id: i32,
    pub location: Location,
}

#[derive(Debug, Deserialize)]
pub struct CheckOutRequest {
    pub visit_id: i32,
    pub location: Location,
}

#[derive(Debug, Deserialize)]
pub struct VisitHistoryParams {
    pub store_id: Option<i32>,
    pub pc_id: Option<i32>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

/// Payload of `GET /api/store-visits/current`: the open visit with its
/// checklist and the check-out gating summary.
#[derive(Debug, Serialize)]
pub struct CurrentVisitResponse {
    pub visit: StoreVisit,
    pub tasks: Vec<TaskAssignment>,
    pub stats: ChecklistStats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChecklistStats {
    pub total_required: i64,
    pub completed_required: i64,
    pub can_check_out: bool,
}
