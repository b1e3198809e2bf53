use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use super::users::Role;

// Supervisor-scheduled work. A separate aggregate from the per-visit
// checklist: no shared identity space, no cross-references.

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct TaskBatch {
    pub id: i32,
    pub assigned_by: i32,
    pub assigned_to_pc_id: i32,
    pub store_id: i32,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: i32,
    pub batch_id: i32,
    pub task_type: String,
    pub title: String,
    pub description: Option<String>,
    pub task_date: Option<NaiveDate>,
    pub active_from: Option<NaiveDate>,
    pub active_to: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub priority: i32,
    pub status: String,
    pub assigned_by: i32,
    pub assigned_to: i32,
    pub attachments: Option<serde_json::Value>,
    pub reviewed_by: Option<i32>,
    pub reviewed_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

pub const SCHEDULED_TASK_TYPES: [&str; 4] =
    ["OSA", "SPECIAL_DISPLAY", "MARKET_INFORMATION", "SURVEY"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Submitted,
    Completed,
    Approved,
    Rejected,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Submitted => "SUBMITTED",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Approved => "APPROVED",
            TaskStatus::Rejected => "REJECTED",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<TaskStatus> {
        match value {
            "PENDING" => Some(TaskStatus::Pending),
            "IN_PROGRESS" => Some(TaskStatus::InProgress),
            "SUBMITTED" => Some(TaskStatus::Submitted),
            "COMPLETED" => Some(TaskStatus::Completed),
            "APPROVED" => Some(TaskStatus::Approved),
            "REJECTED" => Some(TaskStatus::Rejected),
            "CANCELLED" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal statuses never count toward check-in eligibility and accept
    /// no further transitions from the PC.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Approved | TaskStatus::Rejected | TaskStatus::Cancelled
        )
    }
}

/// Role-gated status transition table for scheduled tasks. The PC moves their
/// own tasks through the working statuses; reviewers settle them.
pub fn status_change_allowed(role: Role, is_assignee: bool, new_status: TaskStatus) -> bool {
    match role {
        Role::Pc => {
            is_assignee
                && matches!(
                    new_status,
                    TaskStatus::InProgress | TaskStatus::Submitted | TaskStatus::Completed
                )
        }
        Role::Supervisor | Role::Admin => {
            matches!(new_status, TaskStatus::Approved | TaskStatus::Rejected)
        }
        Role::Sales | Role::Vendor => false,
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskBatchRequest {
    pub assigned_to_pc_id: i32,
    pub store_id: i32,
    pub note: Option<String>,
    #[validate(length(min = 1, message = "a batch must contain at least one task"), nested)]
    pub tasks: Vec<CreateTaskRequest>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateTaskRequest {
    pub task_type: String,
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    pub description: Option<String>,
    pub task_date: Option<NaiveDate>,
    pub active_from: Option<NaiveDate>,
    pub active_to: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[validate(range(min = 0, max = 10))]
    pub priority: Option<i32>,
    pub attachments: Option<serde_json::Value>,
}

impl CreateTaskRequest {
    /// A task is either pinned to one date or carries an active window.
    pub fn has_valid_schedule(&self) -> bool {
        match (self.task_date, self.active_from, self.active_to) {
            (Some(_), _, _) => true,
            (None, Some(from), Some(to)) => from <= to,
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateTaskStatusRequest {
    pub status: String,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskListParams {
    pub status: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub assigned_to: Option<i32>,
}

/// Scheduled task joined with its batch's store, for eligibility grouping.
#[derive(Debug, Serialize, FromRow)]
pub struct EligibleTask {
    pub id: i32,
    pub batch_id: i32,
    pub task_type: String,
    pub title: String,
    pub status: String,
    pub task_date: Option<NaiveDate>,
    pub active_from: Option<NaiveDate>,
    pub active_to: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub priority: i32,
    pub store_id: i32,
    pub store_name: String,
    pub store_code: String,
}

#[derive(Debug, Serialize)]
pub struct StoreEligibility {
    pub store_id: i32,
    pub store_name: String,
    pub store_code: String,
    pub tasks: Vec<EligibleTask>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pc_may_only_work_their_own_tasks() {
        assert!(status_change_allowed(Role::Pc, true, TaskStatus::InProgress));
        assert!(status_change_allowed(Role::Pc, true, TaskStatus::Submitted));
        assert!(status_change_allowed(Role::Pc, true, TaskStatus::Completed));
        assert!(!status_change_allowed(Role::Pc, false, TaskStatus::InProgress));
        assert!(!status_change_allowed(Role::Pc, true, TaskStatus::Approved));
        assert!(!status_change_allowed(Role::Pc, true, TaskStatus::Rejected));
        assert!(!status_change_allowed(Role::Pc, true, TaskStatus::Cancelled));
    }

    #[test]
    fn reviewers_may_only_settle() {
        for role in [Role::Supervisor, Role::Admin] {
            assert!(status_change_allowed(role, false, TaskStatus::Approved));
            assert!(status_change_allowed(role, false, TaskStatus::Rejected));
            assert!(!status_change_allowed(role, false, TaskStatus::InProgress));
            assert!(!status_change_allowed(role, false, TaskStatus::Submitted));
        }
    }

    #[test]
    fn other_roles_change_nothing() {
        for role in [Role::Sales, Role::Vendor] {
            for status in [
                TaskStatus::InProgress,
                TaskStatus::Approved,
                TaskStatus::Cancelled,
            ] {
                assert!(!status_change_allowed(role, true, status));
            }
        }
    }

    #[test]
    fn schedule_needs_a_date_or_a_window() {
        let base = CreateTaskRequest {
            task_type: "OSA".into(),
            title: "Shelf check".into(),
            description: None,
            task_date: None,
            active_from: None,
            active_to: None,
            due_date: None,
            priority: None,
            attachments: None,
        };
        assert!(!base.has_valid_schedule());

        let dated = CreateTaskRequest {
            task_date: Some(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()),
            ..base
        };
        assert!(dated.has_valid_schedule());
    }

    #[test]
    fn window_must_not_be_inverted() {
        let from = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let req = CreateTaskRequest {
            task_type: "SURVEY".into(),
            title: "Price survey".into(),
            description: None,
            task_date: None,
            active_from: Some(from),
            active_to: Some(to),
            due_date: None,
            priority: None,
            attachments: None,
        };
        assert!(!req.has_valid_schedule());
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Approved.is_terminal());
        assert!(TaskStatus::Rejected.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Submitted.is_terminal());
    }
}
