use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One checklist item of a visit. Created when the visit is opened, flipped
/// to COMPLETED when a matching evidence record is inserted.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct TaskAssignment {
    pub id: i32,
    pub visit_id: i32,
    pub task_type: String,
    pub is_required: bool,
    pub status: String,
    pub completed_at: Option<NaiveDateTime>,
    /// Id of the evidence row that completed this item. Which table it lives
    /// in follows from `task_type`; the id is not globally unique.
    pub task_record_id: Option<i32>,
}

pub const ASSIGNMENT_COMPLETED: &str = "COMPLETED";

/// Checklist item kinds. PROMOTION exists in the enumeration but is not part
/// of the default set created at check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentType {
    Osa,
    Display,
    Survey,
    Promotion,
}

impl AssignmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentType::Osa => "OSA",
            AssignmentType::Display => "DISPLAY",
            AssignmentType::Survey => "SURVEY",
            AssignmentType::Promotion => "PROMOTION",
        }
    }
}

/// The checklist every fresh visit starts with.
pub const DEFAULT_ASSIGNMENT_TYPES: [AssignmentType; 3] = [
    AssignmentType::Osa,
    AssignmentType::Display,
    AssignmentType::Survey,
];
