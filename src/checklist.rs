//! Per-visit checklist engine. A fresh visit gets one required assignment per
//! default task type; inserting a matching evidence record completes the
//! corresponding assignment; check-out is gated on every required assignment
//! being complete.
//!
//! All writes take `&mut PgConnection` so they run inside whatever
//! transaction the caller already holds: completion happens in the same
//! transaction as the evidence insert that causes it, never as a detached
//! side effect.

use sqlx::PgConnection;

use crate::models::{
    AssignmentType, ChecklistStats, TaskAssignment, ASSIGNMENT_COMPLETED,
    DEFAULT_ASSIGNMENT_TYPES,
};

/// Insert the default checklist for a newly opened visit: one required
/// PENDING assignment per default type.
pub async fn create_default_assignments(
    conn: &mut PgConnection,
    visit_id: i32,
) -> Result<(), sqlx::Error> {
    for task_type in DEFAULT_ASSIGNMENT_TYPES {
        sqlx::query(
            r#"
            INSERT INTO task_assignments (visit_id, task_type, is_required, status)
            VALUES ($1, $2, TRUE, 'PENDING')
            "#,
        )
        .bind(visit_id)
        .bind(task_type.as_str())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Mark the (visit, task_type) assignment COMPLETED and point it at the
/// evidence row that completed it. The status guard makes this idempotent:
/// re-submitting evidence for an already-completed type affects zero rows,
/// which is not an error. Returns whether a row flipped.
pub async fn complete_assignment(
    conn: &mut PgConnection,
    visit_id: i32,
    task_type: AssignmentType,
    record_id: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE task_assignments
        SET status = 'COMPLETED',
            completed_at = CURRENT_TIMESTAMP,
            task_record_id = $3
        WHERE visit_id = $1
          AND task_type = $2
          AND status <> 'COMPLETED'
        "#,
    )
    .bind(visit_id)
    .bind(task_type.as_str())
    .bind(record_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn assignments_for_visit(
    conn: &mut PgConnection,
    visit_id: i32,
) -> Result<Vec<TaskAssignment>, sqlx::Error> {
    sqlx::query_as::<_, TaskAssignment>(
        r#"
        SELECT id, visit_id, task_type, is_required, status, completed_at, task_record_id
        FROM task_assignments
        WHERE visit_id = $1
        ORDER BY id
        "#,
    )
    .bind(visit_id)
    .fetch_all(&mut *conn)
    .await
}

/// Check-out gating summary. Only required assignments count; optional ones
/// never block check-out.
pub fn stats(assignments: &[TaskAssignment]) -> ChecklistStats {
    let total_required = assignments.iter().filter(|a| a.is_required).count() as i64;
    let completed_required = assignments
        .iter()
        .filter(|a| a.is_required && a.status == ASSIGNMENT_COMPLETED)
        .count() as i64;

    ChecklistStats {
        total_required,
        completed_required,
        can_check_out: completed_required == total_required,
    }
}

/// Task types still blocking check-out, for the rejection payload.
pub fn incomplete_required(assignments: &[TaskAssignment]) -> Vec<String> {
    assignments
        .iter()
        .filter(|a| a.is_required && a.status != ASSIGNMENT_COMPLETED)
        .map(|a| a.task_type.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(task_type: &str, is_required: bool, status: &str) -> TaskAssignment {
        TaskAssignment {
            id: 0,
            visit_id: 1,
            task_type: task_type.to_string(),
            is_required,
            status: status.to_string(),
            completed_at: None,
            task_record_id: None,
        }
    }

    #[test]
    fn fresh_checklist_blocks_check_out() {
        let rows = vec![
            assignment("OSA", true, "PENDING"),
            assignment("DISPLAY", true, "PENDING"),
            assignment("SURVEY", true, "PENDING"),
        ];
        let s = stats(&rows);
        assert_eq!(s.total_required, 3);
        assert_eq!(s.completed_required, 0);
        assert!(!s.can_check_out);
        assert_eq!(incomplete_required(&rows), vec!["OSA", "DISPLAY", "SURVEY"]);
    }

    #[test]
    fn partial_completion_itemizes_the_rest() {
        let rows = vec![
            assignment("OSA", true, "COMPLETED"),
            assignment("DISPLAY", true, "PENDING"),
            assignment("SURVEY", true, "PENDING"),
        ];
        let s = stats(&rows);
        assert_eq!(s.completed_required, 1);
        assert!(!s.can_check_out);
        assert_eq!(incomplete_required(&rows), vec!["DISPLAY", "SURVEY"]);
    }

    #[test]
    fn optional_assignments_never_gate() {
        let rows = vec![
            assignment("OSA", true, "COMPLETED"),
            assignment("DISPLAY", true, "COMPLETED"),
            assignment("SURVEY", true, "COMPLETED"),
            assignment("PROMOTION", false, "PENDING"),
        ];
        let s = stats(&rows);
        assert_eq!(s.total_required, 3);
        assert_eq!(s.completed_required, 3);
        assert!(s.can_check_out);
        assert!(incomplete_required(&rows).is_empty());
    }

    #[test]
    fn empty_checklist_can_check_out() {
        // A visit with no required work has nothing to gate on.
        let s = stats(&[]);
        assert_eq!(s.total_required, 0);
        assert!(s.can_check_out);
    }

    #[test]
    fn in_progress_still_counts_as_incomplete() {
        let rows = vec![assignment("OSA", true, "IN_PROGRESS")];
        assert!(!stats(&rows).can_check_out);
        assert_eq!(incomplete_required(&rows), vec!["OSA"]);
    }
}
