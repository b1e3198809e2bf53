use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i32,
    pub external_id: String,
    pub name: Option<String>,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

/// Application roles. Stored as text in the database; parsed at the auth
/// boundary so handlers work with the typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Pc,
    Supervisor,
    Admin,
    Sales,
    Vendor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Pc => "PC",
            Role::Supervisor => "SUPERVISOR",
            Role::Admin => "ADMIN",
            Role::Sales => "SALES",
            Role::Vendor => "VENDOR",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "PC" => Some(Role::Pc),
            "SUPERVISOR" => Some(Role::Supervisor),
            "ADMIN" => Some(Role::Admin),
            "SALES" => Some(Role::Sales),
            "VENDOR" => Some(Role::Vendor),
            _ => None,
        }
    }

    /// Roles allowed to review evidence and scheduled-task submissions.
    pub fn is_reviewer(&self) -> bool {
        matches!(self, Role::Supervisor | Role::Admin)
    }

    /// Roles allowed to mutate reference data (stores).
    pub fn can_manage_stores(&self) -> bool {
        matches!(self, Role::Supervisor | Role::Admin)
    }
}

/// Authenticated caller, resolved by the auth middleware and injected into
/// request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: i32,
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct SyncUserRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_text() {
        for role in [
            Role::Pc,
            Role::Supervisor,
            Role::Admin,
            Role::Sales,
            Role::Vendor,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("MANAGER"), None);
        assert_eq!(Role::parse("pc"), None);
    }

    #[test]
    fn only_supervisor_and_admin_review() {
        assert!(Role::Supervisor.is_reviewer());
        assert!(Role::Admin.is_reviewer());
        assert!(!Role::Pc.is_reviewer());
        assert!(!Role::Sales.is_reviewer());
        assert!(!Role::Vendor.is_reviewer());
    }
}
