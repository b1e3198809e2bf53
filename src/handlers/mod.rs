pub mod approvals;
pub mod auth;
pub mod evidence;
pub mod stores;
pub mod tasks;
pub mod visits;
