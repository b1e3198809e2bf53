// Re-export all model types from submodules
mod assignments;
mod evidence;
mod stores;
mod tasks;
mod users;
mod visits;

pub use assignments::*;
pub use evidence::*;
pub use stores::*;
pub use tasks::*;
pub use users::*;
pub use visits::*;
