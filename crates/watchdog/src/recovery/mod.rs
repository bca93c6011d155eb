/// Recovery module - remediation commands and their execution
pub mod dispatcher;
pub mod types;

pub use dispatcher::{Dispatcher, ShellDispatcher};
pub use types::{CommandResult, RecoveryAction, RecoveryCategory};
