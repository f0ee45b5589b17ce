// Repository module structure
pub mod errors;
mod escalation_log;
mod in_memory;
mod storage;

// Re-export commonly used types
pub use errors::RepositoryError;
pub use escalation_log::{EscalationLogRepository, EscalationLogRepositoryTrait};

// Re-export test modules for both testing and when mock feature is enabled
#[cfg(any(test, feature = "mock"))]
pub use escalation_log::tests;
