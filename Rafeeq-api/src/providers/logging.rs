use async_trait::async_trait;
use rafeeq_domain::error::CallError;
use rafeeq_domain::services::CallProviderTrait;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Dry-run provider: logs the call instead of placing it
#[derive(Debug, Default)]
pub struct LoggingCallProvider {
    placed: AtomicU64,
}

impl LoggingCallProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls logged so far
    pub fn placed(&self) -> u64 {
        self.placed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallProviderTrait for LoggingCallProvider {
    async fn place_call(&self, contact: &str, message: &str) -> Result<String, CallError> {
        let n = self.placed.fetch_add(1, Ordering::SeqCst) + 1;
        info!(contact = %contact, message = %message, "Dry run: emergency call not placed");
        Ok(format!("dry-run-{}", n))
    }
}
