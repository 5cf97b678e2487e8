//! Fire-and-forget prompt sent when the five-hour window resets

use tokio::task::JoinHandle;

use crate::providers::{ClaudeProvider, NotifyError};
use crate::usage::OrganizationId;

/// Owns clones of what it needs; never touches session state
pub struct ResetNotifier {
    provider: ClaudeProvider,
    org: OrganizationId,
}

impl ResetNotifier {
    pub fn new(provider: ClaudeProvider, org: OrganizationId) -> Self {
        Self { provider, org }
    }

    /// Open a conversation and send one trivial prompt into it
    pub async fn notify(&self) -> Result<(), NotifyError> {
        let conversation = self.provider.create_conversation(&self.org).await?;
        self.provider.send_completion(&self.org, &conversation).await
    }

    /// Detach the notification; failures are logged and dropped
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            match self.notify().await {
                Ok(()) => log::info!("Reset prompt sent"),
                Err(e) => log::warn!("Failed to send reset prompt: {}", e),
            }
        })
    }
}
