//! claude.ai endpoints: organization discovery, usage, and the reset prompt
//!
//! API:
//! - `GET  /organizations` -> `[{"uuid": ...}, ...]`
//! - `GET  /organizations/{id}/usage` -> windows keyed by name
//! - `POST /organizations/{id}/chat_conversations` -> `{"uuid": ...}` (201)
//! - `POST /organizations/{id}/chat_conversations/{uuid}/completion` -> stream, ignored

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::providers::traits::*;
use crate::usage::{OrganizationId, UsageSnapshot};

const ORGANIZATIONS_PATH: &str = "/organizations";
const ERROR_EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("Authentication failed (HTTP {0}). Please log into claude.ai and restart.")]
    Unauthorized(u16),
    #[error("No organizations found")]
    NotFound,
    #[error("Failed to fetch organizations: HTTP {0}")]
    HttpStatus(u16),
    #[error("Failed to fetch organization: {0}")]
    Transport(#[from] NetworkError),
    #[error("Unexpected organizations payload: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("Authentication failed. Please log into claude.ai and restart.")]
    Unauthorized,
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("{0}")]
    Transport(#[from] NetworkError),
    #[error("Parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to create conversation: HTTP {0}")]
    ConversationStatus(u16),
    #[error("Conversation response carried no uuid")]
    MissingConversationId,
    #[error(transparent)]
    Transport(#[from] NetworkError),
}

#[derive(Deserialize)]
struct OrganizationEntry {
    uuid: Option<String>,
}

#[derive(Deserialize)]
struct ConversationResponse {
    uuid: Option<String>,
}

/// Typed calls against the remote service over any [`HttpTransport`]
#[derive(Clone)]
pub struct ClaudeProvider {
    transport: Arc<dyn HttpTransport>,
    read_timeout: Duration,
    notify_timeout: Duration,
    notify_model: String,
}

impl ClaudeProvider {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &Config) -> Self {
        Self {
            transport,
            read_timeout: config.read_timeout,
            notify_timeout: config.notify_timeout,
            notify_model: config.notify_model.clone(),
        }
    }

    /// Look up the organization all further calls are scoped to (first entry wins)
    pub async fn resolve_organization(&self) -> Result<OrganizationId, ResolutionError> {
        let response = self
            .transport
            .get(ORGANIZATIONS_PATH, self.read_timeout)
            .await?;

        match response.status {
            200 => {}
            401 | 403 => return Err(ResolutionError::Unauthorized(response.status)),
            status => return Err(ResolutionError::HttpStatus(status)),
        }

        let orgs: Vec<OrganizationEntry> = serde_json::from_str(&response.body)
            .map_err(|e| ResolutionError::Parse(e.to_string()))?;

        orgs.into_iter()
            .next()
            .and_then(|org| org.uuid)
            .filter(|uuid| !uuid.is_empty())
            .map(OrganizationId::new)
            .ok_or(ResolutionError::NotFound)
    }

    pub async fn fetch_usage(&self, org: &OrganizationId) -> Result<UsageSnapshot, FetchError> {
        let path = format!("{}/{}/usage", ORGANIZATIONS_PATH, org);
        let response = self.transport.get(&path, self.read_timeout).await?;

        match response.status {
            200 => UsageSnapshot::parse(&response.body, Utc::now())
                .map_err(|e| FetchError::Parse(e.to_string())),
            401 | 403 => Err(FetchError::Unauthorized),
            status => Err(FetchError::HttpStatus {
                status,
                body: response.excerpt(ERROR_EXCERPT_CHARS),
            }),
        }
    }

    /// Create an empty conversation, returning its uuid
    pub async fn create_conversation(&self, org: &OrganizationId) -> Result<String, NotifyError> {
        let path = format!("{}/{}/chat_conversations", ORGANIZATIONS_PATH, org);
        let response = self
            .transport
            .post(&path, &json!({ "name": "" }), self.read_timeout)
            .await?;

        if response.status != 201 {
            return Err(NotifyError::ConversationStatus(response.status));
        }

        serde_json::from_str::<ConversationResponse>(&response.body)
            .ok()
            .and_then(|c| c.uuid)
            .filter(|uuid| !uuid.is_empty())
            .ok_or(NotifyError::MissingConversationId)
    }

    /// Send a one-word prompt into `conversation`; the streamed answer is discarded
    pub async fn send_completion(
        &self,
        org: &OrganizationId,
        conversation: &str,
    ) -> Result<(), NotifyError> {
        let path = format!(
            "{}/{}/chat_conversations/{}/completion",
            ORGANIZATIONS_PATH, org, conversation
        );
        let body = json!({
            "prompt": "hi",
            "timezone": "UTC",
            "model": self.notify_model,
            "attachments": [],
        });
        let status = self
            .transport
            .post_status(&path, &body, self.notify_timeout)
            .await?;
        log::debug!("Completion answered HTTP {}", status);
        Ok(())
    }
}
