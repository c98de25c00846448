mod fcm;
mod log_only;
mod notifier;

pub use fcm::FcmSender;
pub use log_only::LogOnlySender;
pub use notifier::{BulkSummary, TaskNotifier};

use std::{collections::BTreeMap, fmt, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use crate::appsettings::PushSettings;

/// Upper bound on messages per `send_each` call imposed by the push provider.
pub const MAX_BATCH_SIZE: usize = 500;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("Push service rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Batch of {0} messages exceeds the limit of {max}", max = MAX_BATCH_SIZE)]
    BatchTooLarge(usize),

    #[error("User does not have a push token configured {0}")]
    MissingToken(String),

    #[error("Send task was aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MessagePriority {
    Default,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AndroidOptions {
    pub channel_id: String,
    pub color: String,
    pub priority: MessagePriority,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub token: String,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
    pub android: Option<AndroidOptions>,
    pub apns_badge: Option<u32>,
}

#[derive(Debug)]
pub struct BatchResponse {
    pub success_count: usize,
    pub failure_count: usize,
    /// One entry per message, in the order the messages were given.
    pub responses: Vec<Result<MessageId, DeliveryError>>,
}

impl BatchResponse {
    pub fn from_results(responses: Vec<Result<MessageId, DeliveryError>>) -> Self {
        let success_count = responses.iter().filter(|r| r.is_ok()).count();
        Self {
            success_count,
            failure_count: responses.len() - success_count,
            responses,
        }
    }
}

#[async_trait]
pub trait NotificationSender: Send + Sync + 'static {
    async fn send(&self, message: &PushMessage) -> Result<MessageId, DeliveryError>;

    /// Sends every message independently; one failure does not stop the rest.
    async fn send_each(&self, messages: &[PushMessage]) -> Result<BatchResponse, DeliveryError> {
        ensure_batch_size(messages)?;

        let mut responses = Vec::with_capacity(messages.len());
        for message in messages {
            responses.push(self.send(message).await);
        }

        Ok(BatchResponse::from_results(responses))
    }
}

pub(crate) fn ensure_batch_size(messages: &[PushMessage]) -> Result<(), DeliveryError> {
    if messages.len() > MAX_BATCH_SIZE {
        return Err(DeliveryError::BatchTooLarge(messages.len()));
    }
    Ok(())
}

/// Picks FCM when credentials are configured, otherwise a sender that only logs.
pub fn sender_from_settings(settings: &PushSettings) -> Arc<dyn NotificationSender> {
    match (&settings.project_id, &settings.access_token) {
        (Some(project_id), Some(access_token))
            if !project_id.is_empty() && !access_token.is_empty() =>
        {
            log::info!("Push delivery enabled [project_id = {project_id}]");
            Arc::new(FcmSender::new(
                project_id,
                access_token.clone(),
                settings.endpoint.as_deref(),
            ))
        }
        _ => {
            log::warn!("Push credentials are not configured, notifications will only be logged");
            Arc::new(LogOnlySender::new())
        }
    }
}
