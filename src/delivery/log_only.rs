use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use super::{DeliveryError, MessageId, NotificationSender, PushMessage};

/// Stand-in used when no push credentials are configured. Every send succeeds.
#[derive(Default)]
pub struct LogOnlySender {
    sent: AtomicU64,
}

impl LogOnlySender {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationSender for LogOnlySender {
    async fn send(&self, message: &PushMessage) -> Result<MessageId, DeliveryError> {
        let sequence = self.sent.fetch_add(1, Ordering::Relaxed) + 1;
        log::info!("[MOCK] Would send '{}': {}", message.title, message.body);
        Ok(MessageId(format!("mock/{sequence}")))
    }
}
