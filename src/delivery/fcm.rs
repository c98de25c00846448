use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::task::JoinSet;

use super::{
    BatchResponse, DeliveryError, MessageId, MessagePriority, NotificationSender, PushMessage,
    ensure_batch_size,
};

const DEFAULT_ENDPOINT: &str = "https://fcm.googleapis.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct SendResponse {
    name: String,
}

struct FcmClient {
    http: reqwest::Client,
    send_url: String,
    access_token: String,
}

/// Firebase Cloud Messaging over the HTTP v1 API.
///
/// The OAuth access token is minted outside of this process and passed in as is.
#[derive(Clone)]
pub struct FcmSender {
    client: Arc<FcmClient>,
}

impl FcmSender {
    pub fn new(project_id: &str, access_token: String, endpoint: Option<&str>) -> Self {
        let endpoint = endpoint.unwrap_or(DEFAULT_ENDPOINT).trim_end_matches('/');
        let send_url = format!("{endpoint}/v1/projects/{project_id}/messages:send");

        Self {
            client: Arc::new(FcmClient {
                http: reqwest::Client::new(),
                send_url,
                access_token,
            }),
        }
    }
}

impl FcmClient {
    async fn send(&self, message: &PushMessage) -> Result<MessageId, DeliveryError> {
        let response = self
            .http
            .post(&self.send_url)
            .bearer_auth(&self.access_token)
            .timeout(REQUEST_TIMEOUT)
            .json(&request_body(message))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let SendResponse { name } = response.json().await?;
        Ok(MessageId(name))
    }
}

#[async_trait]
impl NotificationSender for FcmSender {
    async fn send(&self, message: &PushMessage) -> Result<MessageId, DeliveryError> {
        self.client.send(message).await
    }

    async fn send_each(&self, messages: &[PushMessage]) -> Result<BatchResponse, DeliveryError> {
        ensure_batch_size(messages)?;

        let mut in_flight = JoinSet::new();
        for (index, message) in messages.iter().cloned().enumerate() {
            let client = Arc::clone(&self.client);
            in_flight.spawn(async move { (index, client.send(&message).await) });
        }

        let mut responses: Vec<Option<Result<MessageId, DeliveryError>>> =
            (0..messages.len()).map(|_| None).collect();
        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok((index, result)) => responses[index] = Some(result),
                Err(e) => log::error!("Push send task failed to complete: {e}"),
            }
        }

        let responses = responses
            .into_iter()
            .map(|response| {
                response.unwrap_or_else(|| {
                    Err(DeliveryError::Aborted("send task did not complete".to_owned()))
                })
            })
            .collect();

        Ok(BatchResponse::from_results(responses))
    }
}

fn request_body(message: &PushMessage) -> Value {
    let mut body = json!({
        "token": message.token,
        "notification": {
            "title": message.title,
            "body": message.body,
        },
        "data": message.data,
    });

    if let Some(android) = &message.android {
        let (priority, notification_priority) = match android.priority {
            MessagePriority::High => ("HIGH", "PRIORITY_HIGH"),
            MessagePriority::Default => ("NORMAL", "PRIORITY_DEFAULT"),
        };
        body["android"] = json!({
            "priority": priority,
            "notification": {
                "icon": "ic_notification",
                "color": android.color,
                "sound": "default",
                "channel_id": android.channel_id,
                "notification_priority": notification_priority,
            },
        });
    }

    if let Some(badge) = message.apns_badge {
        body["apns"] = json!({
            "payload": {
                "aps": {
                    "alert": {
                        "title": message.title,
                        "body": message.body,
                    },
                    "badge": badge,
                    "sound": "default",
                },
            },
        });
    }

    json!({ "message": body })
}
