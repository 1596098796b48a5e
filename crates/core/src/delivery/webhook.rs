use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::flows::effects::{EffectError, Notifier};
use crate::flows::states::NotificationRequest;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    to: &'a str,
    request_id: &'a str,
    request_type: &'a str,
    status: &'a str,
    amount: Decimal,
    requester_name: &'a str,
    occurred_at: DateTime<Utc>,
    message: String,
}

/// Pushes status changes to a messaging gateway as JSON.
#[derive(Clone, Debug)]
pub struct WebhookNotifier {
    client: Client,
    endpoint: String,
    token: Option<SecretString>,
}

impl WebhookNotifier {
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, EffectError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| EffectError::Delivery(error.to_string()))?;
        Ok(Self { client, endpoint: endpoint.into(), token })
    }
}

pub fn status_message(notification: &NotificationRequest) -> String {
    format!(
        "{}: your {} request for {} is now {}",
        notification.requester_name,
        notification.request_type,
        notification.amount,
        notification.status.as_str().replace('_', " "),
    )
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &NotificationRequest) -> Result<(), EffectError> {
        let payload = WebhookPayload {
            to: &notification.contact,
            request_id: &notification.request_id.0,
            request_type: notification.request_type.as_str(),
            status: notification.status.as_str(),
            amount: notification.amount,
            requester_name: &notification.requester_name,
            occurred_at: notification.occurred_at,
            message: status_message(notification),
        };

        let mut request = self.client.post(&self.endpoint).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }
        let response =
            request.send().await.map_err(|error| EffectError::Delivery(error.to_string()))?;

        if !response.status().is_success() {
            return Err(EffectError::Delivery(format!(
                "notification endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
