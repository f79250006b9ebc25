//! Notification transport contract.
//!
//! Verification codes and employer decision notices leave the system through
//! a [`Notifier`]. Delivery is fire-and-forget: callers get a delivery id or
//! `DeliveryFailed`, and nothing here retries.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::AppResult;

#[cfg(any(test, feature = "test-utils"))]
use mockall::automock;

/// Message templates the transport knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    VerificationCode,
    EmployerApproved,
    EmployerRejected,
    EmployerSuspended,
    EmployerReinstated,
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TemplateKind::VerificationCode => "verification_code",
            TemplateKind::EmployerApproved => "employer_approved",
            TemplateKind::EmployerRejected => "employer_rejected",
            TemplateKind::EmployerSuspended => "employer_suspended",
            TemplateKind::EmployerReinstated => "employer_reinstated",
        };
        f.write_str(name)
    }
}

/// Transport-assigned id of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryId(pub String);

/// Notification/email transport.
#[cfg_attr(any(test, feature = "test-utils"), automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Hand a message to the transport.
    async fn send(&self, email: &str, template: TemplateKind, payload: Value) -> AppResult<DeliveryId>;
}

/// Development transport: writes messages to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, email: &str, template: TemplateKind, payload: Value) -> AppResult<DeliveryId> {
        let id = Uuid::new_v4().to_string();
        info!(
            delivery_id = %id,
            to = %email,
            template = %template,
            payload = %payload,
            "Notification (log transport)"
        );
        Ok(DeliveryId(id))
    }
}

#[cfg(feature = "relay")]
pub use relay::RelayNotifier;

#[cfg(feature = "relay")]
mod relay {
    use super::*;
    use crate::error::AppError;

    #[derive(Serialize)]
    struct RelayRequest<'a> {
        to: &'a str,
        template: TemplateKind,
        payload: &'a Value,
    }

    #[derive(Deserialize)]
    struct RelayResponse {
        id: String,
    }

    /// Posts messages to an HTTP mail relay.
    pub struct RelayNotifier {
        client: reqwest::Client,
        url: String,
        token: Option<String>,
    }

    impl RelayNotifier {
        pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
            Self {
                client: reqwest::Client::new(),
                url: url.into(),
                token,
            }
        }
    }

    #[async_trait]
    impl Notifier for RelayNotifier {
        async fn send(&self, email: &str, template: TemplateKind, payload: Value) -> AppResult<DeliveryId> {
            let mut request = self.client.post(&self.url).json(&RelayRequest {
                to: email,
                template,
                payload: &payload,
            });
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| AppError::delivery_failed(e.to_string()))?;

            if !response.status().is_success() {
                return Err(AppError::delivery_failed(format!(
                    "relay answered {}",
                    response.status()
                )));
            }

            let body: RelayResponse = response
                .json()
                .await
                .map_err(|e| AppError::delivery_failed(format!("unreadable relay response: {}", e)))?;

            info!(delivery_id = %body.id, template = %template, "Notification accepted by relay");
            Ok(DeliveryId(body.id))
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use recording::{RecordingNotifier, SentNotification};

#[cfg(any(test, feature = "test-utils"))]
mod recording {
    use std::sync::Mutex;

    use super::*;
    use crate::error::AppError;

    /// A message captured by [`RecordingNotifier`].
    #[derive(Debug, Clone)]
    pub struct SentNotification {
        pub email: String,
        pub template: TemplateKind,
        pub payload: Value,
    }

    /// In-memory transport for tests; can be switched to fail.
    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<SentNotification>>,
        failing: Mutex<bool>,
    }

    impl RecordingNotifier {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_failing(&self, failing: bool) {
            *self.failing.lock().unwrap() = failing;
        }

        pub fn sent(&self) -> Vec<SentNotification> {
            self.sent.lock().unwrap().clone()
        }

        /// Code carried by the latest verification message to `email`.
        pub fn last_code(&self, email: &str) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|n| n.email == email && n.template == TemplateKind::VerificationCode)
                .and_then(|n| n.payload.get("code").and_then(Value::as_str).map(str::to_string))
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, email: &str, template: TemplateKind, payload: Value) -> AppResult<DeliveryId> {
            if *self.failing.lock().unwrap() {
                return Err(AppError::delivery_failed("transport offline"));
            }
            self.sent.lock().unwrap().push(SentNotification {
                email: email.to_string(),
                template,
                payload,
            });
            Ok(DeliveryId(Uuid::new_v4().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn log_transport_always_accepts() {
        let id = LogNotifier
            .send("a@x.com", TemplateKind::EmployerApproved, json!({}))
            .await
            .unwrap();
        assert!(!id.0.is_empty());
    }

    #[tokio::test]
    async fn recording_transport_exposes_last_code() {
        let notifier = RecordingNotifier::new();
        notifier
            .send("a@x.com", TemplateKind::VerificationCode, json!({"code": "111111"}))
            .await
            .unwrap();
        notifier
            .send("a@x.com", TemplateKind::VerificationCode, json!({"code": "222222"}))
            .await
            .unwrap();
        assert_eq!(notifier.last_code("a@x.com").as_deref(), Some("222222"));

        notifier.set_failing(true);
        let err = notifier
            .send("a@x.com", TemplateKind::VerificationCode, json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "delivery-failed");
    }
}
