//! Event bus adapter.
//!
//! The core publishes fire-and-forget events on state-changing mutations.
//! Delivery failures are logged, never surfaced to the caller; no handler
//! ever blocks on a sink.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Alert severity for expiry notifications
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Events the service emits
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServiceEvent {
    AliasCreated {
        alias_id: Uuid,
        user_id: Uuid,
        full_address: String,
    },
    AliasDeleted {
        alias_id: Uuid,
        user_id: Uuid,
        cascaded_emails: i64,
    },
    EmailDeleted {
        email_id: Uuid,
        user_id: Uuid,
    },
    CertificateRenewed {
        domain: String,
        expires_at: String,
    },
    CertificateRenewalFailed {
        domain: String,
        error: String,
    },
    CertificateExpiring {
        domain: String,
        days_until_expiry: i64,
        severity: AlertSeverity,
    },
}

/// A delivery target for service events
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Sink name for delivery-failure logs
    fn name(&self) -> &str;

    async fn deliver(&self, event: &ServiceEvent) -> Result<(), String>;
}

/// Sink that records events to the audit log
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn deliver(&self, event: &ServiceEvent) -> Result<(), String> {
        let json = serde_json::to_string(event).unwrap_or_default();
        info!(target: "mailcrypt_events", event = %json, "Service event");
        Ok(())
    }
}

/// Sink that POSTs events to a webhook endpoint
pub struct WebhookSink {
    url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: String, auth_token: Option<String>, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            url,
            auth_token,
            client,
        }
    }
}

#[async_trait]
impl EventSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, event: &ServiceEvent) -> Result<(), String> {
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "payload": event,
        });

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| e.to_string())?;
        if !response.status().is_success() {
            return Err(format!("webhook returned HTTP {}", response.status()));
        }
        Ok(())
    }
}

/// Fans events out to every configured sink without blocking the caller
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Fire-and-forget publish. Each sink delivers on its own task; a
    /// failing sink is logged and otherwise ignored.
    pub fn publish(&self, event: ServiceEvent) {
        debug!(?event, "Publishing service event");
        for sink in &self.sinks {
            let sink = sink.clone();
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = sink.deliver(&event).await {
                    warn!(sink = sink.name(), error = %e, "Event delivery failed");
                }
            });
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records everything it receives
    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<ServiceEvent>>,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn deliver(&self, event: &ServiceEvent) -> Result<(), String> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}
