use anyhow::{Context, Result};
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

use crate::compose::NotificationDraft;
use common::PushConfig;

pub const DEFAULT_API_URL: &str = "https://onesignal.com/api/v1/notifications";

const SMALL_ICON: &str = "ic_stat_onesignal_default";
const OPEN_ACTION: &str = "open_news";

/// Substring the push service puts in its error body when the configured
/// Android channel id is unknown to the app.
const INVALID_CHANNEL_MARKER: &str = "Could not find android_channel_id";

/// Shape of a single delivery attempt's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// The configured payload as-is.
    Full,
    /// The payload with `android_channel_id` omitted, used only after the
    /// service rejects the configured channel.
    WithoutChannel,
}

/// The fixed delivery plan: at most two attempts, ever. The second shape is
/// only present when a channel id is configured, and only reachable through
/// the invalid-channel fallback.
pub fn delivery_plan(has_channel: bool) -> &'static [PayloadShape] {
    if has_channel {
        &[PayloadShape::Full, PayloadShape::WithoutChannel]
    } else {
        &[PayloadShape::Full]
    }
}

#[derive(Debug, Serialize)]
struct PushPayload<'a> {
    app_id: &'a str,
    included_segments: [&'a str; 1],
    headings: LocalizedText<'a>,
    contents: LocalizedText<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    android_channel_id: Option<&'a str>,
    small_icon: &'a str,
    data: PushData<'a>,
}

#[derive(Debug, Serialize)]
struct LocalizedText<'a> {
    en: &'a str,
}

#[derive(Debug, Serialize)]
struct PushData<'a> {
    action: &'a str,
}

/// Proof of a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Number of HTTP attempts actually made (1 or 2).
    pub attempts: u32,
}

/// Client for the push-notification service.
pub struct PushClient {
    client: reqwest::Client,
    api_url: String,
    app_id: String,
    api_key: String,
    android_channel_id: Option<String>,
    timeout: Duration,
}

impl PushClient {
    pub fn new(
        api_url: impl Into<String>,
        app_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            app_id: app_id.into(),
            api_key: api_key.into(),
            android_channel_id: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.android_channel_id = Some(channel.into());
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout = Duration::from_secs(timeout_secs);
        self
    }

    /// Build a client from the `[push]` config section. The API key is
    /// resolved from the environment here, not at send time.
    pub fn from_config(cfg: &PushConfig) -> Result<Self> {
        let mut client = Self::new(
            cfg.api_url.clone().unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            cfg.app_id.clone(),
            cfg.api_key()?,
        );
        if let Some(channel) = &cfg.android_channel_id {
            client = client.with_channel(channel.clone());
        }
        if let Some(secs) = cfg.timeout_seconds {
            client = client.with_timeout(secs);
        }
        Ok(client)
    }

    fn payload<'a>(&'a self, draft: &'a NotificationDraft, shape: PayloadShape) -> PushPayload<'a> {
        let channel = match shape {
            PayloadShape::Full => self.android_channel_id.as_deref(),
            PayloadShape::WithoutChannel => None,
        };
        PushPayload {
            app_id: &self.app_id,
            included_segments: ["All"],
            headings: LocalizedText { en: &draft.title },
            contents: LocalizedText { en: &draft.body },
            android_channel_id: channel,
            small_icon: SMALL_ICON,
            data: PushData { action: OPEN_ACTION },
        }
    }

    /// Send one draft to all subscribers.
    ///
    /// Walks the delivery plan: a failed attempt advances to the next shape
    /// only when the error body reports the configured Android channel id as
    /// unknown; every other failure stops the plan. Delivery is best-effort,
    /// so the caller is expected to log and swallow the returned error.
    pub async fn send(&self, draft: &NotificationDraft) -> Result<DeliveryReceipt> {
        let plan = delivery_plan(self.android_channel_id.is_some());
        let mut attempts = 0u32;

        for (i, shape) in plan.iter().enumerate() {
            attempts += 1;
            let body = self.payload(draft, *shape);

            let response = tokio::time::timeout(
                self.timeout,
                self.client
                    .post(&self.api_url)
                    .header("Authorization", format!("Basic {}", self.api_key))
                    .header("Content-Type", "application/json")
                    .json(&body)
                    .send(),
            )
            .await
            .context("push request timed out")?
            .context("push HTTP request failed")?;

            let status = response.status();
            if status.is_success() {
                return Ok(DeliveryReceipt { attempts });
            }

            let error_body = response.text().await.unwrap_or_default();
            let is_last = i + 1 == plan.len();
            if !is_last && error_body.contains(INVALID_CHANNEL_MARKER) {
                warn!(
                    channel = self.android_channel_id.as_deref().unwrap_or_default(),
                    "push service rejected android_channel_id, retrying without it"
                );
                continue;
            }

            anyhow::bail!(
                "push API error {} after {} attempt(s): {}",
                status,
                attempts,
                error_body
            );
        }

        // delivery_plan never returns an empty slice
        anyhow::bail!("delivery plan exhausted without a response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_without_channel_is_a_single_attempt() {
        assert_eq!(delivery_plan(false), &[PayloadShape::Full]);
    }

    #[test]
    fn plan_with_channel_falls_back_to_channelless_payload() {
        assert_eq!(
            delivery_plan(true),
            &[PayloadShape::Full, PayloadShape::WithoutChannel]
        );
    }

    #[test]
    fn payload_omits_channel_field_for_fallback_shape() {
        let draft = NotificationDraft {
            title: "Morning update: A".to_string(),
            body: "hi there... Tap to read more! 📖".to_string(),
            scheduled_hour: 8,
            scheduled_minute: 5,
        };
        let client = PushClient::new("http://localhost", "app-1234", "key")
            .with_channel("news-channel");

        let full = serde_json::to_value(client.payload(&draft, PayloadShape::Full)).unwrap();
        assert_eq!(full["android_channel_id"], "news-channel");
        assert_eq!(full["included_segments"][0], "All");
        assert_eq!(full["headings"]["en"], "Morning update: A");

        let fallback =
            serde_json::to_value(client.payload(&draft, PayloadShape::WithoutChannel)).unwrap();
        assert!(fallback.get("android_channel_id").is_none());
        assert_eq!(fallback["data"]["action"], "open_news");
    }
}
