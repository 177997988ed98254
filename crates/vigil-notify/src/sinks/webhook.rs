use crate::error::NotifyError;
use crate::AlarmSink;
use anyhow::Result;
use async_trait::async_trait;
use vigil_common::types::AlarmMessage;

/// Sink that POSTs every alarm as JSON to a webhook endpoint.
///
/// An optional body template replaces `{{field}}` placeholders; without
/// one, a fixed JSON document is sent. Delivery is attempted three times
/// with exponential backoff before giving up.
pub struct WebhookAlarmSink {
    url: String,
    client: reqwest::Client,
    body_template: Option<String>,
}

impl WebhookAlarmSink {
    pub fn new(url: &str, body_template: Option<String>) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
            body_template,
        }
    }

    fn render_body(&self, alarm: &AlarmMessage) -> String {
        if let Some(template) = &self.body_template {
            template
                .replace("{{program}}", &alarm.program_name)
                .replace("{{level}}", &alarm.level.to_string())
                .replace("{{summary}}", &alarm.summary)
                .replace("{{detail}}", alarm.detail.as_deref().unwrap_or(""))
                .replace(
                    "{{event_id}}",
                    &alarm
                        .event_id
                        .as_ref()
                        .map(|id| id.to_string())
                        .unwrap_or_default(),
                )
                .replace("{{timestamp}}", &alarm.timestamp.to_rfc3339())
        } else {
            serde_json::json!({
                "program": alarm.program_name,
                "level": alarm.level.to_string(),
                "summary": alarm.summary,
                "detail": alarm.detail,
                "event_id": alarm.event_id.as_ref().map(|id| id.to_string()),
                "timestamp": alarm.timestamp.to_rfc3339(),
            })
            .to_string()
        }
    }
}

#[async_trait]
impl AlarmSink for WebhookAlarmSink {
    async fn raise_alarm(&self, alarm: &AlarmMessage) -> Result<()> {
        let body = self.render_body(alarm);
        let mut last_err: Option<NotifyError> = None;

        for attempt in 0..3u32 {
            match self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .body(body.clone())
                .send()
                .await
            {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(());
                    }
                    let resp_body = resp.text().await.unwrap_or_default();
                    tracing::warn!(
                        attempt = attempt + 1,
                        status = %status,
                        "Webhook returned non-success status, retrying"
                    );
                    last_err = Some(NotifyError::Endpoint {
                        url: self.url.clone(),
                        status: status.as_u16(),
                        body: resp_body,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "Webhook send failed, retrying"
                    );
                    last_err = Some(e.into());
                }
            }
            if attempt < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(100 * 2u64.pow(attempt)))
                    .await;
            }
        }

        Err(last_err
            .unwrap_or_else(|| NotifyError::InvalidConfig("no delivery attempted".into()))
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vigil_common::types::{AlarmLevel, EventId};

    fn sample_alarm() -> AlarmMessage {
        AlarmMessage {
            level: AlarmLevel::High,
            program_name: "billing".to_string(),
            summary: "repeated pay failures".to_string(),
            detail: Some("payment backend returned 502".to_string()),
            event_id: Some(EventId {
                partition: "2024-06-01".to_string(),
                row: "42".to_string(),
            }),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn default_body_is_valid_json() {
        let sink = WebhookAlarmSink::new("http://localhost/hook", None);
        let body = sink.render_body(&sample_alarm());
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["program"], "billing");
        assert_eq!(value["level"], "high");
        assert_eq!(value["event_id"], "2024-06-01:42");
    }

    #[test]
    fn template_placeholders_are_replaced() {
        let sink = WebhookAlarmSink::new(
            "http://localhost/hook",
            Some("[{{level}}] {{program}}: {{summary}} ({{event_id}})".to_string()),
        );
        let body = sink.render_body(&sample_alarm());
        assert_eq!(body, "[high] billing: repeated pay failures (2024-06-01:42)");
    }

    #[test]
    fn template_renders_missing_event_id_as_empty() {
        let sink =
            WebhookAlarmSink::new("http://localhost/hook", Some("id={{event_id}}".to_string()));
        let mut alarm = sample_alarm();
        alarm.event_id = None;
        assert_eq!(sink.render_body(&alarm), "id=");
    }
}
