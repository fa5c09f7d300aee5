use std::time::Duration;

use anyhow::Context as _;
use serde::Serialize;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Downstream consumers of a finished reconcile run. Posting is
/// fire-and-forget: failures are logged and never retried.
#[derive(Debug, Clone)]
pub struct WebhookSinks {
    client: reqwest::Client,
    records_url: Option<String>,
    report_url: Option<String>,
}

impl WebhookSinks {
    pub fn new(records_url: Option<String>, report_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            records_url: records_url.filter(|url| !url.trim().is_empty()),
            report_url: report_url.filter(|url| !url.trim().is_empty()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, None)
    }

    pub async fn send_records<T: Serialize + ?Sized>(&self, records: &T) {
        self.send("records", self.records_url.as_deref(), records)
            .await;
    }

    pub async fn send_report<T: Serialize + ?Sized>(&self, rows: &T) {
        self.send("report", self.report_url.as_deref(), rows).await;
    }

    async fn send<T: Serialize + ?Sized>(&self, sink: &str, url: Option<&str>, body: &T) {
        let Some(url) = url else {
            tracing::debug!(sink, "webhook not configured; skipping");
            return;
        };
        if let Err(err) = self.post(url, body).await {
            tracing::warn!(sink, url, ?err, "webhook delivery failed");
        } else {
            tracing::info!(sink, url, "webhook delivered");
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> anyhow::Result<()> {
        let response = self
            .client
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("webhook responded {status}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_sink_does_not_fail_the_caller() {
        let sinks = WebhookSinks::new(Some("http://127.0.0.1:1/hook".to_owned()), None);
        sinks.send_records(&[1, 2, 3]).await;
        sinks.send_report(&Vec::<u8>::new()).await;
    }

    #[test]
    fn blank_urls_are_treated_as_unset() {
        let sinks = WebhookSinks::new(Some("  ".to_owned()), Some(String::new()));
        assert!(sinks.records_url.is_none());
        assert!(sinks.report_url.is_none());
    }
}
