use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::USER_AGENT;

use crate::formats::{AffiliateLink, ArticleRecord, BackendRequest, PageCountResult};
use crate::pipeline::WorkflowState;
use crate::progress::{ProgressChannel, ProgressEvent};

pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// The backend that turns affiliate links into page counts.
#[async_trait]
pub trait AugmentBackend: Send + Sync {
    async fn augment(&self, request: &BackendRequest) -> anyhow::Result<Vec<PageCountResult>>;
}

#[derive(Debug, Clone)]
pub struct HttpAugmentBackend {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAugmentBackend {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("build backend http client")?;
        Ok(Self {
            client,
            endpoint: scrape_endpoint(base_url),
        })
    }
}

/// Stands in where no backend URL is configured. The catalog workflow never
/// dispatches, so it runs with this.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredBackend;

#[async_trait]
impl AugmentBackend for UnconfiguredBackend {
    async fn augment(&self, _request: &BackendRequest) -> anyhow::Result<Vec<PageCountResult>> {
        anyhow::bail!("no augmentation backend configured")
    }
}

pub fn scrape_endpoint(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    format!("{base_url}/api/scrape")
}

#[async_trait]
impl AugmentBackend for HttpAugmentBackend {
    async fn augment(&self, request: &BackendRequest) -> anyhow::Result<Vec<PageCountResult>> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(USER_AGENT, "catalogscout/0.1")
            .json(request)
            .send()
            .await
            .with_context(|| format!("POST {}", self.endpoint))?;

        let status = response.status();
        let raw = response.text().await.context("read backend response body")?;
        if !status.is_success() {
            anyhow::bail!("backend error ({status}): {raw}");
        }
        serde_json::from_str(&raw).context("parse backend response")
    }
}

/// Records that go to the backend: active ones with an affiliate link.
pub fn eligible_links(records: &[ArticleRecord]) -> Vec<AffiliateLink> {
    records
        .iter()
        .filter(|record| record.is_active && !record.affiliate_url.is_empty())
        .map(|record| AffiliateLink {
            id: record.id,
            amazon_url: record.affiliate_url.clone(),
        })
        .collect()
}

/// Send eligible records in order, `chunk_size` at a time, one request in
/// flight. A failed chunk is logged and skipped; earlier results are kept.
pub async fn dispatch_batches<B>(
    records: &[ArticleRecord],
    chunk_size: usize,
    timestamp: i64,
    backend: &B,
    progress: &ProgressChannel,
) -> Vec<PageCountResult>
where
    B: AugmentBackend + ?Sized,
{
    let links = eligible_links(records);
    let total = links.len();
    let mut results = Vec::new();
    if total == 0 {
        tracing::info!("no active records with affiliate links; nothing to dispatch");
        return results;
    }

    let chunk_size = chunk_size.max(1);
    let chunk_count = total.div_ceil(chunk_size);
    let mut processed = 0usize;

    for (chunk_index, chunk) in links.chunks(chunk_size).enumerate() {
        let request = BackendRequest {
            amazon_urls: chunk.to_vec(),
            current_timestamp: timestamp,
        };

        match backend.augment(&request).await {
            Ok(mut chunk_results) => {
                tracing::debug!(
                    chunk = chunk_index,
                    sent = chunk.len(),
                    received = chunk_results.len(),
                    "backend chunk done"
                );
                results.append(&mut chunk_results);
            }
            Err(err) => {
                tracing::warn!(chunk = chunk_index, size = chunk.len(), ?err, "backend chunk failed");
            }
        }

        processed += chunk.len();
        progress
            .emit(
                ProgressEvent::new(
                    WorkflowState::DispatchingBatches,
                    format!("Sent batch {} of {chunk_count}", chunk_index + 1),
                )
                .with_fraction(processed as f64 / total as f64),
            )
            .await;
    }

    results
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;
    use crate::store::MemoryStore;

    #[derive(Default)]
    struct RecordingBackend {
        calls: Mutex<Vec<BackendRequest>>,
        fail_calls: Vec<usize>,
    }

    #[async_trait]
    impl AugmentBackend for RecordingBackend {
        async fn augment(&self, request: &BackendRequest) -> anyhow::Result<Vec<PageCountResult>> {
            let mut calls = self.calls.lock().await;
            let call_index = calls.len();
            calls.push(request.clone());
            if self.fail_calls.contains(&call_index) {
                anyhow::bail!("connection reset");
            }
            Ok(request
                .amazon_urls
                .iter()
                .map(|link| PageCountResult {
                    id: link.id,
                    page_count: link.id * 10,
                })
                .collect())
        }
    }

    fn active_record(id: u64) -> ArticleRecord {
        ArticleRecord {
            id,
            affiliate_url: format!("https://www.amazon.com/dp/{id}"),
            is_active: true,
            ..ArticleRecord::default()
        }
    }

    fn drain_fractions(
        rx: &mut tokio::sync::broadcast::Receiver<ProgressEvent>,
    ) -> Vec<f64> {
        let mut fractions = Vec::new();
        while let Ok(event) = rx.try_recv() {
            fractions.push(event.fraction);
        }
        fractions
    }

    #[tokio::test]
    async fn twenty_three_records_go_out_in_three_ordered_chunks() {
        let records = (1..=23).map(active_record).collect::<Vec<_>>();
        let backend = RecordingBackend::default();
        let progress = ProgressChannel::new(Arc::new(MemoryStore::default()));
        let mut rx = progress.subscribe();

        let results = dispatch_batches(&records, 10, 1234, &backend, &progress).await;

        let calls = backend.calls.lock().await;
        let sizes = calls.iter().map(|c| c.amazon_urls.len()).collect::<Vec<_>>();
        assert_eq!(sizes, vec![10, 10, 3]);
        assert!(calls.iter().all(|c| c.current_timestamp == 1234));
        let sent_ids = calls
            .iter()
            .flat_map(|c| c.amazon_urls.iter().map(|l| l.id))
            .collect::<Vec<_>>();
        assert_eq!(sent_ids, (1..=23).collect::<Vec<_>>());

        assert_eq!(
            drain_fractions(&mut rx),
            vec![10.0 / 23.0, 20.0 / 23.0, 23.0 / 23.0]
        );
        assert_eq!(results.len(), 23);
    }

    #[tokio::test]
    async fn only_active_records_with_links_are_eligible() {
        let mut records = (1..=4).map(active_record).collect::<Vec<_>>();
        records[1].is_active = false;
        records[2].affiliate_url.clear();

        let backend = RecordingBackend::default();
        let progress = ProgressChannel::new(Arc::new(MemoryStore::default()));
        let results = dispatch_batches(&records, 10, 0, &backend, &progress).await;

        let ids = results.iter().map(|r| r.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 4]);
    }

    #[tokio::test]
    async fn failed_chunk_is_skipped_and_loop_continues() {
        let records = (1..=25).map(active_record).collect::<Vec<_>>();
        let backend = RecordingBackend {
            fail_calls: vec![1],
            ..RecordingBackend::default()
        };
        let progress = ProgressChannel::new(Arc::new(MemoryStore::default()));
        let mut rx = progress.subscribe();

        let results = dispatch_batches(&records, 10, 0, &backend, &progress).await;

        assert_eq!(backend.calls.lock().await.len(), 3);
        let ids = results.iter().map(|r| r.id).collect::<Vec<_>>();
        let expected = (1..=10).chain(21..=25).collect::<Vec<_>>();
        assert_eq!(ids, expected);
        assert_eq!(
            drain_fractions(&mut rx),
            vec![10.0 / 25.0, 20.0 / 25.0, 1.0]
        );
    }

    #[tokio::test]
    async fn nothing_eligible_means_no_calls() {
        let records = vec![ArticleRecord {
            id: 1,
            ..ArticleRecord::default()
        }];
        let backend = RecordingBackend::default();
        let progress = ProgressChannel::new(Arc::new(MemoryStore::default()));
        let mut rx = progress.subscribe();

        let results = dispatch_batches(&records, 10, 0, &backend, &progress).await;

        assert!(results.is_empty());
        assert!(backend.calls.lock().await.is_empty());
        assert!(drain_fractions(&mut rx).is_empty());
    }

    #[test]
    fn endpoint_trims_trailing_slash() {
        assert_eq!(
            scrape_endpoint("http://localhost:3000/"),
            "http://localhost:3000/api/scrape"
        );
    }
}
