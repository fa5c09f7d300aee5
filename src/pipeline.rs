use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::dispatch::{AugmentBackend, DEFAULT_CHUNK_SIZE, dispatch_batches};
use crate::enrich::Enricher;
use crate::error::PipelineError;
use crate::extract::{extract_records, extract_report_row};
use crate::formats::{ArticleRecord, SecondaryTableRow};
use crate::layout::Layout;
use crate::progress::{ColorHint, ProgressChannel, ProgressEvent};
use crate::reconcile::{merge_activity, merge_page_counts};
use crate::source::{ContentReader as _, PageControls as _, PageSession, TableRow};
use crate::store::{KeyValueStore, load_records, save_records};
use crate::wait::poll_until;
use crate::webhook::WebhookSinks;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Idle,
    ScrapingCatalog,
    EnrichingRecords,
    AwaitingSecondTrigger,
    ScrapingSecondaryTable,
    ReconcilingActivity,
    DispatchingBatches,
    MergingResults,
    DispatchingWebhooks,
    Done,
    Error,
}

impl WorkflowState {
    /// States a run ends in. The catalog run ends waiting for the report
    /// trigger.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::AwaitingSecondTrigger | Self::Done | Self::Error
        )
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Catalog pages captured per scan.
    pub max_pages: usize,
    /// Pause after each page-changing control so the table can re-render.
    pub settle_delay: Duration,
    pub chunk_size: usize,
    pub poll_interval: Duration,
    /// `None` waits for the report table until cancelled.
    pub report_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_pages: 2,
            settle_delay: Duration::from_secs(2),
            chunk_size: DEFAULT_CHUNK_SIZE,
            poll_interval: Duration::from_secs(1),
            report_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Drives both workflows: the catalog scan (trigger A) and the report
/// reconciliation (trigger B). One run at a time; every stage awaits the
/// previous one.
pub struct Orchestrator {
    session: Arc<dyn PageSession>,
    backend: Arc<dyn AugmentBackend>,
    store: Arc<dyn KeyValueStore>,
    webhooks: WebhookSinks,
    progress: ProgressChannel,
    layout: Layout,
    config: PipelineConfig,
    cancel: CancellationToken,
    state: WorkflowState,
}

impl Orchestrator {
    pub fn new(
        session: Arc<dyn PageSession>,
        backend: Arc<dyn AugmentBackend>,
        store: Arc<dyn KeyValueStore>,
        layout: Layout,
        config: PipelineConfig,
    ) -> Self {
        let progress = ProgressChannel::new(Arc::clone(&store));
        Self {
            session,
            backend,
            store,
            webhooks: WebhookSinks::disabled(),
            progress,
            layout,
            config,
            cancel: CancellationToken::new(),
            state: WorkflowState::Idle,
        }
    }

    pub fn with_webhooks(mut self, webhooks: WebhookSinks) -> Self {
        self.webhooks = webhooks;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn progress(&self) -> &ProgressChannel {
        &self.progress
    }

    /// Trigger A: capture the catalog table, enrich every record and replace
    /// the persisted record set.
    pub async fn scrape_catalog(&mut self, catalog_url: &str) -> anyhow::Result<Vec<ArticleRecord>> {
        let result = self.try_scrape_catalog(catalog_url).await;
        match result {
            Ok(records) => Ok(records),
            Err(err) => Err(self.fail(err).await),
        }
    }

    /// Trigger B: scan the ad-creative report, reconcile it with the
    /// persisted records, augment through the backend and notify webhooks.
    pub async fn reconcile_report(&mut self, report_url: &str) -> anyhow::Result<Vec<ArticleRecord>> {
        let result = self.try_reconcile_report(report_url).await;
        match result {
            Ok(records) => Ok(records),
            Err(err) => Err(self.fail(err).await),
        }
    }

    async fn try_scrape_catalog(&mut self, catalog_url: &str) -> anyhow::Result<Vec<ArticleRecord>> {
        let catalog = self.layout.catalog.clone();

        self.transition(WorkflowState::ScrapingCatalog, "Scraping catalog table")
            .await;
        self.session
            .open(catalog_url)
            .await
            .context("open catalog page")?;

        let maximized = self
            .session
            .maximize_page_size(&catalog.page_size_control)
            .await
            .context("set page size")?;
        if !maximized {
            return Err(PipelineError::precondition(
                "Page size control not found on the catalog page",
            )
            .into());
        }
        self.settle().await;

        let mut rows = self.read_table(&catalog.table).await?;
        for page in 2..=self.config.max_pages.max(1) {
            let advanced = self
                .session
                .next_page(&catalog.next_page_control)
                .await
                .context("advance pagination")?;
            if !advanced {
                tracing::debug!(page, "no further catalog page");
                break;
            }
            self.settle().await;
            rows.extend(self.read_table(&catalog.table).await?);
        }

        let mut records = extract_records(&rows, &catalog);
        tracing::info!(records = records.len(), "catalog captured");

        self.transition(
            WorkflowState::EnrichingRecords,
            format!("Scraping {} articles", records.len()),
        )
        .await;
        let enricher = Enricher::new(self.layout.detail.clone());
        enricher
            .enrich_all(self.session.as_ref(), &mut records, &self.progress)
            .await;

        save_records(self.store.as_ref(), &records).await?;

        self.state = WorkflowState::AwaitingSecondTrigger;
        self.progress
            .emit_with_data(
                ProgressEvent::new(
                    WorkflowState::AwaitingSecondTrigger,
                    format!("Scraped {} articles", records.len()),
                )
                .with_color(ColorHint::Success)
                .with_fraction(1.0),
                Some(serde_json::json!({ "records": records.len() })),
            )
            .await;

        Ok(records)
    }

    async fn try_reconcile_report(&mut self, report_url: &str) -> anyhow::Result<Vec<ArticleRecord>> {
        let report = self.layout.report.clone();

        self.session
            .open(report_url)
            .await
            .context("open report page")?;
        let anchor_present = self
            .session
            .has_element(&report.anchor)
            .await
            .context("look up report anchor")?;
        if !anchor_present {
            return Err(PipelineError::precondition(
                "Ad-creative report link not found; open the report page first",
            )
            .into());
        }
        let Some(mut records) = load_records(self.store.as_ref()).await? else {
            return Err(PipelineError::precondition(
                "No catalog records yet; scrape the catalog first",
            )
            .into());
        };

        self.transition(
            WorkflowState::ScrapingSecondaryTable,
            "Generating ad-creative report",
        )
        .await;
        let exported = self
            .session
            .activate(&report.export_control)
            .await
            .context("trigger report export")?;
        if !exported {
            return Err(PipelineError::precondition("Report export control not found").into());
        }

        let table_rows = self.wait_for_report(&report.table).await?;
        let report_rows = table_rows
            .iter()
            .map(|row| extract_report_row(row, &report.columns))
            .collect::<Vec<SecondaryTableRow>>();
        tracing::info!(rows = report_rows.len(), "report captured");

        self.transition(
            WorkflowState::ReconcilingActivity,
            format!("Matching {} report rows", report_rows.len()),
        )
        .await;
        merge_activity(&mut records, &report_rows);

        self.transition(WorkflowState::DispatchingBatches, "Sending articles to backend")
            .await;
        let timestamp = chrono::Utc::now().timestamp_millis();
        let results = dispatch_batches(
            &records,
            self.config.chunk_size,
            timestamp,
            self.backend.as_ref(),
            &self.progress,
        )
        .await;

        self.transition(WorkflowState::MergingResults, "Merging backend results")
            .await;
        merge_page_counts(&mut records, &results);
        save_records(self.store.as_ref(), &records).await?;

        self.transition(WorkflowState::DispatchingWebhooks, "Sending webhooks")
            .await;
        self.webhooks.send_records(&records).await;
        self.webhooks.send_report(&report_rows).await;

        let active = records.iter().filter(|r| r.is_active).count();
        self.state = WorkflowState::Done;
        self.progress
            .emit_with_data(
                ProgressEvent::new(
                    WorkflowState::Done,
                    format!("Done: {active} of {} articles active", records.len()),
                )
                .with_color(ColorHint::Success)
                .with_fraction(1.0),
                Some(serde_json::json!({
                    "records": records.len(),
                    "active": active,
                    "augmented": results.len(),
                })),
            )
            .await;

        Ok(records)
    }

    async fn wait_for_report(&self, locator: &str) -> anyhow::Result<Vec<TableRow>> {
        let session = Arc::clone(&self.session);
        let rows = poll_until(
            self.config.poll_interval,
            self.config.report_timeout,
            &self.cancel,
            || {
                let session = Arc::clone(&session);
                let locator = locator.to_owned();
                async move {
                    session.reload().await?;
                    session.read_rows(&locator).await
                }
            },
        )
        .await
        .map_err(PipelineError::from)?;
        Ok(rows)
    }

    async fn read_table(&self, locator: &str) -> anyhow::Result<Vec<TableRow>> {
        let rows = self
            .session
            .read_rows(locator)
            .await
            .with_context(|| format!("read table {locator}"))?;
        Ok(rows.unwrap_or_else(|| {
            tracing::warn!(locator, "table not found on page");
            Vec::new()
        }))
    }

    async fn settle(&self) {
        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }
    }

    async fn transition(&mut self, state: WorkflowState, message: impl Into<String>) {
        tracing::info!(from = ?self.state, to = ?state, "workflow transition");
        self.state = state;
        self.progress.emit(ProgressEvent::new(state, message)).await;
    }

    async fn fail(&mut self, err: anyhow::Error) -> anyhow::Error {
        tracing::error!(state = ?self.state, ?err, "workflow failed");
        self.state = WorkflowState::Error;
        let message = match err.downcast_ref::<PipelineError>() {
            Some(pipeline_err) => pipeline_err.to_string(),
            None => format!("{err:#}"),
        };
        self.progress
            .emit(ProgressEvent::new(WorkflowState::Error, message).with_color(ColorHint::Error))
            .await;
        err
    }
}
