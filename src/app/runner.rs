use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;

use crate::app::config::AppConfig;
use crate::dispatch::{AugmentBackend, HttpAugmentBackend, UnconfiguredBackend};
use crate::layout::Layout;
use crate::pipeline::Orchestrator;
use crate::source::PageSession;
use crate::store::KeyValueStore;
use crate::webhook::WebhookSinks;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowKind {
    Catalog,
    Report,
}

/// Builds an orchestrator per trigger and runs it in the background. Errors
/// end up in the status slot; the runner only logs them.
pub struct WorkflowRunner {
    session: Arc<dyn PageSession>,
    backend: Option<Arc<dyn AugmentBackend>>,
    store: Arc<dyn KeyValueStore>,
    layout: Layout,
    config: AppConfig,
    cancel: CancellationToken,
}

impl WorkflowRunner {
    pub fn new(
        session: Arc<dyn PageSession>,
        store: Arc<dyn KeyValueStore>,
        layout: Layout,
        config: AppConfig,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let backend = match config.backend_url.as_deref() {
            Some(url) => Some(Arc::new(
                HttpAugmentBackend::new(url).context("build augmentation backend")?,
            ) as Arc<dyn AugmentBackend>),
            None => None,
        };
        Ok(Self {
            session,
            backend,
            store,
            layout,
            config,
            cancel,
        })
    }

    /// Picks the request URL, falling back to the configured one.
    pub fn target_url(&self, kind: WorkflowKind, requested: Option<String>) -> Option<String> {
        let configured = match kind {
            WorkflowKind::Catalog => &self.config.catalog_url,
            WorkflowKind::Report => &self.config.report_url,
        };
        requested
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .or_else(|| configured.clone())
    }

    /// Checks everything the run needs before the caller reports it started.
    pub fn orchestrator(&self, kind: WorkflowKind) -> anyhow::Result<Orchestrator> {
        let backend: Arc<dyn AugmentBackend> = match (kind, &self.backend) {
            (_, Some(backend)) => Arc::clone(backend),
            (WorkflowKind::Report, None) => {
                anyhow::bail!("CATALOGSCOUT_BACKEND_URL is required for the report workflow")
            }
            (WorkflowKind::Catalog, None) => Arc::new(UnconfiguredBackend),
        };
        let webhooks = WebhookSinks::new(
            self.config.records_webhook_url.clone(),
            self.config.report_webhook_url.clone(),
        );
        Ok(Orchestrator::new(
            Arc::clone(&self.session),
            backend,
            Arc::clone(&self.store),
            self.layout.clone(),
            self.config.pipeline.clone(),
        )
        .with_webhooks(webhooks)
        .with_cancel(self.cancel.child_token()))
    }

    /// Runs to completion holding `permit`, so the gate stays closed until
    /// the workflow ends.
    pub async fn run(
        mut orchestrator: Orchestrator,
        kind: WorkflowKind,
        url: String,
        permit: OwnedSemaphorePermit,
    ) {
        let _permit = permit;
        let result = match kind {
            WorkflowKind::Catalog => orchestrator.scrape_catalog(&url).await,
            WorkflowKind::Report => orchestrator.reconcile_report(&url).await,
        };
        match result {
            Ok(records) => {
                tracing::info!(
                    ?kind,
                    records = records.len(),
                    state = ?orchestrator.state(),
                    "workflow finished"
                );
            }
            Err(err) => tracing::error!(?kind, ?err, "workflow failed"),
        }
    }
}
