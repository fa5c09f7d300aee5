use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use tokio::sync::broadcast;

use crate::cli::{ReconcileReportArgs, ScrapeCatalogArgs, StatusArgs, WatchArgs};
use crate::dispatch::{HttpAugmentBackend, UnconfiguredBackend};
use crate::layout;
use crate::pipeline::{Orchestrator, PipelineConfig};
use crate::portal::HttpPortal;
use crate::progress::{ProgressEvent, StatusObserver, StatusSlot};
use crate::store::{KeyValueStore, LocalFsStore, STATUS_KEY, get_json};
use crate::webhook::WebhookSinks;

pub async fn scrape_catalog(args: ScrapeCatalogArgs) -> anyhow::Result<()> {
    let layout = layout::load(args.layout.as_deref().map(Path::new))?;
    let store: Arc<dyn KeyValueStore> = Arc::new(LocalFsStore::new(&args.store));
    let portal = Arc::new(HttpPortal::new()?);
    let config = PipelineConfig {
        max_pages: args.max_pages,
        settle_delay: Duration::from_millis(args.settle_ms),
        ..PipelineConfig::default()
    };

    let backend = Arc::new(UnconfiguredBackend);
    let mut orchestrator = Orchestrator::new(portal, backend, store, layout, config);
    let relay = tokio::spawn(log_progress(orchestrator.progress().subscribe()));
    let result = orchestrator.scrape_catalog(&args.catalog_url).await;
    drop(orchestrator);
    let _ = relay.await;

    let records = result?;
    tracing::info!(
        records = records.len(),
        store = %args.store,
        "catalog captured; run reconcile-report next"
    );
    Ok(())
}

pub async fn reconcile_report(args: ReconcileReportArgs) -> anyhow::Result<()> {
    let layout = layout::load(args.layout.as_deref().map(Path::new))?;
    let store: Arc<dyn KeyValueStore> = Arc::new(LocalFsStore::new(&args.store));
    let portal = Arc::new(HttpPortal::new()?);
    let backend = Arc::new(HttpAugmentBackend::new(&args.backend_url)?);
    let config = PipelineConfig {
        chunk_size: args.chunk_size,
        poll_interval: Duration::from_millis(args.poll_ms),
        report_timeout: (args.timeout_secs > 0).then(|| Duration::from_secs(args.timeout_secs)),
        ..PipelineConfig::default()
    };

    let cancel = tokio_util::sync::CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling");
            ctrl_c.cancel();
        }
    });

    let mut orchestrator = Orchestrator::new(portal, backend, store, layout, config)
        .with_webhooks(WebhookSinks::new(args.records_webhook, args.report_webhook))
        .with_cancel(cancel);
    let relay = tokio::spawn(log_progress(orchestrator.progress().subscribe()));
    let result = orchestrator.reconcile_report(&args.report_url).await;
    drop(orchestrator);
    let _ = relay.await;

    let records = result?;
    let active = records.iter().filter(|record| record.is_active).count();
    tracing::info!(records = records.len(), active, "report reconciled");
    Ok(())
}

pub async fn watch(args: WatchArgs) -> anyhow::Result<()> {
    let store: Arc<dyn KeyValueStore> = Arc::new(LocalFsStore::new(&args.store));
    let mut observer = StatusObserver::new(store)
        .with_poll_interval(Duration::from_millis(args.poll_ms.max(1)))
        .with_max_terminal_repeats(args.max_terminal_repeats);
    observer
        .watch(|slot| println!("{}", render_status(slot)))
        .await
}

pub async fn status(args: StatusArgs) -> anyhow::Result<()> {
    let store = LocalFsStore::new(&args.store);
    let slot: Option<StatusSlot> = get_json(&store, STATUS_KEY).await?;
    match slot {
        Some(slot) => {
            let json = serde_json::to_string_pretty(&slot).context("serialize status")?;
            println!("{json}");
        }
        None => println!("idle"),
    }
    Ok(())
}

fn render_status(slot: &StatusSlot) -> String {
    let stage = serde_json::to_value(slot.kind)
        .ok()
        .and_then(|value| value.as_str().map(str::to_owned))
        .unwrap_or_default();
    format!("[{stage}] {:>3.0}% {}", slot.value * 100.0, slot.text)
}

async fn log_progress(mut rx: broadcast::Receiver<ProgressEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => tracing::info!(
                stage = ?event.stage,
                percent = (event.fraction * 100.0).round(),
                "{}",
                event.message
            ),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress relay lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
