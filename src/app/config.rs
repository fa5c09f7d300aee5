use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;

use crate::pipeline::PipelineConfig;

/// Endpoints and tuning for the HTTP app, read from `CATALOGSCOUT_*`
/// variables. Unset URLs can still be supplied per request.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub catalog_url: Option<String>,
    pub report_url: Option<String>,
    pub backend_url: Option<String>,
    pub records_webhook_url: Option<String>,
    pub report_webhook_url: Option<String>,
    pub layout_path: Option<PathBuf>,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut pipeline = PipelineConfig::default();
        if let Some(raw) = var("CATALOGSCOUT_MAX_PAGES") {
            pipeline.max_pages = raw
                .parse()
                .with_context(|| format!("invalid CATALOGSCOUT_MAX_PAGES={raw:?}"))?;
        }
        if let Some(raw) = var("CATALOGSCOUT_CHUNK_SIZE") {
            pipeline.chunk_size = raw
                .parse()
                .with_context(|| format!("invalid CATALOGSCOUT_CHUNK_SIZE={raw:?}"))?;
        }
        if let Some(raw) = var("CATALOGSCOUT_REPORT_TIMEOUT_SECS") {
            let secs: u64 = raw
                .parse()
                .with_context(|| format!("invalid CATALOGSCOUT_REPORT_TIMEOUT_SECS={raw:?}"))?;
            pipeline.report_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(Self {
            catalog_url: var("CATALOGSCOUT_CATALOG_URL"),
            report_url: var("CATALOGSCOUT_REPORT_URL"),
            backend_url: var("CATALOGSCOUT_BACKEND_URL"),
            records_webhook_url: var("CATALOGSCOUT_RECORDS_WEBHOOK_URL"),
            report_webhook_url: var("CATALOGSCOUT_REPORT_WEBHOOK_URL"),
            layout_path: var("CATALOGSCOUT_LAYOUT").map(PathBuf::from),
            pipeline,
        })
    }
}
