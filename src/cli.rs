use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Capture and enrich the article catalog, then wait for the report.
    ScrapeCatalog(ScrapeCatalogArgs),
    /// Reconcile the ad-creative report with the captured catalog.
    ReconcileReport(ReconcileReportArgs),
    /// Follow the status slot until a finished run goes quiet.
    Watch(WatchArgs),
    /// Print the current status slot.
    Status(StatusArgs),
    Layout {
        #[command(subcommand)]
        command: LayoutCommand,
    },
}

#[derive(Debug, Args)]
pub struct ScrapeCatalogArgs {
    /// Catalog listing URL (must be http/https).
    #[arg(long)]
    pub catalog_url: String,

    /// Directory holding the `records` and `data` slots.
    #[arg(long, default_value = "catalogscout-store")]
    pub store: String,

    /// Layout YAML (created by `layout init`); defaults apply when omitted.
    #[arg(long)]
    pub layout: Option<String>,

    /// Catalog pages to capture.
    #[arg(long, default_value_t = 2)]
    pub max_pages: usize,

    /// Pause after changing the page size or page.
    #[arg(long, default_value_t = 2000)]
    pub settle_ms: u64,
}

#[derive(Debug, Args)]
pub struct ReconcileReportArgs {
    /// Ad-creative report URL (must be http/https).
    #[arg(long)]
    pub report_url: String,

    /// Base URL of the augmentation backend (`POST {base}/api/scrape`).
    #[arg(long)]
    pub backend_url: String,

    /// Receives the final record set.
    #[arg(long)]
    pub records_webhook: Option<String>,

    /// Receives the scanned report rows.
    #[arg(long)]
    pub report_webhook: Option<String>,

    #[arg(long, default_value = "catalogscout-store")]
    pub store: String,

    #[arg(long)]
    pub layout: Option<String>,

    /// Affiliate links per backend request.
    #[arg(long, default_value_t = 10)]
    pub chunk_size: usize,

    /// Interval between report table checks.
    #[arg(long, default_value_t = 1000)]
    pub poll_ms: u64,

    /// Give up on the report table after this long (0 waits forever).
    #[arg(long, default_value_t = 600)]
    pub timeout_secs: u64,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[arg(long, default_value = "catalogscout-store")]
    pub store: String,

    #[arg(long, default_value_t = 300)]
    pub poll_ms: u64,

    /// Identical terminal reads tolerated before stopping.
    #[arg(long, default_value_t = 5)]
    pub max_terminal_repeats: u32,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[arg(long, default_value = "catalogscout-store")]
    pub store: String,
}

#[derive(Debug, Subcommand)]
pub enum LayoutCommand {
    Init(LayoutInitArgs),
}

#[derive(Debug, Args)]
pub struct LayoutInitArgs {
    /// Output file path for the layout YAML.
    #[arg(long)]
    pub out: String,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}
