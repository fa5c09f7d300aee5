use anyhow::Context as _;

/// Used when `RUST_LOG` is unset. Request traces from the app's
/// `TraceLayer` are emitted at debug level.
const DEFAULT_FILTER: &str = "info,tower_http=debug";

/// Logs go to stderr so `status`/`watch` output on stdout stays clean.
pub fn init() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_FILTER))
        .context("build log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}
