use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    catalogscout::logging::init().context("init logging")?;

    let cli = catalogscout::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        catalogscout::cli::Command::ScrapeCatalog(args) => {
            catalogscout::commands::scrape_catalog(args)
                .await
                .context("scrape-catalog")?;
        }
        catalogscout::cli::Command::ReconcileReport(args) => {
            catalogscout::commands::reconcile_report(args)
                .await
                .context("reconcile-report")?;
        }
        catalogscout::cli::Command::Watch(args) => {
            catalogscout::commands::watch(args).await.context("watch")?;
        }
        catalogscout::cli::Command::Status(args) => {
            catalogscout::commands::status(args).await.context("status")?;
        }
        catalogscout::cli::Command::Layout {
            command: catalogscout::cli::LayoutCommand::Init(args),
        } => {
            catalogscout::layout::init(args).context("layout init")?;
        }
    }

    Ok(())
}
