mod cli;
mod output;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};
use fhircohort_pipeline::Pipeline;
use fhircohort_pipeline::config::loader::load_config;
use fhircohort_pipeline::observability;
use output::print_error;

#[tokio::main]
async fn main() {
    // A missing .env is fine; anything else is worth a warning.
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = load_config(cli.config.as_deref())
        .map_err(anyhow::Error::msg)
        .context("Configuration error")?;
    if let Some(level) = &cli.log_level {
        cfg.logging.level = level.clone();
        cfg.validate().map_err(anyhow::Error::msg)?;
    }
    observability::init_tracing(&cfg.logging.level);
    tracing::info!(base_url = %cfg.server.base_url, "Configuration loaded");

    let pipeline = Pipeline::new(cfg);
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Cohort => {
            let mut metadata = pipeline.open_metadata()?;
            let report = pipeline
                .cohort(&mut metadata)
                .await
                .context("Cohort extraction failed")?;
            output::print_cohort(&report);
        }
        Commands::Extract(args) => {
            let mut metadata = pipeline.open_metadata()?;
            let summaries = pipeline
                .extract(&args.kinds(), &mut metadata)
                .await
                .context("Resource extraction failed")?;
            output::print_fetch_summaries(&summaries);
            output::print_success(&format!(
                "Results written under {}",
                pipeline.config().output.root.display()
            ));
        }
        Commands::Analyze => {
            let mut metadata = pipeline.open_metadata()?;
            let report = pipeline
                .analyze(&mut metadata)
                .await
                .context("Analysis failed")?;
            output::print_analysis(&report);
            output::print_success(&format!(
                "Metadata written to {}",
                metadata.path().display()
            ));
        }
        Commands::Run => {
            let report = pipeline.run_all().await.context("Pipeline failed")?;
            output::print_cohort(&report.cohort);
            output::print_fetch_summaries(&report.fetches);
            output::print_analysis(&report.analysis);
            output::print_success("Pipeline finished");
        }
        Commands::Config => {
            let shown = toml::to_string_pretty(&pipeline.config().redacted())
                .context("Cannot render configuration")?;
            println!("{shown}");
        }
    }

    Ok(())
}
