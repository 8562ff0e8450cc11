use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use dotenv::dotenv;
use listing_scraper::{
    CsvJob,
    cli::Args,
    config::{LoadFromEnv, RuntimeEnv, Settings},
};
use log::{LevelFilter, error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        })
        .parse_default_env()
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let runtime = RuntimeEnv::load_from_env()?;
    let environment = args
        .env
        .clone()
        .unwrap_or_else(|| runtime.environment().to_string());
    let mut settings = Settings::load(&args.config_dir, &environment)
        .with_context(|| format!("failed to load settings from {}", args.config_dir.display()))?;
    if let Some(output) = &args.output {
        settings.filename = output.display().to_string();
    }

    let job = CsvJob::new(settings, args.job_options(), runtime);
    let report = job.create().await?;
    for area in &report.areas {
        info!("  {}: {}", area.area, area.rows);
    }
    info!("done, {} rows in {}", report.rows_written, job.output_path().display());
    Ok(())
}
