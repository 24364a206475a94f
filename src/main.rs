use anyhow::{Context, Result, bail};
use clap::Parser;
use git2base::analyzer::{AnalysisPipeline, register_builtin_analyzers};
use git2base::cli::Cli;
use git2base::config::Config;
use git2base::error::Git2BaseError;
use git2base::importer::{Importer, reset_store};
use git2base::sink::BatchSink;
use git2base::types::RunSummary;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .init();

    register_builtin_analyzers();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            match err.downcast_ref::<Git2BaseError>() {
                Some(e) => ExitCode::from(e.exit_code()),
                None => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    if cli.list_analyzers || cli.verify_analyzers {
        return analyzers(&cli, &config);
    }

    if cli.stats {
        let sink = BatchSink::open(&config.output).context("Failed to open backend")?;
        let stats = sink.stats().context("Failed to read backend statistics")?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&stats)?);
        } else {
            println!("Backend:     {}", sink.backend_name());
            println!("Commits:     {}", stats.commits);
            println!("Files:       {}", stats.files);
            println!("Diff files:  {}", stats.diff_files);
            println!("Analyses:    {}", stats.analyses);
            println!("Snapshots:   {}", stats.snapshots);
            println!("Watermarks:  {}", stats.watermarks);
        }
        return Ok(());
    }

    let request = cli.request();
    if request.mode.is_none() {
        let output = config.output.clone();
        let summary = tokio::task::spawn_blocking(move || {
            let mut sink = BatchSink::open(&output)?;
            reset_store(&mut sink)
        })
        .await
        .context("Reset task panicked")??;
        return print_summary(&cli, &summary);
    }

    let importer = Importer::new(config.clone(), &cli.repo, !cli.no_analysis)
        .with_context(|| format!("Failed to prepare import of {}", cli.repo.display()))?;

    let cancel = importer.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current batch");
            cancel.cancel();
        }
    });

    let output = config.output.clone();
    let summary = tokio::task::spawn_blocking(move || {
        let mut sink = BatchSink::open(&output)?;
        importer.run(&request, &mut sink)
    })
    .await
    .context("Extraction task panicked")??;

    print_summary(&cli, &summary)
}

fn print_summary(cli: &Cli, summary: &RunSummary) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(summary)?);
    } else {
        println!("{}", summary);
    }
    Ok(())
}

fn analyzers(cli: &Cli, config: &Config) -> Result<()> {
    let pipeline =
        AnalysisPipeline::from_config(&config.analyzers).context("Failed to build analyzers")?;

    if cli.list_analyzers {
        for info in pipeline.describe() {
            println!(
                "{} ({}) [{}]: {}",
                info.name,
                info.kind,
                info.tech_stacks.join(", "),
                info.description
            );
        }
    }

    if cli.verify_analyzers {
        match pipeline.verify() {
            Ok(cases) => println!(
                "All {} test cases passed across {} analyzers",
                cases,
                pipeline.len()
            ),
            Err(e) => bail!("Analyzer verification failed: {}", e),
        }
    }

    Ok(())
}
