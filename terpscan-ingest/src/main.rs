//! terpscan - dispensary menu scanner
//!
//! Reads a menu photo, screenshot, saved page or URL, resolves a terpene
//! profile for every flower strain on it, and ranks them against the
//! strains you already like.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use terpscan_common::config::load_config;
use terpscan_ingest::config::resolve_openai_api_key;
use terpscan_ingest::{MenuSource, PipelineOrchestrator, PipelineStatus, ResultMenu};

/// Command-line arguments for terpscan
#[derive(Parser, Debug)]
#[command(name = "terpscan")]
#[command(about = "Rank the strains on a dispensary menu by terpene profile")]
#[command(version)]
struct Args {
    /// Menu image, saved HTML page, or http(s) URL
    input: String,

    /// A strain you like (repeatable); builds the preference profile
    #[arg(short, long = "like", value_name = "NAME")]
    like: Vec<String>,

    /// Config file (overrides TERPSCAN_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Number of ranked strains to print
    #[arg(short, long, default_value = "10")]
    top: usize,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing (RUST_LOG overrides the configured level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting terpscan {}", env!("CARGO_PKG_VERSION"));

    let api_key = resolve_openai_api_key(&config)?;
    let orchestrator = PipelineOrchestrator::from_config(&config, &api_key)
        .context("Failed to initialize pipeline")?;

    let ideal = if args.like.is_empty() {
        None
    } else {
        let profile = orchestrator.build_profile(&args.like).await;
        if !profile.has_profile() {
            warn!("None of the liked strains resolved to terpene data; results will not be ranked");
        }
        Some(*profile.ideal())
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let events = orchestrator.run(MenuSource::from_input(&args.input), ideal, cancel.clone());
    futures::pin_mut!(events);

    let mut menu = None;
    while let Some(status) = events.next().await {
        match status {
            PipelineStatus::Complete { menu: result } => menu = Some(result),
            PipelineStatus::Error {
                message,
                user_message,
                ..
            } => {
                eprintln!("{}", user_message);
                anyhow::bail!("Pipeline failed: {}", message);
            }
            progress => print_progress(&progress),
        }
    }

    let Some(menu) = menu else {
        if cancel.is_cancelled() {
            eprintln!("Cancelled.");
            return Ok(());
        }
        anyhow::bail!("Pipeline ended without a result");
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&menu)?);
    } else {
        print_menu(&menu, args.top);
    }
    Ok(())
}

/// Cancel the run on Ctrl+C
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        return;
    }
    info!("Received Ctrl+C, cancelling");
    cancel.cancel();
}

fn print_progress(status: &PipelineStatus) {
    match status {
        PipelineStatus::Fetching { source, .. } => eprintln!("Fetching {}", source),
        PipelineStatus::FetchComplete { size } => eprintln!("Fetched {} bytes", size),
        PipelineStatus::ProductsFound {
            total,
            flower_count,
        } => eprintln!("Found {} products ({} flower)", total, flower_count),
        PipelineStatus::ResolvingTerpenes { current, total } => {
            eprintln!("Resolving terpenes {}/{}", current, total)
        }
        PipelineStatus::Complete { .. } | PipelineStatus::Error { .. } => {}
    }
}

fn print_menu(menu: &ResultMenu, top: usize) {
    match &menu.ranked {
        Some(ranked) => {
            println!(
                "{:<4} {:<28} {:>6}  {:<16} {}",
                "#", "Strain", "Score", "Match", "Dominant terpenes"
            );
            for (i, result) in ranked.iter().take(top).enumerate() {
                println!(
                    "{:<4} {:<28} {:>5.1}%  {:<16} {}",
                    i + 1,
                    truncate(&result.strain.name, 28),
                    result.overall * 100.0,
                    result.match_rating.label(),
                    dominant(&result.strain)
                );
            }
        }
        None => {
            println!("{:<28} {:<8} {:<18} {}", "Strain", "Type", "Source", "Dominant terpenes");
            for strain in &menu.strains {
                println!(
                    "{:<28} {:<8} {:<18} {}",
                    truncate(&strain.name, 28),
                    strain.strain_type.label(),
                    format!("{:?}", strain.terpene_source),
                    dominant(strain)
                );
            }
        }
    }
}

fn dominant(strain: &terpscan_ingest::Strain) -> String {
    let top = strain.terpenes.dominant(3);
    if top.is_empty() {
        return "-".to_string();
    }
    top.iter()
        .map(|(terpene, value)| format!("{} {:.2}", terpene, value))
        .collect::<Vec<_>>()
        .join(", ")
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
