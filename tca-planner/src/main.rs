//! tca-planner - Trailer campaign planner
//!
//! Collects signals for a trailer, ranks the target regions and writes a
//! phased rollout plan with its evidence ledger to the output directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Days, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tca_common::config::TomlConfig;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tca_planner::collectors::SignalFixture;
use tca_planner::config::PolicyConfig;
use tca_planner::models::{CampaignRecord, PartialCampaign, RunOutcome};
use tca_planner::progress::LogProgress;
use tca_planner::{storage, CampaignPipeline, CampaignRequest};

/// Command-line arguments for tca-planner
#[derive(Parser, Debug)]
#[command(name = "tca-planner")]
#[command(about = "Trailer campaign signal aggregation and rollout planning")]
#[command(version)]
struct Args {
    /// Configuration file (falls back to TCA_CONFIG, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline and save the campaign
    Generate(GenerateArgs),
    /// Print a saved campaign
    Show {
        /// Campaign JSON written by `generate`
        file: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct GenerateArgs {
    /// Trailer reference (URL or id)
    #[arg(long, default_value = "")]
    trailer: String,

    /// Movie reference (title or id)
    #[arg(long, default_value = "")]
    movie: String,

    /// Comma-separated region codes (defaults to the configured list)
    #[arg(long, value_delimiter = ',')]
    regions: Vec<String>,

    /// Total campaign budget
    #[arg(long, default_value = "0")]
    budget: f64,

    /// Release date (YYYY-MM-DD)
    #[arg(long)]
    release_date: Option<NaiveDate>,

    /// Campaign length in weeks
    #[arg(long)]
    weeks: Option<u32>,

    /// JSON file with canned source responses
    #[arg(long, conflicts_with = "demo")]
    fixture: Option<PathBuf>,

    /// Use the built-in demo data
    #[arg(long)]
    demo: bool,

    /// Output directory (defaults to the configured one)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Command::Generate(generate_args) => generate(&config, generate_args).await,
        Command::Show { file } => show(&file),
    }
}

async fn generate(config: &TomlConfig, args: GenerateArgs) -> Result<()> {
    let policy = PolicyConfig::from_table(&config.policy).context("Invalid [policy] section")?;
    let today = Utc::now().date_naive();

    let fixture = match (&args.fixture, args.demo) {
        (Some(path), _) => SignalFixture::load(path)
            .with_context(|| format!("Failed to load fixture {}", path.display()))?,
        (None, true) => SignalFixture::demo(today),
        (None, false) => bail!("No signal source configured: pass --fixture <FILE> or --demo"),
    };

    let release_date = match args.release_date {
        Some(date) => date,
        None if args.demo => today
            .checked_add_days(Days::new(u64::from(policy.duration_weeks) * 7))
            .context("Configured duration_weeks overflows the release date")?,
        None => bail!("--release-date is required"),
    };
    let regions = if args.regions.is_empty() {
        config.default_regions.clone()
    } else {
        args.regions
    };
    let movie = if args.movie.is_empty() && args.demo {
        "starfall-ascension".to_string()
    } else {
        args.movie
    };

    let mut request = CampaignRequest::new(args.trailer, movie, regions, args.budget, release_date);
    if let Some(weeks) = args.weeks {
        request = request.with_duration_weeks(weeks);
    }

    let pipeline = CampaignPipeline::new(policy, fixture.into_providers()?)?
        .with_reporter(Arc::new(LogProgress));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling run");
            on_interrupt.cancel();
        }
    });

    let output_dir = args.output.unwrap_or_else(|| config.output_dir.clone());
    match pipeline.run_with_cancel(request, cancel).await? {
        RunOutcome::Completed(record) => {
            let path = storage::save_campaign(&record, &output_dir)?;
            print_campaign(&record);
            info!("Campaign written to {}", path.display());
            Ok(())
        }
        RunOutcome::Failed(partial) => {
            let path = storage::save_partial(&partial, &output_dir)?;
            print_failure(&partial);
            bail!(
                "Run failed at {} stage (details in {})",
                partial.failed_stage,
                path.display()
            )
        }
    }
}

fn show(file: &Path) -> Result<()> {
    let record = storage::load_campaign(file)
        .with_context(|| format!("Failed to read campaign {}", file.display()))?;
    print_campaign(&record);
    Ok(())
}

fn print_campaign(record: &CampaignRecord) {
    let campaign = &record.campaign;
    println!(
        "{} | {} | {} to {}",
        campaign.movie.title,
        campaign.status.as_str(),
        campaign.input_echo.campaign_start,
        campaign.input_echo.release_date
    );

    println!("\nRegions:");
    for ranking in &campaign.region_rankings {
        println!(
            "  {:>2}. {} tier {} score {:>6.2} budget {:>5.1}%",
            ranking.rank, ranking.region_code, ranking.tier, ranking.total_score, ranking.budget_pct
        );
        println!("      {}", ranking.rationale);
        println!("      {}", ranking.recommendation);
    }

    println!("\nPhases:");
    for phase in &campaign.phases {
        let regions: Vec<&str> = phase.regions.iter().map(|r| r.as_str()).collect();
        println!(
            "  {}. {} ({} to {}, {}, {:.1}% = {:.2}): {}",
            phase.index,
            phase.name,
            phase.start_date,
            phase.end_date,
            phase.intensity,
            phase.budget_pct,
            phase.budget_amount,
            regions.join(", ")
        );
    }
    if !campaign.dropped_regions.is_empty() {
        let dropped: Vec<&str> = campaign.dropped_regions.iter().map(|r| r.as_str()).collect();
        println!("  dropped: {}", dropped.join(", "));
    }

    println!("\nMilestones:");
    for milestone in &campaign.milestones {
        println!("  {}  {}", milestone.date, milestone.label);
    }

    if !campaign.strategy.recommendations.is_empty() {
        println!("\nStrategy:");
        for line in &campaign.strategy.recommendations {
            println!("  {}", line);
        }
        for plan in &campaign.strategy.channels {
            let regions: Vec<&str> = plan.regions.iter().map(|r| r.as_str()).collect();
            println!(
                "  tier {} ({}, {} investment): {}",
                plan.tier,
                regions.join(", "),
                plan.investment_level,
                plan.channels.join(", ")
            );
        }
    }

    let insights = &campaign.insights;
    for (heading, lines) in [
        ("Key findings", &insights.key_findings),
        ("Recommendations", &insights.recommendations),
        ("Warnings", &insights.warnings),
    ] {
        if !lines.is_empty() {
            println!("\n{}:", heading);
            for line in lines {
                println!("  {}", line);
            }
        }
    }

    if !campaign.skipped_stages.is_empty() {
        println!("\nSkipped stages:");
        for skipped in &campaign.skipped_stages {
            println!("  {}: {}", skipped.stage, skipped.reason);
        }
    }

    let unsupported = record.evidence_ledger.unsupported_facts();
    println!(
        "\nEvidence: {} entries, {} facts, {} unsupported",
        record.evidence_ledger.entries.len(),
        record.evidence_ledger.facts.len(),
        unsupported.len()
    );
    for citation in record.evidence_ledger.citation_list().iter().take(5) {
        println!("  {}", citation);
    }
    for (fact, reason) in unsupported.iter().take(5) {
        println!("  unsupported {}: {}", fact, reason);
    }
}

fn print_failure(partial: &PartialCampaign) {
    println!(
        "{} | failed at {}: {}",
        partial.input_echo.movie_reference, partial.failed_stage, partial.reason
    );
    for report in &partial.stage_reports {
        println!(
            "  {:<10} {:<9} {}",
            report.stage.name(),
            report.status.as_str(),
            report.reason.as_deref().unwrap_or("")
        );
    }
}
