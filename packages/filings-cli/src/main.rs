//! Filings extraction CLI
//!
//! Runs checkpointed analyses over a company list and maintains the local
//! checkpoint and document stores.

mod config;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use filings::{
    default_extractors, system_clock, AnalysisId, AnalysisRunner, Cache, CheckpointStore,
    CheckpointSummary, Cik, CompanyAnalyzer, FileCacheBackend, FileCheckpointStore,
    FilingsClient, HttpTransport, OpenAiReviewer, RateLimitedClient, RecordReviewer,
    ResumeAction, RunOutcome, RunReport, RunRequest, SuggestKind,
};

#[derive(Parser)]
#[command(name = "filings")]
#[command(about = "Extract tax and compensation facts from regulatory filings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze companies for one fiscal year
    Run(RunArgs),

    /// List stored checkpoints
    Checkpoints {
        /// Only show checkpoints for this fiscal year
        #[arg(long)]
        year: Option<i32>,
    },

    /// Maintain the document cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Fiscal year to analyze
    #[arg(long)]
    year: i32,

    /// Comma-separated company identifiers (CIKs)
    #[arg(long, value_delimiter = ',', required_unless_present_any = ["companies_file", "resume"])]
    companies: Vec<String>,

    /// File with one company identifier per line
    #[arg(long, conflicts_with = "companies")]
    companies_file: Option<PathBuf>,

    /// Never pick up an earlier checkpoint on our own
    #[arg(long)]
    no_auto_resume: bool,

    /// Always start a new checkpoint
    #[arg(long, conflicts_with = "resume")]
    force_new: bool,

    /// Resume a specific checkpoint
    #[arg(long, value_name = "ANALYSIS_ID")]
    resume: Option<String>,

    /// Re-attempt companies recorded as failed
    #[arg(long)]
    retry_failed: bool,

    /// Write every collected record to this JSON file
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove expired and corrupted entries
    Sweep,
    /// Remove every entry
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,filings=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Run(args) => cmd_run(&config, args).await,
        Commands::Checkpoints { year } => cmd_checkpoints(&config, year).await,
        Commands::Cache { action } => cmd_cache(&config, action).await,
    }
}

async fn cmd_run(config: &Config, args: RunArgs) -> Result<()> {
    config.require_user_agent()?;
    let companies = match &args.companies_file {
        Some(path) => read_companies_file(path).await?,
        None => parse_companies(&args.companies)?,
    };

    let clock = system_clock();
    let cache = Arc::new(Cache::new(
        Arc::new(
            FileCacheBackend::open(config.cache_dir())
                .await
                .context("Failed to open cache directory")?,
        ),
        clock.clone(),
        config.pipeline.cache.clone(),
    ));
    let transport =
        HttpTransport::new(&config.pipeline.fetch).context("Failed to build HTTP client")?;
    let client = RateLimitedClient::new(transport, config.pipeline.fetch.clone()).with_cache(cache);

    let reviewer = config.openai_api_key.as_ref().map(|key| {
        Arc::new(
            OpenAiReviewer::new(key.expose_secret()).with_model(&config.pipeline.review.model),
        ) as Arc<dyn RecordReviewer>
    });
    if reviewer.is_some() {
        tracing::info!(model = %config.pipeline.review.model, "LLM review enabled");
    }

    let analyzer = CompanyAnalyzer::new(
        Arc::new(FilingsClient::new(client)),
        default_extractors(reviewer, config.pipeline.review.clone()),
    );
    let store = Arc::new(
        FileCheckpointStore::open(config.checkpoint_dir())
            .await
            .context("Failed to open checkpoint directory")?,
    );
    let runner = AnalysisRunner::new(Arc::new(analyzer), store, &config.pipeline, clock);

    let mut request = RunRequest::new(args.year, companies).with_auto_resume(!args.no_auto_resume);
    if args.force_new {
        request = request.force_new();
    }
    if let Some(id) = args.resume {
        request = request.resume_from(AnalysisId::new(id));
    }
    if args.retry_failed {
        request = request.retry_failed();
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupt received, stopping after saving progress...".yellow());
            on_interrupt.cancel();
        }
    });

    let report = runner
        .run(request, cancel)
        .await
        .context("Analysis run failed")?;

    print_report(&report);

    if let Some(path) = &args.output {
        let records: Vec<_> = report.checkpoint.records().collect();
        let json = serde_json::to_vec_pretty(&records)?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} {}", "Records written to".dimmed(), path.display());
    }

    Ok(())
}

async fn cmd_checkpoints(config: &Config, year: Option<i32>) -> Result<()> {
    let store = FileCheckpointStore::open(config.checkpoint_dir())
        .await
        .context("Failed to open checkpoint directory")?;
    let summaries = match year {
        Some(year) => store.list_for_year(year).await?,
        None => store.list().await?,
    };

    if summaries.is_empty() {
        println!("{}", "No checkpoints found".dimmed());
        return Ok(());
    }

    for summary in &summaries {
        let progress = format!("{:>5.1}%", summary.progress_percentage());
        let progress = if summary.is_complete() {
            progress.green()
        } else {
            progress.yellow()
        };
        println!(
            "{}  {}  {}  {}/{} companies  {}  updated {}",
            summary.analysis_id.to_string().bright_cyan(),
            summary.target_year,
            progress,
            summary.completed_companies,
            summary.total_companies,
            summary.stats,
            summary.last_updated.format("%Y-%m-%d %H:%M UTC"),
        );
    }
    Ok(())
}

async fn cmd_cache(config: &Config, action: CacheAction) -> Result<()> {
    let backend = FileCacheBackend::open(config.cache_dir())
        .await
        .context("Failed to open cache directory")?;
    let cache = Cache::new(Arc::new(backend), system_clock(), config.pipeline.cache.clone());

    match action {
        CacheAction::Sweep => {
            let removed = cache.sweep_expired().await?;
            println!("{} {} expired entries", "Removed".green(), removed);
        }
        CacheAction::Clear => {
            let removed = cache.clear().await?;
            println!("{} {} entries", "Removed".green(), removed);
        }
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("{} {}", "Analysis".bold(), report.analysis_id.to_string().bright_cyan());
    println!("  decision: {} ({})", report.action, report.reason);

    let checkpoint = &report.checkpoint;
    let stats = checkpoint.stats();
    println!("  this run: {}", report.run_stats);
    println!(
        "  overall:  {}/{} companies ({:.1}%), {} records, {:.1}% success",
        checkpoint.completed_companies(),
        checkpoint.total_companies(),
        checkpoint.progress_percentage(),
        stats.records,
        stats.success_rate(),
    );

    let failed = checkpoint.failed_companies();
    if !failed.is_empty() {
        let shown: Vec<String> = failed.iter().take(10).map(Cik::to_string).collect();
        let more = failed.len().saturating_sub(shown.len());
        let suffix = if more > 0 { format!(" and {} more", more) } else { String::new() };
        println!("  {} {}{}", "failed:".red(), shown.join(", "), suffix);
        println!("  {}", "Re-run with --retry-failed to try them again".dimmed());
    }

    if let (ResumeAction::Suggest(kind), Some(candidate)) = (report.action, &report.suggestion) {
        print_suggestion(kind, candidate);
    }

    match report.outcome {
        RunOutcome::Completed => println!("{}", "Done".bright_green().bold()),
        RunOutcome::Interrupted => println!(
            "{} Run again to continue automatically, or pass --resume {}",
            "Interrupted.".yellow().bold(),
            report.analysis_id
        ),
    }
}

fn print_suggestion(kind: SuggestKind, candidate: &CheckpointSummary) {
    let headline = match kind {
        SuggestKind::Resume => "An unfinished run for this year may be worth resuming:",
        SuggestKind::Rerun => "A run for nearly the same companies finished recently:",
    };
    println!("  {}", headline.yellow());
    println!(
        "    {} ({:.1}% of {} companies, updated {})",
        candidate.analysis_id,
        candidate.progress_percentage(),
        candidate.total_companies,
        candidate.last_updated.format("%Y-%m-%d %H:%M UTC"),
    );
    println!("    pass --resume {} to continue it", candidate.analysis_id);
}

fn parse_companies<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Cik>> {
    raw.iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .map(|s| Cik::parse(s).with_context(|| format!("Invalid company identifier {:?}", s)))
        .collect()
}

async fn read_companies_file(path: &Path) -> Result<Vec<Cik>> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let lines: Vec<&str> = contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default())
        .collect();
    let companies = parse_companies(&lines)?;
    if companies.is_empty() {
        bail!("{} lists no companies", path.display());
    }
    Ok(companies)
}
