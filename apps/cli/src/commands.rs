//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use dealscout_core::{
    BatchConfig, ExtractionOrchestrator, OrchestratorSettings, RunReport, RunRequest, RunStatus,
    TierPolicy,
};
use dealscout_shared::{
    AppConfig, SourceConfiguration, SourceType, SubscriptionTier, expand_home, init_config,
    load_config,
};
use dealscout_sources::{HttpDealServices, ProcessorRegistry, RandomSupplier};
use dealscout_storage::{StoredCandidate, Storage};
use tracing::{info, warn};

use crate::progress::CliProgress;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// DealScout: find candidate deals across websites, marketplaces and feeds.
#[derive(Parser)]
#[command(
    name = "dealscout",
    version,
    about = "Search configured sources for candidate deals and promote the good ones.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path (overrides `defaults.db_path`).
    #[arg(long, global = true, env = "DEALSCOUT_DB")]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run an extraction over a saved configuration or inline sources.
    Search(SearchArgs),

    /// Manage saved source configurations.
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },

    /// Inspect and promote candidates from past runs.
    Candidates {
        #[command(subcommand)]
        action: CandidatesAction,
    },

    /// Promoted deals.
    Deals {
        #[command(subcommand)]
        action: DealsAction,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Where the sources and keywords of a configuration come from.
#[derive(Args, Debug, Clone)]
pub(crate) struct SourceArgs {
    /// Kind of source: website, marketplace, api, or manual.
    #[arg(long = "type", default_value = "website")]
    pub source_type: SourceType,

    /// Source identifier (URL, listing feed, ...). Repeatable; processed in order.
    #[arg(long = "url")]
    pub urls: Vec<String>,

    /// Keyword a candidate must match. Repeatable or comma-separated.
    #[arg(long, value_delimiter = ',')]
    pub include: Vec<String>,

    /// Keyword that rules a candidate out. Repeatable or comma-separated.
    #[arg(long, value_delimiter = ',')]
    pub exclude: Vec<String>,
}

impl SourceArgs {
    fn to_configuration(&self) -> SourceConfiguration {
        SourceConfiguration::new(
            self.source_type,
            self.urls.clone(),
            self.include.clone(),
            self.exclude.clone(),
        )
    }
}

#[derive(Args, Debug)]
pub(crate) struct SearchArgs {
    /// Saved configuration (id or name). Inline flags are used when absent.
    #[arg(long, conflicts_with_all = ["urls", "include", "exclude"])]
    pub config: Option<String>,

    #[command(flatten)]
    pub sources: SourceArgs,

    /// Subscription tier (overrides `defaults.tier`).
    #[arg(long)]
    pub tier: Option<SubscriptionTier>,

    /// Process only the first N sources (tiers that allow batching).
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Print the run report as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
pub(crate) enum SourcesAction {
    /// Save a new configuration.
    Add {
        /// Unique name for the configuration.
        #[arg(long)]
        name: String,

        #[command(flatten)]
        sources: SourceArgs,

        /// Save it deactivated.
        #[arg(long)]
        inactive: bool,
    },
    /// List saved configurations.
    List {
        /// Only active configurations.
        #[arg(long)]
        active: bool,
    },
    /// Show one configuration.
    Show { key: String },
    /// Allow a configuration to be searched.
    Activate { key: String },
    /// Keep a configuration but refuse to search it.
    Deactivate { key: String },
    /// Delete a configuration (run history is kept).
    Remove { key: String },
}

#[derive(Subcommand)]
pub(crate) enum CandidatesAction {
    /// List the candidates of a run (latest run by default).
    List {
        #[arg(long)]
        run: Option<String>,

        #[arg(long)]
        json: bool,
    },
    /// Promote a candidate to a deal.
    Promote { id: String },
}

#[derive(Subcommand)]
pub(crate) enum DealsAction {
    /// List promoted deals.
    List {
        #[arg(long)]
        json: bool,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "dealscout=info",
        1 => "dealscout=debug",
        _ => "dealscout=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = load_config()?;
    let db_path = match cli.db {
        Some(path) => path,
        None => expand_home(&config.defaults.db_path)?,
    };

    match cli.command {
        Command::Search(args) => cmd_search(&config, &db_path, args).await,
        Command::Sources { action } => match action {
            SourcesAction::Add {
                name,
                sources,
                inactive,
            } => cmd_sources_add(&db_path, &name, &sources, inactive).await,
            SourcesAction::List { active } => cmd_sources_list(&db_path, active).await,
            SourcesAction::Show { key } => cmd_sources_show(&db_path, &key).await,
            SourcesAction::Activate { key } => cmd_sources_set_active(&db_path, &key, true).await,
            SourcesAction::Deactivate { key } => {
                cmd_sources_set_active(&db_path, &key, false).await
            }
            SourcesAction::Remove { key } => cmd_sources_remove(&db_path, &key).await,
        },
        Command::Candidates { action } => match action {
            CandidatesAction::List { run, json } => {
                cmd_candidates_list(&db_path, run.as_deref(), json).await
            }
            CandidatesAction::Promote { id } => cmd_candidates_promote(&db_path, &id).await,
        },
        Command::Deals { action } => match action {
            DealsAction::List { json } => cmd_deals_list(&db_path, json).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

// ---------------------------------------------------------------------------
// search
// ---------------------------------------------------------------------------

/// Turn CLI arguments into a run request. Returns the saved configuration id
/// alongside when one was used.
async fn build_request(
    config: &AppConfig,
    storage: &Storage,
    args: &SearchArgs,
) -> Result<(Option<String>, RunRequest)> {
    let (config_id, source_config) = match &args.config {
        Some(key) => {
            let stored = storage
                .get_source_config(key)
                .await?
                .ok_or_else(|| eyre!("no saved configuration '{key}'"))?;
            if !stored.config.is_active {
                return Err(eyre!(
                    "configuration '{}' is inactive (run `dealscout sources activate {}`)",
                    stored.name,
                    stored.name
                ));
            }
            (Some(stored.id), stored.config)
        }
        None => (None, args.sources.to_configuration()),
    };

    Ok((config_id, request_for(config, source_config, args)))
}

fn request_for(
    config: &AppConfig,
    source_config: SourceConfiguration,
    args: &SearchArgs,
) -> RunRequest {
    let tier = args.tier.unwrap_or(config.defaults.tier);
    RunRequest {
        config: source_config,
        policy: TierPolicy::for_tier(tier, &config.tiers),
        batch: args.batch_size.map(BatchConfig::of).unwrap_or_default(),
    }
}

fn orchestrator(config: &AppConfig) -> Result<Arc<ExtractionOrchestrator>> {
    let services = HttpDealServices::new(&config.services)?;
    let supplier = RandomSupplier::new(
        config.pipeline.simulated_max_candidates,
        config.pipeline.simulated_seed,
    );
    let registry = ProcessorRegistry::new(Arc::new(services), Arc::new(supplier));
    Ok(Arc::new(ExtractionOrchestrator::new(
        registry,
        OrchestratorSettings::from(&config.pipeline),
    )))
}

async fn cmd_search(config: &AppConfig, db_path: &Path, args: SearchArgs) -> Result<()> {
    let storage = Storage::open(db_path).await?;
    let (config_id, request) = build_request(config, &storage, &args).await?;
    let kind = request.config.source_type;
    let tier = request.policy.tier;

    let mut handle = orchestrator(config)?.start_run(request)?;
    let run_id = handle.id().to_string();
    info!(run_id = %run_id, kind = %kind, tier = %tier, "search started");

    if let Err(e) = storage
        .insert_run(&run_id, config_id.as_deref(), kind, tier)
        .await
    {
        handle.cancel();
        return Err(e.into());
    }

    let display = if args.json {
        CliProgress::hidden()
    } else {
        CliProgress::new()
    };
    let ui = tokio::spawn(display.drive(handle.events()));

    let cancel = handle.cancellation();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current source");
            cancel.signal();
        }
    });

    let report = handle.join().await;
    interrupt.abort();
    let _ = ui.await;
    let report = match report {
        Ok(report) => report,
        Err(e) => {
            storage
                .fail_run(&run_id, serde_json::json!({}), &e.to_string())
                .await;
            return Err(e.into());
        }
    };

    let candidate_ids = storage
        .store_results(
            &run_id,
            &report.candidates,
            report.status.as_str(),
            run_stats(&report),
        )
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, &candidate_ids);
    }
    Ok(())
}

fn run_stats(report: &RunReport) -> serde_json::Value {
    serde_json::json!({
        "candidates": report.candidates.len(),
        "sources_total": report.sources_total,
        "sources_processed": report.sources_processed,
        "sources_failed": report.failures.len(),
        "failures": report.failures,
        "elapsed_ms": report.elapsed.as_millis() as u64,
    })
}

fn print_report(report: &RunReport, candidate_ids: &[String]) {
    println!();
    match report.status {
        RunStatus::Completed => println!("  Search complete."),
        RunStatus::NoResults => println!("  Search finished with no candidates."),
        RunStatus::Exhausted => println!("  Search failed: every source raised an error."),
        RunStatus::Cancelled => println!("  Search cancelled; partial results kept."),
    }
    println!("  Run:        {}", report.run_id);
    println!(
        "  Sources:    {} processed of {} ({} failed)",
        report.sources_processed,
        report.sources_total,
        report.failures.len()
    );
    println!("  Candidates: {}", report.candidates.len());
    println!("  Time:       {:.1}s", report.elapsed.as_secs_f64());

    if !report.failures.is_empty() {
        println!();
        for failure in &report.failures {
            println!("  ! [{}] {}", failure.index, failure.error);
        }
    }

    if !report.candidates.is_empty() {
        println!();
        for (candidate, id) in report.candidates.iter().zip(candidate_ids) {
            println!(
                "  {id}  {:<36} {:<24} {:>14}  {}",
                candidate.deal_name,
                candidate.company_name,
                format_amount(candidate.amount),
                candidate.matched_keywords.join(", ")
            );
        }
        println!();
        println!("  Promote with: dealscout candidates promote <id>");
    }
    println!();
}

fn format_amount(amount: f64) -> String {
    if amount >= 1_000_000.0 {
        format!("${:.1}M", amount / 1_000_000.0)
    } else if amount >= 1_000.0 {
        format!("${:.0}K", amount / 1_000.0)
    } else {
        format!("${amount:.0}")
    }
}

// ---------------------------------------------------------------------------
// sources
// ---------------------------------------------------------------------------

async fn cmd_sources_add(
    db_path: &Path,
    name: &str,
    sources: &SourceArgs,
    inactive: bool,
) -> Result<()> {
    let mut config = sources.to_configuration();
    if config.source_urls.is_empty() {
        return Err(eyre!("at least one --url is required"));
    }
    if config.include_keywords.is_empty() {
        return Err(eyre!("at least one --include keyword is required"));
    }
    config.is_active = !inactive;

    let storage = Storage::open(db_path).await?;
    let id = storage.save_source_config(name, &config).await?;
    println!("Saved configuration '{name}' ({id})");
    Ok(())
}

async fn cmd_sources_list(db_path: &Path, active_only: bool) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let configs = storage.list_source_configs(active_only).await?;
    if configs.is_empty() {
        println!("No saved configurations.");
        return Ok(());
    }
    for stored in configs {
        println!(
            "  {:<24} {:<12} {:>3} sources  {}{}",
            stored.name,
            stored.config.source_type,
            stored.config.source_urls.len(),
            stored.config.include_keywords.join(", "),
            if stored.config.is_active { "" } else { "  (inactive)" }
        );
    }
    Ok(())
}

async fn cmd_sources_show(db_path: &Path, key: &str) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let stored = storage
        .get_source_config(key)
        .await?
        .ok_or_else(|| eyre!("no saved configuration '{key}'"))?;
    println!("{}", serde_json::to_string_pretty(&stored)?);
    Ok(())
}

async fn cmd_sources_set_active(db_path: &Path, key: &str, active: bool) -> Result<()> {
    let storage = Storage::open(db_path).await?;
    if !storage.set_source_active(key, active).await? {
        return Err(eyre!("no saved configuration '{key}'"));
    }
    println!(
        "Configuration '{key}' {}",
        if active { "activated" } else { "deactivated" }
    );
    Ok(())
}

async fn cmd_sources_remove(db_path: &Path, key: &str) -> Result<()> {
    let storage = Storage::open(db_path).await?;
    if !storage.delete_source_config(key).await? {
        return Err(eyre!("no saved configuration '{key}'"));
    }
    println!("Removed configuration '{key}'");
    Ok(())
}

// ---------------------------------------------------------------------------
// candidates / deals
// ---------------------------------------------------------------------------

async fn cmd_candidates_list(db_path: &Path, run: Option<&str>, json: bool) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let run_id = match run {
        Some(id) => id.to_string(),
        None => storage
            .list_runs(1)
            .await?
            .into_iter()
            .next()
            .map(|r| r.id)
            .ok_or_else(|| eyre!("no runs recorded yet"))?,
    };
    let candidates = storage.list_candidates(&run_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
        return Ok(());
    }
    println!("Run {run_id}: {} candidates", candidates.len());
    for stored in &candidates {
        print_candidate(stored);
    }
    Ok(())
}

fn print_candidate(stored: &StoredCandidate) {
    let c = &stored.candidate;
    println!(
        "  {}  {:<36} {:<24} {:>14}  {}",
        stored.id,
        c.deal_name,
        c.company_name,
        format_amount(c.amount),
        c.source_url
    );
}

async fn cmd_candidates_promote(db_path: &Path, id: &str) -> Result<()> {
    let storage = Storage::open(db_path).await?;
    let deal = storage.promote_candidate(id).await?;
    println!("Promoted '{}' as deal {}", deal.deal_name, deal.id);
    Ok(())
}

async fn cmd_deals_list(db_path: &Path, json: bool) -> Result<()> {
    let storage = Storage::open_readonly(db_path).await?;
    let deals = storage.list_deals().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&deals)?);
        return Ok(());
    }
    if deals.is_empty() {
        println!("No deals promoted yet.");
        return Ok(());
    }
    for deal in deals {
        println!(
            "  {}  {:<36} {:<24} {:>14}  {}",
            deal.id,
            deal.deal_name,
            deal.company_name,
            format_amount(deal.amount),
            deal.stage
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
