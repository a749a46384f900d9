//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use loyaltyscout_core::{
    BrandStatus, HarvestResult, Harvester, ProgressReporter, load_brand_targets,
    load_manual_seeds,
};
use loyaltyscout_extract::{Classifier, OfflineClassifier, OpenRouterClassifier};
use loyaltyscout_shared::{
    AppConfig, init_config, load_config, load_config_from, validate_api_key,
};

/// Render command used by `--render` when the config names none.
const DEFAULT_RENDER_COMMAND: &str = "chromium --headless --disable-gpu --dump-dom";

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// LoyaltyScout: harvest loyalty program details from brand websites.
#[derive(Parser)]
#[command(
    name = "loyaltyscout",
    version,
    about = "Discover, fetch and merge loyalty program pages into structured records.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.loyaltyscout/loyaltyscout.toml).
    #[arg(long, global = true, env = "LOYALTYSCOUT_CONFIG")]
    pub config: Option<PathBuf>,

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
    /// Discover, fetch and merge loyalty pages for a `brand,domain` list.
    Run(HarvestArgs),

    /// Fetch and merge the pages of a `brand,url,page_type` list (no discovery).
    Scrape(HarvestArgs),

    /// Print ranked candidate pages for one domain.
    Discover {
        /// Brand domain, e.g. `starbucks.com`.
        domain: String,

        /// Maximum candidates to keep.
        #[arg(long)]
        max_urls: Option<usize>,

        /// Print the full discovery report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Options shared by `run` and `scrape`. Flags override the config file.
#[derive(Args)]
pub(crate) struct HarvestArgs {
    /// Input CSV.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output directory (a `run_<timestamp>` folder is created inside).
    #[arg(short, long)]
    pub output: Option<String>,

    /// Skip the classification service; records stay empty.
    #[arg(long)]
    pub skip_llm: bool,

    /// Maximum candidate pages per brand.
    #[arg(long)]
    pub max_urls: Option<usize>,

    /// Maximum requests in flight.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Minimum spacing between requests, in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Fetch page bodies through the headless render command.
    #[arg(long)]
    pub render: bool,

    /// Stop issuing requests after this many seconds.
    #[arg(long)]
    pub run_timeout: Option<u64>,
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
        0 => "loyaltyscout=info",
        1 => "loyaltyscout=debug",
        _ => "loyaltyscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
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

#[derive(Clone, Copy)]
enum Mode {
    Discovery,
    Manual,
}

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run(args) => cmd_harvest(config_path, &args, Mode::Discovery).await,
        Command::Scrape(args) => cmd_harvest(config_path, &args, Mode::Manual).await,
        Command::Discover {
            domain,
            max_urls,
            json,
        } => cmd_discover(config_path, &domain, max_urls, json).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    })
}

fn apply_overrides(config: &mut AppConfig, args: &HarvestArgs) {
    if let Some(dir) = &args.output {
        config.output.dir = dir.clone();
    }
    if let Some(n) = args.max_urls {
        config.discovery.max_urls = n;
    }
    if let Some(n) = args.concurrency {
        config.fetch.concurrency = n;
        config.discovery.probe_concurrency = n;
    }
    if let Some(ms) = args.delay_ms {
        config.fetch.min_delay_ms = ms;
    }
    if args.render && config.fetch.render_command.is_none() {
        config.fetch.render_command = Some(DEFAULT_RENDER_COMMAND.to_string());
    }
    if let Some(secs) = args.run_timeout {
        config.fetch.run_timeout_secs = Some(secs);
    }
}

/// Cancel `token` on the first Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight requests");
            token.cancel();
        }
    });
}

async fn cmd_harvest(config_path: Option<&Path>, args: &HarvestArgs, mode: Mode) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    apply_overrides(&mut config, args);
    config.validate()?;

    // Validate API key before doing anything
    let classifier: Arc<dyn Classifier> = if args.skip_llm {
        info!("classification disabled, records will stay empty");
        Arc::new(OfflineClassifier)
    } else {
        let api_key = validate_api_key(&config)?;
        Arc::new(OpenRouterClassifier::new(&config.llm, api_key)?)
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let harvester = Harvester::new(config, classifier, cancel)?;
    let reporter = CliProgress::new();

    let result = match mode {
        Mode::Discovery => {
            let targets = load_brand_targets(&args.input)?;
            if targets.is_empty() {
                return Err(eyre!("no brands found in '{}'", args.input.display()));
            }
            info!(brands = targets.len(), input = %args.input.display(), "starting run");
            harvester.run_discovery(&targets, &reporter).await?
        }
        Mode::Manual => {
            let seeds = load_manual_seeds(&args.input)?;
            if seeds.is_empty() {
                return Err(eyre!("no seed URLs found in '{}'", args.input.display()));
            }
            info!(seeds = seeds.len(), input = %args.input.display(), "starting scrape");
            harvester.run_manual(&seeds, &reporter).await?
        }
    };

    print_summary(&result);

    if result.summary.any_failed() {
        return Err(eyre!(
            "{} of {} brand(s) failed; see {}",
            result.summary.totals.failed,
            result.summary.totals.brands,
            result.run_dir.join("ledger.json").display()
        ));
    }
    Ok(())
}

fn print_summary(result: &HarvestResult) {
    let summary = &result.summary;

    println!();
    if summary.cancelled {
        println!("  Run cancelled; partial results written.");
    } else {
        println!("  Run complete!");
    }
    for brand in &summary.brands {
        let status = match brand.status {
            BrandStatus::Complete => "complete",
            BrandStatus::Partial => "partial",
            BrandStatus::NoProgramFound => "no program found",
            BrandStatus::Blocked => "blocked",
            BrandStatus::Failed => "FAILED",
        };
        println!(
            "  {:<24} {:<17} {}/{} pages, {} extracted",
            brand.brand,
            status,
            brand.counts.fetched,
            brand.counts.candidates,
            brand.counts.extracted
        );
    }
    println!();
    println!("  Brands:  {}", summary.totals.brands);
    println!("  Errors:  {}", summary.totals.ledger_entries);
    println!("  Output:  {}", result.run_dir.display());
    println!("  Time:    {:.1}s", summary.elapsed_ms as f64 / 1000.0);
    println!();
}

async fn cmd_discover(
    config_path: Option<&Path>,
    domain: &str,
    max_urls: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(n) = max_urls {
        config.discovery.max_urls = n;
    }
    config.validate()?;

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let harvester = Harvester::new(config, Arc::new(OfflineClassifier), cancel)?;

    let (report, ledger) = harvester.discover(domain).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  {} candidate(s) for {} ({:?})", report.candidates.len(), domain, report.coverage);
    println!(
        "  sitemap: {}  probe: {}  crawl: {}",
        report.counts.sitemap, report.counts.probe, report.counts.crawl
    );
    println!();
    for (rank, c) in report.candidates.iter().enumerate() {
        println!(
            "  {rank:>3}  {:>4.1}  {:<8} d{}  {}",
            c.score,
            format!("{:?}", c.source).to_lowercase(),
            c.hop_depth,
            c.url
        );
    }
    for entry in &ledger {
        println!("  ! {}: {}", entry.subject, entry.reason);
    }
    println!();
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    println!("{}", config.to_toml()?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn brand_started(&self, brand: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("[{current}/{total}] {brand}"));
    }

    fn page_fetched(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Fetched [{current}/{total}] {url}"));
    }

    fn page_extracted(&self, url: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Extracted [{current}/{total}] {url}"));
    }

    fn done(&self, _result: &HarvestResult) {
        self.spinner.finish_and_clear();
    }
}
