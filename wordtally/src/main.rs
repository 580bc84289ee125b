//! wordtally CLI Application
//!
//! Fetches every essay in a URL list, counts dictionary words across all
//! of them, and prints the most frequent ones as a JSON report.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use wordtally_lib::{
    load_env_config, parse_duration_string, ConfigManager, Pipeline, PipelineConfig,
};

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// CLI arguments for wordtally
#[derive(Parser, Debug, Default)]
#[command(name = "wordtally")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Count the most frequent dictionary words across a list of essays")]
#[command(
    long_about = "Fetch every essay URL in a list under a shared rate limit, tally the words that appear in a word bank, and print the top N as JSON.\n\nSettings come from flags, WT_* environment variables, and wordtally.toml files, in that order of precedence."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// File with one essay URL per line [default: endg-urls]
    #[arg(short = 'e', long = "essays", value_name = "FILE", help_heading = "Inputs")]
    pub essays: Option<String>,

    /// Word bank file, one word per line [default: words.txt]
    #[arg(short = 'w', long = "words", value_name = "FILE", help_heading = "Inputs")]
    pub words: Option<String>,

    /// Use a specific config file instead of discovered ones
    #[arg(long = "config", value_name = "FILE", help_heading = "Inputs")]
    pub config: Option<String>,

    /// Number of top words to report (1-1000) [default: 10]
    #[arg(short = 'n', long = "top", value_name = "N", help_heading = "Output")]
    pub top: Option<usize>,

    /// Concurrent fetch workers (1-1000) [default: 200]
    #[arg(long = "fetch-workers", value_name = "N", help_heading = "Pipeline")]
    pub fetch_workers: Option<usize>,

    /// Concurrent tokenize workers per batch (1-1000) [default: 20]
    #[arg(long = "tokenize-workers", value_name = "N", help_heading = "Pipeline")]
    pub tokenize_workers: Option<usize>,

    /// Documents per aggregation batch (1-10000) [default: 100]
    #[arg(long = "batch-size", value_name = "N", help_heading = "Pipeline")]
    pub batch_size: Option<usize>,

    /// Whole-run deadline, e.g. "90s" or "2m" [default: 60s]
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Pipeline")]
    pub timeout: Option<String>,

    /// Maximum requests per second (1-10000) [default: 100]
    #[arg(long = "rate-limit", value_name = "N", help_heading = "Pipeline")]
    pub rate_limit: Option<u32>,

    /// Buffered documents between fetch and aggregation [default: 10]
    #[arg(long = "document-buffer", value_name = "N", help_heading = "Pipeline")]
    pub document_buffer: Option<usize>,

    /// Buffered fetch errors [default: 100]
    #[arg(long = "error-buffer", value_name = "N", help_heading = "Pipeline")]
    pub error_buffer: Option<usize>,

    /// Attempts per URL, including the first (1-10) [default: 3]
    #[arg(long = "retries", value_name = "N", help_heading = "HTTP")]
    pub retries: Option<u32>,

    /// Pause between attempts, e.g. "200ms" [default: 200ms]
    #[arg(long = "retry-delay", value_name = "DURATION", help_heading = "HTTP")]
    pub retry_delay: Option<String>,

    /// Per-request timeout, e.g. "10s" [default: 10s]
    #[arg(long = "request-timeout", value_name = "DURATION", help_heading = "HTTP")]
    pub request_timeout: Option<String>,

    /// Log progress information
    #[arg(short = 'v', long = "verbose", help_heading = "Logging")]
    pub verbose: bool,

    /// Log detailed debugging information
    #[arg(short = 'd', long = "debug", help_heading = "Logging")]
    pub debug: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = validate_args(&args) {
        ui::print_error(&e);
        process::exit(1);
    }

    init_logging(&args);
    info!("wordtally v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        ui::print_error(&e.to_string());
        process::exit(1);
    }
}

/// Reject flag values that can never be valid, before any work starts.
///
/// Range checks happen later, once every configuration layer has been
/// merged.
fn validate_args(args: &Args) -> Result<(), String> {
    let counts = [
        ("--top", args.top),
        ("--fetch-workers", args.fetch_workers),
        ("--tokenize-workers", args.tokenize_workers),
        ("--batch-size", args.batch_size),
        ("--document-buffer", args.document_buffer),
        ("--error-buffer", args.error_buffer),
    ];
    for (flag, value) in counts {
        if value == Some(0) {
            return Err(format!("{} must be at least 1", flag));
        }
    }
    if args.rate_limit == Some(0) {
        return Err("--rate-limit must be at least 1".to_string());
    }
    if args.retries == Some(0) {
        return Err("--retries must be at least 1".to_string());
    }

    let durations = [
        ("--timeout", &args.timeout),
        ("--retry-delay", &args.retry_delay),
        ("--request-timeout", &args.request_timeout),
    ];
    for (flag, value) in durations {
        if let Some(value) = value {
            if parse_duration_string(value).is_none() {
                return Err(format!(
                    "Invalid {} '{}'. Use format like '250ms', '5s', '2m'",
                    flag, value
                ));
            }
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over the flags.
fn init_logging(args: &Args) {
    let default_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(args.debug)
        .try_init();
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = Pipeline::new(build_config(&args)?)?;
    debug!(config = ?pipeline.config(), "resolved configuration");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping");
                shutdown.cancel();
            }
        }
    });

    let interactive = !(args.verbose || args.debug);
    let spinner = if interactive {
        ui::Spinner::start("Fetching and counting essays...", &shutdown)
    } else {
        None
    };

    let result = pipeline.run_from_files(shutdown.clone()).await;
    if let Some(spinner) = spinner {
        spinner.stop().await;
    }
    let report = result?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.verbose || args.debug {
        ui::print_summary(&report);
    }
    if report.total_errors > 0 {
        ui::print_error_count(report.total_errors);
    }

    Ok(())
}

/// Layer every configuration source, lowest precedence first.
fn build_config(args: &Args) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let env_config = load_env_config(args.verbose);
    let config_manager = ConfigManager::new(args.verbose);

    // Step 1: Config files. An explicit path replaces discovery.
    let explicit = args.config.as_deref().or(env_config.config.as_deref());
    if let Some(path) = explicit {
        info!(path = %path, "using explicit config file");
    }
    let file_config = config_manager.load(explicit).map_err(|e| {
        format!(
            "Failed to load config file '{}': {}",
            explicit.unwrap_or_default(),
            e
        )
    })?;
    let config = file_config.apply_to(PipelineConfig::default());

    // Step 2: Apply environment variables (WT_*)
    let config = env_config.apply_to(config);

    // Step 3: Apply CLI arguments (highest precedence)
    let config = apply_cli_args_to_config(config, args)?;

    config.validate()?;
    Ok(config)
}

fn apply_cli_args_to_config(
    mut config: PipelineConfig,
    args: &Args,
) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    if let Some(essays) = &args.essays {
        config.essays_file = essays.clone();
    }
    if let Some(words) = &args.words {
        config.word_bank_file = words.clone();
    }
    if let Some(top) = args.top {
        config.top_n = top;
    }
    if let Some(workers) = args.fetch_workers {
        config.fetch_workers = workers;
    }
    if let Some(workers) = args.tokenize_workers {
        config.tokenize_workers = workers;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(rate_limit) = args.rate_limit {
        config.rate_limit = rate_limit;
    }
    if let Some(buffer) = args.document_buffer {
        config.document_buffer = buffer;
    }
    if let Some(buffer) = args.error_buffer {
        config.error_buffer = buffer;
    }
    if let Some(retries) = args.retries {
        config.retry_attempts = retries;
    }
    if let Some(timeout) = &args.timeout {
        config.processing_timeout = parse_flag_duration("--timeout", timeout)?;
    }
    if let Some(delay) = &args.retry_delay {
        config.retry_delay = parse_flag_duration("--retry-delay", delay)?;
    }
    if let Some(timeout) = &args.request_timeout {
        config.request_timeout = parse_flag_duration("--request-timeout", timeout)?;
    }
    Ok(config)
}

fn parse_flag_duration(
    flag: &str,
    value: &str,
) -> Result<std::time::Duration, Box<dyn std::error::Error>> {
    parse_duration_string(value)
        .ok_or_else(|| format!("Invalid {} '{}'", flag, value).into())
}
