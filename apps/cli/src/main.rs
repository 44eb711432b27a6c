use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use logger::LevelFilter;
use tracing::{info, warn};
use watchdog::definition::{self, DEFAULT_PATTERN};
use watchdog::notify::{self, MailgunNotifier, NotifyPolicy};
use watchdog::report;
use watchdog::{WatchdogResult, WatchdogRunner, collect_results};

mod config;

use config::Config;

#[derive(Parser)]
#[command(
    name = "api-watchdog",
    about = "Probe JSON APIs and check their responses against expectations",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file (default: $XDG_CONFIG_HOME/api-watchdog/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find test definitions under a directory, run them and report
    Discover {
        search_directory: PathBuf,
        /// File name pattern of definition files
        #[arg(short, long, default_value = DEFAULT_PATTERN)]
        pattern: String,
        /// Write the JSON report to this file instead of stdout
        #[arg(short, long)]
        output_path: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
        /// Probes in flight at once (overrides the config file)
        #[arg(long)]
        max_workers: Option<usize>,
        /// Per-probe timeout in seconds (overrides the config file)
        #[arg(long)]
        timeout: Option<u64>,
        /// Send notifications even if the config file disables them
        #[arg(long)]
        notify: bool,
    },
    /// Load and check test definitions without running them
    Check {
        search_directory: PathBuf,
        #[arg(short, long, default_value = DEFAULT_PATTERN)]
        pattern: String,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

struct DiscoverArgs {
    search_directory: PathBuf,
    pattern: String,
    output_path: Option<PathBuf>,
    format: Format,
    max_workers: Option<usize>,
    timeout: Option<u64>,
    notify: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    logger::init_with_level(if cli.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO });

    let config = Config::from_config(cli.config.as_ref())
        .context("Failed to load configuration")?
        .with_env();

    match cli.command {
        Commands::Discover {
            search_directory,
            pattern,
            output_path,
            format,
            max_workers,
            timeout,
            notify,
        } => {
            let args = DiscoverArgs {
                search_directory,
                pattern,
                output_path,
                format,
                max_workers,
                timeout,
                notify,
            };
            run_discover(args, &config).await
        }
        Commands::Check { search_directory, pattern } => {
            let tests = load_tests(&search_directory, &pattern)?;
            println!("{} tests found in {}", tests.len(), search_directory.display());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            print!("{config}");
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_tests(dir: &Path, pattern: &str) -> anyhow::Result<Vec<watchdog::WatchdogTest>> {
    definition::discover(dir, pattern)
        .with_context(|| format!("Failed to load test definitions from {}", dir.display()))
}

async fn run_discover(args: DiscoverArgs, config: &Config) -> anyhow::Result<ExitCode> {
    let tests = load_tests(&args.search_directory, &args.pattern)?;

    let max_workers = args.max_workers.unwrap_or(config.runner.max_workers);
    let timeout = args.timeout.map(Duration::from_secs).unwrap_or_else(|| config.runner.timeout());
    let runner =
        WatchdogRunner::new(max_workers, timeout).context("Failed to build the HTTP client")?;

    info!("Running {} tests", tests.len());
    let mut results = runner.run_tests(tests).await;
    report::sort_by_name(&mut results);

    let failures = results.iter().filter(|result| !result.success).count();

    match (&args.output_path, args.format) {
        (Some(path), _) => {
            let root = collect_results(results.iter().cloned());
            report::write_json(&root, path)?;
            info!("Report written to {}", path.display());
            print!("{}", report::render_text(&results));
        }
        (None, Format::Json) => {
            let root = collect_results(results.iter().cloned());
            println!("{}", report::render_json(&root)?);
        }
        (None, Format::Text) => print!("{}", report::render_text(&results)),
    }

    if args.notify || config.notify.enabled {
        send_notifications(&results, config).await;
    }

    if failures > 0 {
        warn!("{} of {} tests failed", failures, results.len());
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

async fn send_notifications(results: &[WatchdogResult], config: &Config) {
    let Some(mailgun) = config.mailgun.resolved() else {
        warn!("Notifications enabled but Mailgun is not configured, skipping");
        return;
    };

    let notifier = match MailgunNotifier::new(mailgun) {
        Ok(notifier) => notifier,
        Err(e) => {
            warn!("Failed to set up Mailgun: {}", e);
            return;
        }
    };

    let policy =
        if config.notify.on_success { NotifyPolicy::Always } else { NotifyPolicy::FailuresOnly };
    let summary = notify::notify_results(results, &notifier, policy).await;
    info!("Sent {} notifications, {} failed", summary.sent, summary.failed);
}
