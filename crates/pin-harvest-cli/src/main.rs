//! PinHarvest CLI — entry point.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use pin_harvest::{harvest, ChromiumSession, DedupLedger, HarvestReport, LaunchOptions};
use pin_harvest_cli::config::{
    build_options, resolve_ledger_path, resolve_settings_path, validate_target_url, RunOverrides,
    Settings,
};

#[derive(Parser)]
#[command(
    name = "pin-harvest",
    about = "PinHarvest — scroll a pin page and download every image not collected before",
    version
)]
struct Cli {
    /// Path to settings.json.
    #[arg(long, global = true)]
    settings: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest images from the configured pin page.
    Run(RunArgs),

    /// Show or update saved settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },

    /// Look up a URL in the ledger.
    Lookup {
        url: String,

        /// Path to the ledger database.
        #[arg(long)]
        ledger: Option<String>,
    },

    /// List ledger rows first recorded by a run directory.
    Runs {
        run_directory: String,

        /// Path to the ledger database.
        #[arg(long)]
        ledger: Option<String>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   pin-harvest completions bash > ~/.local/share/bash-completion/completions/pin-harvest
    ///   pin-harvest completions zsh > ~/.zfunc/_pin-harvest
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Pin page to harvest (overrides settings).
    #[arg(long)]
    url: Option<String>,

    /// Number of scroll iterations.
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Base scroll distance in pixels.
    #[arg(long)]
    scroll_increment: Option<u32>,

    /// Seconds to wait after each scroll.
    #[arg(long)]
    settle_secs: Option<f64>,

    /// Heading text that marks the end of the feed.
    #[arg(long)]
    sentinel: Option<String>,

    /// Proxy for the browser and downloads (also reads PROXY_URL).
    #[arg(long)]
    proxy: Option<String>,

    /// Directory that receives per-run folders.
    #[arg(long)]
    output: Option<String>,

    /// Path to the ledger database (also reads PIN_HARVEST_LEDGER).
    #[arg(long)]
    ledger: Option<String>,

    /// Re-download single-source images already in the ledger.
    #[arg(long)]
    overwrite: bool,

    /// Show the browser window.
    #[arg(long)]
    headed: bool,

    /// Chromium binary (also reads CHROME_PATH).
    #[arg(long)]
    chrome_path: Option<PathBuf>,

    /// Launch Chromium with --no-sandbox.
    #[arg(long)]
    no_sandbox: bool,

    /// Print the run report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Save cookie, target URL, or proxy.
    Save {
        /// Cookie header copied from a logged-in browser.
        #[arg(long)]
        cookie: Option<String>,

        /// Pin page URL (must contain /pin).
        #[arg(long)]
        url: Option<String>,

        /// Proxy URL.
        #[arg(long)]
        proxy: Option<String>,
    },

    /// Print the current settings (cookie masked).
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_file.as_deref())?;

    let settings_path = resolve_settings_path(cli.settings.as_deref());

    match cli.command {
        Commands::Run(args) => run(args, &settings_path).await?,

        Commands::Settings { action } => match action {
            SettingsAction::Save { cookie, url, proxy } => {
                let mut settings = Settings::load(&settings_path)?;
                if let Some(url) = url {
                    validate_target_url(&url)?;
                    settings.target_url = Some(url);
                }
                if let Some(cookie) = cookie {
                    settings.cookie_string = Some(cookie);
                }
                if let Some(proxy) = proxy {
                    settings.proxy_url = Some(proxy);
                }
                settings.save(&settings_path)?;
                println!("Settings saved to {}", settings_path.display());
            }
            SettingsAction::Show => {
                let mut settings = Settings::load(&settings_path)?;
                if let Some(cookie) = settings.cookie_string.as_mut() {
                    *cookie = format!("<{} chars>", cookie.len());
                }
                println!("{}", serde_json::to_string_pretty(&settings)?);
            }
        },

        Commands::Lookup { url, ledger } => {
            let ledger = open_ledger(ledger.as_deref(), &settings_path)?;
            match ledger.exists(&url)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => println!("Not collected: {url}"),
            }
        }

        Commands::Runs {
            run_directory,
            ledger,
        } => {
            let ledger = open_ledger(ledger.as_deref(), &settings_path)?;
            let records = ledger.records_for_run(&run_directory)?;
            for record in &records {
                println!(
                    "{}\t{}",
                    record.resolution_descriptor.as_deref().unwrap_or("-"),
                    record.url
                );
            }
            eprintln!("{} rows recorded by {run_directory}", records.len());
        }

        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "pin-harvest",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

fn init_logging(level: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

fn open_ledger(explicit: Option<&str>, settings_path: &Path) -> Result<DedupLedger> {
    let settings = Settings::load(settings_path)?;
    let path = resolve_ledger_path(explicit.or(settings.ledger_path.as_deref()));
    DedupLedger::open(&path).with_context(|| format!("failed to open ledger {}", path.display()))
}

async fn run(args: RunArgs, settings_path: &Path) -> Result<()> {
    let settings = Settings::load(settings_path)?;
    let overrides = RunOverrides {
        target_url: args.url,
        proxy_url: args.proxy,
        output_root: args.output,
        ledger_path: args.ledger,
        max_iterations: args.max_iterations,
        scroll_increment_px: args.scroll_increment,
        settle_delay_secs: args.settle_secs,
        sentinel_text: args.sentinel,
        overwrite_existing: args.overwrite,
    };
    let options = build_options(&settings, &overrides)?;

    let launch = LaunchOptions {
        chrome_path: args
            .chrome_path
            .or_else(|| std::env::var_os("CHROME_PATH").map(PathBuf::from)),
        headless: !args.headed,
        proxy_url: options.fetch.proxy_url.clone(),
        cookie_string: settings.cookie_string.clone(),
        no_sandbox: args.no_sandbox,
        ..LaunchOptions::default()
    };

    let session = ChromiumSession::launch(&launch)
        .await
        .context("failed to start browser")?;

    let result = harvest(&session, &options).await;

    if let Err(e) = session.shutdown().await {
        tracing::warn!("Browser shutdown failed: {e}");
    }

    let report = result.context("harvest failed")?;
    print_report(&report, args.json)?;
    Ok(())
}

fn print_report(report: &HarvestReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("Run directory:      {}", report.run_directory.display());
    println!("Scroll cycles:      {}", report.scroll_cycles);
    println!(
        "End of feed:        {}",
        if report.sentinel_reached { "reached" } else { "not reached" }
    );
    println!("Containers:         {}", report.containers_processed);
    println!("Downloaded:         {}", report.downloaded);
    println!("Already collected:  {}", report.already_collected);
    println!("Failed:             {}", report.failed);
    println!("Skipped:            {}", report.skipped);
    Ok(())
}
