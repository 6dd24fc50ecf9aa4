use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vaultsync::config::{LoggingConfig, MAX_INTERVAL_MINUTES, MIN_INTERVAL_MINUTES};
use vaultsync::health::CheckResult;
use vaultsync::{AutoSync, Config, HealthCheck, SyncEngine, SyncHistory, SyncOperation, SyncResult};

#[derive(Parser)]
#[command(name = "vaultsync")]
#[command(about = "Synchronize a local vault with a GitHub repository")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a configuration file
    Init {
        /// Vault directory
        #[arg(long)]
        vault: Option<String>,

        /// Account or organization owning the repository
        #[arg(long)]
        owner: Option<String>,

        /// Repository name
        #[arg(long)]
        repository: Option<String>,

        /// Branch to sync with
        #[arg(long)]
        branch: Option<String>,

        /// Personal access token (prefer the GITHUB_TOKEN environment variable)
        #[arg(long)]
        token: Option<String>,
    },

    /// Upload every eligible vault file as one commit
    Push,

    /// Download every eligible remote file, overwriting local copies
    Pull,

    /// Upload local files, then download files that only exist remotely
    Sync,

    /// Run sync periodically in the foreground
    Auto,

    /// System health check and diagnostics
    Doctor,

    /// Show configuration summary and recent operations
    Status {
        /// Number of past operations to show
        #[arg(short, long, default_value_t = 5)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref());
    let logging = config
        .as_ref()
        .map(|c| c.logging.clone())
        .unwrap_or_default();
    init_logging(cli.verbose, &logging)?;
    info!("Starting vaultsync v{}", env!("CARGO_PKG_VERSION"));

    let config = config?;
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_config_path()?,
    };

    match cli.command {
        Commands::Init {
            vault,
            owner,
            repository,
            branch,
            token,
        } => cmd_init(config, &config_path, vault, owner, repository, branch, token),
        Commands::Push => cmd_run(SyncOperation::Push, config).await,
        Commands::Pull => cmd_run(SyncOperation::Pull, config).await,
        Commands::Sync => cmd_run(SyncOperation::Sync, config).await,
        Commands::Auto => cmd_auto(config, config_path).await,
        Commands::Doctor => cmd_doctor(&config).await,
        Commands::Status { limit } => cmd_status(&config, &config_path, limit),
    }
}

/// Initialize logging from configuration, `--verbose` and RUST_LOG
fn init_logging(verbose: bool, logging: &LoggingConfig) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(logging.color).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<&std::path::Path>) -> Result<Config> {
    match config_path {
        Some(path) if path.exists() => Config::load(path),
        Some(_) => {
            let mut config = Config::default();
            config.apply_env_overrides();
            config.expand_paths()?;
            Ok(config)
        }
        None => Config::load_or_default(),
    }
}

fn open_history(config: &Config) -> Option<SyncHistory> {
    if !config.history.enabled {
        return None;
    }
    match SyncHistory::open(&config.history) {
        Ok(history) => Some(history),
        Err(e) => {
            warn!("Sync history unavailable: {:#}", e);
            None
        }
    }
}

fn cmd_init(
    mut config: Config,
    config_path: &std::path::Path,
    vault: Option<String>,
    owner: Option<String>,
    repository: Option<String>,
    branch: Option<String>,
    token: Option<String>,
) -> Result<()> {
    info!("Initializing vaultsync...");

    if let Some(vault) = vault {
        config.vault.path = shellexpand::full(&vault)?.into_owned();
    }
    if let Some(owner) = owner {
        config.github.owner = owner;
    }
    if let Some(repository) = repository {
        config.github.repository = repository;
    }
    if let Some(branch) = branch {
        config.github.branch = branch;
    }
    let token_from_flag = token.is_some();
    match token {
        Some(token) => config.github.token = token,
        // Never persist a token that only came from the environment
        None => {
            if std::env::var("GITHUB_TOKEN").ok().as_deref() == Some(config.github.token.as_str()) {
                config.github.token.clear();
            }
        }
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }
    config.save(config_path)?;
    info!("Configuration saved to: {:?}", config_path);

    println!("✅ vaultsync initialized successfully!");
    println!("   Config: {}", config_path.display());
    println!("   Vault: {}", config.vault.path);
    if token_from_flag {
        println!("   ⚠️  The token is stored in plain text in the config file");
    }
    if config.github.owner.is_empty() || config.github.repository.is_empty() {
        println!("   Next: set github.owner and github.repository, then run 'vaultsync doctor'");
    } else {
        println!("   Next: run 'vaultsync doctor', then 'vaultsync push'");
    }

    Ok(())
}

/// Run one push, pull or sync and exit non-zero on failure
async fn cmd_run(operation: SyncOperation, config: Config) -> Result<()> {
    let history = open_history(&config);
    let engine = SyncEngine::from_config(config);

    println!("🔄 Running {}...", operation);
    let result = engine.execute(operation).await;

    if let Some(history) = &history {
        if let Err(e) = history.record(operation, &result) {
            warn!("Failed to record sync history: {:#}", e);
        }
    }

    print_result(&result);
    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_auto(config: Config, config_path: PathBuf) -> Result<()> {
    if !config.interval_in_recommended_range() {
        warn!(
            "Auto-sync interval of {} minutes is outside the recommended {}-{} minutes",
            config.sync.interval_minutes, MIN_INTERVAL_MINUTES, MAX_INTERVAL_MINUTES
        );
    }
    if !config.sync.auto_sync {
        println!("❌ Auto-sync is disabled");
        println!("   Set sync.auto_sync: true in {}", config_path.display());
        std::process::exit(1);
    }

    println!(
        "🖥️  Auto-sync every {} minutes (Ctrl+C to stop)",
        config.sync.interval_minutes
    );

    let history = open_history(&config);
    let reload_path = config_path.exists().then_some(config_path);
    let engine = Arc::new(SyncEngine::from_config(config));
    let mut daemon = AutoSync::new(engine, reload_path);
    if let Some(history) = history {
        daemon = daemon.with_history(history);
    }

    daemon.run().await?;

    let status = daemon.status();
    println!("📊 Auto-sync statistics:");
    println!("   ⏱️  Uptime: {:.1}m", status.uptime.as_secs_f64() / 60.0);
    println!("   Total: {}", status.total_syncs);
    println!("   Successful: {}", status.successful_syncs);
    println!("   Failed: {}", status.failed_syncs);
    println!("   Skipped ticks: {}", status.skipped_ticks);
    Ok(())
}

/// System health check and diagnostics
async fn cmd_doctor(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config).await;
    print_health_report(&health);
    if !health.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_status(config: &Config, config_path: &std::path::Path, limit: u32) -> Result<()> {
    println!("📊 vaultsync status");
    println!("   📄 Config: {}", config_path.display());
    println!("   📁 Vault: {}", config.vault.path);
    if config.is_configured() {
        println!(
            "   🔗 Repository: {}/{} ({})",
            config.github.owner, config.github.repository, config.github.branch
        );
    } else {
        println!("   🔗 Repository: not configured");
    }
    println!(
        "   🔄 Auto-sync: {} (every {} minutes)",
        if config.sync.auto_sync { "enabled" } else { "disabled" },
        config.sync.interval_minutes
    );

    let Some(history) = open_history(config) else {
        println!("   History is disabled");
        return Ok(());
    };

    let runs = history.recent(limit)?;
    if runs.is_empty() {
        println!("\n   No operations recorded yet");
        return Ok(());
    }

    println!("\n🕒 Recent operations:");
    for run in runs {
        let icon = if run.success { "✅" } else { "❌" };
        println!(
            "   {} {} {:<5} ↑{} ↓{}  {}",
            icon,
            run.timestamp
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M"),
            run.operation.as_str(),
            run.files_uploaded,
            run.files_downloaded,
            run.message
        );
    }

    Ok(())
}

fn print_result(result: &SyncResult) {
    if result.success {
        println!("✅ {}", result.message);
        println!("   ⬆️  Uploaded: {}", result.files_uploaded);
        println!("   ⬇️  Downloaded: {}", result.files_downloaded);
    } else {
        println!("❌ {}", result.message);
        if let Some(kind) = result.failure {
            println!("   Reason: {}", kind.as_str());
        }
    }
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning { "⚠️ " } else { "✅" }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 vaultsync Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    if health.all_passed() {
        println!("✅ All checks passed");
    } else {
        println!("❌ Some checks failed");
    }
}
