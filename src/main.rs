use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::{theme::ColorfulTheme, Input, Password};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use repos::config::resolve_target_dir;
use repos::github::auth;
use repos::{Config, Error, Owner, SyncEngine, SyncRequest, SyncResult, SyncSummary};

#[derive(Parser)]
#[command(name = "repos")]
#[command(about = "Clone or pull every repository of a GitHub organization or user")]
#[command(version)]
struct Cli {
    /// Sync every stored organization/user pair from the config file
    /// (defaults to the XDG config location)
    #[arg(short, long, value_name = "PATH")]
    config: Option<Option<PathBuf>>,

    /// GitHub organization name
    #[arg(short, long)]
    org: Option<String>,

    /// GitHub username
    #[arg(short, long)]
    user: Option<String>,

    /// Directory where repositories should be cloned
    #[arg(short, long)]
    dir: Option<String>,

    /// GitHub API root (e.g. https://github.example.com/api/v3)
    #[arg(long)]
    api_url: Option<String>,

    /// Maximum concurrent clone/pull operations (unbounded by default)
    #[arg(long)]
    max_parallel: Option<usize>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn has_owner_flags(&self) -> bool {
        self.org.is_some() || self.user.is_some() || self.dir.is_some()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Conflicting owner flags fail before the config file is touched.
    let owner = if cli.config.is_none() && cli.has_owner_flags() {
        Some(Owner::from_parts(cli.org.as_deref(), cli.user.as_deref())?)
    } else {
        None
    };

    let config_path = match &cli.config {
        Some(Some(path)) => path.clone(),
        _ => Config::default_config_path()?,
    };
    let (config, created) = load_config(&cli, &config_path)?;

    init_logging(cli.verbose, &config.logging.level)?;
    info!("Starting repos v{}", env!("CARGO_PKG_VERSION"));

    if created {
        config.save(&config_path)?;
        info!("Created default configuration at: {:?}", config_path);
    }

    let api_url = cli
        .api_url
        .clone()
        .unwrap_or_else(|| config.github.api_url.clone());

    let mut sync_config = config.sync.clone();
    if cli.max_parallel.is_some() {
        sync_config.max_parallel = cli.max_parallel;
    }
    let engine = SyncEngine::from_config(&sync_config);

    if cli.config.is_some() {
        return cmd_stored_pairs(&engine, &config, &api_url).await;
    }

    let request = match owner {
        Some(owner) => request_from_flags(&cli, owner, &config, &api_url)?,
        None => prompt_request(&config, &api_url)?,
    };

    run_request(&engine, &request).await?;
    remember_pair(config, &config_path, &request)
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool, level: &str) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

/// Load the config file; an explicit `--config PATH` has to exist.
///
/// Returns defaults and `true` when the default file is still missing.
fn load_config(cli: &Cli, path: &Path) -> Result<(Config, bool)> {
    match &cli.config {
        Some(Some(_)) => Ok((Config::load(path)?, false)),
        _ => Ok(match Config::load_existing(path)? {
            Some(config) => (config, false),
            None => (Config::default(), true),
        }),
    }
}

/// Sync every stored pair, stopping at the first fatal error
async fn cmd_stored_pairs(engine: &SyncEngine, config: &Config, api_url: &str) -> Result<()> {
    if config.pairs.is_empty() {
        println!("No stored organization/user pairs. Run with --org or --user first.");
        return Ok(());
    }

    let token = resolve_token(&config.github.auth_method, true)?;
    let requests = config.requests(api_url, &token)?;

    for request in &requests {
        run_request(engine, request).await?;
    }

    Ok(())
}

/// Build the request from --org/--user/--dir without prompting
fn request_from_flags(
    cli: &Cli,
    owner: Owner,
    config: &Config,
    api_url: &str,
) -> Result<SyncRequest> {
    let token = resolve_token(&config.github.auth_method, false)?;
    let directory = cli.dir.as_deref().unwrap_or_default();

    Ok(SyncRequest::new(api_url, owner, token, directory)?)
}

/// Ask for owner, token and directory on the terminal
fn prompt_request(config: &Config, api_url: &str) -> Result<SyncRequest> {
    let theme = ColorfulTheme::default();

    let org: String = Input::with_theme(&theme)
        .with_prompt("GitHub organization name (leave empty to sync a user)")
        .allow_empty(true)
        .interact_text()?;

    let user: String = if org.trim().is_empty() {
        Input::with_theme(&theme)
            .with_prompt("GitHub username (leave empty to sync an organization)")
            .allow_empty(true)
            .interact_text()?
    } else {
        String::new()
    };

    let owner = Owner::from_parts(Some(&org), Some(&user))?;
    let token = resolve_token(&config.github.auth_method, true)?;

    let default_dir = resolve_target_dir(&owner, "")?;
    let directory: String = Input::with_theme(&theme)
        .with_prompt(format!(
            "Directory where repositories should be cloned (empty for {})",
            default_dir.display()
        ))
        .allow_empty(true)
        .interact_text()?;

    Ok(SyncRequest::new(api_url, owner, token, &directory)?)
}

/// Resolve the access token, falling back to a masked prompt when allowed
/// and stdin is a terminal
fn resolve_token(auth_method: &str, allow_prompt: bool) -> Result<String> {
    match auth::resolve_token(auth_method) {
        Ok((strategy, token)) => {
            info!("Using authentication strategy: {:?}", strategy);
            Ok(token)
        }
        Err(Error::AuthMissing(reason)) if allow_prompt && std::io::stdin().is_terminal() => {
            info!("No stored credentials ({}), asking for a token", reason);
            let token = Password::with_theme(&ColorfulTheme::default())
                .with_prompt("Enter personal access token")
                .interact()
                .context("Failed to read access token")?;
            Ok(token.trim().to_string())
        }
        Err(e) => Err(e.into()),
    }
}

/// List and sync one owner, then print the totals
async fn run_request(engine: &SyncEngine, request: &SyncRequest) -> Result<SyncSummary> {
    println!(
        "Clone or pull repositories of {} into {}",
        request.owner,
        request.target_dir.display()
    );

    let summary = engine
        .run(request)
        .await
        .with_context(|| format!("Failed to sync repositories of {}", request.owner))?;

    print_summary(&summary);
    Ok(summary)
}

fn print_summary(summary: &SyncSummary) {
    println!("Total number of repositories: {}", summary.total_repositories);
    println!(
        "   Cloned: {}, pulled: {}, failed: {} ({:.2}s)",
        summary.cloned,
        summary.pulled,
        summary.failed,
        summary.duration.as_secs_f64()
    );

    for result in summary.failures() {
        if let SyncResult::Failed { error, .. } = result {
            println!("   ❌ {}", error);
        }
    }
}

/// Store the owner/directory pair of a successful run
fn remember_pair(mut config: Config, config_path: &Path, request: &SyncRequest) -> Result<()> {
    let pair = request.pair();
    if config.record_pair(pair.clone()) {
        config.save(config_path)?;
        info!("Remembered {} in {:?}", pair, config_path);
    } else {
        debug!("{} is already stored in {:?}", pair, config_path);
    }
    Ok(())
}
