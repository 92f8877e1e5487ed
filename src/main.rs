//! plg-sdk command line.
//!
//! ```text
//! plg-sdk [--debug] [--schema FILE] <command>
//!
//!   init             write a commented plg-sdk-config.toml
//!   version          print the tool version
//!   config-validate  validate the resolved configuration
//!   modules          show installed vs upstream module versions
//!   install          install or upgrade modules
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, SystemTime};

use clap::{Parser, Subcommand};

use plg_sdk::config::validation::{resolve_namespace, ALL_MODULES};
use plg_sdk::config::{template, validate_config, ConfigPaths, ConfigStore, ConfigValue};
use plg_sdk::modules::cache::MAX_MODULES;
use plg_sdk::modules::{CacheSnapshot, ModuleVersionCache, PipResolver, PYPI_BASE_URL};
use plg_sdk::observability::logging;
use plg_sdk::version::canonicalize;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "plg-sdk")]
#[command(about = "Project tooling for plg modules", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Use an alternate config schema file
    #[arg(long, global = true)]
    schema: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter plg-sdk-config.toml into the current directory
    Init {
        /// Omit description comments
        #[arg(short, long)]
        no_comments: bool,

        /// Overwrite an existing config file
        #[arg(short, long)]
        force: bool,
    },
    /// Print the plg-sdk version
    Version,
    /// Validate the configuration only
    ConfigValidate,
    /// Show installed and upstream versions of the allowed modules
    Modules {
        /// Query the registry even if the cache is fresh
        #[arg(short, long)]
        refresh: bool,

        /// Hours before cached upstream versions are refreshed
        #[arg(long, default_value_t = 24)]
        ttl_hours: u64,

        /// PyPI-compatible JSON API base URL
        #[arg(long, default_value = PYPI_BASE_URL)]
        registry: String,
    },
    /// Install or upgrade modules with pip
    Install {
        #[arg(required = true)]
        modules: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let log = logging::init(cli.debug);

    match run(cli, &log).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Exit code 3");
            ExitCode::from(3)
        }
    }
}

async fn run(cli: Cli, log: &logging::LogHandle) -> Result<ExitCode, Box<dyn Error>> {
    let mut paths = ConfigPaths::from_current_dir()?;
    paths.schema = cli.schema;

    let mut store = ConfigStore::init(&paths)?;
    if cli.debug {
        store.set("plg-sdk.debug", true);
    }
    log.set_debug(store.get_bool("plg-sdk.debug", false));

    tracing::debug!(
        version = VERSION,
        work_dir = ?paths.work_dir,
        config_file = ?paths.config_file,
        "plg-sdk starting"
    );

    match cli.command {
        Commands::Init { no_comments, force } => init(&paths, &store, no_comments, force),
        Commands::Version => {
            println!("{VERSION}");
            Ok(ExitCode::SUCCESS)
        }
        Commands::ConfigValidate => Ok(if config_validate(&store) {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }),
        Commands::Modules {
            refresh,
            ttl_hours,
            registry,
        } => {
            if !config_validate(&store) {
                return Ok(ExitCode::FAILURE);
            }
            let ttl = Duration::from_secs(ttl_hours.saturating_mul(3600));
            show_modules(&paths, &store, refresh, ttl, &registry).await
        }
        Commands::Install { modules } => {
            let mut resolver = PipResolver::for_python(&python(&store), PYPI_BASE_URL)?;
            let modules: BTreeSet<String> = modules.into_iter().collect();
            let installed =
                tokio::task::spawn_blocking(move || resolver.update_install_modules(modules)).await?;
            if installed {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}

fn init(
    paths: &ConfigPaths,
    store: &ConfigStore,
    no_comments: bool,
    force: bool,
) -> Result<ExitCode, Box<dyn Error>> {
    if paths.config_file.exists() && !force {
        tracing::error!(path = ?paths.config_file, "Config file already exists, use --force to overwrite");
        return Ok(ExitCode::FAILURE);
    }

    let text = template::render(store.schema(), VERSION, !no_comments)?;
    fs::write(&paths.config_file, text)?;
    tracing::info!(path = ?paths.config_file, "Config file written");
    Ok(ExitCode::SUCCESS)
}

/// Log every finding; true when the configuration has no errors.
fn config_validate(store: &ConfigStore) -> bool {
    let report = validate_config(store);

    for warning in report.warnings() {
        tracing::warn!("{warning}");
    }
    for error in report.errors() {
        tracing::error!("{error}");
    }

    if !report.is_ok() {
        tracing::error!("Configuration is invalid");
        return false;
    }

    if report.warnings().is_empty() {
        tracing::info!(namespace = ?resolve_namespace(store), "Configuration is valid");
    } else {
        tracing::warn!("Configuration is usable, but has warnings");
    }
    true
}

async fn show_modules(
    paths: &ConfigPaths,
    store: &ConfigStore,
    refresh: bool,
    ttl: Duration,
    registry: &str,
) -> Result<ExitCode, Box<dyn Error>> {
    let mut resolver = PipResolver::for_python(&python(store), registry)?;
    resolver.setup_modules(declared_modules(store));

    // pip metadata lookups spawn processes.
    let (resolver, installed) = tokio::task::spawn_blocking(move || {
        let installed = resolver.request_local_versions();
        (resolver, installed)
    })
    .await?;

    let cache = ModuleVersionCache::new(paths.module_cache_file());
    let mut snapshot = cache.load();
    let now = SystemTime::now();

    if refresh || snapshot.needs_refresh(resolver.modules(), ttl, now) {
        let upstream = resolver.request_pip_versions().await;
        snapshot = snapshot.merge(upstream, now);

        if snapshot.modules.len() > MAX_MODULES {
            tracing::warn!(
                modules = snapshot.modules.len(),
                "Too many modules for the version cache, not saving"
            );
        } else if let Err(e) = cache.save(&snapshot) {
            tracing::warn!(path = ?cache.path(), error = %e, "Failed to save module cache");
        }
    } else {
        tracing::debug!(path = ?cache.path(), "Using cached upstream versions");
    }

    print_versions(&installed, &snapshot);
    Ok(ExitCode::SUCCESS)
}

/// Modules named in `modules.allowed`, with `all` expanded to the schema list.
fn declared_modules(store: &ConfigStore) -> Vec<String> {
    let allowed = store
        .get("modules.allowed")
        .and_then(ConfigValue::as_string_array)
        .unwrap_or_default();

    if allowed.iter().any(|m| m == ALL_MODULES) {
        store.modules().to_vec()
    } else {
        allowed.to_vec()
    }
}

fn python(store: &ConfigStore) -> PathBuf {
    store
        .get("plg-sdk.python")
        .and_then(ConfigValue::as_path)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("python3"))
}

fn print_versions(installed: &BTreeMap<String, Option<String>>, snapshot: &CacheSnapshot) {
    let width = installed.keys().map(String::len).max().unwrap_or(0).max("MODULE".len());
    println!("{:<width$}  {:<14}  {:<14}", "MODULE", "INSTALLED", "UPSTREAM");

    for (module, local) in installed {
        let local = local.as_deref().unwrap_or("-");
        let upstream = snapshot
            .modules
            .get(module)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .unwrap_or("?");

        let outdated = local != "-"
            && upstream != "?"
            && canonicalize(local).unwrap_or_else(|| local.to_string())
                != canonicalize(upstream).unwrap_or_else(|| upstream.to_string());
        let marker = if outdated { "  (update available)" } else { "" };

        println!("{module:<width$}  {local:<14}  {upstream:<14}{marker}");
    }
}
