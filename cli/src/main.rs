use std::path::PathBuf;

use catalog_cache::{CacheConfig, CacheInfo, CatalogCache, DataOrigin};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "catalog-cache")]
#[command(about = "Refresh and inspect the local catalog cache", version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the source files (overrides the config).
    #[arg(long, global = true)]
    source_dir: Option<PathBuf>,
    /// Directory holding the database and fallback blob (overrides the config).
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Load the catalog (from cache when valid) and print row counts.
    #[command(alias = "stats")]
    Load,
    /// Re-fetch from the source and replace the cached generation.
    Refresh,
    /// Show the state of the persisted cache.
    Info,
    /// Drop the cached catalog and fallback blob. Other tables are kept.
    Clear,
    /// Re-enable structured storage after it was disabled this session.
    ResetStorage,
    /// Print one component as JSON.
    Component(LookupArgs),
    /// Print the compositions of a revision (`item_id|version`), one JSON
    /// object per line.
    Compositions(LookupArgs),
    /// Write the effective configuration as YAML.
    InitConfig(InitConfigArgs),
}

#[derive(Debug, Args)]
struct LookupArgs {
    key: String,
}

#[derive(Debug, Args)]
struct InitConfigArgs {
    /// Output path for the YAML file.
    #[arg(long)]
    output: PathBuf,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = load_config(&cli.global).and_then(|config| run(config, cli.command));

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn load_config(global: &GlobalArgs) -> Result<CacheConfig, String> {
    let mut config = match &global.config {
        Some(path) => CacheConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
        None => CacheConfig::default(),
    };
    if let Some(dir) = &global.source_dir {
        config.source_dir = Some(dir.clone());
    }
    if let Some(dir) = &global.cache_dir {
        config.cache_dir = dir.clone();
    }
    Ok(config)
}

fn open_cache(config: CacheConfig) -> Result<CatalogCache, String> {
    CatalogCache::builder(config)
        .build()
        .map_err(|e| format!("Failed to set up cache: {e}"))
}

fn run(config: CacheConfig, command: Command) -> Result<(), String> {
    match command {
        Command::InitConfig(args) => run_init_config(&config, args),
        Command::Load => run_load(&mut open_cache(config)?),
        Command::Refresh => run_refresh(&mut open_cache(config)?),
        Command::Info => {
            print_info(&open_cache(config)?.cache_info());
            Ok(())
        }
        Command::Clear => {
            open_cache(config)?
                .clear_cache()
                .map_err(|e| format!("Clear failed: {e}"))?;
            println!("Cache cleared.");
            Ok(())
        }
        Command::ResetStorage => run_reset_storage(config),
        Command::Component(args) => run_component(&mut open_cache(config)?, &args.key),
        Command::Compositions(args) => run_compositions(&mut open_cache(config)?, &args.key),
    }
}

// ---------------------------------------------------------------------------
// load command
// ---------------------------------------------------------------------------

fn run_load(cache: &mut CatalogCache) -> Result<(), String> {
    let origin = cache.initialize();
    println!("Loaded from {origin}:");
    print_row_counts(cache);
    if origin == DataOrigin::Empty {
        return Err("no catalog data available".to_string());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// refresh command
// ---------------------------------------------------------------------------

fn run_refresh(cache: &mut CatalogCache) -> Result<(), String> {
    if !cache.refresh() {
        let origin = cache.origin().unwrap_or(DataOrigin::Empty);
        return Err(format!("Refresh failed, serving {origin}"));
    }
    println!("Refresh complete:");
    print_row_counts(cache);
    Ok(())
}

// ---------------------------------------------------------------------------
// component and compositions commands
// ---------------------------------------------------------------------------

fn run_component(cache: &mut CatalogCache, id: &str) -> Result<(), String> {
    cache.initialize();
    let record = cache
        .component(id)
        .ok_or_else(|| format!("Component '{id}' not found"))?;
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| format!("Failed to serialize component: {e}"))?;
    println!("{json}");
    Ok(())
}

fn run_compositions(cache: &mut CatalogCache, revision: &str) -> Result<(), String> {
    cache.initialize();
    for record in cache.compositions_for_revision(revision) {
        let json = serde_json::to_string(record)
            .map_err(|e| format!("Failed to serialize composition: {e}"))?;
        println!("{json}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// reset-storage command
// ---------------------------------------------------------------------------

fn run_reset_storage(config: CacheConfig) -> Result<(), String> {
    let persisted = config.session_file.is_some();
    open_cache(config)?.reset_storage();
    if persisted {
        println!("Structured storage re-enabled.");
    } else {
        println!("No session_file configured: breaker state lives only for one run, nothing to reset.");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// init-config command
// ---------------------------------------------------------------------------

fn run_init_config(config: &CacheConfig, args: InitConfigArgs) -> Result<(), String> {
    config
        .save(&args.output)
        .map_err(|e| format!("Failed to write '{}': {e}", args.output.display()))?;
    println!("Wrote {}", args.output.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_row_counts(cache: &CatalogCache) {
    let Some(index) = cache.index() else {
        return;
    };
    for (table, rows) in index.dataset().row_counts() {
        println!("  {table}: {rows}");
    }
    if index.unresolved_compositions() > 0 {
        println!(
            "  ({} compositions with unresolved references)",
            index.unresolved_compositions()
        );
    }
}

fn print_info(info: &CacheInfo) {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    println!("Cache Info:");
    println!("  Store: {:?}", info.store);
    println!("  Exists: {}", yes_no(info.exists));
    match info.age_ms {
        Some(age) => println!("  Age: {}s", age / 1000),
        None => println!("  Age: -"),
    }
    println!("  Valid: {}", yes_no(info.is_valid));
    match info.source {
        Some(origin) => println!("  Source: {origin}"),
        None => println!("  Source: -"),
    }
}
