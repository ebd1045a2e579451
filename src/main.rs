/// Version injected at compile time via PLANSPEC_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("PLANSPEC_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use planspec::{Config, Session};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Extract normalized resource specs from an infrastructure plan
#[derive(Parser, Debug)]
#[command(name = "planspec", version, about, long_about = None)]
struct Args {
    /// Plan document in JSON form (`terraform show -json`)
    #[arg(required_unless_present = "list_types")]
    plan: Option<PathBuf>,

    /// Cloud provider whose mappings to use
    #[arg(short, long)]
    provider: Option<String>,

    /// Directory with extra mapping declarations (<dir>/<provider>/*.yaml)
    #[arg(long)]
    mappings_dir: Option<PathBuf>,

    /// Directory with reference data files shadowing the embedded ones
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// List the resource types the provider mapping supports and exit
    #[arg(long)]
    list_types: bool,

    /// Print compact JSON instead of pretty-printed
    #[arg(long)]
    compact: bool,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off")]
    log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("planspec {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("planspec").join("planspec.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".planspec").join("planspec.log");
    }
    PathBuf::from("planspec.log")
}

fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    // Command line wins over the config file
    let mut config = Config::load();
    if let Some(provider) = args.provider {
        config.provider = provider;
    }
    if args.mappings_dir.is_some() {
        config.mappings_dir = args.mappings_dir;
    }
    if args.data_dir.is_some() {
        config.data_dir = args.data_dir;
    }

    let session = Session::new(config);
    let provider = session.config().provider.clone();

    if args.list_types {
        let mapping = session.mapping(&provider)?;
        for resource_type in mapping.resource_types() {
            println!("{}", resource_type);
        }
        return Ok(());
    }

    let Some(plan_path) = args.plan else {
        anyhow::bail!("no plan document given");
    };
    let content = std::fs::read_to_string(&plan_path)
        .with_context(|| format!("Failed to read plan {:?}", plan_path))?;
    let plan: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse plan {:?}", plan_path))?;

    let extraction = session
        .extract(&plan, &provider)
        .with_context(|| format!("Extraction of {:?} aborted", plan_path))?;

    let output = if args.compact {
        serde_json::to_string(&extraction)?
    } else {
        serde_json::to_string_pretty(&extraction)?
    };
    println!("{}", output);

    for unresolved in &extraction.unresolved {
        eprintln!(
            "unresolved {} ({}): {}",
            unresolved.address, unresolved.resource_type, unresolved.reason
        );
    }

    Ok(())
}
