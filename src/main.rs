//! wikidat: load encyclopedia dumps into a relational store

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wikidat::{
    config::{Config, ExecutionMode, LogFormat},
    import::read_namespaces,
    pipeline::{run_stage, Launcher, Orchestrator, ProcessLauncher, StageSpec, TaskLauncher},
    storage::SchemaMode,
};

#[derive(Parser)]
#[command(name = "wikidat")]
#[command(about = "Load encyclopedia dump files into a relational store")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "wikidat.toml", global = true)]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode, transform and load dump files
    Run {
        /// Dump files (.xml, .bz2, .gz, .7z, .lzma)
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Number of independent pipeline lines
        #[arg(long)]
        lines: Option<usize>,

        /// Language key of the dump, e.g. enwiki
        #[arg(long)]
        language: Option<String>,

        /// Keep existing tables instead of recreating them
        #[arg(long)]
        reuse_schema: bool,

        /// Run stages as processes or as tasks
        #[arg(long, value_enum)]
        execution: Option<ExecutionMode>,
    },

    /// Write a default configuration file
    Init {
        /// Output file
        #[arg(default_value = "wikidat.toml")]
        path: PathBuf,
    },

    /// Print the namespace table of a dump
    Namespaces {
        /// Dump file
        path: PathBuf,
    },

    /// Run a single pipeline stage (used by the process launcher)
    #[command(hide = true)]
    Stage {
        /// JSON stage description
        #[arg(long)]
        spec: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    // Setup logging; stdout is reserved for stage reports
    let level = config.logging.level.raised(cli.verbose);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match config.logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    match cli.command {
        Commands::Run {
            paths,
            lines,
            language,
            reuse_schema,
            execution,
        } => {
            let mut config = config;
            if let Some(lines) = lines {
                config.pipeline.lines = lines;
            }
            if let Some(language) = language {
                config.pipeline.language = language;
            }
            if reuse_schema {
                config.pipeline.schema_mode = SchemaMode::Reuse;
            }
            if let Some(execution) = execution {
                config.pipeline.execution = execution;
            }
            config.validate()?;

            let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| level.as_str().to_string());
            let config_path = cli.config.exists().then_some(cli.config);
            run_pipeline(config, paths, config_path, log_filter).await
        }
        Commands::Init { path } => init_config(path).await,
        Commands::Namespaces { path } => show_namespaces(path).await,
        Commands::Stage { spec } => run_single_stage(spec).await,
    }
}

async fn run_pipeline(
    config: Config,
    paths: Vec<PathBuf>,
    config_path: Option<PathBuf>,
    log_filter: String,
) -> Result<()> {
    let launcher: Arc<dyn Launcher> = match config.pipeline.execution {
        ExecutionMode::Tasks => Arc::new(TaskLauncher),
        ExecutionMode::Processes => {
            let mut launcher = ProcessLauncher::current()?.with_log_filter(log_filter);
            if let Some(path) = config_path {
                launcher = launcher.with_config(path);
            }
            Arc::new(launcher)
        }
    };

    let failure_logs: Vec<PathBuf> = (0..config.pipeline.lines)
        .map(|line| config.storage.failure_log_path(line))
        .collect();

    info!(
        "Loading {} dump files on {} lines into {}",
        paths.len(),
        config.pipeline.lines,
        config.storage.url
    );
    let mut orchestrator = Orchestrator::new(config, launcher);
    let report = match orchestrator.run(&paths).await {
        Ok(report) => report,
        Err(e) => {
            let written: Vec<_> = failure_logs.iter().filter(|path| path.exists()).collect();
            if !written.is_empty() {
                eprintln!("\nFailure logs:");
                for path in written {
                    eprintln!("  {}", path.display());
                }
            }
            anyhow::bail!("Run failed in state {}: {}", orchestrator.state(), e);
        }
    };

    println!("\nRun Summary");
    println!("===========");
    for line in &report.lines {
        println!("Line {} ({} files)", line.line, line.files.len());
        for stage in &line.stages {
            print!(
                "  {:<28} in {:>10}  out {:>10}  skipped {:>8}",
                stage.stage, stage.received, stage.emitted, stage.skipped
            );
            match &stage.load {
                Some(load) => println!(
                    "  cycles {:>4}  failed chunks {}",
                    load.cycles, load.chunks_failed
                ),
                None => println!(),
            }
        }
    }

    let failure_logs = report.failure_logs();
    if !failure_logs.is_empty() {
        println!("\nSome bulk loads failed; staged copies are listed in:");
        for path in failure_logs {
            println!("  {}", path.display());
        }
    }

    Ok(())
}

async fn init_config(path: PathBuf) -> Result<()> {
    if path.exists() {
        anyhow::bail!("Refusing to overwrite existing file: {}", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, Config::default_toml()?)?;
    println!("Created configuration file: {}", path.display());
    Ok(())
}

async fn show_namespaces(path: PathBuf) -> Result<()> {
    let namespaces = tokio::task::spawn_blocking(move || read_namespaces(&path)).await??;
    for (code, name) in namespaces.iter() {
        println!("{:>6}  {}", code, if name.is_empty() { "(main)" } else { name });
    }
    Ok(())
}

async fn run_single_stage(spec: String) -> Result<()> {
    let spec: StageSpec = serde_json::from_str(&spec)
        .map_err(|e| anyhow::anyhow!("Invalid stage spec: {}", e))?;
    let name = spec.name();
    let report = run_stage(spec)
        .await
        .map_err(|e| anyhow::anyhow!("{} failed: {}", name, e))?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
