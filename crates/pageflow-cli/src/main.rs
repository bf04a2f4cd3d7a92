//! pageflow CLI: run synthetic long/double pipelines and print run stats.

mod pipeline;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pageflow_core::config::EngineConfig;
use pageflow_exec::Engine;

use crate::pipeline::SyntheticPipeline;

#[derive(Parser)]
#[command(name = "pageflow")]
#[command(about = "Pull-based columnar pipelines over memory-accounted pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic (long, double) pipeline and print stats as JSON
    Run {
        /// Number of generated rows
        #[arg(short, long, default_value_t = 100_000)]
        rows: usize,

        /// Make every Nth long (and the row before's double) null; 0 disables
        #[arg(long, default_value_t = 0)]
        null_every: usize,

        /// Predicate such as "l > 10" or "d <= 2.5"
        #[arg(long)]
        filter: Option<String>,

        /// Stop after this many rows (per pipeline instance)
        #[arg(long)]
        limit: Option<usize>,

        /// Aggregation such as "count(*)" or "sum(l)"; repeatable
        #[arg(long = "aggregate")]
        aggregates: Vec<String>,

        /// Pipeline instances run concurrently over disjoint row ranges
        #[arg(long, default_value_t = 1)]
        parallel: usize,

        /// JSON config file (defaults to PAGEFLOW_* environment variables)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Breaker ceiling in bytes (overrides config)
        #[arg(long)]
        mem_cap: Option<usize>,

        /// Positions per source page (overrides config)
        #[arg(long)]
        max_page_positions: Option<usize>,

        /// Concurrent pipeline instances (overrides config)
        #[arg(long)]
        max_parallel: Option<usize>,
    },

    /// Print the effective configuration as JSON
    Config {
        /// JSON config file (defaults to PAGEFLOW_* environment variables)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            rows,
            null_every,
            filter,
            limit,
            aggregates,
            parallel,
            config,
            mem_cap,
            max_page_positions,
            max_parallel,
        } => {
            let pipeline = SyntheticPipeline {
                rows,
                null_every,
                filter,
                limit,
                aggregates,
                parallel,
            };
            let overrides = Overrides {
                mem_cap,
                max_page_positions,
                max_parallel,
            };
            if let Err(e) = run_pipeline(&pipeline, config.as_deref(), overrides) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Config { config } => match load_config(config.as_deref()) {
            Ok(cfg) => match serde_json::to_string_pretty(&cfg) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            },
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Overrides {
    mem_cap: Option<usize>,
    max_page_positions: Option<usize>,
    max_parallel: Option<usize>,
}

impl Overrides {
    fn apply(self, cfg: &mut EngineConfig) {
        if let Some(cap) = self.mem_cap {
            cfg.mem_cap_bytes = cap;
        }
        if let Some(m) = self.max_page_positions {
            cfg.max_page_positions = m;
        }
        if let Some(p) = self.max_parallel {
            cfg.max_parallel_pipelines = p;
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(EngineConfig::from_json_str(&fs::read_to_string(path)?)?),
        None => Ok(EngineConfig::from_env()),
    }
}

fn run_pipeline(
    pipeline: &SyntheticPipeline,
    config_path: Option<&Path>,
    overrides: Overrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    overrides.apply(&mut config);

    let engine = Engine::new(config)?;
    let report = pipeline.run(&engine)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
