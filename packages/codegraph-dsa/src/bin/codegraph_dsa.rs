//! Codegraph DSA CLI
//!
//! Runs a heap-shape analysis over a module serialized as JSON.
//!
//! # Usage
//!
//! ```bash
//! # Context-sensitive analysis with defaults
//! cargo run --bin codegraph-dsa -- analyze module.json
//!
//! # Bottom-up only, dumping every graph
//! cargo run --bin codegraph-dsa -- analyze module.json --kind bottom_up --dump
//!
//! # Print the effective configuration of a preset
//! cargo run --bin codegraph-dsa -- config --preset balanced
//! ```
//!
//! Log output is controlled by `CODEGRAPH_DSA_LOG` (`EnvFilter` syntax).

use clap::{Parser, Subcommand};
use codegraph_dsa::config::{AnalysisKind, DsaConfig, Preset};
use codegraph_dsa::features::dsa::{GlobalAnalysis, Module};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

const ENV_FILTER: &str = "CODEGRAPH_DSA_LOG";

#[derive(Parser)]
#[command(name = "codegraph-dsa")]
#[command(about = "Codegraph DSA - context-sensitive heap-shape analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a JSON module
    Analyze {
        /// Module file
        module: PathBuf,

        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Preset (fast, balanced, thorough, custom)
        #[arg(short, long)]
        preset: Option<String>,

        /// Analysis kind, overrides the preset
        #[arg(short, long)]
        kind: Option<String>,

        /// Print JSON graph snapshots
        #[arg(long)]
        dump: bool,
    },

    /// Print the effective YAML configuration
    Config {
        /// Preset (fast, balanced, thorough, custom)
        #[arg(short, long)]
        preset: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            module,
            config,
            preset,
            kind,
            dump,
        } => {
            let config = load_config(config, preset, kind)?;
            analyze(module, config, dump)?;
        }
        Commands::Config { preset } => {
            let config = load_config(None, preset, None)?;
            print!("{}", config.to_yaml()?);
        }
    }

    Ok(())
}

fn setup_tracing() {
    let stderr_layer = fmt::Layer::default()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env(ENV_FILTER));
    Registry::default().with(stderr_layer).init();
}

fn load_config(
    file: Option<PathBuf>,
    preset: Option<String>,
    kind: Option<String>,
) -> Result<DsaConfig, Box<dyn std::error::Error>> {
    let mut config = match (file, preset) {
        (Some(path), _) => DsaConfig::from_yaml_file(path)?,
        (None, Some(name)) => DsaConfig::preset(Preset::from_str(&name)?),
        (None, None) => DsaConfig::default(),
    };
    if let Some(kind) = kind {
        config.kind = AnalysisKind::from_str(&kind)?;
    }
    Ok(config)
}

fn analyze(path: PathBuf, config: DsaConfig, dump: bool) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(&path)?;
    let module: Module = serde_json::from_str(&content)?;

    let mut analysis = GlobalAnalysis::new(config);
    let stats = analysis.run_on_module(&module)?;

    println!("Module: {} ({})", module.name, stats.kind);
    println!(
        "  {} functions, {} graphs, {} live nodes, {:.2} ms",
        stats.functions, stats.graphs, stats.live_nodes, stats.duration_ms
    );
    if let Some(fixpoint) = &stats.fixpoint {
        println!(
            "  fixpoint: {} seeded, {} processed, {} down, {} up",
            fixpoint.seeded, fixpoint.items_processed, fixpoint.down_steps, fixpoint.up_steps
        );
    }

    println!("\nFunctions:");
    for f in &module.functions {
        match analysis.graph(f.id) {
            Some(g) => println!("  {:<32} {:>6} nodes", f.name, g.num_live_nodes()),
            None => println!("  {:<32}   (no body)", f.name),
        }
    }

    println!("\nCall sites:");
    for cs in module.sorted_call_sites() {
        let Some(res) = analysis.call_site_resolution(cs.id) else {
            continue;
        };
        let callees: Vec<&str> = res.callees.iter().map(|c| module.function_name(*c)).collect();
        println!(
            "  {} in {} -> [{}]{}",
            cs.id,
            module.function_name(cs.caller),
            callees.join(", "),
            if res.fully_resolved { "" } else { " (incomplete)" }
        );
    }

    if dump {
        for f in module.functions.iter().filter(|f| f.has_body()) {
            if let Some(g) = analysis.graph(f.id) {
                println!("\n{}:\n{}", f.name, serde_json::to_string_pretty(&g.snapshot())?);
            }
        }
    }
    Ok(())
}
