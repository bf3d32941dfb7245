//! matewright CLI: assembly constraint inference engine.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use matewright::config::EngineConfig;
use matewright::geometry::GeometryExtraction;
use matewright::normalize::{HttpEnricher, NoEnrichment, PartEnricher};
use matewright::part::RawPart;
use matewright::store::{MemoryConstraintSink, MemoryRuleStore, RuleStore};
use matewright::task::MateEngine;
use matewright::validate::{ConflictValidator, HttpValidator, NoValidator};

#[derive(Parser)]
#[command(name = "matewright", version, about = "Assembly constraint inference engine")]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// External solver URL, overriding the config file.
    #[arg(long, global = true)]
    solver_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run inference over a parts list.
    Infer {
        /// Path to a JSON file with the parts list.
        #[arg(long)]
        parts: PathBuf,

        /// Path to a JSON file with a geometry extraction to merge in.
        #[arg(long)]
        geometry: Option<PathBuf>,
    },

    /// List the current rule base.
    Rules,

    /// Show the effective engine configuration.
    Info,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::default(),
    };
    if cli.solver_url.is_some() {
        config.solver_url = cli.solver_url.clone();
    }

    match cli.command {
        Commands::Infer { parts, geometry } => {
            let content = std::fs::read_to_string(&parts).into_diagnostic()?;
            let raw_parts: Vec<RawPart> = serde_json::from_str(&content).into_diagnostic()?;

            let extraction: Option<GeometryExtraction> = match geometry {
                Some(path) => {
                    let content = std::fs::read_to_string(&path).into_diagnostic()?;
                    Some(serde_json::from_str(&content).into_diagnostic()?)
                }
                None => None,
            };

            let validator: Arc<dyn ConflictValidator> = match &config.solver_url {
                Some(url) => Arc::new(HttpValidator::new(
                    url.clone(),
                    Duration::from_secs(config.solver_timeout_secs),
                )),
                None => Arc::new(NoValidator),
            };
            let enricher: Arc<dyn PartEnricher> = match &config.enrichment_url {
                Some(url) => Arc::new(HttpEnricher::new(
                    url.clone(),
                    config.enrichment_timeout_secs,
                )),
                None => Arc::new(NoEnrichment),
            };

            let engine = MateEngine::new(
                config,
                Arc::new(MemoryRuleStore::with_seed_rules()),
                validator,
                enricher,
                Arc::new(MemoryConstraintSink::new()),
            );

            let result = engine.run_inference(raw_parts, extraction)?;
            println!("{}", serde_json::to_string_pretty(&result).into_diagnostic()?);
        }

        Commands::Info => {
            let store = MemoryRuleStore::with_seed_rules();
            println!("matewright {}", env!("CARGO_PKG_VERSION"));
            println!("  acceptance threshold: {}", config.acceptance_threshold);
            println!(
                "  solver: {} (timeout {}s)",
                config.solver_url.as_deref().unwrap_or("none"),
                config.solver_timeout_secs
            );
            println!(
                "  enrichment: {} (timeout {}s)",
                config.enrichment_url.as_deref().unwrap_or("none"),
                config.enrichment_timeout_secs
            );
            println!("  persist chunk size: {}", config.persist_chunk_size);
            println!("  authored rules: {}", store.len());
        }

        Commands::Rules => {
            let store = MemoryRuleStore::with_seed_rules();
            println!("Rule base ({} rules, priority order):", store.len());
            for rule in store.snapshot() {
                println!(
                    "  {} [{:>3}] {} ({:?}) used {} / confirmed {}",
                    rule.id,
                    rule.priority,
                    rule.name,
                    rule.origin,
                    rule.usage_count,
                    rule.success_count
                );
            }
        }
    }

    Ok(())
}
