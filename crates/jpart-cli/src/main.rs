//! jpart CLI - partition a stream of JSON records into files by rule

mod config_file;
mod input;

use anyhow::Result;
use clap::{Parser, Subcommand};
use jpart_core::{
    apply_rules, build_rules, load_and_apply, validate_config, FilterRegistry, PartitionConfig, ResourceCache,
    RunSummary, DEFAULT_CAPACITY,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config_file::load_config;
use crate::input::{open_input, records_from_reader};

#[derive(Parser)]
#[command(name = "jpart")]
#[command(about = "Partition JSON records into files keyed by rule-derived values")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the configured rules to a record stream
    Partition {
        /// Path to the rules file (JSON or YAML)
        #[arg(short, long, env = "JPART_CONFIG")]
        config: PathBuf,

        /// Root directory for partitioned output
        #[arg(short, long, env = "JPART_OUTPUT_DIR", default_value = "./partitioned")]
        output_dir: PathBuf,

        /// Input file of JSON records; reads stdin when omitted
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Maximum number of output files held open at once
        #[arg(long, env = "JPART_MAX_OPEN_FILES", default_value_t = DEFAULT_CAPACITY)]
        max_open_files: usize,

        /// Open, write and close the output file for every record
        #[arg(long)]
        no_cache: bool,
    },

    /// Validate a rules file
    Validate {
        /// Path to the rules file (JSON or YAML)
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging; stdout is reserved for the run summary.
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Partition {
            config,
            output_dir,
            input,
            max_open_files,
            no_cache,
        } => {
            let summary = run_partition(&config, &output_dir, input.as_deref(), max_open_files, no_cache)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Validate { config } => {
            validate_config_file(&config)?;
        }
    }

    Ok(())
}

fn load_validated(path: &Path) -> Result<PartitionConfig> {
    info!("Loading rules from {:?}", path);
    let config = load_config(path)?;

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            eprintln!("Validation error: {}", error);
        }
        anyhow::bail!("Config validation failed with {} errors", errors.len());
    }

    Ok(config)
}

fn run_partition(
    config_path: &Path,
    output_dir: &Path,
    input: Option<&Path>,
    max_open_files: usize,
    no_cache: bool,
) -> Result<RunSummary> {
    let config = load_validated(config_path)?;
    let registry = FilterRegistry::new();
    let records = records_from_reader(open_input(input)?);

    let summary = if no_cache {
        info!("Writing without a resource cache");
        let filters = registry.resolve_mappings(&config.filter_mappings)?;
        let rules = build_rules(&filters, &config, None)?;
        apply_rules(output_dir, &rules, records)?
    } else {
        let cache = ResourceCache::for_output_root(output_dir, max_open_files)?.into_shared();
        load_and_apply(&registry, output_dir, &config, records, Some(cache), true)?
    };

    info!(
        "Partitioned {} records ({} writes) into {:?}",
        summary.records,
        summary.written(),
        output_dir
    );

    Ok(summary)
}

fn validate_config_file(path: &Path) -> Result<()> {
    let config = load_validated(path)?;

    // Plugin references must also resolve against the compiled-in filters.
    FilterRegistry::new().resolve_mappings(&config.filter_mappings)?;

    println!("Config is valid!");
    println!("  Filters: {}", config.filter_mappings.len());
    println!("  Rules: {}", config.rules.len());
    for (name, parts) in &config.rules {
        let fields: Vec<&str> = parts.iter().map(|p| p.field()).collect();
        println!("    - {}: {}", name, fields.join(", "));
    }

    Ok(())
}
