//! Document Migration CLI
//!
//! Migrates, downgrades, validates and checksums snapshot files against the
//! built-in record type contracts.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use document_schemas::config::OutputFormat;
use document_schemas::{
    registry, schemas, Checksum, ContractRegistry, EngineConfig, Ingestor, MigrationReport,
    Migrator, Snapshot, VersionVector,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "doc-migrate")]
#[command(about = "Validate and migrate document snapshots between schema versions")]
struct Cli {
    /// Config file layered over the default locations
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the version vector the running code expects
    Versions,

    /// Migrate a snapshot to the current versions or to an explicit target
    Migrate {
        /// Snapshot file (JSON)
        #[arg(short, long)]
        input: PathBuf,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Target version vector (JSON)
        #[arg(short, long)]
        target: Option<PathBuf>,
    },

    /// Downgrade a snapshot for a peer running older code
    Downgrade {
        /// Snapshot file (JSON)
        #[arg(short, long)]
        input: PathBuf,
        /// Version vector advertised by the peer (JSON)
        #[arg(short, long)]
        peer: PathBuf,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate every record and list all failures
    Validate {
        /// Snapshot file (JSON)
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Migrate, validate and apply the configured ingest policy
    Ingest {
        /// Snapshot file (JSON)
        #[arg(short, long)]
        input: PathBuf,
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the SHA256 checksum of a snapshot
    Checksum {
        /// Snapshot file (JSON)
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match EngineConfig::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured filter
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command, &config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, config: &EngineConfig) -> Result<()> {
    let registry: &ContractRegistry =
        registry::install(schemas::registry_with(config.validation.unknown_props)?)?;
    let migrator = Migrator::new(registry);
    let format = config.output.format;

    match command {
        Commands::Versions => {
            println!("{}", format.render(&registry.current_versions())?);
            Ok(())
        }

        Commands::Migrate {
            input,
            output,
            target,
        } => {
            let snapshot: Snapshot = read_json(&input)?;
            let target = match target {
                Some(path) => read_json::<VersionVector>(&path)?,
                None => registry.current_versions(),
            };

            let outcome = migrator
                .migrate_with_report(&snapshot, &target)
                .with_context(|| format!("Failed to migrate {}", input.display()))?;
            if config.validation.validate_after_migrate {
                registry.validate_snapshot(&outcome.snapshot)?;
            }

            print_report(&outcome.report);
            write_snapshot(&outcome.snapshot, output.as_deref(), format)
        }

        Commands::Downgrade {
            input,
            peer,
            output,
        } => {
            let snapshot: Snapshot = read_json(&input)?;
            let peer: VersionVector = read_json(&peer)?;

            let outcome = migrator
                .downgrade_for_peer(&snapshot, &peer)
                .with_context(|| format!("Failed to downgrade {}", input.display()))?;

            print_report(&outcome.report);
            write_snapshot(&outcome.snapshot, output.as_deref(), format)
        }

        Commands::Validate { input } => {
            let snapshot: Snapshot = read_json(&input)?;
            let diagnostics = registry.diagnose(&snapshot);

            if diagnostics.is_empty() {
                println!("✅ {} records valid", snapshot.len());
                return Ok(());
            }

            for diagnostic in &diagnostics {
                println!(
                    "  ❌ {} ({}): {}",
                    diagnostic.record_id, diagnostic.type_name, diagnostic.error
                );
            }
            bail!(
                "{} of {} records failed validation",
                diagnostics.len(),
                snapshot.len()
            )
        }

        Commands::Ingest { input, output } => {
            let snapshot: Snapshot = read_json(&input)?;
            let outcome = Ingestor::from_config(registry, config)
                .ingest(&snapshot)
                .with_context(|| format!("Failed to ingest {}", input.display()))?;

            print_report(&outcome.report);
            for dropped in &outcome.dropped {
                eprintln!(
                    "  🗑️  dropped {} ({}): {}",
                    dropped.record_id, dropped.type_name, dropped.reason
                );
            }
            write_snapshot(&outcome.snapshot, output.as_deref(), format)
        }

        Commands::Checksum { input } => {
            let snapshot: Snapshot = read_json(&input)?;
            println!("{}", Checksum::of_snapshot(&snapshot)?);
            Ok(())
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_snapshot<T: Serialize>(value: &T, output: Option<&Path>, format: OutputFormat) -> Result<()> {
    let rendered = format.render(value)?;
    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("📝 Written to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Reports go to stderr so stdout stays valid JSON
fn print_report(report: &MigrationReport) {
    if report.is_noop() {
        eprintln!("✅ Already at target versions");
        return;
    }

    eprintln!("🔄 Applied {} migration steps", report.total_steps());
    for path in report.paths.values() {
        eprintln!("  {} {} -> {}", path.scope, path.from, path.to);
    }
    for step in &report.lossy_steps {
        eprintln!(
            "  ⚠️  lossy {} step {} ({}): {}",
            step.scope, step.sequence_id, step.direction, step.note
        );
    }
}
