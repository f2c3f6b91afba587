// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema repository CLI
//!
//! Operator tool over the SQLite schema repository.
//!
//! # Usage
//!
//! ```bash
//! # Register a schema file under a subject
//! schema-repo --db schemas.db register orders orders-v2.avsc
//!
//! # Append only if version 3 is still the latest
//! schema-repo --db schemas.db register orders orders-v3.avsc --expect 3
//!
//! # Show a subject's history
//! schema-repo --db schemas.db show orders
//! ```

use std::io::Read;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use schema_repo::{RepoConfig, Repository, ValidatorRegistry};

#[derive(Parser, Debug)]
#[command(name = "schema-repo")]
#[command(about = "Schema repository - deduplicated subject/schema store", long_about = None)]
struct Args {
    /// Database path (SQLite file)
    #[arg(short, long)]
    db: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Busy timeout in milliseconds
    #[arg(long)]
    busy_timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register a schema under a subject
    Register {
        /// Subject name
        subject: String,
        /// Schema file ("-" reads stdin)
        file: String,
        /// Only register if this schema id is still the subject's latest
        #[arg(long)]
        expect: Option<String>,
    },
    /// Show the schema history of a subject
    Show {
        /// Subject name
        subject: String,
    },
    /// Print one schema of a subject
    Lookup {
        /// Subject name
        subject: String,
        /// Schema id
        #[arg(long)]
        id: String,
    },
    /// List subjects
    List,
    /// Show row counts
    Stats,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RepoConfig::from_file(path)
            .with_context(|| format!("failed to load configuration from {}", path))?,
        None => RepoConfig::default(),
    };
    if let Some(db) = args.db {
        config.database = db;
    }
    if let Some(ms) = args.busy_timeout {
        config.busy_timeout_ms = ms;
    }

    tracing::info!("  Database: {}", config.database);

    let repo = Repository::open_sqlite(&config, ValidatorRegistry::new())
        .with_context(|| format!("failed to open schema repository {}", config.database))?;

    handle_command(args.command, &repo)
}

fn read_schema(file: &str) -> Result<String> {
    if file == "-" {
        let mut schema = String::new();
        std::io::stdin()
            .read_to_string(&mut schema)
            .context("failed to read schema from stdin")?;
        return Ok(schema);
    }
    std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file))
}

fn handle_command(cmd: Commands, repo: &Repository) -> Result<()> {
    match cmd {
        Commands::Register {
            subject,
            file,
            expect,
        } => {
            let schema = read_schema(&file)?;
            let subject = repo.register(&subject, None)?;

            let entry = match expect {
                Some(id) => {
                    let expected = match subject.lookup_by_id(&id) {
                        Some(entry) => entry,
                        None => bail!("subject '{}' has no schema {}", subject.name(), id),
                    };
                    match subject.register_if_latest(&schema, Some(&expected))? {
                        Some(entry) => entry,
                        None => bail!(
                            "schema {} is no longer the latest of '{}'",
                            id,
                            subject.name()
                        ),
                    }
                }
                None => subject.register(&schema)?,
            };
            println!("{} id={} hash={}", subject.name(), entry.id(), entry.hash());
        }
        Commands::Show { subject } => {
            let Some(subject) = repo.lookup(&subject) else {
                bail!("unknown subject '{}'", subject);
            };
            let latest = subject.latest();
            println!("Subject '{}':", subject.name());
            for entry in subject.all_entries() {
                let marker = match &latest {
                    Some(latest) if latest.id() == entry.id() => " (latest)",
                    _ => "",
                };
                println!(
                    "  id={}, hash={}, size={} bytes{}",
                    entry.id(),
                    entry.hash(),
                    entry.schema().len(),
                    marker
                );
            }
        }
        Commands::Lookup { subject, id } => {
            let Some(subject) = repo.lookup(&subject) else {
                bail!("unknown subject '{}'", subject);
            };
            match subject.lookup_by_id(&id) {
                Some(entry) => println!("{}", entry.schema()),
                None => bail!("subject '{}' has no schema {}", subject.name(), id),
            }
        }
        Commands::List => {
            println!("Subjects:");
            for subject in repo.subjects() {
                println!(
                    "  {} ({} versions)",
                    subject.name(),
                    subject.all_entries().len()
                );
            }
        }
        Commands::Stats => {
            let store = repo.store();
            println!("Subjects: {}", store.subject_count()?);
            println!("Schemas:  {}", store.schema_count()?);
            println!("Links:    {}", store.link_count()?);
        }
    }

    Ok(())
}
