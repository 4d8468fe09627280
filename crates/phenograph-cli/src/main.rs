//! Phenograph CLI
//!
//! Command-line interface for:
//! - Running the cohort query operations against a graph store
//! - Serving the operations over HTTP (`serve`)
//! - Loading clinical exports into the store (`load`)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use phenograph_core::{ClaimSet, CohortQueryService, PatientSearch, PhenotypeSearch};
use phenograph_ingest::SourceFormat;
use phenograph_store::Neo4jStore;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod config;
mod server;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "phenograph")]
#[command(author, version, about = "Phenograph: cohort-aware patient/phenotype graph queries")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Permission claims to query with (comma or space separated)
    #[arg(long, global = true, default_value = "")]
    claims: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the query operations over HTTP.
    Serve {
        /// Listen address (overrides the config file)
        #[arg(long)]
        listen: Option<std::net::SocketAddr>,
    },

    /// List the cohorts the claims give access to.
    Cohorts,

    /// List every visible patient, per cohort.
    Patients {
        #[arg(long)]
        cohort: Option<String>,
    },

    /// Show one patient.
    Patient { id: String },

    /// Patients within `--fuzz` hops of a patient.
    Similar {
        id: String,
        #[command(flatten)]
        traversal: TraversalArgs,
    },

    /// Patients with a phenotype, or one within `--fuzz` subclass steps.
    With {
        label: String,
        #[command(flatten)]
        traversal: TraversalArgs,
        #[command(flatten)]
        phenotype: PhenotypeArgs,
    },

    /// Path graph from a patient to similar patients.
    GraphLike {
        id: String,
        #[command(flatten)]
        traversal: TraversalArgs,
    },

    /// Path graph from a phenotype to the patients that have it.
    GraphWith {
        label: String,
        /// Maximum number of hops
        #[arg(long)]
        fuzz: Option<String>,
        #[command(flatten)]
        phenotype: PhenotypeArgs,
    },

    /// Load a clinical export into the store.
    Load {
        input: PathBuf,
        /// phenotips, acute-care or mito
        #[arg(long)]
        format: SourceFormat,
        /// Target cohort (defaults per format)
        #[arg(long)]
        cohort: Option<String>,
    },
}

#[derive(Args)]
struct TraversalArgs {
    /// Maximum number of hops
    #[arg(long)]
    fuzz: Option<String>,
    /// Only this cohort
    #[arg(long)]
    cohort: Option<String>,
}

#[derive(Args)]
struct PhenotypeArgs {
    /// Minimum number of cohort patients per matched phenotype
    #[arg(long)]
    cutoff: Option<String>,
    /// Second phenotype label matched patients must also have
    #[arg(long)]
    limitation: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("phenograph=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    let claims = ClaimSet::parse_list(&cli.claims);

    let store = Neo4jStore::connect(&config.store)
        .await
        .context("failed to connect to the graph store")?;

    match cli.command {
        Commands::Load {
            input,
            format,
            cohort,
        } => load(&store, &input, format, cohort.as_deref()).await,
        command => {
            let service = CohortQueryService::new(store, config.permissions.clone())
                .with_options(config.service_options());
            run(command, service, &config, &claims).await
        }
    }
}

async fn load(
    store: &Neo4jStore,
    input: &Path,
    format: SourceFormat,
    cohort: Option<&str>,
) -> Result<()> {
    let report = phenograph_ingest::load_file(store, input, format, cohort).await?;
    let line = format!(
        "loaded {} patients into {} ({} phenotype links, {} unmatched)",
        report.patients, report.cohort, report.links, report.unmatched_phenotypes
    );
    if report.failed_statements == 0 {
        eprintln!("{} {}", "✓".green(), line);
    } else {
        eprintln!(
            "{} {} ({} statements failed)",
            "!".yellow(),
            line,
            report.failed_statements
        );
    }
    Ok(())
}

async fn run(
    command: Commands,
    service: CohortQueryService<Neo4jStore>,
    config: &AppConfig,
    claims: &ClaimSet,
) -> Result<()> {
    match command {
        Commands::Serve { listen } => {
            let listen = listen.unwrap_or(config.server.listen);
            let state = server::ServerState {
                service,
                claims_header: config.server.claims_header.clone(),
            };
            server::serve(listen, state).await?;
        }
        Commands::Cohorts => {
            for cohort in service.list_authorized_cohorts(claims).await? {
                println!("{}", cohort.bold());
            }
        }
        Commands::Patients { cohort } => {
            print_json(&service.list_patients(cohort.as_deref(), claims).await?)?;
        }
        Commands::Patient { id } => {
            print_json(&service.get_patient(&id, claims).await?)?;
        }
        Commands::Similar { id, traversal } => {
            let search = PatientSearch::from_params(
                &id,
                traversal.fuzz.as_deref(),
                traversal.cohort.as_deref(),
            )?;
            print_json(&service.find_similar_patients(&search, claims).await?)?;
        }
        Commands::With {
            label,
            traversal,
            phenotype,
        } => {
            let search = PhenotypeSearch::from_params(
                &label,
                traversal.fuzz.as_deref(),
                phenotype.cutoff.as_deref(),
                phenotype.limitation.as_deref(),
                traversal.cohort.as_deref(),
            )?;
            print_json(&service.find_patients_with_phenotype(&search, claims).await?)?;
        }
        Commands::GraphLike { id, traversal } => {
            let search = PatientSearch::from_params(
                &id,
                traversal.fuzz.as_deref(),
                traversal.cohort.as_deref(),
            )?;
            print_json(&service.project_similarity_graph(&search, claims).await?)?;
        }
        Commands::GraphWith {
            label,
            fuzz,
            phenotype,
        } => {
            let search = PhenotypeSearch::from_params(
                &label,
                fuzz.as_deref(),
                phenotype.cutoff.as_deref(),
                phenotype.limitation.as_deref(),
                None,
            )?;
            print_json(&service.project_phenotype_graph(&search, claims).await?)?;
        }
        Commands::Load { .. } => anyhow::bail!("load does not run through the query service"),
    }
    Ok(())
}
