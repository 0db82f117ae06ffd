//! Quote Estimator
//!
//! Prices a request file against a provider catalog snapshot, or lists the
//! cheapest instance prices for a size.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use core_config::FromEnv;
use core_config::tracing::{init_tracing, install_color_eyre};
use domain_catalog::InstanceRequirements;
use domain_quotes::BatchPolicy;
use tracing::info;

mod config;
mod estimator;

use config::Config;
use estimator::{EstimateRequest, Estimator, load_catalog};

#[derive(Parser)]
#[command(name = "quote-estimator")]
#[command(about = "Estimate the monthly cost of a quote against a provider catalog")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Price every resource of a request file
    Estimate {
        /// JSON request: quote attributes and resources
        request: PathBuf,

        /// Skip resources without a matching price instead of failing
        #[arg(short, long)]
        skip_failures: bool,

        /// Print costing metrics to stderr when done
        #[arg(short, long)]
        metrics: bool,
    },

    /// List the cheapest instance prices for a size
    Lookup {
        /// Minimal vCPU count
        #[arg(long)]
        cpu: f64,

        /// Minimal RAM in MB
        #[arg(long)]
        ram_mb: u32,

        /// Location, defaults to the configured one
        #[arg(short, long)]
        location: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    let config = Config::from_env()?;
    init_tracing(&config.environment);

    observability::init_metrics()?;

    let cli = Cli::parse();

    let catalog = load_catalog(&config.catalog_path)?;
    let estimator = Estimator::new(catalog, config.default_location, config.costing)?;

    match cli.command {
        Commands::Estimate {
            request,
            skip_failures,
            metrics,
        } => {
            let raw = std::fs::read_to_string(&request)
                .wrap_err_with(|| format!("Failed to read request {}", request.display()))?;
            let request: EstimateRequest =
                serde_json::from_str(&raw).wrap_err("Invalid estimate request")?;
            let policy = if skip_failures {
                BatchPolicy::SkipAndReport
            } else {
                BatchPolicy::Abort
            };

            info!(name = %request.name, resources = request.resources.len(), "Estimating quote");
            let estimate = estimator.estimate(request, policy).await?;
            println!("{}", serde_json::to_string_pretty(&estimate)?);

            if metrics {
                eprint!("{}", observability::render_metrics());
            }
        }

        Commands::Lookup {
            cpu,
            ram_mb,
            location,
        } => {
            let candidates = estimator
                .lookup(&InstanceRequirements::new(cpu, ram_mb), location)
                .await?;
            println!("{}", serde_json::to_string_pretty(&candidates)?);
        }
    }

    Ok(())
}
