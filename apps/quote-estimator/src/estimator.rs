//! One-shot quote estimation over a catalog snapshot

use std::path::Path;

use color_eyre::eyre::{Result, WrapErr, eyre};
use core_config::CostingConfig;
use domain_catalog::{
    Candidate, Catalog, InMemoryCatalogRepository, InstancePrice, InstanceRequirements, Usage,
};
use domain_quotes::{
    BatchPolicy, BatchReport, CreateQuote, ImportEntry, InMemoryQuoteRepository, Quote,
    QuoteResult, QuoteService,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Quote attributes and the resources to price
#[derive(Debug, Clone, Deserialize)]
pub struct EstimateRequest {
    pub name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub license: Option<String>,
    pub usage: Option<Usage>,
    pub ram_adjusted_rate: Option<u32>,
    #[serde(default)]
    pub resources: Vec<ImportEntry>,
}

/// Priced quote with the outcome of each resource
#[derive(Debug, Clone, Serialize)]
pub struct Estimate {
    pub quote: Quote,
    pub report: BatchReport,
}

/// Read a catalog snapshot from a JSON file
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read catalog {}", path.display()))?;
    serde_json::from_str(&raw)
        .wrap_err_with(|| format!("Failed to parse catalog {}", path.display()))
}

pub struct Estimator {
    service: QuoteService<InMemoryQuoteRepository, InMemoryCatalogRepository>,
    provider: String,
    default_location: String,
}

impl Estimator {
    pub fn new(
        catalog: Catalog,
        default_location: Option<String>,
        costing: CostingConfig,
    ) -> Result<Self> {
        let default_location = match default_location {
            Some(location) => location,
            None => catalog
                .locations
                .first()
                .map(|l| l.name.clone())
                .ok_or_else(|| eyre!("Catalog of '{}' has no location", catalog.provider))?,
        };
        let provider = catalog.provider.clone();
        info!(
            provider = %provider,
            location = %default_location,
            instance_prices = catalog.instance_prices.len(),
            storage_prices = catalog.storage_prices.len(),
            "Catalog loaded"
        );

        Ok(Self {
            service: QuoteService::new(
                InMemoryQuoteRepository::new(),
                InMemoryCatalogRepository::with_catalog(catalog),
                costing,
            ),
            provider,
            default_location,
        })
    }

    async fn open_quote(&self, request: CreateQuoteRequest) -> QuoteResult<Quote> {
        self.service
            .create_quote(CreateQuote {
                name: request.name,
                description: request.description,
                provider: self.provider.clone(),
                location: request
                    .location
                    .unwrap_or_else(|| self.default_location.clone()),
                license: request.license,
                usage: request.usage,
                ram_adjusted_rate: request.ram_adjusted_rate,
            })
            .await
    }

    /// Price every resource of the request in a single batch
    pub async fn estimate(
        &self,
        request: EstimateRequest,
        policy: BatchPolicy,
    ) -> QuoteResult<Estimate> {
        let resources = request.resources.clone();
        let quote = self.open_quote(CreateQuoteRequest::from(request)).await?;
        let report = self.service.import(quote.id, resources, policy).await?;
        let quote = self.service.get_quote(quote.id).await?;

        info!(
            quote_id = %quote.id,
            cost = quote.cost,
            max_cost = quote.max_cost,
            initial_cost = quote.initial_cost,
            failed = report.failures.len(),
            "Estimate completed"
        );
        Ok(Estimate { quote, report })
    }

    /// Cheapest instance prices for a size, up to the configured limit
    pub async fn lookup(
        &self,
        requirements: &InstanceRequirements,
        location: Option<String>,
    ) -> QuoteResult<Vec<Candidate<InstancePrice>>> {
        let quote = self
            .open_quote(CreateQuoteRequest {
                name: "lookup".to_string(),
                location,
                ..CreateQuoteRequest::default()
            })
            .await?;
        let candidates = self.service.lookup_instances(quote.id, requirements).await;
        self.service.delete_quote(quote.id).await?;
        candidates
    }
}

/// Quote attributes of a request, without its resources
#[derive(Debug, Default)]
struct CreateQuoteRequest {
    name: String,
    description: Option<String>,
    location: Option<String>,
    license: Option<String>,
    usage: Option<Usage>,
    ram_adjusted_rate: Option<u32>,
}

impl From<EstimateRequest> for CreateQuoteRequest {
    fn from(request: EstimateRequest) -> Self {
        Self {
            name: request.name,
            description: request.description,
            location: request.location,
            license: request.license,
            usage: request.usage,
            ram_adjusted_rate: request.ram_adjusted_rate,
        }
    }
}
