use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{CatalogError, CatalogResult};
use crate::models::{Catalog, Location};

/// Repository trait for provider catalogs
///
/// A catalog is materialized once per load and shared read-only by every
/// lookup made from it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Load the catalog of a provider
    async fn load(&self, provider: &str) -> CatalogResult<Arc<Catalog>>;

    /// Find a location of a provider by name
    async fn find_location(&self, provider: &str, name: &str) -> CatalogResult<Option<Location>>;
}

/// In-memory implementation of CatalogRepository (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryCatalogRepository {
    catalogs: Arc<RwLock<HashMap<String, Arc<Catalog>>>>,
}

impl InMemoryCatalogRepository {
    pub fn new() -> Self {
        Self {
            catalogs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Create a repository holding a single catalog
    pub fn with_catalog(catalog: Catalog) -> Self {
        let mut catalogs = HashMap::new();
        catalogs.insert(catalog.provider.clone(), Arc::new(catalog));
        Self {
            catalogs: Arc::new(RwLock::new(catalogs)),
        }
    }

    /// Register or replace the catalog of its provider.
    ///
    /// Catalogs already handed out keep their previous content.
    pub async fn insert(&self, catalog: Catalog) {
        let mut catalogs = self.catalogs.write().await;
        tracing::info!(
            provider = %catalog.provider,
            instance_prices = catalog.instance_prices.len(),
            storage_prices = catalog.storage_prices.len(),
            "Registered catalog"
        );
        catalogs.insert(catalog.provider.clone(), Arc::new(catalog));
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn load(&self, provider: &str) -> CatalogResult<Arc<Catalog>> {
        let catalogs = self.catalogs.read().await;
        catalogs
            .get(provider)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("provider '{provider}'")))
    }

    async fn find_location(&self, provider: &str, name: &str) -> CatalogResult<Option<Location>> {
        let catalog = self.load(provider).await?;
        Ok(catalog.location(name).cloned())
    }
}
