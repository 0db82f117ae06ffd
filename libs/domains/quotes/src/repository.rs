use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{QuoteError, QuoteResult};
use crate::models::{CreateQuote, Quote};

/// Repository trait for Quote persistence
///
/// Quotes are saved whole, with their resources and computed costs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteRepository: Send + Sync {
    /// Create a new, empty quote
    async fn create(&self, input: CreateQuote) -> QuoteResult<Quote>;

    /// Get a quote by ID
    async fn get_by_id(&self, id: Uuid) -> QuoteResult<Option<Quote>>;

    /// Persist the current state of a quote
    async fn save(&self, quote: &Quote) -> QuoteResult<()>;

    /// Delete a quote by ID
    async fn delete(&self, id: Uuid) -> QuoteResult<bool>;

    /// Physically delete resources of a quote. Returns the number deleted.
    async fn delete_resources(&self, quote_id: Uuid, ids: &[Uuid]) -> QuoteResult<usize>;
}

/// In-memory implementation of QuoteRepository (for development/testing)
#[derive(Debug, Default, Clone)]
pub struct InMemoryQuoteRepository {
    quotes: Arc<RwLock<HashMap<Uuid, Quote>>>,
}

impl InMemoryQuoteRepository {
    pub fn new() -> Self {
        Self {
            quotes: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl QuoteRepository for InMemoryQuoteRepository {
    async fn create(&self, input: CreateQuote) -> QuoteResult<Quote> {
        let mut quotes = self.quotes.write().await;

        let quote = Quote::new(input);
        quotes.insert(quote.id, quote.clone());

        tracing::info!(quote_id = %quote.id, provider = %quote.provider, "Created quote");
        Ok(quote)
    }

    async fn get_by_id(&self, id: Uuid) -> QuoteResult<Option<Quote>> {
        let quotes = self.quotes.read().await;
        Ok(quotes.get(&id).cloned())
    }

    async fn save(&self, quote: &Quote) -> QuoteResult<()> {
        let mut quotes = self.quotes.write().await;

        let stored = quotes
            .get_mut(&quote.id)
            .ok_or_else(|| QuoteError::NotFound(format!("quote {}", quote.id)))?;
        *stored = quote.clone();
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> QuoteResult<bool> {
        let mut quotes = self.quotes.write().await;

        if quotes.remove(&id).is_some() {
            tracing::info!(quote_id = %id, "Deleted quote");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn delete_resources(&self, quote_id: Uuid, ids: &[Uuid]) -> QuoteResult<usize> {
        let mut quotes = self.quotes.write().await;

        let quote = quotes
            .get_mut(&quote_id)
            .ok_or_else(|| QuoteError::NotFound(format!("quote {quote_id}")))?;
        let before = quote.instances.len() + quote.storages.len();
        quote.instances.retain(|i| !ids.contains(&i.id));
        quote.storages.retain(|s| !ids.contains(&s.id));
        let deleted = before - (quote.instances.len() + quote.storages.len());

        tracing::info!(quote_id = %quote_id, deleted, "Deleted quote resources");
        Ok(deleted)
    }
}
