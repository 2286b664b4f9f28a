use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::instrument;

use super::{NewQuote, Quote, QuoteId, QuoteResult, QuoteStore};
use crate::indicator::Scope;
use crate::store::CounterMap;

/// Volatile quote archive, used when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryQuoteStore {
    quotes: RwLock<Vec<Quote>>,
}

impl MemoryQuoteStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuoteStore for MemoryQuoteStore {
    #[instrument(skip(self, quote), fields(server = %quote.server))]
    async fn create(&self, quote: NewQuote) -> QuoteResult<Quote> {
        let mut quotes = self.quotes.write().await;
        let created = Quote {
            id: QuoteId(quotes.len() as i64 + 1),
            message: quote.message,
            server: quote.server,
            created_by: quote.created_by,
            created_at: Utc::now().naive_utc(),
        };

        quotes.push(created.clone());
        Ok(created)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: QuoteId) -> QuoteResult<Option<Quote>> {
        let quotes = self.quotes.read().await;
        Ok(quotes.iter().find(|q| q.id == id).cloned())
    }

    #[instrument(skip(self))]
    async fn ids_by_server(&self, server: &Scope) -> QuoteResult<Vec<QuoteId>> {
        let quotes = self.quotes.read().await;
        Ok(quotes
            .iter()
            .filter(|q| &q.server == server)
            .map(|q| q.id)
            .collect())
    }

    #[instrument(skip(self))]
    async fn servers(&self) -> QuoteResult<Vec<Scope>> {
        let quotes = self.quotes.read().await;
        let mut servers: Vec<Scope> = quotes.iter().map(|q| q.server.clone()).collect();
        servers.sort();
        servers.dedup();

        Ok(servers)
    }

    #[instrument(skip(self))]
    async fn tally_by_author(&self, server: &Scope) -> QuoteResult<CounterMap> {
        let quotes = self.quotes.read().await;
        let mut tally = CounterMap::new();
        for quote in quotes.iter().filter(|q| &q.server == server) {
            *tally.entry(quote.created_by.to_string()).or_insert(0) += 1;
        }

        Ok(tally)
    }
}
