//! Quote archive.
//!
//! The indicator core never touches quotes directly; the chat front-end uses a [`QuoteStore`]
//! to archive and retrieve them and feeds the author / server pair into the indicators.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::indicator::{Scope, Subject};
use crate::store::CounterMap;

pub mod memory;
pub mod pg;

pub use memory::MemoryQuoteStore;
pub use pg::PgQuoteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuoteId(pub i64);

impl core::fmt::Display for QuoteId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl core::str::FromStr for QuoteId {
    type Err = core::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(QuoteId)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub message: String,
    pub server: Scope,
    pub created_by: Subject,
    pub created_at: NaiveDateTime,
}

impl core::fmt::Display for Quote {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{} \"{}\" - {}", self.id, self.message, self.created_by)
    }
}

#[derive(Debug, Clone)]
pub struct NewQuote {
    pub message: String,
    pub server: Scope,
    pub created_by: Subject,
}

impl NewQuote {
    /// Trims the message and rejects it when nothing is left.
    pub fn new(message: &str, server: Scope, created_by: Subject) -> QuoteResult<Self> {
        let message = message.trim();
        if message.is_empty() {
            return Err(QuoteErr::EmptyMessage);
        }

        Ok(Self {
            message: message.to_owned(),
            server,
            created_by,
        })
    }
}

#[async_trait]
pub trait QuoteStore: Send + Sync + core::fmt::Debug {
    async fn create(&self, quote: NewQuote) -> QuoteResult<Quote>;

    async fn get(&self, id: QuoteId) -> QuoteResult<Option<Quote>>;

    async fn ids_by_server(&self, server: &Scope) -> QuoteResult<Vec<QuoteId>>;

    /// Every server holding at least one quote.
    async fn servers(&self) -> QuoteResult<Vec<Scope>>;

    /// `created_by -> number of quotes` for one server.
    async fn tally_by_author(&self, server: &Scope) -> QuoteResult<CounterMap>;
}

pub type QuoteResult<T> = core::result::Result<T, QuoteErr>;

#[derive(Debug, Error)]
pub enum QuoteErr {
    #[error("quote message is empty")]
    EmptyMessage,

    #[error(transparent)]
    SqlxError(#[from] sqlx::Error),
}
