//! Transport-independent chat front-end.
//!
//! [`Bot::handle`] takes one incoming message and produces at most one reply. It is the only
//! place that decides which indicator to bump for a command; errors from either store are logged
//! here and turned into a generic failure reply.

use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use crate::indicator::rank::top_n;
use crate::indicator::{Indicator, IndicatorErr, Kind, Scope, Subject};
use crate::quotes::{NewQuote, QuoteErr, QuoteId, QuoteStore};
use crate::store::CounterStore;

pub mod commands;
pub mod replies;

pub use commands::{BotCommand, DEFAULT_PREFIX, ParseErr};
use replies::{ReplyReason, idx};

/// One chat message as seen by the bot.
#[derive(Debug, Clone)]
pub struct MessageCtx {
    pub server: Scope,
    pub author: Subject,
    pub content: String,
}

impl MessageCtx {
    pub fn new(server: impl Into<Scope>, author: impl Into<Subject>, content: &str) -> Self {
        Self {
            server: server.into(),
            author: author.into(),
            content: content.to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Bot {
    counters: Arc<dyn CounterStore>,
    quotes: Arc<dyn QuoteStore>,
    prefix: String,
    key_prefix: Option<String>,
}

impl Bot {
    pub fn new(counters: Arc<dyn CounterStore>, quotes: Arc<dyn QuoteStore>) -> Self {
        Self {
            counters,
            quotes,
            prefix: DEFAULT_PREFIX.to_owned(),
            key_prefix: None,
        }
    }

    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: Option<String>) -> Self {
        self.key_prefix = key_prefix;
        self
    }

    pub fn indicator(&self, server: &Scope) -> Indicator {
        let indicator = Indicator::new(self.counters.clone(), server.clone());
        match &self.key_prefix {
            Some(prefix) => indicator.with_prefix(prefix.clone()),
            None => indicator,
        }
    }

    #[instrument(skip(self, ctx), fields(server = %ctx.server, author = %ctx.author))]
    pub async fn handle(&self, ctx: &MessageCtx) -> Option<String> {
        let cmd = match commands::parse(&self.prefix, &ctx.content)? {
            Ok(cmd) => cmd,
            Err(e) => {
                tracing::debug!(error = %e, "unparseable command");
                return Some(format!("@{} {}", ctx.author, e));
            }
        };

        tracing::info!(command = ?cmd, "handling command");

        match self.run(cmd, ctx).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                tracing::error!(error = ?e, retryable = e.is_retryable(), "command failed");
                Some(ReplyReason::Failure.get_reply().to_owned())
            }
        }
    }

    async fn run(&self, cmd: BotCommand, ctx: &MessageCtx) -> BotResult<String> {
        let indicator = self.indicator(&ctx.server);

        match cmd {
            BotCommand::Quote { message } => {
                let quote = NewQuote::new(&message, ctx.server.clone(), ctx.author.clone())?;
                let created = self.quotes.create(quote).await?;

                // the quote is archived either way; the recount daemon makes up a missed count
                if let Err(e) = indicator.register_quoted(&ctx.author).await {
                    tracing::warn!(id = %created.id, error = ?e, "quote saved but not counted");
                }

                Ok(format!("saved quote #{}", created.id))
            }

            BotCommand::Random => {
                let ids = self.quotes.ids_by_server(&ctx.server).await?;
                if ids.is_empty() {
                    return Ok(ReplyReason::NoQuotes.get_reply().to_owned());
                }

                let id = ids[idx(ids.len())];
                let Some(quote) = self.quotes.get(id).await? else {
                    return Ok(ReplyReason::NotFound.get_reply().to_owned());
                };

                indicator.register_requested(&ctx.author).await?;
                indicator.set_last_quote(quote.id).await?;

                Ok(quote.to_string())
            }

            BotCommand::Get { id } => self.show(&ctx.server, id).await,

            BotCommand::Last => match indicator.get_last_quote().await? {
                Some(id) => self.show(&ctx.server, id).await,
                None => Ok(ReplyReason::NoLastQuote.get_reply().to_owned()),
            },

            BotCommand::Leaderboard { kind, top } => {
                let Some(tally) = indicator.tally(kind).await? else {
                    return Ok(format!("nobody has {kind} anything here yet"));
                };

                Ok(render_leaderboard(kind, &top_n(&tally, top)))
            }

            BotCommand::Help => Ok(self.help()),
        }
    }

    /// Quotes from another server are reported as missing.
    async fn show(&self, server: &Scope, id: QuoteId) -> BotResult<String> {
        match self.quotes.get(id).await? {
            Some(quote) if &quote.server == server => Ok(quote.to_string()),
            _ => Ok(ReplyReason::NotFound.get_reply().to_owned()),
        }
    }

    fn help(&self) -> String {
        let p = &self.prefix;
        format!(
            "{p}quote <text> | {p}random | {p}get <id> | {p}last | {p}quoters [n] | {p}requesters [n]"
        )
    }
}

pub fn render_leaderboard(kind: Kind, ranked: &[(String, i64)]) -> String {
    let title = match kind {
        Kind::Quoted => "top quoters",
        Kind::Requested => "top requesters",
    };

    let lines: Vec<String> = ranked
        .iter()
        .enumerate()
        .map(|(i, (name, count))| format!("{}. {} ({})", i + 1, name, count))
        .collect();

    format!("{}: {}", title, lines.join(", "))
}

pub type BotResult<T> = core::result::Result<T, BotErr>;

#[derive(Debug, Error)]
pub enum BotErr {
    #[error(transparent)]
    Indicator(#[from] IndicatorErr),

    #[error(transparent)]
    Quote(#[from] QuoteErr),
}

impl BotErr {
    pub fn is_retryable(&self) -> bool {
        match self {
            BotErr::Indicator(e) => e.is_retryable(),
            BotErr::Quote(QuoteErr::EmptyMessage) => false,
            BotErr::Quote(QuoteErr::SqlxError(_)) => true,
        }
    }
}
