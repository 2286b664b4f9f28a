use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::instrument;

use crate::bot::Bot;
use crate::quotes::{QuoteResult, QuoteStore};

/// Periodically folds the quote archive's per-author counts into every server's `quoted` tally,
/// so a registration lost between the quote insert and the increment is made up. Counts are only
/// ever raised: registrations that land mid-pass and counts the archive doesn't know about (e.g.
/// an in-memory archive after a restart) survive.
#[derive(Debug)]
pub struct Recount {
    bot: Bot,
    quotes: Arc<dyn QuoteStore>,
    interval: Duration,
}

impl Recount {
    pub fn new(bot: Bot, quotes: Arc<dyn QuoteStore>, interval: Duration) -> Self {
        Self {
            bot,
            quotes,
            interval,
        }
    }

    /// Runs until `shutdown` flips to `true`.
    #[instrument(skip(self, shutdown), fields(interval = ?self.interval))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.recount_all().await {
                        Ok(count) => tracing::info!(servers = count, "recount pass finished"),
                        Err(e) => tracing::error!(error = ?e, "recount pass failed"),
                    }
                }

                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        tracing::info!("recount daemon stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One pass over every server. A failing server is logged and skipped; only failing to list
    /// servers aborts the pass. Returns the number of servers reconciled.
    #[instrument(skip(self))]
    pub async fn recount_all(&self) -> QuoteResult<usize> {
        let servers = self.quotes.servers().await?;
        let mut reconciled = 0;

        for server in servers {
            let tally = match self.quotes.tally_by_author(&server).await {
                Ok(tally) => tally,
                Err(e) => {
                    tracing::warn!(server = %server, error = ?e, "skipping server recount");
                    continue;
                }
            };

            match self.bot.indicator(&server).reconcile_quoted(&tally).await {
                Ok(()) => reconciled += 1,
                Err(e) => tracing::warn!(server = %server, error = ?e, "skipping server recount"),
            }
        }

        Ok(reconciled)
    }
}
