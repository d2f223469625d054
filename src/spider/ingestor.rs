//! Sequential fetch-retry-persist loop over a range of IDs.
//!
//! Each ID moves through a small state machine: attempts are classified into
//! [`AttemptOutcome`]s until one is terminal or the retry budget runs out, then
//! the terminal [`Outcome`] is upserted and the loop pauses before the next ID.

use std::sync::Arc;

use tracing::{info, warn};

use super::http_client::Fetcher;
use super::policy::{IdRange, RateLimit, RetryPolicy, UrlTemplate};
use crate::extract::classify_body;
use crate::models::{AttemptOutcome, Outcome, Summary};
use crate::repository::{PokemonStore, StoreError};

/// Per-outcome tallies for one run, plus the table summary afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub stored: u64,
    pub empty_body: u64,
    pub http_status: u64,
    pub exhausted: u64,
    pub summary: Summary,
}

impl RunReport {
    /// Number of IDs processed in this run.
    pub fn processed(&self) -> u64 {
        self.stored + self.empty_body + self.http_status + self.exhausted
    }

    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Stored(_) => self.stored += 1,
            Outcome::EmptyBody => self.empty_body += 1,
            Outcome::HttpStatus(_) => self.http_status += 1,
            Outcome::Exhausted { .. } => self.exhausted += 1,
        }
    }
}

/// Fetches IDs from the upstream API and upserts them into a store.
pub struct Ingestor {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn PokemonStore>,
}

impl Ingestor {
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<dyn PokemonStore>) -> Self {
        Self { fetcher, store }
    }

    /// Process every ID in `range` in ascending order and return the report.
    ///
    /// Store failures abort the run; rows written so far stay committed.
    pub async fn run(
        &self,
        range: &IdRange,
        template: &UrlTemplate,
        retry: &RetryPolicy,
        rate_limit: RateLimit,
    ) -> Result<RunReport, StoreError> {
        info!(
            "Ingesting {} IDs ({}..={}) from {}",
            range.count(),
            range.start(),
            range.end(),
            template.as_str()
        );

        let mut report = RunReport::default();
        for id in range.ids() {
            let url = template.render(id);
            let outcome = self.process(id, &url, retry).await?;
            report.record(&outcome);
            rate_limit.pause().await;
        }

        report.summary = self.store.summary().await?;
        Ok(report)
    }

    /// Resolve and persist the outcome for a single ID.
    pub async fn process(
        &self,
        id: u32,
        url: &str,
        retry: &RetryPolicy,
    ) -> Result<Outcome, StoreError> {
        let outcome = self.fetch_with_retry(id, url, retry).await;
        self.store.upsert(&outcome.to_upsert(url)).await?;

        match &outcome {
            Outcome::Stored(_) => info!("[{}] OK 200 -> {}", id, url),
            Outcome::EmptyBody => warn!("[{}] 200 but invalid JSON -> {}", id, url),
            Outcome::HttpStatus(code) => warn!("[{}] NON-200 {} -> {}", id, code, url),
            Outcome::Exhausted { attempts } => warn!(
                "[{}] FAILED after {} attempts, stored failure marker -> {}",
                id, attempts, url
            ),
        }

        Ok(outcome)
    }

    async fn fetch_with_retry(&self, id: u32, url: &str, retry: &RetryPolicy) -> Outcome {
        let max_attempts = retry.max_attempts();
        for attempt in 1..=max_attempts {
            match self.attempt(url).await {
                AttemptOutcome::Classified(outcome) => return outcome,
                AttemptOutcome::Transport(e) if attempt < max_attempts => {
                    let delay = retry.delay_for(attempt);
                    warn!(
                        "[{}] Request error on attempt {}/{}: {}. Retrying in {:?}",
                        id, attempt, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                AttemptOutcome::Transport(e) => {
                    warn!(
                        "[{}] Request error on attempt {}/{}: {}",
                        id, attempt, max_attempts, e
                    );
                }
            }
        }

        Outcome::Exhausted {
            attempts: max_attempts,
        }
    }

    async fn attempt(&self, url: &str) -> AttemptOutcome {
        match self.fetcher.fetch(url).await {
            Ok(response) if response.is_ok() => {
                AttemptOutcome::Classified(classify_body(&response.body))
            }
            Ok(response) => AttemptOutcome::Classified(Outcome::HttpStatus(response.status)),
            Err(e) => AttemptOutcome::Transport(e),
        }
    }
}
