//! End-to-end orchestration of one run.
//!
//! Wires the rate limiter, fetch stage and aggregation stage together
//! under a single run token and turns the aggregate into a [`Report`].

use crate::aggregator::{AggregatorConfig, WordAggregator};
use crate::error::WordTallyError;
use crate::extract::{Extractor, HeuristicExtractor};
use crate::fetcher::{read_url_list, DocumentFetcher, DocumentStreams, FetchConfig, RetryPolicy};
use crate::rate_limiter::RateLimiter;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::types::{PipelineConfig, Report};
use crate::wordbank::WordBank;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long the fetch stage gets to wind down after aggregation returns.
const FETCH_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A configured pipeline, reusable across runs.
pub struct Pipeline<T> {
    config: PipelineConfig,
    transport: Arc<T>,
    extractor: Arc<dyn Extractor>,
}

impl Pipeline<ReqwestTransport> {
    /// Validate `config` and build a pipeline over real HTTP.
    pub fn new(config: PipelineConfig) -> Result<Self, WordTallyError> {
        config.validate()?;
        let transport = ReqwestTransport::new(config.request_timeout)?;
        Self::with_transport(config, transport)
    }
}

impl<T: HttpTransport> Pipeline<T> {
    /// Validate `config` and build a pipeline over `transport`.
    pub fn with_transport(config: PipelineConfig, transport: T) -> Result<Self, WordTallyError> {
        config.validate()?;
        Ok(Self {
            config,
            transport: Arc::new(transport),
            extractor: Arc::new(HeuristicExtractor::new()),
        })
    }

    /// Replace the default heuristic extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read the configured URL list and word bank, then [`run`](Self::run).
    ///
    /// An unreadable URL list is fatal. An unreadable word bank only
    /// produces a warning and an empty ranking.
    pub async fn run_from_files(&self, shutdown: CancellationToken) -> Result<Report, WordTallyError> {
        let urls = read_url_list(&self.config.essays_file)?;
        let word_bank = WordBank::load_or_empty(&self.config.word_bank_file);
        Ok(self.run(urls, Arc::new(word_bank), shutdown).await)
    }

    /// Fetch every URL, tally admissible words and rank them.
    ///
    /// The run stops early on the processing deadline or when `shutdown`
    /// fires; either way a report of what was merged so far is returned.
    pub async fn run(
        &self,
        urls: Vec<String>,
        word_bank: Arc<WordBank>,
        shutdown: CancellationToken,
    ) -> Report {
        let config = &self.config;
        info!(
            urls = urls.len(),
            words = word_bank.len(),
            fetch_workers = config.fetch_workers,
            tokenize_workers = config.tokenize_workers,
            batch_size = config.batch_size,
            rate_limit = config.rate_limit,
            "starting pipeline"
        );

        let run_token = shutdown.child_token();
        let deadline = spawn_deadline(run_token.clone(), config.processing_timeout);

        let limiter = Arc::new(RateLimiter::new(config.rate_limit, Duration::from_secs(1)));
        let fetcher = DocumentFetcher::new(
            Arc::clone(&self.transport),
            limiter,
            Arc::clone(&self.extractor),
            self.fetch_config(),
        );
        let DocumentStreams {
            documents,
            errors,
            handle,
        } = fetcher.stream(urls, run_token.clone());

        let aggregator = WordAggregator::new(
            word_bank,
            AggregatorConfig {
                batch_size: config.batch_size,
                tokenize_workers: config.tokenize_workers,
            },
        );
        let outcome = aggregator
            .consume(documents, errors, config.top_n, run_token.clone())
            .await;

        if outcome.cancelled {
            run_token.cancel();
        }
        match tokio::time::timeout(FETCH_SHUTDOWN_GRACE, handle).await {
            Ok(Ok(summary)) => debug!(
                documents = summary.documents,
                errors = summary.errors,
                abandoned = summary.abandoned(),
                "fetch stage finished"
            ),
            Ok(Err(e)) => warn!(error = %e, "fetch stage task failed"),
            Err(_) => warn!("fetch stage did not stop within the shutdown grace period"),
        }

        // Also ends the deadline task if it is still waiting.
        run_token.cancel();
        join_deadline(deadline).await;

        info!(
            documents = outcome.total_documents,
            errors = outcome.total_errors,
            cancelled = outcome.cancelled,
            "pipeline finished"
        );

        Report {
            top_words: outcome.top_words,
            total_documents: outcome.total_documents,
            total_errors: outcome.total_errors,
            timestamp: Utc::now(),
            cancelled: outcome.cancelled,
        }
    }

    fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            max_workers: self.config.fetch_workers,
            document_buffer: self.config.document_buffer,
            error_buffer: self.config.error_buffer,
            retry: RetryPolicy {
                max_attempts: self.config.retry_attempts,
                delay: self.config.retry_delay,
            },
        }
    }
}

/// Cancel `token` once `timeout` elapses, unless it is cancelled first.
fn spawn_deadline(token: CancellationToken, timeout: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                warn!(timeout = ?timeout, "processing timeout reached, cancelling run");
                token.cancel();
            }
        }
    })
}

/// Wait for the deadline task, logging it if it panicked or was aborted.
async fn join_deadline(deadline: JoinHandle<()>) -> bool {
    match deadline.await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "deadline task failed");
            false
        }
    }
}
