//! Bounded-concurrency document fetching.
//!
//! A feeder task pushes URLs into a bounded queue shared by a pool of
//! fetch workers. Each worker takes a rate-limiter token, fetches with
//! retries, extracts the page, and publishes exactly one `Document` or one
//! `FetchError` per URL onto two output streams.
//!
//! ```text
//! urls ──► feeder ──► [url queue] ──► worker × N ──┬──► documents
//!                                                  └──► errors
//! ```
//!
//! The workers own the only senders of both streams, so the streams close
//! exactly when the last worker exits. The returned join handle resolves
//! at that point with a [`FetchSummary`].

use crate::error::{FetchError, FetchFailure, WordTallyError};
use crate::extract::Extractor;
use crate::rate_limiter::RateLimiter;
use crate::transport::HttpTransport;
use crate::types::Document;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How many times to try one URL and how long to pause in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(200),
        }
    }
}

/// Sizing of the fetch stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchConfig {
    pub max_workers: usize,
    pub document_buffer: usize,
    pub error_buffer: usize,
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_workers: 200,
            document_buffer: 10,
            error_buffer: 100,
            retry: RetryPolicy::default(),
        }
    }
}

/// What the fetch stage did, available once every worker has exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchSummary {
    /// URLs handed to the stage
    pub urls: usize,
    /// Workers launched
    pub workers: usize,
    /// Documents published
    pub documents: usize,
    /// Errors published
    pub errors: usize,
}

impl FetchSummary {
    /// URLs that produced neither outcome because cancellation stopped them.
    pub fn abandoned(&self) -> usize {
        self.urls.saturating_sub(self.documents + self.errors)
    }
}

/// Output of [`DocumentFetcher::stream`].
pub struct DocumentStreams {
    pub documents: mpsc::Receiver<Document>,
    pub errors: mpsc::Receiver<FetchError>,
    /// Join point of the worker pool
    pub handle: JoinHandle<FetchSummary>,
}

/// Read a URL list: one URL per line, `#` comments and blank lines skipped.
pub fn parse_url_list<R: BufRead>(reader: R) -> Result<Vec<String>, WordTallyError> {
    let mut urls = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();

        // Skip empty lines and comments
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        urls.push(trimmed.to_string());
    }

    Ok(urls)
}

/// Read a URL list file.
pub fn read_url_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>, WordTallyError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        WordTallyError::file_error(
            path.to_string_lossy(),
            format!("Failed to open essay list file: {}", e),
        )
    })?;

    let urls = parse_url_list(BufReader::new(file)).map_err(|e| {
        WordTallyError::file_error(
            path.to_string_lossy(),
            format!("Error reading essay list file: {}", e),
        )
    })?;

    info!(path = %path.display(), urls = urls.len(), "found essay URLs");
    Ok(urls)
}

/// Fetch-stage coordinator.
pub struct DocumentFetcher<T> {
    transport: Arc<T>,
    limiter: Arc<RateLimiter>,
    extractor: Arc<dyn Extractor>,
    config: FetchConfig,
}

impl<T> Clone for DocumentFetcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            limiter: Arc::clone(&self.limiter),
            extractor: Arc::clone(&self.extractor),
            config: self.config,
        }
    }
}

/// Result of working one URL.
enum Outcome {
    Fetched(Document),
    Failed(FetchError),
    Cancelled,
}

impl<T: HttpTransport> DocumentFetcher<T> {
    pub fn new(
        transport: Arc<T>,
        limiter: Arc<RateLimiter>,
        extractor: Arc<dyn Extractor>,
        config: FetchConfig,
    ) -> Self {
        Self {
            transport,
            limiter,
            extractor,
            config,
        }
    }

    /// Start fetching `urls` and return the two output streams.
    ///
    /// Runs until every URL has an outcome or `cancel` fires. Must be
    /// called from within a tokio runtime.
    pub fn stream(&self, urls: Vec<String>, cancel: CancellationToken) -> DocumentStreams {
        let total = urls.len();
        let workers = self.config.max_workers.max(1).min(total);

        let (doc_tx, documents) = mpsc::channel(self.config.document_buffer.max(1));
        let (err_tx, errors) = mpsc::channel(self.config.error_buffer.max(1));
        let (url_tx, url_rx) = mpsc::channel::<String>(workers.max(1));
        let queue = Arc::new(Mutex::new(url_rx));

        info!(urls = total, workers, "starting fetch workers");

        let feeder = tokio::spawn(feed(urls, url_tx, cancel.clone()));

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let fetcher = self.clone();
            let queue = Arc::clone(&queue);
            let doc_tx = doc_tx.clone();
            let err_tx = err_tx.clone();
            let cancel = cancel.clone();
            pool.spawn(async move {
                fetcher
                    .run_worker(worker_id, queue, doc_tx, err_tx, cancel)
                    .await
            });
        }
        // Workers now hold the only senders.
        drop(doc_tx);
        drop(err_tx);

        let handle = tokio::spawn(async move {
            let mut summary = FetchSummary {
                urls: total,
                workers,
                ..FetchSummary::default()
            };

            while let Some(joined) = pool.join_next().await {
                match joined {
                    Ok((documents, errors)) => {
                        summary.documents += documents;
                        summary.errors += errors;
                    }
                    Err(e) => warn!(error = %e, "fetch worker panicked"),
                }
            }

            if let Err(e) = feeder.await {
                warn!(error = %e, "url feeder panicked");
            }

            info!(
                documents = summary.documents,
                errors = summary.errors,
                abandoned = summary.abandoned(),
                "fetch workers finished"
            );
            summary
        });

        DocumentStreams {
            documents,
            errors,
            handle,
        }
    }

    /// Pull URLs until the queue closes or cancellation fires.
    ///
    /// Returns how many documents and errors this worker published.
    async fn run_worker(
        self,
        worker_id: usize,
        queue: Arc<Mutex<mpsc::Receiver<String>>>,
        documents: mpsc::Sender<Document>,
        errors: mpsc::Sender<FetchError>,
        cancel: CancellationToken,
    ) -> (usize, usize) {
        let mut published = (0, 0);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                url = async { queue.lock().await.recv().await } => url,
            };
            let Some(url) = next else {
                break;
            };

            match self.fetch_one(&url, &cancel).await {
                Outcome::Fetched(document) => {
                    if !publish(&documents, document, &cancel).await {
                        break;
                    }
                    published.0 += 1;
                }
                Outcome::Failed(error) => {
                    warn!(url = %error.url, attempts = error.attempts, "{}", error.failure);
                    if !publish(&errors, error, &cancel).await {
                        break;
                    }
                    published.1 += 1;
                }
                Outcome::Cancelled => break,
            }
        }

        debug!(
            worker_id,
            documents = published.0,
            errors = published.1,
            "fetch worker exiting"
        );
        published
    }

    /// Acquire a token, then fetch with retries and extract.
    async fn fetch_one(&self, url: &str, cancel: &CancellationToken) -> Outcome {
        if self.limiter.acquire(cancel).await.is_err() {
            return Outcome::Cancelled;
        }

        let max_attempts = self.config.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Outcome::Cancelled,
                result = self.transport.get(url) => result,
            };

            let failure = match result {
                Ok(response) if response.is_ok() => {
                    let extracted = self.extractor.extract(&response.body);
                    return Outcome::Fetched(Document {
                        url: url.to_string(),
                        title: extracted.title,
                        body: extracted.body,
                    });
                }
                Ok(response) => FetchFailure::Status {
                    code: response.status,
                },
                Err(failure) => failure,
            };

            if !failure.is_retryable() || attempt >= max_attempts {
                return Outcome::Failed(FetchError::new(url, failure, attempt));
            }

            debug!(url, attempt, error = %failure, "fetch attempt failed, retrying");

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Outcome::Cancelled,
                _ = tokio::time::sleep(self.config.retry.delay) => {}
            }
        }
    }
}

async fn feed(urls: Vec<String>, queue: mpsc::Sender<String>, cancel: CancellationToken) {
    for url in urls {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            sent = queue.send(url) => {
                if sent.is_err() {
                    return;
                }
            }
        }
    }
}

/// Send `item`, giving up on cancellation or a closed stream.
async fn publish<I>(stream: &mpsc::Sender<I>, item: I, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = stream.send(item) => sent.is_ok(),
    }
}
