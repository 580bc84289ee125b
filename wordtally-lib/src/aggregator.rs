//! Batched word aggregation.
//!
//! A single coordinating loop owns the global tally and both counters. It
//! collects documents into fixed-size batches; each flush fans the batch
//! out to a pool of tokenize workers that build local tallies, joins them
//! all, then merges the local tallies into the global one. Flushes run
//! strictly one after another, so the global tally never sees two merges
//! at once and needs no lock.

use crate::error::FetchError;
use crate::types::{Document, RankedWord, WordTally};
use crate::wordbank::{WordBank, MIN_WORD_LEN};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Count every admissible word of `text` into `tally`.
///
/// Candidates are maximal runs of ASCII letters. A candidate is counted,
/// lowercased, when it has at least three letters and is in `bank`.
pub fn tokenize_into(text: &str, bank: &WordBank, tally: &mut WordTally) {
    for candidate in text.split(|c: char| !c.is_ascii_alphabetic()) {
        if candidate.len() < MIN_WORD_LEN {
            continue;
        }
        let word = candidate.to_ascii_lowercase();
        if bank.contains(&word) {
            tally.increment(&word);
        }
    }
}

/// Tally of the admissible words in `text`.
pub fn tokenize(text: &str, bank: &WordBank) -> WordTally {
    let mut tally = WordTally::new();
    tokenize_into(text, bank, &mut tally);
    tally
}

/// Sizing of the aggregation stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    /// Documents per flush
    pub batch_size: usize,
    /// Tokenize workers per flush
    pub tokenize_workers: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            tokenize_workers: 20,
        }
    }
}

/// What [`WordAggregator::consume`] returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOutcome {
    pub top_words: Vec<RankedWord>,
    /// Documents in fully merged batches
    pub total_documents: usize,
    pub total_errors: usize,
    /// True when cancellation ended the loop before the document stream closed
    pub cancelled: bool,
}

/// Consumer side of the pipeline.
pub struct WordAggregator {
    word_bank: Arc<WordBank>,
    config: AggregatorConfig,
}

impl WordAggregator {
    pub fn new(word_bank: Arc<WordBank>, config: AggregatorConfig) -> Self {
        Self { word_bank, config }
    }

    /// Drain both streams, tally every document, and rank the result.
    ///
    /// If `cancel` fires before the document stream closes the loop
    /// returns at once with what has been merged so far. A flush that has
    /// already started is finished and merged first; documents still
    /// waiting in an unflushed batch are dropped and not counted.
    pub async fn consume(
        &self,
        mut documents: mpsc::Receiver<Document>,
        mut errors: mpsc::Receiver<FetchError>,
        top_n: usize,
        cancel: CancellationToken,
    ) -> AggregateOutcome {
        let batch_size = self.config.batch_size.max(1);
        let mut tally = WordTally::new();
        let mut batch: Vec<Document> = Vec::with_capacity(batch_size);
        let mut total_documents = 0usize;
        let mut total_errors = 0usize;
        let mut errors_open = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(
                        documents = total_documents,
                        errors = total_errors,
                        discarded = batch.len(),
                        "aggregation cancelled, returning partial results"
                    );
                    return AggregateOutcome {
                        top_words: tally.top_n(top_n),
                        total_documents,
                        total_errors,
                        cancelled: true,
                    };
                }
                document = documents.recv() => match document {
                    Some(document) => {
                        batch.push(document);
                        if batch.len() >= batch_size {
                            total_documents += self.flush(&mut batch, &mut tally).await;
                            info!(documents = total_documents, "processed essays");
                        }
                    }
                    None => break,
                },
                error = errors.recv(), if errors_open => match error {
                    Some(error) => {
                        debug!(url = %error.url, "counted fetch error");
                        total_errors += 1;
                    }
                    None => errors_open = false,
                },
            }
        }

        total_documents += self.flush(&mut batch, &mut tally).await;
        if errors_open {
            total_errors += drain_errors(&mut errors);
        }

        info!(
            documents = total_documents,
            errors = total_errors,
            distinct_words = tally.len(),
            "aggregation complete"
        );

        AggregateOutcome {
            top_words: tally.top_n(top_n),
            total_documents,
            total_errors,
            cancelled: false,
        }
    }

    /// Fan `batch` out to the tokenize pool and merge the results.
    ///
    /// Empties `batch` and returns how many documents were tallied.
    async fn flush(&self, batch: &mut Vec<Document>, tally: &mut WordTally) -> usize {
        let size = batch.len();
        if size == 0 {
            return 0;
        }

        let (work_tx, work_rx) = mpsc::channel(size);
        let mut enqueued = 0usize;
        for document in batch.drain(..) {
            // Capacity equals the batch size and the receiver is held here,
            // so a rejection would be a bug. Such a document is not counted.
            match work_tx.try_send(document) {
                Ok(()) => enqueued += 1,
                Err(e) => warn!(error = %e, "batch queue rejected a document"),
            }
        }
        drop(work_tx);

        let queue = Arc::new(Mutex::new(work_rx));
        let workers = self.config.tokenize_workers.max(1).min(enqueued.max(1));
        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let bank = Arc::clone(&self.word_bank);
            pool.spawn(async move {
                let mut local = WordTally::new();
                loop {
                    let next = queue.lock().await.recv().await;
                    match next {
                        Some(document) => tokenize_into(&document.body, &bank, &mut local),
                        None => break,
                    }
                }
                local
            });
        }

        // Join every worker before touching the global tally.
        let mut locals = Vec::with_capacity(workers);
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(local) => locals.push(local),
                Err(e) => warn!(error = %e, "tokenize worker panicked"),
            }
        }
        for local in locals {
            tally.merge(local);
        }

        debug!(documents = enqueued, workers, "batch merged");
        enqueued
    }
}

/// Count errors already buffered, without waiting for more.
fn drain_errors(errors: &mut mpsc::Receiver<FetchError>) -> usize {
    let mut count = 0;
    while let Ok(error) = errors.try_recv() {
        debug!(url = %error.url, "counted buffered fetch error");
        count += 1;
    }
    count
}
