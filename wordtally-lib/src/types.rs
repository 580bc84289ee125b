//! Core data types for the tally pipeline.
//!
//! This module defines the documents that flow between the two stages,
//! the word tallies they produce, the final report, and the pipeline
//! configuration with its accepted ranges.

use crate::error::WordTallyError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// A successfully fetched and extracted document.
///
/// Created once by a fetch worker and moved by value to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// The URL the document was fetched from
    pub url: String,

    /// Extracted title, or "Untitled"
    pub title: String,

    /// Extracted body text, possibly empty
    pub body: String,
}

/// A word and how many times it was counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedWord {
    pub word: String,
    pub count: u64,
}

/// Mapping from lowercase word to occurrence count.
///
/// Counts only ever go up: there is no way to decrement or remove a word.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordTally {
    counts: HashMap<String, u64>,
}

impl WordTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more occurrence of `word`.
    pub fn increment(&mut self, word: &str) {
        if let Some(count) = self.counts.get_mut(word) {
            *count += 1;
        } else {
            self.counts.insert(word.to_string(), 1);
        }
    }

    /// Add every count from `other` into this tally.
    ///
    /// Merging is commutative and associative.
    pub fn merge(&mut self, other: WordTally) {
        if self.counts.is_empty() {
            self.counts = other.counts;
            return;
        }
        for (word, count) in other.counts {
            *self.counts.entry(word).or_insert(0) += count;
        }
    }

    pub fn get(&self, word: &str) -> Option<u64> {
        self.counts.get(word).copied()
    }

    /// Number of distinct words.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// The `n` most frequent words.
    ///
    /// Sorted by count descending, ties broken by word ascending, so the
    /// result never depends on map iteration order. Returns every entry
    /// when fewer than `n` exist.
    pub fn top_n(&self, n: usize) -> Vec<RankedWord> {
        let mut words: Vec<RankedWord> = self
            .counts
            .iter()
            .map(|(word, count)| RankedWord {
                word: word.clone(),
                count: *count,
            })
            .collect();

        words.sort_unstable_by(|a, b| b.count.cmp(&a.count).then_with(|| a.word.cmp(&b.word)));
        words.truncate(n);
        words
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for WordTally {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut tally = WordTally::new();
        for (word, count) in iter {
            *tally.counts.entry(word.into()).or_insert(0) += count;
        }
        tally
    }
}

/// Final result of a run.
///
/// Serializes to the public record `{top_words, total_essays, timestamp}`.
/// The error count and cancellation flag stay on the struct for callers.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub top_words: Vec<RankedWord>,

    #[serde(rename = "total_essays")]
    pub total_documents: usize,

    #[serde(skip_serializing)]
    pub total_errors: usize,

    /// Capture time of the report
    pub timestamp: DateTime<Utc>,

    /// Whether the deadline or an external stop cut the run short
    #[serde(skip_serializing)]
    pub cancelled: bool,
}

pub const DEFAULT_ESSAYS_FILE: &str = "endg-urls";
pub const DEFAULT_WORD_BANK_FILE: &str = "words.txt";

/// Configuration for a pipeline run.
///
/// Every numeric knob has a default and an accepted range; anything
/// outside the range is rejected by [`PipelineConfig::validate`] before
/// the pipeline starts.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Line-oriented list of document URLs
    pub essays_file: String,

    /// Line-oriented dictionary of admissible words
    pub word_bank_file: String,

    /// Maximum number of concurrent fetch workers
    /// Default: 200, Range: 1-1000
    pub fetch_workers: usize,

    /// Tokenize workers per batch flush
    /// Default: 20, Range: 1-1000
    pub tokenize_workers: usize,

    /// Documents per aggregation batch
    /// Default: 100, Range: 1-10000
    pub batch_size: usize,

    /// How many ranked words to report
    /// Default: 10, Range: 1-1000
    pub top_n: usize,

    /// Overall deadline for the whole run
    /// Default: 60 seconds, Range: 1s-1h
    pub processing_timeout: Duration,

    /// Outbound requests per second (also the bucket capacity)
    /// Default: 100, Range: 1-10000
    pub rate_limit: u32,

    /// Buffered documents between the two stages
    /// Default: 10, Range: 1-10000
    pub document_buffer: usize,

    /// Buffered fetch errors between the two stages
    /// Default: 100, Range: 1-10000
    pub error_buffer: usize,

    /// Total attempts per URL, including the first
    /// Default: 3, Range: 1-10
    pub retry_attempts: u32,

    /// Pause between attempts at the same URL
    /// Default: 200 milliseconds, Range: 0-5s
    pub retry_delay: Duration,

    /// Timeout for each individual HTTP request
    /// Default: 10 seconds, Range: 1s-120s
    pub request_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            essays_file: DEFAULT_ESSAYS_FILE.to_string(),
            word_bank_file: DEFAULT_WORD_BANK_FILE.to_string(),
            fetch_workers: 200,
            tokenize_workers: 20,
            batch_size: 100,
            top_n: 10,
            processing_timeout: Duration::from_secs(60),
            rate_limit: 100,
            document_buffer: 10,
            error_buffer: 100,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(200),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl PipelineConfig {
    pub fn with_essays_file<S: Into<String>>(mut self, path: S) -> Self {
        self.essays_file = path.into();
        self
    }

    pub fn with_word_bank_file<S: Into<String>>(mut self, path: S) -> Self {
        self.word_bank_file = path.into();
        self
    }

    pub fn with_fetch_workers(mut self, workers: usize) -> Self {
        self.fetch_workers = workers;
        self
    }

    pub fn with_tokenize_workers(mut self, workers: usize) -> Self {
        self.tokenize_workers = workers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.processing_timeout = timeout;
        self
    }

    pub fn with_rate_limit(mut self, requests_per_second: u32) -> Self {
        self.rate_limit = requests_per_second;
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Check every value against its accepted range.
    pub fn validate(&self) -> Result<(), WordTallyError> {
        if self.essays_file.trim().is_empty() {
            return Err(WordTallyError::config("essays file path cannot be empty"));
        }
        if self.word_bank_file.trim().is_empty() {
            return Err(WordTallyError::config("word bank file path cannot be empty"));
        }

        check_range("fetch workers", self.fetch_workers, 1, 1000)?;
        check_range("tokenize workers", self.tokenize_workers, 1, 1000)?;
        check_range("batch size", self.batch_size, 1, 10_000)?;
        check_range("top words count", self.top_n, 1, 1000)?;
        check_range("rate limit", self.rate_limit as usize, 1, 10_000)?;
        check_range("document buffer", self.document_buffer, 1, 10_000)?;
        check_range("error buffer", self.error_buffer, 1, 10_000)?;
        check_range("retry attempts", self.retry_attempts as usize, 1, 10)?;

        check_duration(
            "process timeout",
            self.processing_timeout,
            Duration::from_secs(1),
            Duration::from_secs(3600),
        )?;
        check_duration(
            "retry delay",
            self.retry_delay,
            Duration::ZERO,
            Duration::from_secs(5),
        )?;
        check_duration(
            "request timeout",
            self.request_timeout,
            Duration::from_secs(1),
            Duration::from_secs(120),
        )?;

        Ok(())
    }
}

fn check_range(name: &str, value: usize, min: usize, max: usize) -> Result<(), WordTallyError> {
    if value < min || value > max {
        return Err(WordTallyError::config(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

fn check_duration(
    name: &str,
    value: Duration,
    min: Duration,
    max: Duration,
) -> Result<(), WordTallyError> {
    if value < min || value > max {
        return Err(WordTallyError::config(format!(
            "{} must be between {:?} and {:?}, got {:?}",
            name, min, max, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tally(entries: &[(&str, u64)]) -> WordTally {
        entries.iter().map(|(w, c)| (*w, *c)).collect()
    }

    #[test]
    fn test_top_n_truncates_with_alphabetical_ties() {
        let t = tally(&[("cherry", 3), ("banana", 5), ("apple", 5)]);
        assert_eq!(
            t.top_n(2),
            vec![
                RankedWord { word: "apple".into(), count: 5 },
                RankedWord { word: "banana".into(), count: 5 },
            ]
        );
    }

    #[test]
    fn test_top_n_returns_all_when_fewer() {
        let t = tally(&[("one", 1), ("two", 2)]);
        let ranked = t.top_n(10);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].word, "two");
        assert!(WordTally::new().top_n(5).is_empty());
    }

    #[test]
    fn test_top_n_is_deterministic() {
        let words = ["delta", "alpha", "echo", "charlie", "bravo", "foxtrot"];
        let first = words.iter().map(|w| (*w, 4)).collect::<WordTally>().top_n(3);
        for _ in 0..20 {
            let again = words.iter().rev().map(|w| (*w, 4)).collect::<WordTally>().top_n(3);
            assert_eq!(first, again);
        }
        let order: Vec<_> = first.iter().map(|r| r.word.as_str()).collect();
        assert_eq!(order, vec!["alpha", "bravo", "charlie"]);
    }

    #[test]
    fn test_merge_is_commutative() {
        let parts = [
            tally(&[("the", 3), ("cat", 1)]),
            tally(&[("cat", 2), ("dog", 5)]),
            tally(&[("the", 1), ("owl", 1)]),
        ];

        let mut forward = WordTally::new();
        for part in parts.iter().cloned() {
            forward.merge(part);
        }
        let mut backward = WordTally::new();
        for part in parts.iter().rev().cloned() {
            backward.merge(part);
        }

        assert_eq!(forward, backward);
        assert_eq!(forward.get("the"), Some(4));
        assert_eq!(forward.get("cat"), Some(3));
        assert_eq!(forward.total(), 13);
    }

    #[test]
    fn test_increment() {
        let mut t = WordTally::new();
        t.increment("word");
        t.increment("word");
        t.increment("other");
        assert_eq!(t.get("word"), Some(2));
        assert_eq!(t.len(), 2);
        assert_eq!(t.get("missing"), None);
    }

    #[test]
    fn test_report_serializes_public_fields_only() {
        let report = Report {
            top_words: vec![RankedWord { word: "the".into(), count: 7 }],
            total_documents: 3,
            total_errors: 2,
            timestamp: Utc::now(),
            cancelled: false,
        };
        let json: serde_json::Value = serde_json::to_value(&report).unwrap();
        assert_eq!(json["total_essays"], 3);
        assert_eq!(json["top_words"][0]["word"], "the");
        assert_eq!(json["top_words"][0]["count"], 7);
        assert!(json.get("timestamp").is_some());
        assert!(json.get("total_errors").is_none());
        assert!(json.get("cancelled").is_none());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_config_rejected() {
        assert!(PipelineConfig::default().with_top_n(0).validate().is_err());
        assert!(PipelineConfig::default().with_fetch_workers(1001).validate().is_err());
        assert!(PipelineConfig::default().with_rate_limit(0).validate().is_err());
        assert!(PipelineConfig::default()
            .with_retry(3, Duration::from_secs(6))
            .validate()
            .is_err());
        assert!(PipelineConfig::default()
            .with_timeout(Duration::from_millis(10))
            .validate()
            .is_err());
        assert!(PipelineConfig::default().with_essays_file("").validate().is_err());
        assert!(PipelineConfig::default()
            .with_request_timeout(Duration::from_millis(500))
            .validate()
            .is_err());
    }

    #[test]
    fn test_request_timeout_builder() {
        let config = PipelineConfig::default().with_request_timeout(Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }
}
