//! The admissible-word dictionary.
//!
//! Loaded once before the pipeline starts and shared read-only by every
//! tokenize worker, so it needs no locking.

use crate::error::WordTallyError;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

/// Shortest word the dictionary will accept.
pub const MIN_WORD_LEN: usize = 3;

/// Immutable set of lowercase, ASCII-alphabetic words of at least
/// [`MIN_WORD_LEN`] characters.
#[derive(Debug, Clone, Default)]
pub struct WordBank {
    words: HashSet<String>,
}

impl WordBank {
    /// An empty bank that rejects every word.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a bank from words in memory, applying the same filter as a file.
    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let words = words
            .into_iter()
            .filter_map(|word| normalize_entry(word.as_ref()))
            .collect();
        Self { words }
    }

    /// Parse a line-oriented dictionary.
    ///
    /// Blank lines and lines starting with `#` are skipped. Every other
    /// line is trimmed and lowercased, then kept only if it is at least
    /// three characters long and purely ASCII alphabetic.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, WordTallyError> {
        let mut words = HashSet::new();

        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();

            // Skip empty lines and comments
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            if let Some(word) = normalize_entry(trimmed) {
                words.insert(word);
            }
        }

        Ok(Self { words })
    }

    /// Load a dictionary file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, WordTallyError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            WordTallyError::file_error(
                path.to_string_lossy(),
                format!("Failed to open word bank file: {}", e),
            )
        })?;

        let bank = Self::from_reader(BufReader::new(file)).map_err(|e| {
            WordTallyError::file_error(
                path.to_string_lossy(),
                format!("Error reading word bank file: {}", e),
            )
        })?;

        info!(
            path = %path.display(),
            words = bank.len(),
            "loaded valid words from word bank file"
        );

        Ok(bank)
    }

    /// Load a dictionary file, falling back to an empty bank on failure.
    ///
    /// A missing dictionary is a warning, not a fatal error: the run
    /// continues and simply counts nothing.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(bank) => bank,
            Err(e) => {
                warn!(error = %e, "failed to load word bank, continuing with an empty one");
                Self::empty()
            }
        }
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, word: &str) -> bool {
        if word.bytes().any(|b| b.is_ascii_uppercase()) {
            self.words.contains(&word.to_ascii_lowercase())
        } else {
            self.words.contains(word)
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

fn normalize_entry(entry: &str) -> Option<String> {
    let word = entry.trim().to_lowercase();
    if word.len() >= MIN_WORD_LEN && word.bytes().all(|b| b.is_ascii_alphabetic()) {
        Some(word)
    } else {
        None
    }
}
