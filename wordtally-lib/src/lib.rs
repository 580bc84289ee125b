//! # wordtally Library
//!
//! Fetches a list of documents concurrently under a shared rate limit,
//! extracts their article text, and counts how often each dictionary word
//! appears across the whole collection.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tokio_util::sync::CancellationToken;
//! use wordtally_lib::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default()
//!         .with_essays_file("endg-urls")
//!         .with_top_n(10);
//!
//!     let pipeline = Pipeline::new(config)?;
//!     let report = pipeline.run_from_files(CancellationToken::new()).await?;
//!
//!     println!("{}", serde_json::to_string_pretty(&report)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Stages
//!
//! - **Rate limiting**: a token bucket caps request admissions per second
//! - **Fetching**: a bounded worker pool with retries and per-request timeouts
//! - **Aggregation**: documents are tallied in batches by a tokenize pool
//! - **Ranking**: count descending, ties broken alphabetically

// Re-export main public API types and functions
// This makes them available as wordtally_lib::TypeName
pub use aggregator::{tokenize, tokenize_into, AggregateOutcome, AggregatorConfig, WordAggregator};
pub use config::{
    load_env_config, parse_duration_string, ConfigManager, EnvConfig, FileConfig, HttpConfig,
    PathsConfig, PipelineSection,
};
pub use error::{FetchError, FetchFailure, WordTallyError};
pub use extract::{clean_text, Extracted, Extractor, HeuristicExtractor, UNTITLED};
pub use fetcher::{
    parse_url_list, read_url_list, DocumentFetcher, DocumentStreams, FetchConfig, FetchSummary,
    RetryPolicy,
};
pub use pipeline::Pipeline;
pub use rate_limiter::RateLimiter;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
pub use types::{
    Document, PipelineConfig, RankedWord, Report, WordTally, DEFAULT_ESSAYS_FILE,
    DEFAULT_WORD_BANK_FILE,
};
pub use wordbank::{WordBank, MIN_WORD_LEN};

// Public modules
pub mod config;

mod aggregator;
mod error;
mod extract;
mod fetcher;
mod pipeline;
mod rate_limiter;
mod transport;
mod types;
mod wordbank;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, WordTallyError>;

// Library version and metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
