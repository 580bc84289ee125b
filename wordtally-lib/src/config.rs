//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `WT_*`
//! environment variables, and layering them onto a [`PipelineConfig`]
//! with proper precedence rules.

use crate::error::WordTallyError;
use crate::types::PipelineConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Configuration loaded from TOML files.
///
/// ```toml
/// [paths]
/// essays_file = "endg-urls"
/// word_bank_file = "words.txt"
///
/// [pipeline]
/// fetch_workers = 200
/// timeout = "60s"
///
/// [http]
/// retry_attempts = 3
/// retry_delay = "200ms"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    /// Input file locations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paths: Option<PathsConfig>,

    /// Worker pools, batching and buffering
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineSection>,

    /// Request timeout and retry behavior
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PathsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub essays_file: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub word_bank_file: Option<String>,
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PipelineSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_workers: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokenize_workers: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_n: Option<usize>,

    /// Whole-run deadline (as string, e.g. "60s", "2m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Requests per second
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_buffer: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_buffer: Option<usize>,
}

/// `[http]` section.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HttpConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,

    /// Pause between attempts (e.g. "200ms")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_delay: Option<String>,

    /// Per-request timeout (e.g. "10s")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<String>,
}

impl FileConfig {
    /// Overlay every value set in this file onto `config`.
    ///
    /// Durations that fail to parse are left untouched; [`ConfigManager`]
    /// rejects such files before they get here.
    pub fn apply_to(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(paths) = &self.paths {
            if let Some(essays_file) = &paths.essays_file {
                config.essays_file = essays_file.clone();
            }
            if let Some(word_bank_file) = &paths.word_bank_file {
                config.word_bank_file = word_bank_file.clone();
            }
        }

        if let Some(pipeline) = &self.pipeline {
            set(&mut config.fetch_workers, pipeline.fetch_workers);
            set(&mut config.tokenize_workers, pipeline.tokenize_workers);
            set(&mut config.batch_size, pipeline.batch_size);
            set(&mut config.top_n, pipeline.top_n);
            set(&mut config.rate_limit, pipeline.rate_limit);
            set(&mut config.document_buffer, pipeline.document_buffer);
            set(&mut config.error_buffer, pipeline.error_buffer);
            set(
                &mut config.processing_timeout,
                pipeline.timeout.as_deref().and_then(parse_duration_string),
            );
        }

        if let Some(http) = &self.http {
            set(&mut config.retry_attempts, http.retry_attempts);
            set(
                &mut config.retry_delay,
                http.retry_delay.as_deref().and_then(parse_duration_string),
            );
            set(
                &mut config.request_timeout,
                http.request_timeout.as_deref().and_then(parse_duration_string),
            );
        }

        config
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// Configuration discovery and loading functionality.
pub struct ConfigManager {
    /// Whether to report which files were used
    pub verbose: bool,
}

impl ConfigManager {
    /// Create a new configuration manager.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load configuration from a specific file.
    ///
    /// The file must exist, parse as TOML, and hold only valid values.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, WordTallyError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(WordTallyError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            WordTallyError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            WordTallyError::config(format!("Failed to parse TOML configuration: {}", e))
        })?;

        // Validate the loaded configuration
        self.validate_config(&config)?;

        if self.verbose {
            info!(path = %path.display(), "loaded configuration file");
        }

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// Later files override earlier ones field by field: the XDG config,
    /// then `~/.wordtally.toml`, then `./wordtally.toml`. Files that fail
    /// to load are skipped with a warning.
    pub fn discover_and_load(&self) -> FileConfig {
        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        let mut merged_config = FileConfig::default();
        let mut loaded_files = Vec::new();

        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    merged_config = self.merge_configs(merged_config, config);
                    loaded_files.push(path);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "ignoring configuration file"),
            }
        }

        if self.verbose && loaded_files.len() > 1 {
            info!(
                files = ?loaded_files,
                "multiple config files merged, later files take precedence"
            );
        }

        merged_config
    }

    /// Load the explicit file if one is named, otherwise discover.
    pub fn load(&self, explicit: Option<&str>) -> Result<FileConfig, WordTallyError> {
        match explicit {
            Some(path) => self.load_file(path),
            None => Ok(self.discover_and_load()),
        }
    }

    fn get_local_config_path(&self) -> Option<PathBuf> {
        existing(PathBuf::from("./wordtally.toml"))
    }

    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        existing(Path::new(&home).join(".wordtally.toml"))
    }

    /// Follows the XDG Base Directory Specification.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        existing(config_dir.join("wordtally").join("config.toml"))
    }

    /// Merge two configurations, values from `higher` winning.
    pub fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            paths: merge_section(lower.paths, higher.paths, |lower, higher| PathsConfig {
                essays_file: higher.essays_file.or(lower.essays_file),
                word_bank_file: higher.word_bank_file.or(lower.word_bank_file),
            }),
            pipeline: merge_section(lower.pipeline, higher.pipeline, |lower, higher| {
                PipelineSection {
                    fetch_workers: higher.fetch_workers.or(lower.fetch_workers),
                    tokenize_workers: higher.tokenize_workers.or(lower.tokenize_workers),
                    batch_size: higher.batch_size.or(lower.batch_size),
                    top_n: higher.top_n.or(lower.top_n),
                    timeout: higher.timeout.or(lower.timeout),
                    rate_limit: higher.rate_limit.or(lower.rate_limit),
                    document_buffer: higher.document_buffer.or(lower.document_buffer),
                    error_buffer: higher.error_buffer.or(lower.error_buffer),
                }
            }),
            http: merge_section(lower.http, higher.http, |lower, higher| HttpConfig {
                retry_attempts: higher.retry_attempts.or(lower.retry_attempts),
                retry_delay: higher.retry_delay.or(lower.retry_delay),
                request_timeout: higher.request_timeout.or(lower.request_timeout),
            }),
        }
    }

    /// Reject bad durations and out-of-range values.
    fn validate_config(&self, config: &FileConfig) -> Result<(), WordTallyError> {
        let durations = [
            config.pipeline.as_ref().and_then(|p| p.timeout.as_ref()),
            config.http.as_ref().and_then(|h| h.retry_delay.as_ref()),
            config.http.as_ref().and_then(|h| h.request_timeout.as_ref()),
        ];
        for value in durations.into_iter().flatten() {
            if parse_duration_string(value).is_none() {
                return Err(WordTallyError::config(format!(
                    "Invalid duration '{}'. Use format like '250ms', '5s', '2m'",
                    value
                )));
            }
        }

        config.apply_to(PipelineConfig::default()).validate()
    }
}

fn existing(path: PathBuf) -> Option<PathBuf> {
    if path.exists() {
        Some(path)
    } else {
        None
    }
}

fn merge_section<S>(lower: Option<S>, higher: Option<S>, merge: impl FnOnce(S, S) -> S) -> Option<S> {
    match (lower, higher) {
        (Some(lower), Some(higher)) => Some(merge(lower, higher)),
        (lower, higher) => higher.or(lower),
    }
}

/// Environment variable configuration that mirrors CLI options.
///
/// This represents configuration values that can be set via WT_* environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub essays_file: Option<String>,
    pub word_bank_file: Option<String>,
    pub fetch_workers: Option<usize>,
    pub tokenize_workers: Option<usize>,
    pub batch_size: Option<usize>,
    pub top_n: Option<usize>,
    pub timeout: Option<Duration>,
    pub rate_limit: Option<u32>,
    pub document_buffer: Option<usize>,
    pub error_buffer: Option<usize>,
    pub retry_attempts: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub request_timeout: Option<Duration>,
    pub config: Option<String>,
}

impl EnvConfig {
    /// Overlay every variable that was set onto `config`.
    pub fn apply_to(&self, mut config: PipelineConfig) -> PipelineConfig {
        set(&mut config.essays_file, self.essays_file.clone());
        set(&mut config.word_bank_file, self.word_bank_file.clone());
        set(&mut config.fetch_workers, self.fetch_workers);
        set(&mut config.tokenize_workers, self.tokenize_workers);
        set(&mut config.batch_size, self.batch_size);
        set(&mut config.top_n, self.top_n);
        set(&mut config.processing_timeout, self.timeout);
        set(&mut config.rate_limit, self.rate_limit);
        set(&mut config.document_buffer, self.document_buffer);
        set(&mut config.error_buffer, self.error_buffer);
        set(&mut config.retry_attempts, self.retry_attempts);
        set(&mut config.retry_delay, self.retry_delay);
        set(&mut config.request_timeout, self.request_timeout);
        config
    }
}

/// Load configuration from environment variables.
///
/// Parses all WT_* environment variables. Values that do not parse are
/// ignored, with a warning when `verbose`; range checks happen later in
/// [`PipelineConfig::validate`].
pub fn load_env_config(verbose: bool) -> EnvConfig {
    load_env_from(|name| env::var(name).ok(), verbose)
}

/// [`load_env_config`] over an arbitrary variable lookup.
pub fn load_env_from<F>(lookup: F, verbose: bool) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let number = |name| env_parsed(&lookup, name, verbose);
    let duration = |name| env_duration(&lookup, name, verbose);

    EnvConfig {
        essays_file: env_path(&lookup, "WT_ESSAYS_FILE", verbose),
        word_bank_file: env_path(&lookup, "WT_WORDBANK_FILE", verbose),
        fetch_workers: number("WT_FETCH_WORKERS"),
        tokenize_workers: number("WT_TOKENIZE_WORKERS"),
        batch_size: number("WT_BATCH_SIZE"),
        top_n: number("WT_TOP_N"),
        timeout: duration("WT_PROCESS_TIMEOUT"),
        rate_limit: env_parsed(&lookup, "WT_RATE_LIMIT", verbose),
        document_buffer: number("WT_DOCUMENT_BUFFER"),
        error_buffer: number("WT_ERROR_BUFFER"),
        retry_attempts: env_parsed(&lookup, "WT_RETRY_ATTEMPTS", verbose),
        retry_delay: duration("WT_RETRY_DELAY"),
        request_timeout: duration("WT_REQUEST_TIMEOUT"),
        config: env_path(&lookup, "WT_CONFIG", verbose),
    }
}

fn env_path<F>(lookup: &F, name: &str, verbose: bool) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name)?;
    if value.trim().is_empty() {
        return None;
    }
    if verbose {
        info!("Using {}={}", name, value);
    }
    Some(value)
}

fn env_parsed<F, T>(lookup: &F, name: &str, verbose: bool) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let value = lookup(name)?;
    match value.trim().parse::<T>() {
        Ok(parsed) => {
            if verbose {
                info!("Using {}={}", name, value);
            }
            Some(parsed)
        }
        Err(_) => {
            if verbose {
                warn!("Invalid {}='{}', expected a non-negative integer", name, value);
            }
            None
        }
    }
}

fn env_duration<F>(lookup: &F, name: &str, verbose: bool) -> Option<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(name)?;
    let parsed = parse_duration_string(&value);
    if verbose {
        match parsed {
            Some(_) => info!("Using {}={}", name, value),
            None => warn!(
                "Invalid {}='{}', use format like '250ms', '5s', '2m'",
                name, value
            ),
        }
    }
    parsed
}

/// Parse a duration like "250ms", "5s", "2m", or bare seconds.
pub fn parse_duration_string(value: &str) -> Option<Duration> {
    let value = value.trim().to_lowercase();

    if let Some(ms) = value.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = value.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = value.strip_suffix('m') {
        mins.trim()
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        // Assume seconds if no unit
        value.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_parse_duration_string() {
        assert_eq!(parse_duration_string("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration_string("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration_string("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration_string(" 30 "), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration_string("10S"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration_string("invalid"), None);
        assert_eq!(parse_duration_string("-5s"), None);
        assert_eq!(parse_duration_string(""), None);
    }

    #[test]
    fn test_load_valid_config() {
        let temp_file = write_config(
            r#"
[paths]
essays_file = "urls.txt"

[pipeline]
fetch_workers = 50
top_n = 25
timeout = "2m"

[http]
retry_attempts = 5
retry_delay = "500ms"
"#,
        );

        let manager = ConfigManager::new(false);
        let file = manager.load_file(temp_file.path()).unwrap();
        let config = file.apply_to(PipelineConfig::default());

        assert_eq!(config.essays_file, "urls.txt");
        assert_eq!(config.word_bank_file, "words.txt");
        assert_eq!(config.fetch_workers, 50);
        assert_eq!(config.top_n, 25);
        assert_eq!(config.processing_timeout, Duration::from_secs(120));
        assert_eq!(config.retry_attempts, 5);
        assert_eq!(config.retry_delay, Duration::from_millis(500));
        assert_eq!(config.batch_size, 100);
    }

    #[test]
    fn test_out_of_range_value_rejected() {
        let temp_file = write_config("[pipeline]\nfetch_workers = 0\n");
        let result = ConfigManager::new(false).load_file(temp_file.path());
        assert!(matches!(result, Err(WordTallyError::ConfigError { .. })));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let temp_file = write_config("[http]\nrequest_timeout = \"soon\"\n");
        let result = ConfigManager::new(false).load_file(temp_file.path());
        assert!(matches!(result, Err(WordTallyError::ConfigError { .. })));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let temp_file = write_config("[pipeline\nfetch_workers = ");
        let result = ConfigManager::new(false).load_file(temp_file.path());
        assert!(matches!(result, Err(WordTallyError::ConfigError { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigManager::new(false).load_file("definitely/not/here.toml");
        assert!(matches!(result, Err(WordTallyError::FileError { .. })));
    }

    #[test]
    fn test_merge_configs() {
        let manager = ConfigManager::new(false);

        let lower = FileConfig {
            pipeline: Some(PipelineSection {
                fetch_workers: Some(10),
                batch_size: Some(50),
                ..Default::default()
            }),
            http: Some(HttpConfig {
                retry_attempts: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };

        let higher = FileConfig {
            pipeline: Some(PipelineSection {
                fetch_workers: Some(25),
                ..Default::default()
            }),
            paths: Some(PathsConfig {
                word_bank_file: Some("dict.txt".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let merged = manager.merge_configs(lower, higher);
        let pipeline = merged.pipeline.unwrap();

        assert_eq!(pipeline.fetch_workers, Some(25)); // Higher wins
        assert_eq!(pipeline.batch_size, Some(50)); // Lower preserved
        assert_eq!(merged.http.unwrap().retry_attempts, Some(2));
        assert_eq!(merged.paths.unwrap().word_bank_file, Some("dict.txt".to_string()));
    }

    #[test]
    fn test_env_config_parsing() {
        let vars: HashMap<&str, &str> = [
            ("WT_ESSAYS_FILE", "my-urls"),
            ("WT_FETCH_WORKERS", "42"),
            ("WT_TOP_N", "not-a-number"),
            ("WT_PROCESS_TIMEOUT", "90s"),
            ("WT_RETRY_DELAY", "50ms"),
            ("WT_REQUEST_TIMEOUT", "later"),
            ("WT_WORDBANK_FILE", "  "),
        ]
        .into_iter()
        .collect();

        let env = load_env_from(|name| vars.get(name).map(|v| v.to_string()), true);

        assert_eq!(env.essays_file, Some("my-urls".to_string()));
        assert_eq!(env.word_bank_file, None);
        assert_eq!(env.fetch_workers, Some(42));
        assert_eq!(env.top_n, None);
        assert_eq!(env.timeout, Some(Duration::from_secs(90)));
        assert_eq!(env.retry_delay, Some(Duration::from_millis(50)));
        assert_eq!(env.request_timeout, None);
        assert_eq!(env.config, None);
    }

    #[test]
    fn test_env_overrides_file() {
        let file = FileConfig {
            pipeline: Some(PipelineSection {
                fetch_workers: Some(10),
                top_n: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        };
        let env = EnvConfig {
            fetch_workers: Some(30),
            ..Default::default()
        };

        let config = env.apply_to(file.apply_to(PipelineConfig::default()));
        assert_eq!(config.fetch_workers, 30);
        assert_eq!(config.top_n, 5);
        assert_eq!(config.tokenize_workers, 20);
    }
}
