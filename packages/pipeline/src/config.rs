//! Pipeline configuration loaded from TOML.
//!
//! The default configuration is embedded at compile time from
//! `config/default.toml`. A user file replaces it; keys the file leaves
//! out fall back to the same defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use species_map_boundary::{BoundaryQuery, DEFAULT_CACHE_TTL_DAYS, nominatim};
use species_map_http::HttpError;
use species_map_occurrence::gbif::{DEFAULT_PAGE_DELAY, DEFAULT_PAGE_SIZE};
use species_map_occurrence::retry::{DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY, DEFAULT_MIN_DELAY};
use species_map_occurrence::{FetchOptions, RetryPolicy};
use species_map_occurrence_models::ThreatStatus;

/// Longest boundary cache lifetime accepted, in days.
pub const MAX_CACHE_TTL_DAYS: i64 = 3650;

/// Longest backoff floor or ceiling accepted, in seconds.
pub const MAX_RETRY_DELAY_SECS: f64 = 3600.0;

/// The embedded default configuration.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

/// Errors loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Read {
        /// File that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration is not valid TOML or has wrongly typed values.
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        /// File that failed.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// The configuration parsed but holds unusable values.
    #[error("Invalid config: {message}")]
    Invalid {
        /// What is wrong.
        message: String,
    },
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub http: HttpConfig,
    pub boundary: BoundaryConfig,
    pub occurrence: OccurrenceConfig,
    pub paths: PathsConfig,
}

/// Settings shared by every outgoing request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// `User-Agent` header. Nominatim rejects requests without one.
    pub user_agent: String,
}

/// Boundary lookup settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BoundaryConfig {
    /// Nominatim search URL.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// How long a resolved boundary stays cached, in days.
    pub cache_ttl_days: i64,
    /// Place to resolve.
    pub query: BoundaryQuery,
}

/// Occurrence search settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OccurrenceConfig {
    /// GBIF occurrence search URL.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// IUCN categories to fetch.
    pub statuses: Vec<ThreatStatus>,
    /// Records per page.
    pub page_size: u32,
    /// Pause between pages of the same status, in milliseconds.
    pub page_delay_ms: u64,
    /// Per-page retry settings.
    pub retry: RetryConfig,
}

/// Backoff settings for occurrence page requests.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts per page, first attempt included.
    pub max_attempts: u32,
    /// Shortest wait between attempts, in seconds.
    pub min_delay_secs: f64,
    /// Longest wait between attempts, in seconds.
    pub max_delay_secs: f64,
    /// Base of the exponential curve, in seconds.
    pub multiplier: f64,
}

/// File locations. Unset entries use [`species_map_database::paths`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Conservation status reference CSV.
    pub reference_table: Option<PathBuf>,
    /// Enriched occurrence Parquet output.
    pub output: Option<PathBuf>,
    /// Boundary cache database.
    pub boundary_cache: Option<PathBuf>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: "species-map/0.1 (+https://github.com/BSteffaniak/species-map)".to_string(),
        }
    }
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            base_url: nominatim::DEFAULT_BASE_URL.to_string(),
            timeout_secs: 30,
            cache_ttl_days: DEFAULT_CACHE_TTL_DAYS,
            query: BoundaryQuery::new("United States", "New York", "Ulster County", "Marbletown"),
        }
    }
}

impl Default for OccurrenceConfig {
    fn default() -> Self {
        Self {
            base_url: species_map_occurrence::DEFAULT_BASE_URL.to_string(),
            timeout_secs: 60,
            statuses: ThreatStatus::DEFAULT.to_vec(),
            page_size: DEFAULT_PAGE_SIZE,
            page_delay_ms: u64::try_from(DEFAULT_PAGE_DELAY.as_millis()).unwrap_or(200),
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_delay_secs: DEFAULT_MIN_DELAY.as_secs_f64(),
            max_delay_secs: DEFAULT_MAX_DELAY.as_secs_f64(),
            multiplier: 1.0,
        }
    }
}

impl PipelineConfig {
    /// Parses the embedded default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (a compile-time constant,
    /// covered by tests).
    #[must_use]
    pub fn embedded() -> Self {
        Self::from_toml_str(DEFAULT_CONFIG_TOML, "<embedded>")
            .unwrap_or_else(|e| panic!("Embedded default config is invalid: {e}"))
    }

    /// Loads the configuration from `path`, or the embedded default when
    /// `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::embedded());
        };
        let label = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: label.clone(),
            source,
        })?;
        let config = Self::from_toml_str(&contents, &label)?;
        log::info!("Loaded config from {label}");
        Ok(config)
    }

    /// Parses and validates TOML text. `label` names the source in errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the text cannot be parsed or validated.
    pub fn from_toml_str(contents: &str, label: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: label.to_owned(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| {
            Err(ConfigError::Invalid {
                message: message.to_owned(),
            })
        };
        let retry = &self.occurrence.retry;

        if self.http.user_agent.trim().is_empty() {
            return invalid("http.user_agent must not be empty");
        }
        if !(1..=MAX_CACHE_TTL_DAYS).contains(&self.boundary.cache_ttl_days) {
            return invalid("boundary.cache_ttl_days must be between 1 and 3650");
        }
        if self.occurrence.statuses.is_empty() {
            return invalid("occurrence.statuses must list at least one status");
        }
        if self.occurrence.page_size == 0 {
            return invalid("occurrence.page_size must be at least 1");
        }
        if retry.max_attempts == 0 {
            return invalid("occurrence.retry.max_attempts must be at least 1");
        }
        let delays = [retry.min_delay_secs, retry.max_delay_secs, retry.multiplier];
        if delays.iter().any(|d| !d.is_finite() || *d < 0.0) {
            return invalid("occurrence.retry delays must be finite and non-negative");
        }
        if retry.max_delay_secs > MAX_RETRY_DELAY_SECS {
            return invalid("occurrence.retry.max_delay_secs must not exceed 3600");
        }
        if retry.min_delay_secs > retry.max_delay_secs {
            return invalid("occurrence.retry.min_delay_secs exceeds max_delay_secs");
        }
        Ok(())
    }

    /// Per-page retry policy for occurrence requests.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy<HttpError> {
        let retry = &self.occurrence.retry;
        RetryPolicy::http()
            .with_max_attempts(retry.max_attempts)
            .with_delays(
                delay_secs(retry.min_delay_secs, DEFAULT_MIN_DELAY),
                delay_secs(retry.max_delay_secs, DEFAULT_MAX_DELAY),
            )
            .with_multiplier(retry.multiplier)
    }

    /// Paging options for occurrence requests.
    #[must_use]
    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions::default()
            .with_statuses(&self.occurrence.statuses)
            .with_page_size(self.occurrence.page_size)
            .with_page_delay(Duration::from_millis(self.occurrence.page_delay_ms))
    }

    /// Boundary cache lifetime.
    #[must_use]
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.boundary.cache_ttl_days.clamp(1, MAX_CACHE_TTL_DAYS))
    }

    #[must_use]
    pub fn reference_table_path(&self) -> PathBuf {
        self.paths
            .reference_table
            .clone()
            .unwrap_or_else(species_map_database::paths::reference_table_path)
    }

    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.paths
            .output
            .clone()
            .unwrap_or_else(species_map_database::paths::output_path)
    }

    #[must_use]
    pub fn boundary_cache_path(&self) -> PathBuf {
        self.paths
            .boundary_cache
            .clone()
            .unwrap_or_else(species_map_database::paths::boundary_cache_db_path)
    }
}

/// Converts configured seconds to a [`Duration`], using `fallback` for
/// values that have no `Duration` form.
fn delay_secs(seconds: f64, fallback: Duration) -> Duration {
    Duration::try_from_secs_f64(seconds.min(MAX_RETRY_DELAY_SECS)).unwrap_or(fallback)
}
