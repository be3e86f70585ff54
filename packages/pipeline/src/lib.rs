#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! The species map pipeline.
//!
//! Resolves the configured place to its administrative boundary, fetches
//! threatened-species occurrences inside it from GBIF, tags them with the
//! state conservation status reference table and writes the result to
//! Parquet. Every stage runs once, in order; any failure aborts the run.
//! [`Pipeline::ensure_dataset`] is the only place that may fall back to a
//! previous output.

pub mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use species_map_boundary::cache::{BoundaryCache, Clock, MemoryBoundaryCache, SystemClock};
use species_map_boundary::{BoundaryError, BoundaryResolver, ResolvedBoundary};
use species_map_database::{DbError, DuckDbBoundaryCache};
use species_map_geometry::GeometryError;
use species_map_geometry_models::BoundingBox;
use species_map_http::{HttpClient, HttpError, ReqwestClient, Sleeper, TokioSleeper};
use species_map_occurrence::{
    OccurrenceError, OccurrenceFetcher, ProgressCallback, null_progress,
};
use species_map_status::{EnrichedTable, ReferenceTable, StatusError};

pub use config::{ConfigError, PipelineConfig};

/// Errors that abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Boundary lookup error.
    #[error(transparent)]
    Boundary(#[from] BoundaryError),

    /// Geometry conversion error.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Occurrence retrieval error.
    #[error(transparent)]
    Occurrence(#[from] OccurrenceError),

    /// Reference table error.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// Storage error.
    #[error(transparent)]
    Database(#[from] DbError),

    /// HTTP client setup error.
    #[error(transparent)]
    Http(#[from] HttpError),
}

/// The external services and clocks a [`Pipeline`] talks through.
pub struct Collaborators {
    /// Client for the boundary lookup.
    pub boundary_http: Arc<dyn HttpClient>,
    /// Client for occurrence search.
    pub occurrence_http: Arc<dyn HttpClient>,
    /// Waits for page delays and retry backoff.
    pub sleeper: Arc<dyn Sleeper>,
    /// Boundary cache.
    pub cache: Arc<dyn BoundaryCache>,
    /// Time source for cache expiry.
    pub clock: Arc<dyn Clock>,
    /// Receives occurrence fetch progress.
    pub progress: Arc<dyn ProgressCallback>,
}

impl Collaborators {
    /// Real network clients, the persistent `DuckDB` boundary cache (or a
    /// throwaway in-memory one when `use_cache` is false) and the system
    /// clock.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if an HTTP client cannot be built or the
    /// cache database cannot be opened.
    pub fn live(config: &PipelineConfig, use_cache: bool) -> Result<Self, PipelineError> {
        let user_agent = &config.http.user_agent;
        let boundary_http = ReqwestClient::new(
            user_agent,
            Duration::from_secs(config.boundary.timeout_secs),
        )?;
        let occurrence_http = ReqwestClient::new(
            user_agent,
            Duration::from_secs(config.occurrence.timeout_secs),
        )?;

        let clock = Arc::new(SystemClock);
        let cache: Arc<dyn BoundaryCache> = if use_cache {
            let path = config.boundary_cache_path();
            let cache = DuckDbBoundaryCache::open(&path)?;
            cache.purge_expired(clock.now())?;
            log::debug!("Using boundary cache at {}", path.display());
            Arc::new(cache)
        } else {
            Arc::new(MemoryBoundaryCache::new())
        };

        Ok(Self {
            boundary_http: Arc::new(boundary_http),
            occurrence_http: Arc::new(occurrence_http),
            sleeper: Arc::new(TokioSleeper),
            cache,
            clock,
            progress: null_progress(),
        })
    }

    /// Replaces the progress receiver.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }
}

/// A resolved boundary with its WKT renderings.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundarySummary {
    /// The resolved boundary.
    pub boundary: ResolvedBoundary,
    /// Boundary polygon as WKT, used as the occurrence query geometry.
    pub geometry_wkt: String,
    /// Bounding box as a WKT rectangle.
    pub bbox_wkt: String,
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Bounding box `(south, north, west, east)` of the boundary.
    pub bounding_box: BoundingBox,
    /// `"Polygon"` or `"MultiPolygon"`.
    pub geometry_type: &'static str,
    /// Occurrence query geometry.
    pub geometry_wkt: String,
    /// Bounding box as WKT, for reference.
    pub bbox_wkt: String,
    /// Distinct occurrences fetched.
    pub occurrences_total: usize,
    /// Occurrences whose species has a state conservation rank.
    pub with_status_count: usize,
    /// The enriched table.
    pub table: EnrichedTable,
    /// Where the table was written, once it has been.
    pub output_path: Option<PathBuf>,
}

/// Runs the boundary, occurrence and enrichment stages.
pub struct Pipeline {
    config: PipelineConfig,
    resolver: BoundaryResolver,
    fetcher: OccurrenceFetcher,
}

impl Pipeline {
    /// Wires the stages to `collaborators` using `config`.
    #[must_use]
    pub fn new(config: PipelineConfig, collaborators: Collaborators) -> Self {
        let resolver = BoundaryResolver::new(
            collaborators.boundary_http,
            collaborators.cache,
            collaborators.clock,
        )
        .with_base_url(&config.boundary.base_url)
        .with_ttl(config.cache_ttl());

        let fetcher = OccurrenceFetcher::new(collaborators.occurrence_http, collaborators.sleeper)
            .with_base_url(&config.occurrence.base_url)
            .with_retry_policy(config.retry_policy())
            .with_progress(collaborators.progress);

        Self {
            config,
            resolver,
            fetcher,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolves the configured place and renders its geometry as WKT.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the lookup fails or the geometry cannot
    /// be rendered.
    pub async fn resolve_boundary(&self) -> Result<BoundarySummary, PipelineError> {
        let boundary = self.resolver.resolve(&self.config.boundary.query).await?;
        let geometry_wkt = species_map_geometry::geometry_to_wkt(&boundary.geometry)?;
        let bbox_wkt = species_map_geometry::bounding_box_to_wkt(&boundary.bounding_box);
        Ok(BoundarySummary {
            boundary,
            geometry_wkt,
            bbox_wkt,
        })
    }

    /// Resolves the boundary, fetches occurrences and enriches them with
    /// `reference`. Nothing is written.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] from the first stage that fails.
    pub async fn collect(&self, reference: &ReferenceTable) -> Result<PipelineResult, PipelineError> {
        let summary = self.resolve_boundary().await?;

        let occurrences = self
            .fetcher
            .fetch_occurrences(&summary.geometry_wkt, &self.config.fetch_options())
            .await?;
        let occurrences_total = occurrences.len();

        let table = species_map_status::enrich(occurrences, reference);
        let with_status_count = table.with_status_count();

        Ok(PipelineResult {
            bounding_box: summary.boundary.bounding_box,
            geometry_type: summary.boundary.geometry.geometry_type(),
            geometry_wkt: summary.geometry_wkt,
            bbox_wkt: summary.bbox_wkt,
            occurrences_total,
            with_status_count,
            table,
            output_path: None,
        })
    }

    /// Runs every stage and writes the enriched table to the configured
    /// output path.
    ///
    /// The reference table is loaded before any network access.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] from the first stage that fails. A failed
    /// run leaves any previous output untouched.
    pub async fn run(&self) -> Result<PipelineResult, PipelineError> {
        let reference = ReferenceTable::load(&self.config.reference_table_path())?;
        let mut result = self.collect(&reference).await?;

        let output_path = self.config.output_path();
        let rows = result.table.rows().iter().map(|row| row.cells());
        species_map_database::write_parquet(&output_path, &EnrichedTable::columns(), rows)?;
        result.output_path = Some(output_path);

        log::info!(
            "Pipeline complete: {} occurrences, {} with state status",
            result.occurrences_total,
            result.with_status_count
        );
        Ok(result)
    }

    /// Returns the path of a usable output dataset, running the pipeline
    /// when needed.
    ///
    /// An existing output is returned as-is unless `force` is set. If a run
    /// fails while an older output exists, the failure is logged and the
    /// older output is returned instead.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the run fails and there is no previous
    /// output to fall back on.
    pub async fn ensure_dataset(&self, force: bool) -> Result<PathBuf, PipelineError> {
        let output_path = self.config.output_path();
        if output_path.exists() && !force {
            log::info!("Using existing dataset at {}", output_path.display());
            return Ok(output_path);
        }

        match self.run().await {
            Ok(result) => Ok(result.output_path.unwrap_or(output_path)),
            Err(e) if output_path.exists() => {
                log::warn!(
                    "Pipeline run failed ({e}); using existing dataset at {}",
                    output_path.display()
                );
                Ok(output_path)
            }
            Err(e) => Err(e),
        }
    }
}
