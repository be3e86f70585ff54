//! Cached boundary resolution.

use std::sync::Arc;

use species_map_http::HttpClient;

use crate::cache::{BoundaryCache, Clock};
use crate::{BoundaryError, BoundaryQuery, DEFAULT_CACHE_TTL_DAYS, ResolvedBoundary, nominatim};

/// Resolves place queries to boundaries, consulting the cache first.
pub struct BoundaryResolver {
    http: Arc<dyn HttpClient>,
    cache: Arc<dyn BoundaryCache>,
    clock: Arc<dyn Clock>,
    base_url: String,
    ttl: chrono::Duration,
}

impl BoundaryResolver {
    /// Creates a resolver against the public Nominatim endpoint with the
    /// default 7-day TTL.
    #[must_use]
    pub fn new(
        http: Arc<dyn HttpClient>,
        cache: Arc<dyn BoundaryCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            cache,
            clock,
            base_url: nominatim::DEFAULT_BASE_URL.to_string(),
            ttl: chrono::Duration::days(DEFAULT_CACHE_TTL_DAYS),
        }
    }

    /// Overrides the Nominatim search URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        base_url.clone_into(&mut self.base_url);
        self
    }

    /// Overrides how long resolved boundaries stay cached.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Resolves `query` to a bounding box and boundary polygon.
    ///
    /// A live cache entry is returned unchanged without any network
    /// access. Otherwise a single Nominatim request is made (no retry) and
    /// the result is stored with an expiry of `now + ttl`.
    ///
    /// Cache read or write failures are logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns [`BoundaryError`] if the request fails, returns no
    /// candidates, or returns a payload that cannot be parsed.
    pub async fn resolve(&self, query: &BoundaryQuery) -> Result<ResolvedBoundary, BoundaryError> {
        let key = query.cache_key();
        let now = self.clock.now();

        match self.cache.get(&key, now) {
            Ok(Some(boundary)) => {
                log::info!("Boundary cache hit for {query}");
                return Ok(boundary);
            }
            Ok(None) => log::debug!("Boundary cache miss for {query}"),
            Err(e) => log::warn!("Boundary cache read failed for {query}: {e}"),
        }

        log::info!("Looking up boundary for {query} via {}", self.base_url);
        let request = nominatim::build_request(&self.base_url, query);
        let response = self.http.get(&request).await?.error_for_status()?;
        let body: serde_json::Value = response.json().map_err(|e| BoundaryError::MalformedPayload {
            message: e.to_string(),
        })?;
        let boundary = nominatim::parse_response(&body, query)?;

        if boundary.bounding_box.is_inverted() {
            log::warn!(
                "Bounding box for {query} is inverted (south, north, west, east) = {:?}; \
                 using it as supplied",
                boundary.bounding_box.as_tuple()
            );
        }

        match now.checked_add_signed(self.ttl) {
            Some(expires_at) => {
                if let Err(e) = self.cache.put(&key, &boundary, expires_at) {
                    log::warn!("Boundary cache write failed for {query}: {e}");
                }
            }
            None => log::warn!(
                "Cache TTL {} overflows the clock; not caching {query}",
                self.ttl
            ),
        }

        Ok(boundary)
    }
}
