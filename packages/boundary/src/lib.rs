#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Administrative boundary resolution.
//!
//! Looks up a named place with the Nominatim structured search endpoint,
//! picks the administrative boundary among the candidates and returns its
//! bounding box and polygon. Results are memoized through the
//! [`cache::BoundaryCache`] abstraction for a configurable TTL so repeated
//! runs do not hit Nominatim (1 request/second usage policy).
//!
//! The lookup is never retried: a failed request or an unexpected payload
//! fails the run.

pub mod cache;
pub mod nominatim;
pub mod resolver;

use serde::{Deserialize, Serialize};
use species_map_geometry::GeometryError;
use species_map_geometry_models::{BoundaryGeometry, BoundingBox};
use species_map_http::HttpError;

pub use resolver::BoundaryResolver;

/// Default number of days a resolved boundary stays cached.
pub const DEFAULT_CACHE_TTL_DAYS: i64 = 7;

/// Errors from boundary resolution.
#[derive(Debug, thiserror::Error)]
pub enum BoundaryError {
    /// The geocoding service returned no candidates.
    #[error("No boundary found for {query}")]
    NoBoundaryFound {
        /// Human-readable form of the query.
        query: String,
    },

    /// The selected candidate lacks a bounding box or geometry, or they
    /// cannot be parsed.
    #[error("Unexpected boundary payload: {message}")]
    MalformedPayload {
        /// Description of what was wrong with the payload.
        message: String,
    },

    /// The candidate geometry is not a supported polygon type.
    #[error("Boundary geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// The HTTP request failed.
    #[error("Boundary lookup failed: {0}")]
    Http(#[from] HttpError),
}

/// A structured place query: country, state/province, county and city.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryQuery {
    /// Country name (e.g. "United States").
    pub country: String,
    /// State or province (e.g. "New York").
    pub state: String,
    /// County or other sub-division (e.g. "Ulster County").
    pub county: String,
    /// City, town or other place name (e.g. "Marbletown").
    pub city: String,
}

impl BoundaryQuery {
    /// Creates a query from its four parts.
    #[must_use]
    pub fn new(country: &str, state: &str, county: &str, city: &str) -> Self {
        Self {
            country: country.to_owned(),
            state: state.to_owned(),
            county: county.to_owned(),
            city: city.to_owned(),
        }
    }

    /// Cache key covering every parameter sent to the geocoder.
    #[must_use]
    pub fn cache_key(&self) -> String {
        nominatim::query_params(self)
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl std::fmt::Display for BoundaryQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {}, {}, {}",
            self.city, self.county, self.state, self.country
        )
    }
}

/// A resolved boundary: bounding box plus polygon geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedBoundary {
    /// Bounding box as reported by the geocoder.
    pub bounding_box: BoundingBox,
    /// Boundary polygon.
    pub geometry: BoundaryGeometry,
}
