#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Boundary geometry codec.
//!
//! Converts `GeoJSON` Polygon/MultiPolygon objects into
//! [`BoundaryGeometry`] values ([`parse`]) and renders those, as well as
//! plain bounding boxes, as Well-Known-Text query geometries ([`wkt`]).
//!
//! [`BoundaryGeometry`]: species_map_geometry_models::BoundaryGeometry

pub mod parse;
pub mod wkt;

pub use parse::parse_geojson;
pub use wkt::{bounding_box_to_wkt, geojson_to_wkt, geometry_to_wkt};

/// Errors from geometry conversion.
#[derive(Debug, thiserror::Error)]
pub enum GeometryError {
    /// The geometry is not a Polygon or MultiPolygon, or has no
    /// coordinates.
    #[error("Unsupported GeoJSON geometry: {message}")]
    Unsupported {
        /// Description of the offending geometry.
        message: String,
    },

    /// The geometry claims a supported type but its coordinates are not
    /// valid `GeoJSON` positions.
    #[error("Malformed GeoJSON geometry: {message}")]
    Malformed {
        /// Description of what could not be parsed.
        message: String,
    },
}
