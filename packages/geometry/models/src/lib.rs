#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bounding box and boundary polygon types.
//!
//! These are the shapes produced by the boundary resolver and consumed by
//! the WKT codec. They serialize to the same layout as `GeoJSON` so a
//! cached boundary is readable by any `GeoJSON` tool.

use serde::{Deserialize, Serialize};

/// An axis-aligned box in WGS84 degrees, in Nominatim's
/// `(south, north, west, east)` order.
///
/// The ordering `south <= north` / `west <= east` is not enforced; source
/// data may violate it and consumers must use the values as supplied.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    /// Southern latitude.
    pub south: f64,
    /// Northern latitude.
    pub north: f64,
    /// Western longitude.
    pub west: f64,
    /// Eastern longitude.
    pub east: f64,
}

impl BoundingBox {
    /// Creates a bounding box from `(south, north, west, east)`.
    #[must_use]
    pub const fn new(south: f64, north: f64, west: f64, east: f64) -> Self {
        Self {
            south,
            north,
            west,
            east,
        }
    }

    /// Returns `true` if `south > north` or `west > east`.
    #[must_use]
    pub fn is_inverted(&self) -> bool {
        self.south > self.north || self.west > self.east
    }

    /// Returns the values as a `(south, north, west, east)` tuple.
    #[must_use]
    pub const fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.south, self.north, self.west, self.east)
    }
}

/// A single `(longitude, latitude)` vertex.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Position {
    /// Longitude (WGS84).
    pub lon: f64,
    /// Latitude (WGS84).
    pub lat: f64,
}

impl Position {
    /// Creates a vertex from longitude and latitude.
    #[must_use]
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

impl From<[f64; 2]> for Position {
    fn from([lon, lat]: [f64; 2]) -> Self {
        Self { lon, lat }
    }
}

impl From<Position> for [f64; 2] {
    fn from(position: Position) -> Self {
        [position.lon, position.lat]
    }
}

/// An ordered sequence of vertices describing one boundary loop.
///
/// Rings coming from source data may or may not repeat their first vertex
/// at the end. [`Ring::closed`] produces the closed form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ring {
    positions: Vec<Position>,
}

impl Ring {
    /// Creates a ring from vertices, as supplied.
    #[must_use]
    pub const fn new(positions: Vec<Position>) -> Self {
        Self { positions }
    }

    /// The vertices in order.
    #[must_use]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Number of vertices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns `true` if the ring has no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Returns `true` if the ring is empty or its first and last vertices
    /// are identical.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match (self.positions.first(), self.positions.last()) {
            (Some(first), Some(last)) => first == last,
            _ => true,
        }
    }

    /// Returns the closed form of this ring: the first vertex is appended
    /// when the ring does not already end with it. Idempotent.
    #[must_use]
    pub fn closed(&self) -> Self {
        let mut positions = self.positions.clone();
        if !self.is_closed()
            && let Some(first) = positions.first().copied()
        {
            positions.push(first);
        }
        Self { positions }
    }
}

impl From<Vec<Position>> for Ring {
    fn from(positions: Vec<Position>) -> Self {
        Self::new(positions)
    }
}

/// An administrative boundary geometry.
///
/// Serialized as a `GeoJSON` geometry object (`{"type": ..., "coordinates": ...}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum BoundaryGeometry {
    /// One polygon: exterior ring followed by any holes.
    Polygon(Vec<Ring>),
    /// Several polygons, each an exterior ring followed by any holes.
    MultiPolygon(Vec<Vec<Ring>>),
}

impl BoundaryGeometry {
    /// The `GeoJSON` type tag.
    #[must_use]
    pub const fn geometry_type(&self) -> &'static str {
        match self {
            Self::Polygon(_) => "Polygon",
            Self::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Returns `true` if the geometry has no coordinates at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Polygon(rings) => rings.is_empty(),
            Self::MultiPolygon(polygons) => polygons.is_empty(),
        }
    }

    /// Total number of rings across all polygons.
    #[must_use]
    pub fn ring_count(&self) -> usize {
        match self {
            Self::Polygon(rings) => rings.len(),
            Self::MultiPolygon(polygons) => polygons.iter().map(Vec::len).sum(),
        }
    }
}
