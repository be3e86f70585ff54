//! Well-Known-Text serialization.
//!
//! Vertices are rendered as `"{lon} {lat}"` using the shortest decimal
//! representation that round-trips to the same `f64`. No reprojection or
//! rounding is applied.

use species_map_geometry_models::{BoundaryGeometry, BoundingBox, Position, Ring};

use crate::GeometryError;

/// Renders a bounding box as a five-vertex rectangular `POLYGON`.
///
/// Vertex order is west-south, east-south, east-north, west-north,
/// west-south, using the box values exactly as supplied (an inverted box
/// yields an inverted rectangle).
#[must_use]
pub fn bounding_box_to_wkt(bounding_box: &BoundingBox) -> String {
    let BoundingBox {
        south,
        north,
        west,
        east,
    } = *bounding_box;

    let corners = [
        Position::new(west, south),
        Position::new(east, south),
        Position::new(east, north),
        Position::new(west, north),
        Position::new(west, south),
    ];

    format!("POLYGON({})", ring_to_wkt(&corners))
}

/// Renders a boundary geometry as `POLYGON(...)` or `MULTIPOLYGON(...)`.
///
/// Every ring is closed before serialization. An empty ring renders as
/// `()`.
///
/// # Errors
///
/// Returns [`GeometryError::Unsupported`] if the geometry has no
/// coordinates.
pub fn geometry_to_wkt(geometry: &BoundaryGeometry) -> Result<String, GeometryError> {
    if geometry.is_empty() {
        return Err(GeometryError::Unsupported {
            message: format!("{} without coordinates", geometry.geometry_type()),
        });
    }

    Ok(match geometry {
        BoundaryGeometry::Polygon(rings) => format!("POLYGON({})", polygon_body(rings)),
        BoundaryGeometry::MultiPolygon(polygons) => {
            let bodies: Vec<String> = polygons
                .iter()
                .map(|rings| format!("({})", polygon_body(rings)))
                .collect();
            format!("MULTIPOLYGON({})", bodies.join(", "))
        }
    })
}

/// Parses a `GeoJSON` geometry object and renders it as WKT.
///
/// # Errors
///
/// Returns [`GeometryError`] if the geometry cannot be parsed or is not a
/// Polygon/MultiPolygon with coordinates.
pub fn geojson_to_wkt(value: &serde_json::Value) -> Result<String, GeometryError> {
    geometry_to_wkt(&crate::parse_geojson(value)?)
}

fn polygon_body(rings: &[Ring]) -> String {
    rings
        .iter()
        .map(|ring| ring_to_wkt(ring.closed().positions()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn ring_to_wkt(positions: &[Position]) -> String {
    let vertices: Vec<String> = positions
        .iter()
        .map(|p| format!("{} {}", p.lon, p.lat))
        .collect();
    format!("({})", vertices.join(", "))
}
