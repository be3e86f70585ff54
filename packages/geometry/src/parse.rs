//! `GeoJSON` geometry parsing.
//!
//! Only Polygon and MultiPolygon are accepted; anything else is rejected
//! before the coordinates are looked at.

use species_map_geometry_models::{BoundaryGeometry, Position, Ring};

use crate::GeometryError;

/// Parses a `GeoJSON` geometry object into a [`BoundaryGeometry`].
///
/// # Errors
///
/// Returns [`GeometryError::Unsupported`] if the `type` tag is missing or
/// is not `Polygon`/`MultiPolygon`, or if `coordinates` is missing or
/// empty. Returns [`GeometryError::Malformed`] if the coordinates are not
/// valid `GeoJSON` positions.
pub fn parse_geojson(value: &serde_json::Value) -> Result<BoundaryGeometry, GeometryError> {
    let geometry_type = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| GeometryError::Unsupported {
            message: "missing geometry type".to_string(),
        })?;

    if !matches!(geometry_type, "Polygon" | "MultiPolygon") {
        return Err(GeometryError::Unsupported {
            message: geometry_type.to_string(),
        });
    }

    let has_coordinates = value
        .get("coordinates")
        .and_then(serde_json::Value::as_array)
        .is_some_and(|coords| !coords.is_empty());
    if !has_coordinates {
        return Err(GeometryError::Unsupported {
            message: format!("{geometry_type} without coordinates"),
        });
    }

    let geometry = geojson::Geometry::from_json_value(value.clone()).map_err(|e| {
        GeometryError::Malformed {
            message: e.to_string(),
        }
    })?;

    match geometry.value {
        geojson::Value::Polygon(rings) => Ok(BoundaryGeometry::Polygon(convert_polygon(&rings)?)),
        geojson::Value::MultiPolygon(polygons) => Ok(BoundaryGeometry::MultiPolygon(
            polygons
                .iter()
                .map(|rings| convert_polygon(rings))
                .collect::<Result<_, _>>()?,
        )),
        _ => Err(GeometryError::Unsupported {
            message: format!("{geometry_type} decoded to a different geometry kind"),
        }),
    }
}

fn convert_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Vec<Ring>, GeometryError> {
    rings
        .iter()
        .map(|ring| {
            ring.iter()
                .map(|position| convert_position(position))
                .collect::<Result<Vec<_>, _>>()
                .map(Ring::new)
        })
        .collect()
}

fn convert_position(position: &[f64]) -> Result<Position, GeometryError> {
    match position {
        [lon, lat, ..] => Ok(Position::new(*lon, *lat)),
        _ => Err(GeometryError::Malformed {
            message: format!("position with {} values", position.len()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_polygon() {
        let value = serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[-74.2, 41.8], [-74.1, 41.8], [-74.1, 41.9]]]
        });
        let geometry = parse_geojson(&value).unwrap();
        let BoundaryGeometry::Polygon(rings) = geometry else {
            panic!("expected polygon");
        };
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].positions()[1], Position::new(-74.1, 41.8));
    }

    #[test]
    fn parses_multipolygon() {
        let value = serde_json::json!({
            "type": "MultiPolygon",
            "coordinates": [
                [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]],
                [[[5.0, 5.0], [6.0, 5.0], [6.0, 6.0], [5.0, 5.0]]]
            ]
        });
        let geometry = parse_geojson(&value).unwrap();
        assert_eq!(geometry.geometry_type(), "MultiPolygon");
        assert_eq!(geometry.ring_count(), 2);
    }

    #[test]
    fn rejects_point() {
        let value = serde_json::json!({"type": "Point", "coordinates": [0.0, 0.0]});
        assert!(matches!(
            parse_geojson(&value),
            Err(GeometryError::Unsupported { .. })
        ));
    }

    #[test]
    fn rejects_missing_type() {
        let value = serde_json::json!({"coordinates": [[[0.0, 0.0]]]});
        assert!(matches!(
            parse_geojson(&value),
            Err(GeometryError::Unsupported { .. })
        ));
    }

    #[test]
    fn rejects_empty_coordinates() {
        for value in [
            serde_json::json!({"type": "Polygon", "coordinates": []}),
            serde_json::json!({"type": "MultiPolygon"}),
            serde_json::json!({"type": "Polygon", "coordinates": null}),
        ] {
            assert!(
                matches!(parse_geojson(&value), Err(GeometryError::Unsupported { .. })),
                "{value} should be unsupported"
            );
        }
    }

    #[test]
    fn rejects_non_numeric_coordinates() {
        let value = serde_json::json!({
            "type": "Polygon",
            "coordinates": [[["a", "b"], [1.0, 0.0]]]
        });
        assert!(matches!(
            parse_geojson(&value),
            Err(GeometryError::Malformed { .. })
        ));
    }
}
