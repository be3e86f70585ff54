//! Nominatim structured search for administrative boundaries.
//!
//! Requests `jsonv2` output with the boundary polygon inlined as `GeoJSON`
//! (`polygon_geojson=1`). Nominatim usage policy allows at most **1
//! request per second** and requires an identifying `User-Agent`.
//!
//! See <https://nominatim.org/release-docs/develop/api/Search/>

use species_map_geometry::GeometryError;
use species_map_geometry_models::BoundingBox;
use species_map_http::HttpRequest;

use crate::{BoundaryError, BoundaryQuery, ResolvedBoundary};

/// Public Nominatim search endpoint.
pub const DEFAULT_BASE_URL: &str = "https://nominatim.openstreetmap.org/search";

/// Candidate `type` preferred over any other result.
const ADMINISTRATIVE_TYPE: &str = "administrative";

/// Returns the full, ordered parameter set sent for `query`.
#[must_use]
pub fn query_params(query: &BoundaryQuery) -> Vec<(&'static str, String)> {
    vec![
        ("format", "jsonv2".to_string()),
        ("polygon_geojson", "1".to_string()),
        ("country", query.country.clone()),
        ("state", query.state.clone()),
        ("county", query.county.clone()),
        ("city", query.city.clone()),
        ("namedetails", "0".to_string()),
        ("addressdetails", "0".to_string()),
    ]
}

/// Builds the search request for `query` against `base_url`.
#[must_use]
pub fn build_request(base_url: &str, query: &BoundaryQuery) -> HttpRequest {
    query_params(query)
        .into_iter()
        .fold(HttpRequest::new(base_url), |request, (key, value)| {
            request.with_query(key, value)
        })
}

/// Parses a Nominatim search response into a [`ResolvedBoundary`].
///
/// The first candidate whose `type` is `"administrative"` wins; if there is
/// none, the first candidate is used.
///
/// # Errors
///
/// Returns [`BoundaryError::NoBoundaryFound`] for an empty result set,
/// [`BoundaryError::MalformedPayload`] if the response is not an array or
/// the selected candidate has a missing/unparseable `boundingbox` or
/// `geojson`, and [`BoundaryError::Geometry`] if the geometry is not a
/// Polygon/MultiPolygon.
pub fn parse_response(
    body: &serde_json::Value,
    query: &BoundaryQuery,
) -> Result<ResolvedBoundary, BoundaryError> {
    let results = body
        .as_array()
        .ok_or_else(|| BoundaryError::MalformedPayload {
            message: "Nominatim response is not an array".to_string(),
        })?;

    let candidate = select_candidate(results).ok_or_else(|| BoundaryError::NoBoundaryFound {
        query: query.to_string(),
    })?;

    if let Some(name) = candidate
        .get("display_name")
        .and_then(serde_json::Value::as_str)
    {
        log::debug!("Selected Nominatim candidate: {name}");
    }

    let bounding_box = parse_bounding_box(candidate.get("boundingbox"))?;

    let geojson = candidate
        .get("geojson")
        .filter(|g| !g.is_null())
        .ok_or_else(|| BoundaryError::MalformedPayload {
            message: "Missing geojson in Nominatim response".to_string(),
        })?;

    let geometry = species_map_geometry::parse_geojson(geojson).map_err(|e| match e {
        GeometryError::Malformed { message } => BoundaryError::MalformedPayload { message },
        unsupported @ GeometryError::Unsupported { .. } => BoundaryError::Geometry(unsupported),
    })?;

    Ok(ResolvedBoundary {
        bounding_box,
        geometry,
    })
}

/// Picks the first administrative candidate, else the first candidate.
#[must_use]
pub fn select_candidate(results: &[serde_json::Value]) -> Option<&serde_json::Value> {
    results
        .iter()
        .find(|item| {
            item.get("type").and_then(serde_json::Value::as_str) == Some(ADMINISTRATIVE_TYPE)
        })
        .or_else(|| results.first())
}

/// Parses Nominatim's `boundingbox`: four numbers (usually as strings) in
/// `(south, north, west, east)` order.
fn parse_bounding_box(value: Option<&serde_json::Value>) -> Result<BoundingBox, BoundaryError> {
    let values = value
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| BoundaryError::MalformedPayload {
            message: "Missing boundingbox in Nominatim response".to_string(),
        })?;

    let numbers = values
        .iter()
        .map(|v| {
            v.as_f64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
                .filter(|n| n.is_finite())
                .ok_or_else(|| BoundaryError::MalformedPayload {
                    message: format!("Non-numeric boundingbox value: {v}"),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let &[south, north, west, east] = numbers.as_slice() else {
        return Err(BoundaryError::MalformedPayload {
            message: format!("boundingbox has {} values, expected 4", numbers.len()),
        });
    };

    Ok(BoundingBox::new(south, north, west, east))
}

#[cfg(test)]
mod tests {
    use super::*;
    use species_map_geometry_models::BoundaryGeometry;

    fn query() -> BoundaryQuery {
        BoundaryQuery::new("United States", "New York", "Ulster County", "Marbletown")
    }

    fn polygon() -> serde_json::Value {
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[-74.2, 41.8], [-74.1, 41.8], [-74.1, 41.9], [-74.2, 41.8]]]
        })
    }

    #[test]
    fn request_carries_fixed_and_query_params() {
        let request = build_request(DEFAULT_BASE_URL, &query());
        assert_eq!(request.url, DEFAULT_BASE_URL);
        assert_eq!(request.query_value("format"), Some("jsonv2"));
        assert_eq!(request.query_value("polygon_geojson"), Some("1"));
        assert_eq!(request.query_value("county"), Some("Ulster County"));
        assert_eq!(request.query_value("city"), Some("Marbletown"));
        assert_eq!(request.query_value("namedetails"), Some("0"));
        assert_eq!(request.query_value("addressdetails"), Some("0"));
    }

    #[test]
    fn prefers_administrative_candidate() {
        let body = serde_json::json!([
            {"type": "hamlet", "boundingbox": ["0", "1", "2", "3"], "geojson": polygon()},
            {"type": "administrative", "boundingbox": ["41.8", "41.9", "-74.2", "-74.1"], "geojson": polygon()}
        ]);
        let boundary = parse_response(&body, &query()).unwrap();
        assert_eq!(
            boundary.bounding_box,
            BoundingBox::new(41.8, 41.9, -74.2, -74.1)
        );
        assert!(matches!(boundary.geometry, BoundaryGeometry::Polygon(_)));
    }

    #[test]
    fn falls_back_to_first_candidate() {
        let body = serde_json::json!([
            {"type": "town", "boundingbox": ["1", "2", "3", "4"], "geojson": polygon()},
            {"type": "village", "boundingbox": ["5", "6", "7", "8"], "geojson": polygon()}
        ]);
        let boundary = parse_response(&body, &query()).unwrap();
        assert_eq!(boundary.bounding_box, BoundingBox::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn empty_results_is_no_boundary() {
        let err = parse_response(&serde_json::json!([]), &query()).unwrap_err();
        assert!(matches!(err, BoundaryError::NoBoundaryFound { .. }));
    }

    #[test]
    fn missing_fields_are_malformed() {
        let cases = [
            serde_json::json!([{"type": "administrative", "geojson": polygon()}]),
            serde_json::json!([{"type": "administrative", "boundingbox": ["1", "2", "3", "4"]}]),
            serde_json::json!([{"boundingbox": ["1", "2", "x", "4"], "geojson": polygon()}]),
            serde_json::json!([{"boundingbox": ["1", "2", "3"], "geojson": polygon()}]),
            serde_json::json!([{"boundingbox": ["1", "2", "3", "NaN"], "geojson": polygon()}]),
            serde_json::json!({"error": "not an array"}),
        ];
        for body in cases {
            let err = parse_response(&body, &query()).unwrap_err();
            assert!(
                matches!(err, BoundaryError::MalformedPayload { .. }),
                "{body} produced {err}"
            );
        }
    }

    #[test]
    fn numeric_bounding_box_values_are_accepted() {
        let body = serde_json::json!([
            {"boundingbox": [41.8, 41.9, -74.2, -74.1], "geojson": polygon()}
        ]);
        let boundary = parse_response(&body, &query()).unwrap();
        assert!((boundary.bounding_box.west - -74.2).abs() < f64::EPSILON);
    }

    #[test]
    fn point_geometry_is_unsupported() {
        let body = serde_json::json!([{
            "boundingbox": ["1", "2", "3", "4"],
            "geojson": {"type": "Point", "coordinates": [3.5, 1.5]}
        }]);
        let err = parse_response(&body, &query()).unwrap_err();
        assert!(matches!(
            err,
            BoundaryError::Geometry(GeometryError::Unsupported { .. })
        ));
    }
}
