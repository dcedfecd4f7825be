use crate::types::{BoundingBox, CslcError, CslcResult, FrameId};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// GeoJSON FeatureCollection of frame footprints. Only the geometry
/// types the frame database actually uses are modeled.
#[derive(Debug, Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    id: serde_json::Value,
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon {
        coordinates: Vec<Vec<Vec<f64>>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Vec<f64>>>>,
    },
}

/// Load the frame-geometry GeoJSON and reduce each frame footprint to a
/// bounding box
pub fn load_geo_bounds<P: AsRef<Path>>(path: P) -> CslcResult<HashMap<FrameId, BoundingBox>> {
    log::info!("Loading frame geometries from: {}", path.as_ref().display());
    let content = std::fs::read_to_string(&path)?;
    parse_geo_bounds(&content)
}

/// Parse a frame-geometry FeatureCollection from JSON text
pub fn parse_geo_bounds(json_text: &str) -> CslcResult<HashMap<FrameId, BoundingBox>> {
    let collection: FeatureCollection = serde_json::from_str(json_text)?;
    let mut bounds = HashMap::with_capacity(collection.features.len());

    for feature in collection.features {
        let frame_id = parse_feature_id(&feature.id)?;
        let bbox = match &feature.geometry {
            Geometry::Polygon { coordinates } => {
                polygon_bounding_box(coordinates.iter().flatten())
            }
            Geometry::MultiPolygon { coordinates } => {
                // A frame footprint split into a multi-polygon crosses
                // the antimeridian; a naive min/max over all points
                // would span nearly the whole globe
                antimeridian_bounding_box(coordinates.iter().flatten().flatten())
            }
        }?;
        bounds.insert(frame_id, bbox);
    }

    log::info!("Loaded bounding boxes for {} frames", bounds.len());
    Ok(bounds)
}

fn parse_feature_id(id: &serde_json::Value) -> CslcResult<FrameId> {
    match id {
        serde_json::Value::Number(n) => n
            .as_u64()
            .map(|v| v as FrameId)
            .ok_or_else(|| CslcError::InvalidFormat(format!("bad frame feature id: {}", n))),
        serde_json::Value::String(s) => s.parse().map_err(|_| {
            CslcError::InvalidFormat(format!("non-numeric frame feature id: {}", s))
        }),
        other => Err(CslcError::InvalidFormat(format!(
            "unsupported frame feature id: {}",
            other
        ))),
    }
}

/// Bounding box of a single polygon: plain min/max over its points
fn polygon_bounding_box<'a, I>(points: I) -> CslcResult<BoundingBox>
where
    I: Iterator<Item = &'a Vec<f64>>,
{
    let mut bbox = empty_bbox();
    let mut seen = false;

    for point in points {
        let (lon, lat) = point_lon_lat(point)?;
        bbox.min_lon = bbox.min_lon.min(lon);
        bbox.max_lon = bbox.max_lon.max(lon);
        bbox.min_lat = bbox.min_lat.min(lat);
        bbox.max_lat = bbox.max_lat.max(lat);
        seen = true;
    }

    if !seen {
        return Err(CslcError::InvalidFormat(
            "frame geometry has no points".to_string(),
        ));
    }
    Ok(bbox)
}

/// Bounding box of an antimeridian-crossing footprint: `min_lon` is the
/// west-most negative longitude and `max_lon` the east-most positive
/// longitude, both clamped to [-180, 180]
fn antimeridian_bounding_box<'a, I>(points: I) -> CslcResult<BoundingBox>
where
    I: Iterator<Item = &'a Vec<f64>>,
{
    let mut bbox = empty_bbox();
    let mut seen = false;

    for point in points {
        let (lon, lat) = point_lon_lat(point)?;
        if lon < 0.0 {
            bbox.min_lon = bbox.min_lon.min(lon);
        } else if lon > 0.0 {
            bbox.max_lon = bbox.max_lon.max(lon);
        }
        bbox.min_lat = bbox.min_lat.min(lat);
        bbox.max_lat = bbox.max_lat.max(lat);
        seen = true;
    }

    if !seen {
        return Err(CslcError::InvalidFormat(
            "frame geometry has no points".to_string(),
        ));
    }

    bbox.min_lon = bbox.min_lon.clamp(-180.0, 180.0);
    bbox.max_lon = bbox.max_lon.clamp(-180.0, 180.0);
    Ok(bbox)
}

fn empty_bbox() -> BoundingBox {
    BoundingBox {
        min_lon: f64::INFINITY,
        max_lon: f64::NEG_INFINITY,
        min_lat: f64::INFINITY,
        max_lat: f64::NEG_INFINITY,
    }
}

fn point_lon_lat(point: &[f64]) -> CslcResult<(f64, f64)> {
    if point.len() < 2 {
        return Err(CslcError::InvalidFormat(format!(
            "geometry point has {} coordinates",
            point.len()
        )));
    }
    Ok((point[0], point[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_simple_polygon_bounds() {
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "id": 831,
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-120.1, 34.2], [-119.5, 34.2], [-119.5, 35.0], [-120.1, 35.0], [-120.1, 34.2]]]
                }
            }]
        }"#;
        let bounds = parse_geo_bounds(geojson).unwrap();
        let bbox = &bounds[&831];
        assert_relative_eq!(bbox.min_lon, -120.1);
        assert_relative_eq!(bbox.max_lon, -119.5);
        assert_relative_eq!(bbox.min_lat, 34.2);
        assert_relative_eq!(bbox.max_lat, 35.0);
    }

    #[test]
    fn test_antimeridian_multipolygon_bounds() {
        // Footprint split at the antimeridian: east part near +180,
        // west part near -180
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "id": "9999",
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[179.2, -16.0], [180.0, -16.0], [180.0, -15.0], [179.2, -15.0], [179.2, -16.0]]],
                        [[[-180.0, -16.0], [-179.4, -16.0], [-179.4, -15.0], [-180.0, -15.0], [-180.0, -16.0]]]
                    ]
                }
            }]
        }"#;
        let bounds = parse_geo_bounds(geojson).unwrap();
        let bbox = &bounds[&9999];
        assert_relative_eq!(bbox.min_lon, -180.0);
        assert_relative_eq!(bbox.max_lon, 180.0);
        assert_relative_eq!(bbox.min_lat, -16.0);
        assert_relative_eq!(bbox.max_lat, -15.0);
    }

    #[test]
    fn test_antimeridian_clamps_unwrapped_longitudes() {
        // Some producers emit unwrapped longitudes past the antimeridian
        let geojson = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "id": 7,
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[179.0, 10.0], [180.8, 10.0], [180.8, 11.0], [179.0, 11.0], [179.0, 10.0]]],
                        [[[-180.4, 10.0], [-179.0, 10.0], [-179.0, 11.0], [-180.4, 11.0], [-180.4, 10.0]]]
                    ]
                }
            }]
        }"#;
        let bounds = parse_geo_bounds(geojson).unwrap();
        let bbox = &bounds[&7];
        assert_eq!(bbox.min_lon, -180.0);
        assert_eq!(bbox.max_lon, 180.0);
    }
}
