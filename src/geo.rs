//! GeoJSON normalization for inconsistent upstream geometries
//!
//! The upstream sensor feeds wrap their features under a nonstandard
//! `features1` key and nest the geometry inside `properties`, with no
//! reliable axis order on the coordinate pair. This module repairs both:
//! it emits canonical `Feature`/`FeatureCollection` objects whose
//! coordinates are always `[latitude, longitude]`, disambiguated by the
//! `resolve_axis_order` heuristic.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Container key the upstreams use instead of the GeoJSON `features` key.
/// Deliberately tolerated as-is rather than "fixed" at the boundary.
pub const FEATURES_KEY: &str = "features1";

/// Longitude band of the service region (Burgas); a first coordinate whose
/// integer part falls inside this band is taken to already be latitude-first
const REGION_BAND: std::ops::RangeInclusive<i64> = 26..=28;

/// Errors raised when an upstream payload violates the expected shape
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The `features1` container key is absent or not an array
    #[error("payload is missing the '{FEATURES_KEY}' array")]
    MissingFeatures,

    /// A feature lacks `properties.geometry` with a two-value coordinate pair
    #[error("feature {index} has no usable geometry")]
    BadGeometry { index: usize },
}

/// Normalized geometry, coordinates always `[lat, lng]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// Geometry type carried through from upstream (e.g. "Point")
    #[serde(rename = "type")]
    pub geometry_type: String,
    /// Coordinate pair in `[latitude, longitude]` order
    pub coordinates: [f64; 2],
}

/// The only raw properties republished to consumers; everything else the
/// upstream attaches is dropped. Missing name/description is valid and the
/// key is omitted from the output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Canonical GeoJSON feature emitted to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub feature_type: String,
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

/// Canonical GeoJSON feature collection, order matching the upstream array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub collection_type: String,
    pub features: Vec<Feature>,
}

/// Decides which coordinate is latitude and returns `[lat, lng]`
///
/// Heuristic, not a CRS transform: the integer part of the *printed* first
/// coordinate is compared against the region's known longitude band 26..=28.
/// Inside the band the pair is taken as already latitude-first; outside it
/// the pair is assumed reversed and swapped. Isolated here so it can be
/// replaced by a proper coordinate-reference-system transform without
/// touching the rest of the pipeline.
pub fn resolve_axis_order(first: f64, second: f64) -> [f64; 2] {
    let printed = first.to_string();
    let integer_part = printed.split('.').next().unwrap_or("");

    let in_band = integer_part
        .parse::<i64>()
        .map(|n| REGION_BAND.contains(&n))
        .unwrap_or(false);

    if in_band {
        [first, second]
    } else {
        [second, first]
    }
}

/// Converts a raw upstream container into a canonical feature collection
///
/// Fails with `SchemaError::MissingFeatures` when the `features1` array is
/// absent — a hard precondition checked before any geometry work. No feature
/// is dropped: one with a broken geometry fails the whole payload instead.
pub fn normalize(raw: &Value) -> Result<FeatureCollection, SchemaError> {
    let raw_features = raw
        .get(FEATURES_KEY)
        .and_then(Value::as_array)
        .ok_or(SchemaError::MissingFeatures)?;

    let mut features = Vec::with_capacity(raw_features.len());

    for (index, raw_feature) in raw_features.iter().enumerate() {
        let properties = raw_feature
            .get("properties")
            .ok_or(SchemaError::BadGeometry { index })?;
        let geometry = properties
            .get("geometry")
            .ok_or(SchemaError::BadGeometry { index })?;

        let geometry_type = geometry
            .get("type")
            .and_then(Value::as_str)
            .ok_or(SchemaError::BadGeometry { index })?;

        let coordinates = geometry
            .get("coordinates")
            .and_then(Value::as_array)
            .ok_or(SchemaError::BadGeometry { index })?;
        let first = coordinates
            .first()
            .and_then(Value::as_f64)
            .ok_or(SchemaError::BadGeometry { index })?;
        let second = coordinates
            .get(1)
            .and_then(Value::as_f64)
            .ok_or(SchemaError::BadGeometry { index })?;

        features.push(Feature {
            feature_type: "Feature".to_string(),
            geometry: Geometry {
                geometry_type: geometry_type.to_string(),
                coordinates: resolve_axis_order(first, second),
            },
            properties: FeatureProperties {
                name: properties.get("name").cloned(),
                description: properties.get("description").cloned(),
                data: properties.get("data").cloned(),
            },
        });
    }

    Ok(FeatureCollection {
        collection_type: "FeatureCollection".to_string(),
        features,
    })
}
