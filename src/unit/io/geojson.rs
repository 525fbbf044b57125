use std::{collections::HashMap, fs, path::Path};

use anyhow::{anyhow, bail, Context, Result};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::Value;
use tracing::debug;

use crate::{common::{self, AttrValue}, unit::{UnitLayer, UnitType}};

impl UnitLayer {
    /// Loads a layer from a GeoJSON FeatureCollection of Polygon / MultiPolygon features.
    pub fn from_geojson(ty: UnitType, path: &Path) -> Result<Self> {
        Self::from_geojson_keyed(ty, ty.key_field(), path)
    }

    /// Like `from_geojson`, with an explicit key field.
    pub fn from_geojson_keyed(ty: UnitType, key_field: &str, path: &Path) -> Result<Self> {
        common::require_file_exists(path)?;
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read GeoJSON: {}", path.display()))?;
        let doc: Value = serde_json::from_str(&text)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?;

        let features = doc.get("features").and_then(Value::as_array)
            .ok_or_else(|| anyhow!("[unit] {} is not a GeoJSON FeatureCollection", path.display()))?;

        let mut shapes = Vec::with_capacity(features.len());
        let mut rows: Vec<HashMap<String, AttrValue>> = Vec::with_capacity(features.len());
        for (i, feature) in features.iter().enumerate() {
            shapes.push(geometry_to_multipolygon(feature.get("geometry").unwrap_or(&Value::Null))
                .with_context(|| format!("[unit] feature {i} of {}", path.display()))?);
            rows.push(feature.get("properties").and_then(Value::as_object)
                .map(|props| props.iter()
                    .map(|(name, value)| (name.clone(), json_to_attr(value)))
                    .collect())
                .unwrap_or_default());
        }

        let data = super::attributes_to_dataframe(&rows, key_field)
            .with_context(|| format!("[unit] reading properties of {}", path.display()))?;
        let epsg = epsg_from_crs_member(&doc);
        debug!("[unit] read {} {} features from {} (epsg {})", shapes.len(), ty, path.display(), epsg);

        Self::from_parts(ty, key_field, data, shapes, epsg)
    }
}

/// RFC 7946 GeoJSON is WGS84; honor a legacy `crs` member naming an EPSG code.
fn epsg_from_crs_member(doc: &Value) -> u32 {
    doc.pointer("/crs/properties/name")
        .and_then(Value::as_str)
        .and_then(|name| name.rsplit(':').next())
        .and_then(|code| code.trim().parse().ok())
        .unwrap_or(4326)
}

fn json_to_attr(value: &Value) -> AttrValue {
    match value {
        Value::Null => AttrValue::Text(None),
        Value::Bool(b) => AttrValue::Flag(Some(*b)),
        Value::Number(n) => AttrValue::Number(n.as_f64()),
        Value::String(s) => AttrValue::Text(Some(s.clone())),
        other => AttrValue::Text(Some(other.to_string())),
    }
}

fn geometry_to_multipolygon(geometry: &Value) -> Result<MultiPolygon<f64>> {
    /// Parse `[[x, y], ...]` into a ring
    fn ring(value: &Value) -> Result<LineString<f64>> {
        let points = value.as_array().ok_or_else(|| anyhow!("ring is not an array"))?;
        points.iter()
            .map(|pt| match pt.as_array().map(Vec::as_slice) {
                Some([x, y, ..]) => match (x.as_f64(), y.as_f64()) {
                    (Some(x), Some(y)) => Ok(Coord { x, y }),
                    _ => bail!("non-numeric coordinate {pt}"),
                },
                _ => bail!("invalid position {pt}"),
            })
            .collect::<Result<Vec<_>>>()
            .map(LineString)
    }

    /// Parse `[exterior, hole, ...]` into a polygon
    fn polygon(value: &Value) -> Result<Option<Polygon<f64>>> {
        let rings = value.as_array().ok_or_else(|| anyhow!("polygon is not an array"))?;
        let Some((exterior, holes)) = rings.split_first() else { return Ok(None) };
        Ok(Some(Polygon::new(ring(exterior)?, holes.iter().map(ring).collect::<Result<_>>()?)))
    }

    if geometry.is_null() { return Ok(MultiPolygon(Vec::new())) }

    let coords = geometry.get("coordinates").ok_or_else(|| anyhow!("geometry has no coordinates"))?;
    match geometry.get("type").and_then(Value::as_str) {
        Some("Polygon") => Ok(MultiPolygon(polygon(coords)?.into_iter().collect())),
        Some("MultiPolygon") => {
            let polys = coords.as_array().ok_or_else(|| anyhow!("multipolygon is not an array"))?;
            Ok(MultiPolygon(polys.iter()
                .map(polygon)
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .flatten()
                .collect()))
        }
        other => bail!("unsupported geometry type {other:?}, expected polygons"),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn reads_feature_collection() {
        let doc = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "CBSAFP": "31080", "NAME": "Los Angeles", "POP": 13.2 },
                    "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]] }
                },
                {
                    "type": "Feature",
                    "properties": { "CBSAFP": 41860, "NAME": "San Francisco", "POP": null },
                    "geometry": { "type": "MultiPolygon", "coordinates": [
                        [[[2, 0], [3, 0], [3, 1], [2, 0]]],
                        [[[4, 0], [5, 0], [5, 1], [4, 0]], [[4.2, 0.1], [4.4, 0.1], [4.4, 0.2], [4.2, 0.1]]]
                    ] }
                }
            ]
        });
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("msa.geojson");
        fs::write(&path, doc.to_string()).unwrap();

        let layer = UnitLayer::from_geojson(UnitType::Msa, &path).unwrap();
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.geoms().epsg(), 4326);
        assert_eq!(layer.unit_ids()[1].id(), "41860");
        assert_eq!(layer.geoms().shapes()[1].0.len(), 2);
        assert_eq!(layer.geoms().shapes()[1].0[1].interiors().len(), 1);

        let pop = layer.data().column("POP").unwrap().f64().unwrap();
        assert_eq!(pop.get(0), Some(13.2));
        assert_eq!(pop.get(1), None);
    }

    #[test]
    fn legacy_crs_member() {
        let doc = json!({ "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::3310" } } });
        assert_eq!(epsg_from_crs_member(&doc), 3310);
        assert_eq!(epsg_from_crs_member(&json!({})), 4326);
    }

    #[test]
    fn rejects_points() {
        let point = json!({ "type": "Point", "coordinates": [0, 0] });
        assert!(geometry_to_multipolygon(&point).is_err());
        assert!(geometry_to_multipolygon(&Value::Null).unwrap().0.is_empty());
    }
}
