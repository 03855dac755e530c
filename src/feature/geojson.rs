use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use serde_json::{Map, Value};

use crate::feature::{FeatureRecord, Geometry, Ring};
use crate::foundation::error::{MapError, MapResult};

/// Property names probed, in order, when no label field is given.
pub const LABEL_CANDIDATES: &[&str] = &[
    "CTYUA23NM",
    "CTYUA21NM",
    "NAME",
    "name",
    "Name",
    "county",
    "COUNTY",
    "region",
    "REGION",
];

/// How the label property is chosen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum LabelField {
    /// Use exactly this property.
    Explicit(String),
    /// Use the first of [`LABEL_CANDIDATES`] present on any feature.
    #[default]
    Probe,
}

/// An ordered feature collection plus its shared spatial-reference context.
#[derive(Clone, Debug)]
pub struct FeatureCollection {
    pub records: Vec<FeatureRecord>,
    /// The property the labels were read from; `None` for an empty collection.
    pub label_field: Option<String>,
    /// Spatial reference name from the legacy `crs` member, if any.
    pub crs: Option<String>,
    /// Where the collection came from, for the manifest.
    pub source_name: String,
}

impl FeatureCollection {
    pub fn from_records(source_name: impl Into<String>, records: Vec<FeatureRecord>) -> Self {
        Self {
            records,
            label_field: None,
            crs: None,
            source_name: source_name.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Read a GeoJSON `FeatureCollection` from a file.
    pub fn read_path(path: &Path, label: &LabelField) -> MapResult<Self> {
        let f = File::open(path).map_err(|e| {
            MapError::source_failure(format!("open '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f), label, path.display().to_string())
    }

    pub fn from_reader<R: Read>(
        reader: R,
        label: &LabelField,
        source_name: impl Into<String>,
    ) -> MapResult<Self> {
        let root: Value = serde_json::from_reader(reader)
            .map_err(|e| MapError::source_failure(format!("parse GeoJSON: {e}")))?;
        Self::from_value(root, label, source_name)
    }

    pub fn from_value(
        root: Value,
        label: &LabelField,
        source_name: impl Into<String>,
    ) -> MapResult<Self> {
        let source_name = source_name.into();
        let Value::Object(mut root) = root else {
            return Err(MapError::source_failure("GeoJSON root must be an object"));
        };
        match root.get("type").and_then(Value::as_str) {
            Some("FeatureCollection") => {}
            Some(other) => {
                return Err(MapError::source_failure(format!(
                    "expected a FeatureCollection, found '{other}'"
                )));
            }
            None => return Err(MapError::source_failure("GeoJSON root has no 'type'")),
        }

        let crs = root
            .get("crs")
            .and_then(|c| c.pointer("/properties/name"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        let features = match root.remove("features") {
            Some(Value::Array(features)) => features,
            _ => {
                return Err(MapError::source_failure(
                    "FeatureCollection has no 'features' array",
                ));
            }
        };

        let mut raw = Vec::with_capacity(features.len());
        for (idx, feature) in features.into_iter().enumerate() {
            let Value::Object(mut feature) = feature else {
                return Err(MapError::source_failure(format!(
                    "feature {idx} is not an object"
                )));
            };
            let props = match feature.remove("properties") {
                Some(Value::Object(props)) => props,
                _ => Map::new(),
            };
            let geometry = parse_geometry(feature.remove("geometry").unwrap_or(Value::Null));
            raw.push((props, geometry));
        }

        let label_field = if raw.is_empty() {
            None
        } else {
            Some(resolve_label_field(&raw, label)?)
        };

        let records = raw
            .into_iter()
            .enumerate()
            .map(|(idx, (props, geometry))| {
                let label = label_field
                    .as_deref()
                    .and_then(|field| props.get(field))
                    .map(label_text)
                    .unwrap_or_default();
                FeatureRecord::new(idx, label, geometry)
            })
            .collect::<Vec<_>>();

        tracing::info!(
            source = %source_name,
            features = records.len(),
            label_field = label_field.as_deref().unwrap_or("-"),
            crs = crs.as_deref().unwrap_or("-"),
            "loaded feature collection"
        );

        Ok(Self {
            records,
            label_field,
            crs,
            source_name,
        })
    }
}

fn resolve_label_field(
    raw: &[(Map<String, Value>, Geometry)],
    label: &LabelField,
) -> MapResult<String> {
    let present = |field: &str| raw.iter().any(|(props, _)| props.contains_key(field));
    match label {
        LabelField::Explicit(field) => {
            if present(field) {
                Ok(field.clone())
            } else {
                Err(MapError::source_failure(format!(
                    "label field '{field}' is not present on any feature"
                )))
            }
        }
        LabelField::Probe => LABEL_CANDIDATES
            .iter()
            .find(|c| present(**c))
            .map(|c| (*c).to_owned())
            .ok_or_else(|| {
                MapError::source_failure(format!(
                    "no label field found; tried {}",
                    LABEL_CANDIDATES.join(", ")
                ))
            }),
    }
}

fn label_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_geometry(v: Value) -> Geometry {
    let mut obj = match v {
        Value::Object(obj) => obj,
        Value::Null => return Geometry::Empty,
        _ => return Geometry::Malformed("geometry is not an object".into()),
    };
    let kind = match obj.get("type").and_then(Value::as_str) {
        Some(kind) => kind.to_owned(),
        None => return Geometry::Malformed("geometry has no 'type'".into()),
    };
    let coords = obj.remove("coordinates").unwrap_or(Value::Null);
    match kind.as_str() {
        "Polygon" => match parse_rings(&coords) {
            Ok(rings) => Geometry::Polygon(rings),
            Err(e) => Geometry::Malformed(format!("Polygon: {e}")),
        },
        "MultiPolygon" => {
            let Some(parts) = coords.as_array() else {
                return Geometry::Malformed("MultiPolygon: coordinates must be an array".into());
            };
            let mut polys = Vec::with_capacity(parts.len());
            for (i, part) in parts.iter().enumerate() {
                match parse_rings(part) {
                    Ok(rings) => polys.push(rings),
                    Err(e) => {
                        return Geometry::Malformed(format!("MultiPolygon part {i}: {e}"));
                    }
                }
            }
            Geometry::MultiPolygon(polys)
        }
        _ => Geometry::Unsupported(kind),
    }
}

fn parse_rings(v: &Value) -> Result<Vec<Ring>, String> {
    let rings = v.as_array().ok_or("rings must be an array")?;
    rings
        .iter()
        .map(|ring| {
            ring.as_array()
                .ok_or_else(|| "ring must be an array".to_owned())?
                .iter()
                .map(parse_position)
                .collect::<Result<Ring, String>>()
        })
        .collect()
}

fn parse_position(v: &Value) -> Result<[f64; 2], String> {
    let pos = v.as_array().ok_or("position must be an array")?;
    match (
        pos.first().and_then(Value::as_f64),
        pos.get(1).and_then(Value::as_f64),
    ) {
        (Some(x), Some(y)) => Ok([x, y]),
        _ => Err(format!("position {v} needs two numbers")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(features: Value) -> Value {
        serde_json::json!({ "type": "FeatureCollection", "features": features })
    }

    fn square() -> Value {
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 1], [0, 0]]]
        })
    }

    #[test]
    fn probes_label_candidates_in_order() {
        let v = collection(serde_json::json!([
            { "type": "Feature", "properties": { "NAME": "Kent", "name": "kent" }, "geometry": square() },
            { "type": "Feature", "properties": { "NAME": 42 }, "geometry": square() },
            { "type": "Feature", "properties": {}, "geometry": square() },
        ]));
        let fc = FeatureCollection::from_value(v, &LabelField::Probe, "test").unwrap();
        assert_eq!(fc.label_field.as_deref(), Some("NAME"));
        let labels: Vec<_> = fc.records.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, ["Kent", "42", ""]);
        assert_eq!(fc.records[2].sequence_index, 2);
    }

    #[test]
    fn unresolved_label_field_is_a_source_error() {
        let v = collection(serde_json::json!([
            { "type": "Feature", "properties": { "code": "E1" }, "geometry": square() },
        ]));
        let err = FeatureCollection::from_value(v.clone(), &LabelField::Probe, "t").unwrap_err();
        assert!(matches!(err, MapError::Source(_)));

        let err = FeatureCollection::from_value(v, &LabelField::Explicit("NAME".into()), "t")
            .unwrap_err();
        assert!(err.to_string().contains("'NAME'"));
    }

    #[test]
    fn empty_collection_is_not_an_error() {
        let fc = FeatureCollection::from_value(collection(serde_json::json!([])), &LabelField::Probe, "t")
            .unwrap();
        assert!(fc.is_empty());
        assert_eq!(fc.label_field, None);
    }

    #[test]
    fn bad_geometry_is_kept_per_record() {
        let v = collection(serde_json::json!([
            { "type": "Feature", "properties": { "name": "a" }, "geometry": { "type": "Point", "coordinates": [0, 0] } },
            { "type": "Feature", "properties": { "name": "b" }, "geometry": { "type": "Polygon", "coordinates": [[["x", 0]]] } },
            { "type": "Feature", "properties": { "name": "c" }, "geometry": null },
            { "type": "Feature", "properties": { "name": "d" }, "geometry": {
                "type": "MultiPolygon", "coordinates": [[[[0, 0, 5], [1, 0, 5], [1, 1, 5], [0, 0, 5]]]]
            } },
        ]));
        let fc = FeatureCollection::from_value(v, &LabelField::Probe, "t").unwrap();
        assert_eq!(fc.records[0].geometry, Geometry::Unsupported("Point".into()));
        assert!(matches!(fc.records[1].geometry, Geometry::Malformed(_)));
        assert_eq!(fc.records[2].geometry, Geometry::Empty);
        assert!(fc.records[3].geometry.polygons().is_ok());
    }

    #[test]
    fn rejects_non_collections_and_reads_crs() {
        let err = FeatureCollection::from_value(
            serde_json::json!({ "type": "Feature" }),
            &LabelField::Probe,
            "t",
        )
        .unwrap_err();
        assert!(err.to_string().contains("FeatureCollection"));

        let mut v = collection(serde_json::json!([]));
        v["crs"] = serde_json::json!({ "type": "name", "properties": { "name": "EPSG:27700" } });
        let fc = FeatureCollection::from_value(v, &LabelField::Probe, "t").unwrap();
        assert_eq!(fc.crs.as_deref(), Some("EPSG:27700"));
    }
}
