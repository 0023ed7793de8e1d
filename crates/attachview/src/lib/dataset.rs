//! Classification of analysis-primitive datasets
//!
//! A dataset is a JSON object keyed by measurement name. Each value is either
//! a scalar (`{"type": "Scalar", "value": 5}`) or a point sequence
//! (`{"points": [[x, y, z], ...]}`). Anything else is dropped without error.
//! A record tagged as a scalar stays a scalar even when its value is unusable.
//!
//! Entries are visited in document order (`serde_json` is built with
//! `preserve_order`). If a document repeats a key, the parser keeps the last
//! value at the position of the first occurrence.

use bevy::log::{debug, warn};
use bevy::math::Vec3;
use serde_json::{Map, Value};

/// Discriminator value that marks a scalar entry
pub const SCALAR_TYPE: &str = "Scalar";

#[derive(Debug, Clone, PartialEq)]
pub struct Scalar {
    pub label: String,
    /// `None` when the record's value is missing or not a number
    pub value: Option<f64>,
}

impl Scalar {
    pub fn display_value(&self) -> String {
        match self.value {
            Some(value) => value.to_string(),
            None => "n/a".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spline {
    pub label: String,
    pub points: Vec<Vec3>,
}

/// One decoded dataset record
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetEntry {
    Scalar(Option<f64>),
    Spline(Vec<Vec3>),
    Unrecognized,
}

impl DatasetEntry {
    /// Decode a record by a fixed rule: the scalar tag is checked first, then
    /// the `points` array. A record never lands in both collections.
    pub fn decode(record: &Value) -> Self {
        let Some(fields) = record.as_object() else {
            return Self::Unrecognized;
        };

        if fields.get("type").and_then(Value::as_str) == Some(SCALAR_TYPE) {
            return Self::Scalar(fields.get("value").and_then(Value::as_f64));
        }

        match fields.get("points") {
            Some(Value::Array(items)) => match decode_points(items) {
                Some(points) if !points.is_empty() => Self::Spline(points),
                _ => Self::Unrecognized,
            },
            _ => Self::Unrecognized,
        }
    }
}

/// `[[x, y, z], ...]` into points; `None` if any item is not a numeric triple
fn decode_points(items: &[Value]) -> Option<Vec<Vec3>> {
    items
        .iter()
        .map(|item| {
            let coords = item.as_array()?;
            if coords.len() != 3 {
                return None;
            }
            let x = coords[0].as_f64()? as f32;
            let y = coords[1].as_f64()? as f32;
            let z = coords[2].as_f64()? as f32;
            Some(Vec3::new(x, y, z))
        })
        .collect()
}

/// Classified contents of one dataset
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub scalars: Vec<Scalar>,
    pub splines: Vec<Spline>,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.splines.is_empty()
    }

    pub fn point_count(&self) -> usize {
        self.splines.iter().map(|s| s.points.len()).sum()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("dataset is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dataset must be a JSON object, got {found}")]
    NotAnObject { found: &'static str },
}

/// Split a raw dataset into scalars and splines
pub fn classify(raw: &Map<String, Value>) -> Dataset {
    let mut dataset = Dataset::default();

    for (label, record) in raw {
        match DatasetEntry::decode(record) {
            DatasetEntry::Scalar(value) => {
                if value.is_none() {
                    warn!("Scalar '{}' has no numeric value", label);
                }
                dataset.scalars.push(Scalar {
                    label: label.clone(),
                    value,
                });
            }
            DatasetEntry::Spline(points) => dataset.splines.push(Spline {
                label: label.clone(),
                points,
            }),
            DatasetEntry::Unrecognized => {
                debug!("Skipping unrecognized dataset entry '{}'", label);
            }
        }
    }

    dataset
}

/// Parse a fetched body and classify it
pub fn parse_dataset(bytes: &[u8]) -> Result<Dataset, DatasetError> {
    let value: Value = serde_json::from_slice(bytes)?;
    match value {
        Value::Object(map) => Ok(classify(&map)),
        other => Err(DatasetError::NotAnObject {
            found: json_kind(&other),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
