// ── Reading values ──
//
// One tagged variant for every shape a reading can take. Conversions into
// declared tag types live in `cncbridge-core`; this module only covers
// construction and the JSON wire form.

use std::collections::BTreeMap;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single value produced by a reading accessor.
///
/// Map variants carry per-axis or per-spindle values keyed by the axis or
/// spindle name the controller reports (`"X"`, `"S1"`, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Int64List(Vec<i64>),
    Float64List(Vec<f64>),
    MapInt(BTreeMap<String, i64>),
    MapFloat(BTreeMap<String, f64>),
}

impl Reading {
    /// Decode a JSON value the way an external consumer sees it: every
    /// number is a 64-bit float, objects become float maps and arrays become
    /// float lists. Non-numeric members of objects and arrays are dropped.
    /// Returns `None` for `null`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n.as_f64().map(Self::Float64),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Array(items) => Some(Self::Float64List(
                items.iter().filter_map(Value::as_f64).collect(),
            )),
            Value::Object(entries) => Some(Self::MapFloat(
                entries
                    .iter()
                    .filter_map(|(k, v)| v.as_f64().map(|f| (k.clone(), f)))
                    .collect(),
            )),
        }
    }

    /// Scalar numeric view, widening integers to `f64`.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int16(v) => Some(f64::from(*v)),
            Self::Int32(v) => Some(f64::from(*v)),
            Self::Int64(v) => Some(*v as f64),
            Self::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Look up one entry of a map-valued reading, widened to `f64`.
    #[allow(clippy::cast_precision_loss, clippy::as_conversions)]
    pub fn map_entry(&self, key: &str) -> Option<f64> {
        match self {
            Self::MapInt(map) => map.get(key).map(|v| *v as f64),
            Self::MapFloat(map) => map.get(key).copied(),
            _ => None,
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Self::MapInt(_) | Self::MapFloat(_))
    }

    /// Short shape name for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int16(_) => "int16",
            Self::Int32(_) => "int32",
            Self::Int64(_) => "int64",
            Self::Float64(_) => "float64",
            Self::String(_) => "string",
            Self::Int64List(_) => "[]int64",
            Self::Float64List(_) => "[]float64",
            Self::MapInt(_) => "map<int64>",
            Self::MapFloat(_) => "map<float64>",
        }
    }
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int16(v) => serializer.serialize_i16(*v),
            Self::Int32(v) => serializer.serialize_i32(*v),
            Self::Int64(v) => serializer.serialize_i64(*v),
            Self::Float64(v) => serializer.serialize_f64(*v),
            Self::String(v) => serializer.serialize_str(v),
            Self::Int64List(v) => v.serialize(serializer),
            Self::Float64List(v) => v.serialize(serializer),
            Self::MapInt(v) => v.serialize(serializer),
            Self::MapFloat(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Reading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value)
            .ok_or_else(|| de::Error::custom(format!("unsupported reading value: {value}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn serializes_to_natural_json() {
        let mut loads = BTreeMap::new();
        loads.insert("X".to_owned(), 12);
        loads.insert("Z".to_owned(), 5);

        assert_eq!(serde_json::to_value(Reading::Int16(3)).unwrap(), json!(3));
        assert_eq!(
            serde_json::to_value(Reading::MapInt(loads)).unwrap(),
            json!({"X": 12, "Z": 5})
        );
        assert_eq!(
            serde_json::to_value(Reading::String("N100".into())).unwrap(),
            json!("N100")
        );
    }

    #[test]
    fn json_numbers_decode_as_float() {
        assert_eq!(Reading::from_json(&json!(3)), Some(Reading::Float64(3.0)));
        let map = Reading::from_json(&json!({"X": 12, "bad": "x"})).unwrap();
        assert_eq!(map.map_entry("X"), Some(12.0));
        assert_eq!(map.map_entry("bad"), None);
        assert_eq!(
            Reading::from_json(&json!([1, "a", 2.5])),
            Some(Reading::Float64List(vec![1.0, 2.5]))
        );
        assert_eq!(Reading::from_json(&Value::Null), None);
    }

    #[test]
    fn deserialize_rejects_null() {
        assert!(serde_json::from_str::<Reading>("null").is_err());
        assert_eq!(
            serde_json::from_str::<Reading>("true").unwrap(),
            Reading::Bool(true)
        );
    }
}
