// ── Value conversion ──
//
// Total conversion from a reading (as decoded from a record) to the type a
// tag was declared with. Absent or mismatched inputs yield the declared
// type's zero value; numbers saturate at the target width.

use cncbridge_driver::Reading;
use serde::Serialize;

use crate::model::DeclaredType;

/// Typed value held by an address-space leaf.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum NodeValue {
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float64(f64),
    String(String),
    Int64Array(Vec<i64>),
    Float64Array(Vec<f64>),
}

impl NodeValue {
    /// `false`, `0`, `0.0`, `""` or an empty array.
    pub fn zero(ty: DeclaredType) -> Self {
        match ty {
            DeclaredType::Bool => Self::Bool(false),
            DeclaredType::Int16 => Self::Int16(0),
            DeclaredType::Int32 => Self::Int32(0),
            DeclaredType::Int64 => Self::Int64(0),
            DeclaredType::Float64 => Self::Float64(0.0),
            DeclaredType::String => Self::String(String::new()),
            DeclaredType::Int64Array => Self::Int64Array(Vec::new()),
            DeclaredType::Float64Array => Self::Float64Array(Vec::new()),
        }
    }

    pub fn declared_type(&self) -> DeclaredType {
        match self {
            Self::Bool(_) => DeclaredType::Bool,
            Self::Int16(_) => DeclaredType::Int16,
            Self::Int32(_) => DeclaredType::Int32,
            Self::Int64(_) => DeclaredType::Int64,
            Self::Float64(_) => DeclaredType::Float64,
            Self::String(_) => DeclaredType::String,
            Self::Int64Array(_) => DeclaredType::Int64Array,
            Self::Float64Array(_) => DeclaredType::Float64Array,
        }
    }
}

/// Convert `reading` (or the `subkey` entry of a map reading) to `ty`.
pub fn convert(reading: Option<&Reading>, subkey: Option<&str>, ty: DeclaredType) -> NodeValue {
    let Some(reading) = reading else {
        return NodeValue::zero(ty);
    };
    match subkey {
        Some(key) => map_entry(reading, key)
            .and_then(|v| from_number(v, ty))
            .unwrap_or_else(|| NodeValue::zero(ty)),
        None => from_reading(reading, ty).unwrap_or_else(|| NodeValue::zero(ty)),
    }
}

/// Map lookup by exact key, then upper case, then lower case.
fn map_entry(reading: &Reading, key: &str) -> Option<f64> {
    reading
        .map_entry(key)
        .or_else(|| reading.map_entry(&key.to_uppercase()))
        .or_else(|| reading.map_entry(&key.to_lowercase()))
}

fn from_reading(reading: &Reading, ty: DeclaredType) -> Option<NodeValue> {
    match (ty, reading) {
        (DeclaredType::Bool, Reading::Bool(b)) => Some(NodeValue::Bool(*b)),
        (DeclaredType::String, Reading::String(s)) => Some(NodeValue::String(s.clone())),
        (DeclaredType::String, Reading::MapInt(_) | Reading::MapFloat(_)) => {
            Some(NodeValue::String(render_map(reading)))
        }
        (DeclaredType::Int64Array, Reading::Int64List(v)) => Some(NodeValue::Int64Array(v.clone())),
        (DeclaredType::Int64Array, Reading::Float64List(v)) => Some(NodeValue::Int64Array(
            v.iter().map(|f| saturate_i64(*f)).collect(),
        )),
        (DeclaredType::Float64Array, Reading::Float64List(v)) => {
            Some(NodeValue::Float64Array(v.clone()))
        }
        (DeclaredType::Float64Array, Reading::Int64List(v)) => Some(NodeValue::Float64Array(
            v.iter().map(|i| widen(*i)).collect(),
        )),
        (
            DeclaredType::Int16 | DeclaredType::Int32 | DeclaredType::Int64,
            Reading::Int16(_) | Reading::Int32(_) | Reading::Int64(_),
        ) => from_integer(integer(reading)?, ty),
        (_, _) => reading.as_f64().and_then(|v| from_number(v, ty)),
    }
}

fn integer(reading: &Reading) -> Option<i64> {
    match reading {
        Reading::Int16(v) => Some(i64::from(*v)),
        Reading::Int32(v) => Some(i64::from(*v)),
        Reading::Int64(v) => Some(*v),
        _ => None,
    }
}

fn from_integer(v: i64, ty: DeclaredType) -> Option<NodeValue> {
    match ty {
        DeclaredType::Int16 => Some(NodeValue::Int16(
            i16::try_from(v.clamp(i64::from(i16::MIN), i64::from(i16::MAX))).ok()?,
        )),
        DeclaredType::Int32 => Some(NodeValue::Int32(
            i32::try_from(v.clamp(i64::from(i32::MIN), i64::from(i32::MAX))).ok()?,
        )),
        DeclaredType::Int64 => Some(NodeValue::Int64(v)),
        _ => None,
    }
}

/// Scalar numeric targets only; everything else is a mismatch.
fn from_number(v: f64, ty: DeclaredType) -> Option<NodeValue> {
    match ty {
        DeclaredType::Float64 => Some(NodeValue::Float64(v)),
        DeclaredType::Int16 | DeclaredType::Int32 | DeclaredType::Int64 => {
            from_integer(saturate_i64(v), ty)
        }
        _ => None,
    }
}

/// Truncate toward zero, saturating at the `i64` range; NaN becomes 0.
#[allow(clippy::as_conversions, clippy::cast_possible_truncation)]
fn saturate_i64(v: f64) -> i64 {
    v as i64
}

#[allow(clippy::as_conversions, clippy::cast_precision_loss)]
fn widen(v: i64) -> f64 {
    v as f64
}

/// `"K: v, K2: v2"` in key order.
fn render_map(reading: &Reading) -> String {
    let parts: Vec<String> = match reading {
        Reading::MapInt(map) => map.iter().map(|(k, v)| format!("{k}: {v}")).collect(),
        Reading::MapFloat(map) => map.iter().map(|(k, v)| format!("{k}: {v}")).collect(),
        _ => Vec::new(),
    };
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn loads() -> Reading {
        Reading::MapFloat(BTreeMap::from([("X".to_owned(), 12.0), ("z".to_owned(), 5.0)]))
    }

    #[test]
    fn zero_values_per_type() {
        assert_eq!(NodeValue::zero(DeclaredType::Bool), NodeValue::Bool(false));
        assert_eq!(NodeValue::zero(DeclaredType::String), NodeValue::String(String::new()));
        assert_eq!(NodeValue::zero(DeclaredType::Float64Array), NodeValue::Float64Array(vec![]));
        assert_eq!(
            NodeValue::zero(DeclaredType::Int32).declared_type(),
            DeclaredType::Int32
        );
    }

    #[test]
    fn floats_narrow_to_declared_width() {
        let v = Reading::Float64(3.0);
        assert_eq!(convert(Some(&v), None, DeclaredType::Int16), NodeValue::Int16(3));
        assert_eq!(convert(Some(&v), None, DeclaredType::Int64), NodeValue::Int64(3));
        assert_eq!(
            convert(Some(&Reading::Float64(1e12)), None, DeclaredType::Int16),
            NodeValue::Int16(i16::MAX)
        );
        assert_eq!(
            convert(Some(&Reading::Float64(-7.9)), None, DeclaredType::Int32),
            NodeValue::Int32(-7)
        );
        assert_eq!(
            convert(Some(&Reading::Int16(4)), None, DeclaredType::Float64),
            NodeValue::Float64(4.0)
        );
    }

    #[test]
    fn subkeys_try_exact_then_upper_then_lower() {
        let m = loads();
        assert_eq!(convert(Some(&m), Some("X"), DeclaredType::Int64), NodeValue::Int64(12));
        assert_eq!(convert(Some(&m), Some("x"), DeclaredType::Int64), NodeValue::Int64(12));
        assert_eq!(convert(Some(&m), Some("Z"), DeclaredType::Float64), NodeValue::Float64(5.0));
        assert_eq!(convert(Some(&m), Some("Y"), DeclaredType::Int64), NodeValue::Int64(0));
    }

    #[test]
    fn mismatches_become_zero() {
        assert_eq!(convert(None, None, DeclaredType::Int16), NodeValue::Int16(0));
        assert_eq!(
            convert(Some(&Reading::String("N10".into())), None, DeclaredType::Int64),
            NodeValue::Int64(0)
        );
        assert_eq!(
            convert(Some(&Reading::Float64(1.0)), None, DeclaredType::Bool),
            NodeValue::Bool(false)
        );
        assert_eq!(
            convert(Some(&Reading::Float64(1.0)), Some("X"), DeclaredType::Int64),
            NodeValue::Int64(0)
        );
    }

    #[test]
    fn maps_render_into_string_leaves() {
        assert_eq!(
            convert(Some(&loads()), None, DeclaredType::String),
            NodeValue::String("X: 12, z: 5".into())
        );
    }

    #[test]
    fn lists_convert_elementwise() {
        let v = Reading::Float64List(vec![1.5, -2.0]);
        assert_eq!(
            convert(Some(&v), None, DeclaredType::Int64Array),
            NodeValue::Int64Array(vec![1, -2])
        );
        assert_eq!(
            convert(Some(&v), None, DeclaredType::Float64Array),
            NodeValue::Float64Array(vec![1.5, -2.0])
        );
    }
}
