use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Tag name → declared type, in declaration order.
pub type TagPack = IndexMap<String, DeclaredType>;

/// Type a tag is published as in the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum DeclaredType {
    #[serde(rename = "bool")]
    #[strum(serialize = "bool")]
    Bool,
    #[serde(rename = "int16")]
    #[strum(serialize = "int16")]
    Int16,
    #[serde(rename = "int32")]
    #[strum(serialize = "int32")]
    Int32,
    #[serde(rename = "int64")]
    #[strum(serialize = "int64")]
    Int64,
    #[serde(rename = "float64")]
    #[strum(serialize = "float64")]
    Float64,
    #[serde(rename = "string")]
    #[strum(serialize = "string")]
    String,
    #[serde(rename = "[]int64")]
    #[strum(serialize = "[]int64")]
    Int64Array,
    #[serde(rename = "[]float64")]
    #[strum(serialize = "[]float64")]
    Float64Array,
}

/// A declared tag name split into its reading identifier and optional
/// map subkey: `"servo_loads.X"` → (`servo_loads`, `X`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagName {
    full: String,
    split: Option<usize>,
}

impl TagName {
    pub fn parse(full: &str) -> Self {
        Self {
            full: full.to_owned(),
            split: full.find('.'),
        }
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    /// Segment before the first dot (the whole name if there is none).
    pub fn reading(&self) -> &str {
        match self.split {
            Some(i) => self.full.get(..i).unwrap_or(&self.full),
            None => &self.full,
        }
    }

    pub fn subkey(&self) -> Option<&str> {
        self.split.and_then(|i| self.full.get(i + 1..))
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn dotted_names_split_on_first_dot() {
        let tag = TagName::parse("servo_loads.X");
        assert_eq!(tag.reading(), "servo_loads");
        assert_eq!(tag.subkey(), Some("X"));

        let bare = TagName::parse("aut");
        assert_eq!(bare.reading(), "aut");
        assert_eq!(bare.subkey(), None);
    }

    #[test]
    fn declared_types_use_wire_names() {
        let pack: TagPack =
            serde_json::from_str(r#"{"aut":"int16","positions":"[]float64"}"#).unwrap();
        assert_eq!(pack["aut"], DeclaredType::Int16);
        assert_eq!(pack["positions"], DeclaredType::Float64Array);
        assert_eq!(DeclaredType::Int64Array.to_string(), "[]int64");
        assert_eq!(DeclaredType::from_str("float64").unwrap(), DeclaredType::Float64);
        assert!(serde_json::from_str::<DeclaredType>(r#""uint8""#).is_err());
    }
}
