use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque session token issued by the vendor library.
///
/// The library uses `0` to mean "no handle"; a `Handle` is never zero, so
/// absence is expressed with `Option<Handle>` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Handle(u16);

impl Handle {
    pub const fn new(raw: u16) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    pub const fn get(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for Handle {
    type Error = String;

    fn try_from(raw: u16) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| "handle 0 is reserved for 'no handle'".to_owned())
    }
}

impl From<Handle> for u16 {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_not_a_handle() {
        assert!(Handle::new(0).is_none());
        assert_eq!(Handle::new(77).map(Handle::get), Some(77));
    }

    #[test]
    fn serializes_as_bare_integer() {
        let handles = vec![Handle::new(77).unwrap(), Handle::new(3).unwrap()];
        assert_eq!(serde_json::to_string(&handles).unwrap(), "[77,3]");

        let parsed: Vec<Handle> = serde_json::from_str("[77]").unwrap();
        assert_eq!(parsed, vec![Handle::new(77).unwrap()]);
    }

    #[test]
    fn rejects_zero_on_deserialize() {
        assert!(serde_json::from_str::<Handle>("0").is_err());
    }
}
