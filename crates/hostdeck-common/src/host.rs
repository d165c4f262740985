use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a managed host.
///
/// The backend uses numeric primary keys, but nothing on the client side
/// depends on that; ids are carried verbatim as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HostId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for HostId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for HostId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_string_ids_compare_equal() {
        assert_eq!(HostId::from(7), HostId::from("7"));
        assert_eq!(HostId::new("7").to_string(), "7");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&HostId::from("h1")).unwrap();
        assert_eq!(json, "\"h1\"");
    }
}
