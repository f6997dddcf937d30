//! Interpolatable configuration text.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A configuration value that may contain `${...}` references.
///
/// Scalars of any kind are accepted (`min = 5`, `enabled = true`) and
/// kept as text; the resolver turns them back into typed values at
/// execution time, after interpolation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Template(String);

impl Template {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Template {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Template {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Template {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Serialize for Template {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Template {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Int(i64),
            Float(f64),
            Bool(bool),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Str(s) => Self(s),
            Raw::Int(i) => Self(i.to_string()),
            Raw::Float(f) => Self(f.to_string()),
            Raw::Bool(b) => Self(b.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_accept_numbers_and_booleans_as_text() {
        let values: Vec<Template> =
            serde_json::from_value(serde_json::json!(["${x}", 5, 2.5, true])).unwrap();
        let texts: Vec<&str> = values.iter().map(Template::as_str).collect();
        assert_eq!(texts, vec!["${x}", "5", "2.5", "true"]);
    }

    #[test]
    fn should_serialize_as_plain_string() {
        let json = serde_json::to_string(&Template::from("lobby")).unwrap();
        assert_eq!(json, "\"lobby\"");
    }
}
