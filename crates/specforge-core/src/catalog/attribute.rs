//! Attribute definitions for entities.

use super::types::AttributeType;
use serde::{Deserialize, Deserializer, Serialize};

/// One declared attribute of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSpec {
    /// Attribute name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Whether a value must be provided.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub required: bool,
    /// Minimum length for textual attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u32>,
    /// Maximum length for textual attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// Default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Allowed values.
    #[serde(default, rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

impl AttributeSpec {
    /// Create a new optional attribute.
    pub fn new(name: impl Into<String>, attr_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
            required: false,
            min_length: None,
            max_length: None,
            default: None,
            enum_values: Vec::new(),
        }
    }

    /// Mark the attribute as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Set length constraints.
    pub fn with_length(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.min_length = min;
        self.max_length = max;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Set the allowed values.
    pub fn with_enum<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Check if existing rows would need a value that cannot be derived.
    pub fn is_required_without_default(&self) -> bool {
        self.required && self.default.is_none()
    }
}

/// Accept `true`/`false` as booleans or strings.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFlag {
        Bool(bool),
        Text(String),
    }

    match RawFlag::deserialize(deserializer)? {
        RawFlag::Bool(flag) => Ok(flag),
        RawFlag::Text(text) => match text.trim() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected boolean, got '{}'",
                other
            ))),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_attribute() {
        let attr: AttributeSpec = serde_json::from_value(json!({
            "name": "title",
            "type": "string",
            "required": true,
            "minLength": 32,
            "maxLength": 128
        }))
        .unwrap();

        assert_eq!(attr.name, "title");
        assert_eq!(attr.attr_type, AttributeType::String);
        assert!(attr.required);
        assert_eq!(attr.min_length, Some(32));
        assert_eq!(attr.max_length, Some(128));
        assert!(attr.enum_values.is_empty());
    }

    #[test]
    fn test_required_as_string() {
        let attr: AttributeSpec =
            serde_json::from_value(json!({"name": "a", "type": "int", "required": "true"}))
                .unwrap();
        assert!(attr.required);

        let attr: AttributeSpec =
            serde_json::from_value(json!({"name": "a", "type": "int", "required": "false"}))
                .unwrap();
        assert!(!attr.required);

        let missing: AttributeSpec =
            serde_json::from_value(json!({"name": "a", "type": "int"})).unwrap();
        assert!(!missing.required);

        assert!(serde_json::from_value::<AttributeSpec>(
            json!({"name": "a", "type": "int", "required": "maybe"})
        )
        .is_err());
    }

    #[test]
    fn test_required_without_default() {
        let attr = AttributeSpec::new("views", AttributeType::Integer).required();
        assert!(attr.is_required_without_default());
        assert!(!attr.with_default(json!(0)).is_required_without_default());
    }
}
