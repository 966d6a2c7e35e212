//! JSON:API documents for bulk requests and their responses.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as Json};

use crate::error::Error;
use crate::mutation::{FieldValue, MutationKind, ResourceMutation};
use crate::value::Value;

/// JSON:API media type.
pub const MEDIA_TYPE: &str = "application/vnd.api+json";

/// Extension name negotiated for bulk requests.
pub const BULK_EXTENSION: &str = "bulk";

/// A JSON:API resource object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Resource identity. Numeric ids are accepted and normalized to strings.
    #[serde(
        default,
        deserialize_with = "deserialize_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    /// Resource attributes.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Json>,
}

impl ResourceObject {
    /// Create a resource object.
    pub fn new(resource_type: impl Into<String>, id: Option<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id,
            attributes: Map::new(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: Json) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Convert to a resource mutation of the given kind.
    pub fn into_mutation(self, kind: MutationKind) -> ResourceMutation {
        let attributes = self
            .attributes
            .iter()
            .map(|(name, value)| FieldValue::new(name.clone(), Value::from_json(value)))
            .collect();

        ResourceMutation {
            kind,
            identity: self.id,
            attributes,
        }
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(Option::<RawId>::deserialize(deserializer)?.map(|raw| match raw {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    }))
}

/// Inbound bulk document: `{"data": [ ...resource objects... ]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkDocument {
    /// Resource objects in request order.
    pub data: Vec<ResourceObject>,
}

impl BulkDocument {
    /// Decode a bulk document from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Number of resource objects.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the document carries no resources.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Convert every resource into a mutation of the given kind.
    ///
    /// When `expected_type` is given, every resource must carry that type.
    pub fn into_mutations(
        self,
        kind: MutationKind,
        expected_type: Option<&str>,
    ) -> Result<Vec<ResourceMutation>, Error> {
        self.data
            .into_iter()
            .enumerate()
            .map(|(index, resource)| {
                if let Some(expected) = expected_type {
                    if resource.resource_type != expected {
                        return Err(Error::InvalidDocument(format!(
                            "data[{}] has type '{}', expected '{}'",
                            index, resource.resource_type, expected
                        )));
                    }
                }
                if kind != MutationKind::Create && resource.id.is_none() {
                    return Err(Error::InvalidDocument(format!(
                        "data[{}] is missing an id required for {}",
                        index, kind
                    )));
                }
                Ok(resource.into_mutation(kind))
            })
            .collect()
    }
}

/// Outbound document for a committed batch.
///
/// `meta` holds one slot per input resource, in input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDocument {
    /// Resulting resources.
    pub data: Vec<ResourceObject>,
    /// Per-item side-channel data.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta: Vec<Json>,
}

/// A JSON:API error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// HTTP status code, as a string.
    pub status: String,
    /// Application-specific error code.
    pub code: String,
    /// Short summary.
    pub title: String,
    /// Explanation specific to this occurrence.
    pub detail: String,
    /// Pointer into the request document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

/// Location of the offending input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorSource {
    /// JSON pointer, e.g. `/data/1`.
    pub pointer: String,
}

impl ErrorObject {
    /// Create an error object.
    pub fn new(
        status: u16,
        code: impl Into<String>,
        title: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status: status.to_string(),
            code: code.into(),
            title: title.into(),
            detail: detail.into(),
            source: None,
        }
    }

    /// Point at the offending item of the request's `data` array.
    pub fn at_item(mut self, index: usize) -> Self {
        self.source = Some(ErrorSource {
            pointer: format!("/data/{}", index),
        });
        self
    }
}

/// Outbound document for a failed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDocument {
    /// Errors; a failed batch reports exactly one.
    pub errors: Vec<ErrorObject>,
}

impl From<ErrorObject> for ErrorDocument {
    fn from(error: ErrorObject) -> Self {
        Self {
            errors: vec![error],
        }
    }
}
