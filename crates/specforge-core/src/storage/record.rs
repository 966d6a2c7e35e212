//! Row record format.

use crate::error::Error;
use rkyv::{Archive, Deserialize, Serialize};
use specforge_proto::{FieldValue, Value};

/// A stored row with metadata.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Record {
    /// Row identity.
    pub id: u64,

    /// Column values in write order.
    pub fields: Vec<FieldValue>,

    /// Creation timestamp in microseconds since Unix epoch.
    pub created_at: u64,

    /// Last write timestamp in microseconds since Unix epoch.
    pub updated_at: u64,

    /// Set when the row is a soft-delete tombstone.
    pub deleted_at: Option<u64>,
}

impl Record {
    /// Create a new record with the current timestamp.
    pub fn new(id: u64, fields: Vec<FieldValue>) -> Self {
        let now = super::key::current_timestamp();
        Self {
            id,
            fields,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Check if this record is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Look up a column value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|fv| fv.field == field)
            .map(|fv| &fv.value)
    }

    /// Serialize the record to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes using rkyv.
    ///
    /// Bytes handed out by sled carry no alignment guarantee, so they are
    /// copied into an aligned buffer first.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}
