//! Specforge wire types.
//!
//! This crate defines the values and mutations that flow into the bulk
//! processor, and the JSON:API documents they are decoded from and encoded to.
//!
//! # Modules
//!
//! - [`value`] - Runtime attribute values
//! - [`mutation`] - Resource mutations for bulk writes
//! - [`document`] - JSON:API request, response and error documents
//! - [`error`] - Protocol error types
//!
//! Values and field pairs derive `rkyv::Archive` so the storage layer can
//! persist them without an intermediate representation.

pub mod document;
pub mod error;
pub mod mutation;
pub mod value;

pub use document::{
    BulkDocument, ErrorDocument, ErrorObject, ErrorSource, ResourceObject, ResponseDocument,
    BULK_EXTENSION, MEDIA_TYPE,
};
pub use error::Error;
pub use mutation::{FieldValue, MutationKind, ResourceMutation};
pub use value::Value;
