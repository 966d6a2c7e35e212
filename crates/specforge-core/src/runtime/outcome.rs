//! Result of a committed batch.

use serde_json::Value as Json;
use specforge_proto::ResponseDocument;

use super::model::Model;

/// Side-channel data of one item, e.g. spelling suggestions.
pub type ItemMeta = serde_json::Map<String, Json>;

/// Models and per-item meta of a committed create or update batch.
///
/// `meta` always has one slot per input item, in input order; items with
/// nothing to report keep an empty slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionOutcome {
    /// Entity class name.
    pub entity: String,
    /// Authoritative models in input order.
    pub models: Vec<Model>,
    /// Per-item meta slots in input order.
    pub meta: Vec<ItemMeta>,
}

impl TransactionOutcome {
    /// Number of items in the batch.
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Check if the batch was empty.
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Render as a JSON:API response document.
    pub fn to_document(&self) -> ResponseDocument {
        ResponseDocument {
            data: self.models.iter().map(Model::to_resource).collect(),
            meta: self.meta.iter().cloned().map(Json::Object).collect(),
        }
    }
}
