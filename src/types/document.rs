//! Document helpers.
//!
//! Documents are plain `serde_json::Value` objects. The server attaches a
//! monotonic resource id under `_rid`; ORDER BY queries additionally wrap
//! each document in an envelope carrying the sort key tuple.

use serde::Deserialize;
use serde_json::Value;

/// Property holding the server-assigned resource id.
pub const RID_PROPERTY: &str = "_rid";

/// Returns the document's `_rid`, if present.
pub fn document_rid(document: &Value) -> Option<&str> {
    document.get(RID_PROPERTY).and_then(Value::as_str)
}

/// The wire envelope ORDER BY queries return per document.
///
/// Each entry of `order_by_items` is `{"item": <value>}`; a missing
/// `item` key means the sorted property was undefined on the document.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderByEnvelope {
    #[serde(rename = "orderByItems")]
    pub order_by_items: Vec<OrderByKey>,
    pub payload: Value,
    #[serde(rename = "_rid", default)]
    pub rid: Option<String>,
}

/// One sort key cell of an [`OrderByEnvelope`].
#[derive(Debug, Clone, Deserialize)]
pub struct OrderByKey {
    #[serde(default)]
    pub item: Option<Value>,
}

impl OrderByEnvelope {
    /// Parses the envelope out of a raw feed document.
    pub fn from_document(document: &Value) -> Option<Self> {
        serde_json::from_value(document.clone()).ok()
    }

    /// The sort key tuple, with undefined cells mapped to `None`.
    pub fn keys(&self) -> Vec<Option<Value>> {
        self.order_by_items.iter().map(|k| k.item.clone()).collect()
    }
}
