//! Single-partition page request.

use uuid::Uuid;

use crate::types::query::SqlQuery;

/// One page request against one partition key range.
///
/// The pipeline builds these; the request executor turns them into wire
/// requests, applies retries, and returns a page.
#[derive(Debug, Clone)]
pub struct DocumentServiceRequest {
    /// Resource id of the collection being queried.
    pub collection_rid: String,
    /// The partition key range the request is routed to.
    pub partition_key_range_id: String,
    /// The per-partition query, with any resume filter already formatted in.
    pub query: SqlQuery,
    /// Server continuation for this range; `None` starts from the beginning.
    pub continuation: Option<String>,
    /// Requested page size.
    pub page_size: usize,
    /// Correlates all requests issued for one logical query.
    pub activity_id: Uuid,
}

impl DocumentServiceRequest {
    pub fn new(
        collection_rid: impl Into<String>,
        partition_key_range_id: impl Into<String>,
        query: SqlQuery,
        continuation: Option<String>,
        page_size: usize,
        activity_id: Uuid,
    ) -> Self {
        Self {
            collection_rid: collection_rid.into(),
            partition_key_range_id: partition_key_range_id.into(),
            query,
            continuation,
            page_size,
            activity_id,
        }
    }
}
