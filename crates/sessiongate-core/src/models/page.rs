use serde::{Deserialize, Serialize};

/// One page of a cursor-paginated collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    /// Cursor for the next page; `None` on the last page.
    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<u64>,
}
