use async_trait::async_trait;
use serde_json::Value;

use crate::error::Error;
use crate::request::SearchRequest;
use crate::schema::FieldMap;

/// One projected result row: the hit's source document with `_score`
/// merged in.
pub type Row = serde_json::Map<String, Value>;

/// -----------------------------
/// Boundary contracts
/// -----------------------------

/// Transport to the search backend. Connection pooling, retries and
/// timeouts all live behind this trait; the compiler only dispatches
/// assembled requests and threads scroll cursors.
#[async_trait]
pub trait SearchClient: Send + Sync + 'static {
    async fn search(&self, request: &SearchRequest) -> Result<Value, Error>;

    /// Fetch the next batch for an open cursor, keeping it alive for `ttl`.
    async fn scroll(&self, cursor: &str, ttl: &str) -> Result<Value, Error>;

    /// Delete one document by key. Implementations signal a missing
    /// document with `Error::NotFound`.
    async fn delete(&self, index: &str, id: &str) -> Result<(), Error>;
}

/// Source of the index schema and naming configuration.
pub trait SchemaProvider {
    /// Declared field mapping, or `None` to degrade to naming-convention
    /// resolution with no static validation.
    fn field_map(&self) -> Option<FieldMap>;

    fn index_name(&self) -> &str;

    fn key_name(&self) -> &str;
}

/// Hydrates raw result rows into application records.
pub trait RecordFactory {
    type Record;

    fn from_row(&self, row: &Row) -> Result<Self::Record, Error>;
}
