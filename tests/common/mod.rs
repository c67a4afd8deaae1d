#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use zetesis::{
    Error, FieldMap, QueryBuilder, RecordFactory, Row, SchemaProvider, SearchClient, SearchRequest,
};

pub const INDEX: &str = "listings";

/// In-memory search client: records every dispatched request and replays
/// canned replies in order.
#[derive(Default)]
pub struct StubClient {
    pub requests: Mutex<Vec<Value>>,
    pub scroll_cursors: Mutex<Vec<String>>,
    search_replies: Mutex<VecDeque<Value>>,
    scroll_replies: Mutex<VecDeque<Value>>,
    pub missing: Vec<String>,
}

impl StubClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(reply: Value) -> Self {
        let stub = Self::default();
        stub.queue_search(reply);
        stub
    }

    pub fn with_missing(ids: Vec<String>) -> Self {
        Self {
            missing: ids,
            ..Self::default()
        }
    }

    pub fn queue_search(&self, reply: Value) {
        self.search_replies.lock().unwrap().push_back(reply);
    }

    pub fn queue_scroll(&self, reply: Value) {
        self.scroll_replies.lock().unwrap().push_back(reply);
    }

    pub fn last_request(&self) -> Option<Value> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl SearchClient for StubClient {
    async fn search(&self, request: &SearchRequest) -> Result<Value, Error> {
        self.requests.lock().unwrap().push(request.to_value());
        Ok(self
            .search_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(empty_reply))
    }

    async fn scroll(&self, cursor: &str, _ttl: &str) -> Result<Value, Error> {
        self.scroll_cursors.lock().unwrap().push(cursor.to_string());
        Ok(self
            .scroll_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(empty_reply))
    }

    async fn delete(&self, _index: &str, id: &str) -> Result<(), Error> {
        if self.missing.iter().any(|missing| missing == id) {
            return Err(Error::NotFound);
        }
        Ok(())
    }
}

/// Fixture schema for a listings index with a nested orders relationship.
pub struct ListingProvider;

impl SchemaProvider for ListingProvider {
    fn field_map(&self) -> Option<FieldMap> {
        Some(
            FieldMap::from_value(json!({
                "id": { "type": "integer" },
                "status": { "type": "keyword" },
                "title": { "type": "text", "fields": { "raw": { "type": "keyword" } } },
                "description": { "type": "text" },
                "price": { "type": "integer" },
                "listed_at": { "type": "date" },
                "orders": {
                    "type": "nested",
                    "properties": {
                        "amount": { "type": "integer" },
                        "status": { "type": "keyword" },
                        "customer": {
                            "type": "nested",
                            "properties": {
                                "name": {
                                    "type": "text",
                                    "fields": { "keyword": { "type": "keyword" } }
                                }
                            }
                        }
                    }
                }
            }))
            .unwrap(),
        )
    }

    fn index_name(&self) -> &str {
        INDEX
    }

    fn key_name(&self) -> &str {
        "id"
    }
}

/// Provider with no declared mapping; resolution degrades to the naming
/// convention and validation is off.
pub struct BareProvider;

impl SchemaProvider for BareProvider {
    fn field_map(&self) -> Option<FieldMap> {
        None
    }

    fn index_name(&self) -> &str {
        INDEX
    }

    fn key_name(&self) -> &str {
        "id"
    }
}

pub fn stub_builder() -> (Arc<StubClient>, QueryBuilder) {
    builder_with(StubClient::new())
}

pub fn builder_with(stub: StubClient) -> (Arc<StubClient>, QueryBuilder) {
    let stub = Arc::new(stub);
    let client: Arc<dyn SearchClient> = stub.clone();
    (stub, QueryBuilder::new(client, &ListingProvider))
}

pub fn empty_reply() -> Value {
    json!({ "hits": { "total": { "value": 0 }, "hits": [] } })
}

pub fn hit(source: Value, score: f64) -> Value {
    json!({ "_source": { INDEX: source }, "_score": score })
}

pub fn reply(total: u64, hits: Vec<Value>) -> Value {
    json!({ "hits": { "total": { "value": total }, "hits": hits } })
}

/// Hydrates a row into its title string.
pub struct TitleFactory;

impl RecordFactory for TitleFactory {
    type Record = String;

    fn from_row(&self, row: &Row) -> Result<String, Error> {
        row.get("title")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::Backend("row is missing a title".to_string()))
    }
}
