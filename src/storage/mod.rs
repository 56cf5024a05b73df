/// Storage Gateway
///
/// Generic key-value operations against the single card graph table keyed by
/// (vertex, edge). Implementations are pass-through: no business rules, no
/// retries, errors surface unchanged to the caller.

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteGraphTable;

use crate::error::CardResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Largest number of rows a single batch write request may carry
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// Row attributes, kept ordered so rows compare and serialize deterministically
pub type Attributes = BTreeMap<String, String>;

/// A single stored row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRow {
    pub vertex: String,
    pub edge: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl GraphRow {
    pub fn new(vertex: impl Into<String>, edge: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            edge: edge.into(),
            attributes: Attributes::new(),
        }
    }

    /// Builder-style attribute setter
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Set an attribute only when a value is present
    pub fn with_optional_attribute(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(value) => self.with_attribute(name, value),
            None => self,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn key(&self) -> RowKey {
        RowKey {
            vertex: self.vertex.clone(),
            edge: self.edge.clone(),
        }
    }
}

/// Primary key of a row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    pub vertex: String,
    pub edge: String,
}

/// Key of the last row returned by a query, used to resume after it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageKey {
    pub partition: String,
    pub sort: String,
}

/// Vertex condition for a partition query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VertexMatch {
    /// Rows of exactly one vertex
    Exact(String),
    /// Rows of every vertex starting with the prefix
    Prefix(String),
}

/// Secondary indexes available on the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexName {
    /// Partition: edge, sort: vertex
    Label,
    /// Partition: edge, sort: idx
    LabelAndLastTestTime,
    /// Partition: owning user id, sort: card id (card rows only)
    UserId,
}

impl IndexName {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexName::Label => "LabelIndex",
            IndexName::LabelAndLastTestTime => "LabelAndLastTestTimeIndex",
            IndexName::UserId => "UserIdIndex",
        }
    }
}

impl std::fmt::Display for IndexName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query against a secondary index
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub index: IndexName,
    /// Exact value of the index partition key
    pub partition: String,
    /// Extra key condition: sort key must begin with this prefix
    pub sort_prefix: Option<String>,
    pub limit: usize,
    /// Resume strictly after this key
    pub exclusive_start: Option<PageKey>,
    pub ascending: bool,
}

impl IndexQuery {
    pub fn new(index: IndexName, partition: impl Into<String>, limit: usize) -> Self {
        Self {
            index,
            partition: partition.into(),
            sort_prefix: None,
            limit,
            exclusive_start: None,
            ascending: true,
        }
    }

    pub fn with_sort_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sort_prefix = Some(prefix.into());
        self
    }

    pub fn starting_after(mut self, key: Option<PageKey>) -> Self {
        self.exclusive_start = key;
        self
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }
}

/// One page of query results
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub rows: Vec<GraphRow>,
    /// Present iff more rows match beyond this page
    pub last_evaluated: Option<PageKey>,
}

/// Key-value table holding the card graph
#[async_trait]
pub trait GraphTable: Send + Sync {
    /// Fetch one row by primary key
    async fn get(&self, vertex: &str, edge: &str) -> CardResult<Option<GraphRow>>;

    /// Create or fully replace a row
    async fn put(&self, row: GraphRow) -> CardResult<()>;

    /// Delete one row; deleting a missing row is not an error
    async fn delete(&self, vertex: &str, edge: &str) -> CardResult<()>;

    /// Rows matching a vertex condition, ordered by (vertex, edge)
    ///
    /// Page keys carry the vertex as partition and the edge as sort key.
    async fn query_by_vertex(
        &self,
        vertex: VertexMatch,
        exclusive_start: Option<PageKey>,
        limit: usize,
    ) -> CardResult<QueryPage>;

    /// Rows of one secondary index partition, ordered by its sort key
    async fn query_by_index(&self, query: IndexQuery) -> CardResult<QueryPage>;

    /// Create or replace many rows; the input must not be empty
    async fn batch_put(&self, rows: Vec<GraphRow>) -> CardResult<()>;

    /// Delete many rows; the input must not be empty
    async fn batch_delete(&self, keys: Vec<RowKey>) -> CardResult<()>;
}
