/// SQLite-backed graph table
///
/// Emulates a partition/sort-key store: the primary key is (vertex, edge) and
/// every secondary index is a (partition column, sort column) pair. Index
/// projections are lifted out of the attribute map on write.
use crate::{
    error::{CardError, CardResult},
    metrics,
    storage::{
        schema::{
            ATTR_IDX, ATTR_USER_INDEX_ID, ATTR_USER_INDEX_USER_ID, COL_IDX, COL_USER_INDEX_ID,
            COL_USER_INDEX_USER_ID, TABLE_NAME,
        },
        Attributes, GraphRow, GraphTable, IndexName, IndexQuery, PageKey, QueryPage, RowKey,
        VertexMatch, MAX_BATCH_WRITE_ITEMS,
    },
};
use async_trait::async_trait;
use sqlx::{
    query::Query,
    sqlite::{SqliteArguments, SqliteRow},
    QueryBuilder, Row, Sqlite, SqlitePool,
};
use std::future::Future;
use std::time::{Duration, Instant};

const SELECT_ROW: &str = "SELECT vertex, edge, attributes FROM graph_row WHERE vertex = ?1 AND edge = ?2";

const UPSERT_ROW: &str = r#"
    INSERT INTO graph_row (vertex, edge, attributes, idx, user_index_user_id, user_index_id)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    ON CONFLICT(vertex, edge) DO UPDATE SET
        attributes = excluded.attributes,
        idx = excluded.idx,
        user_index_user_id = excluded.user_index_user_id,
        user_index_id = excluded.user_index_id
"#;

const DELETE_ROW: &str = "DELETE FROM graph_row WHERE vertex = ?1 AND edge = ?2";

/// Graph table stored in one SQLite table
#[derive(Clone)]
pub struct SqliteGraphTable {
    pool: SqlitePool,
    call_timeout: Duration,
}

impl SqliteGraphTable {
    /// Create a table gateway over a migrated pool
    pub fn new(pool: SqlitePool, call_timeout: Duration) -> Self {
        Self { pool, call_timeout }
    }

    /// Run one storage call under the per-call timeout and record it
    async fn call<T, F>(&self, operation: &'static str, fut: F) -> CardResult<T>
    where
        F: Future<Output = CardResult<T>>,
    {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(CardError::StorageTimeout {
                operation,
                timeout_ms: self.call_timeout.as_millis() as u64,
            }),
        };

        metrics::record_storage_call(operation, outcome.is_ok(), started.elapsed().as_secs_f64());
        outcome
    }
}

/// Partition and sort columns backing an index
fn index_columns(index: IndexName) -> (&'static str, &'static str) {
    match index {
        IndexName::Label => ("edge", "vertex"),
        IndexName::LabelAndLastTestTime => ("edge", COL_IDX),
        IndexName::UserId => (COL_USER_INDEX_USER_ID, COL_USER_INDEX_ID),
    }
}

fn decode_row(row: &SqliteRow) -> CardResult<GraphRow> {
    let vertex: String = row.try_get("vertex")?;
    let edge: String = row.try_get("edge")?;
    let raw: String = row.try_get("attributes")?;

    let attributes: Attributes = serde_json::from_str(&raw).map_err(|e| {
        CardError::MalformedRow(format!("attributes of ({}, {}): {}", vertex, edge, e))
    })?;

    Ok(GraphRow {
        vertex,
        edge,
        attributes,
    })
}

fn upsert_query(row: &GraphRow) -> CardResult<Query<'static, Sqlite, SqliteArguments<'static>>> {
    let attributes = serde_json::to_string(&row.attributes)
        .map_err(|e| CardError::Internal(format!("Failed to encode attributes: {}", e)))?;

    Ok(sqlx::query(UPSERT_ROW)
        .bind(row.vertex.clone())
        .bind(row.edge.clone())
        .bind(attributes)
        .bind(row.attribute(ATTR_IDX).map(str::to_string))
        .bind(row.attribute(ATTR_USER_INDEX_USER_ID).map(str::to_string))
        .bind(row.attribute(ATTR_USER_INDEX_ID).map(str::to_string)))
}

/// Cut a look-ahead result (limit + 1 rows) down to one page
fn paginate(mut entries: Vec<(GraphRow, PageKey)>, limit: usize) -> QueryPage {
    let has_more = entries.len() > limit;
    entries.truncate(limit);

    let last_evaluated = if has_more {
        entries.last().map(|(_, key)| key.clone())
    } else {
        None
    };

    QueryPage {
        rows: entries.into_iter().map(|(row, _)| row).collect(),
        last_evaluated,
    }
}

/// SQL limit of a look-ahead read for `limit` rows
fn look_ahead_limit(limit: usize) -> CardResult<i64> {
    if limit == 0 {
        return Err(CardError::StorageRejected(
            "query limit must be at least 1".to_string(),
        ));
    }
    i64::try_from(limit.saturating_add(1))
        .map_err(|_| CardError::StorageRejected(format!("query limit {} is out of range", limit)))
}

#[async_trait]
impl GraphTable for SqliteGraphTable {
    async fn get(&self, vertex: &str, edge: &str) -> CardResult<Option<GraphRow>> {
        self.call("get", async {
            let row = sqlx::query(SELECT_ROW)
                .bind(vertex)
                .bind(edge)
                .fetch_optional(&self.pool)
                .await?;

            row.as_ref().map(decode_row).transpose()
        })
        .await
    }

    async fn put(&self, row: GraphRow) -> CardResult<()> {
        self.call("put", async {
            upsert_query(&row)?.execute(&self.pool).await?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, vertex: &str, edge: &str) -> CardResult<()> {
        self.call("delete", async {
            sqlx::query(DELETE_ROW)
                .bind(vertex)
                .bind(edge)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn query_by_vertex(
        &self,
        vertex: VertexMatch,
        exclusive_start: Option<PageKey>,
        limit: usize,
    ) -> CardResult<QueryPage> {
        let sql_limit = look_ahead_limit(limit)?;

        self.call("query_by_vertex", async {
            let mut builder = QueryBuilder::<Sqlite>::new(format!(
                "SELECT vertex, edge, attributes FROM {} WHERE ",
                TABLE_NAME
            ));
            match &vertex {
                VertexMatch::Exact(value) => {
                    builder.push("vertex = ").push_bind(value.clone());
                }
                VertexMatch::Prefix(prefix) => {
                    builder
                        .push("substr(vertex, 1, length(")
                        .push_bind(prefix.clone())
                        .push(")) = ")
                        .push_bind(prefix.clone());
                }
            }
            if let Some(start) = &exclusive_start {
                builder
                    .push(" AND (vertex > ")
                    .push_bind(start.partition.clone())
                    .push(" OR (vertex = ")
                    .push_bind(start.partition.clone())
                    .push(" AND edge > ")
                    .push_bind(start.sort.clone())
                    .push("))");
            }
            builder
                .push(" ORDER BY vertex ASC, edge ASC LIMIT ")
                .push_bind(sql_limit);

            let rows = builder.build().fetch_all(&self.pool).await?;

            let mut entries = Vec::with_capacity(rows.len());
            for row in &rows {
                let decoded = decode_row(row)?;
                let key = PageKey {
                    partition: decoded.vertex.clone(),
                    sort: decoded.edge.clone(),
                };
                entries.push((decoded, key));
            }

            Ok(paginate(entries, limit))
        })
        .await
    }

    async fn query_by_index(&self, query: IndexQuery) -> CardResult<QueryPage> {
        let sql_limit = look_ahead_limit(query.limit)?;

        if let Some(start) = &query.exclusive_start {
            if start.partition != query.partition {
                return Err(CardError::StorageRejected(format!(
                    "exclusive start key does not belong to {} partition '{}'",
                    query.index, query.partition
                )));
            }
        }

        self.call("query_by_index", async {
            let (partition_col, sort_col) = index_columns(query.index);

            let mut builder = QueryBuilder::<Sqlite>::new(format!(
                "SELECT vertex, edge, attributes, {sort} AS sort_key FROM {table} WHERE {partition} = ",
                sort = sort_col,
                table = TABLE_NAME,
                partition = partition_col,
            ));
            builder.push_bind(query.partition.clone());
            builder.push(format!(" AND {} IS NOT NULL", sort_col));

            if let Some(prefix) = &query.sort_prefix {
                builder
                    .push(format!(" AND substr({}, 1, length(", sort_col))
                    .push_bind(prefix.clone())
                    .push(")) = ")
                    .push_bind(prefix.clone());
            }

            if let Some(start) = &query.exclusive_start {
                let comparison = if query.ascending { ">" } else { "<" };
                builder
                    .push(format!(" AND {} {} ", sort_col, comparison))
                    .push_bind(start.sort.clone());
            }

            let direction = if query.ascending { "ASC" } else { "DESC" };
            builder
                .push(format!(" ORDER BY {} {} LIMIT ", sort_col, direction))
                .push_bind(sql_limit);

            let rows = builder.build().fetch_all(&self.pool).await?;

            let mut entries = Vec::with_capacity(rows.len());
            for row in &rows {
                let decoded = decode_row(row)?;
                let key = PageKey {
                    partition: query.partition.clone(),
                    sort: row.try_get("sort_key")?,
                };
                entries.push((decoded, key));
            }

            Ok(paginate(entries, query.limit))
        })
        .await
    }

    async fn batch_put(&self, rows: Vec<GraphRow>) -> CardResult<()> {
        if rows.is_empty() {
            return Err(CardError::StorageRejected(
                "batch put requires at least one row".to_string(),
            ));
        }

        for chunk in rows.chunks(MAX_BATCH_WRITE_ITEMS) {
            self.call("batch_put", async {
                let mut tx = self.pool.begin().await?;
                for row in chunk {
                    upsert_query(row)?.execute(&mut *tx).await?;
                }
                tx.commit().await?;
                Ok(())
            })
            .await?;
        }

        Ok(())
    }

    async fn batch_delete(&self, keys: Vec<RowKey>) -> CardResult<()> {
        if keys.is_empty() {
            return Err(CardError::StorageRejected(
                "batch delete requires at least one key".to_string(),
            ));
        }

        for chunk in keys.chunks(MAX_BATCH_WRITE_ITEMS) {
            self.call("batch_delete", async {
                let mut tx = self.pool.begin().await?;
                for key in chunk {
                    sqlx::query(DELETE_ROW)
                        .bind(key.vertex.clone())
                        .bind(key.edge.clone())
                        .execute(&mut *tx)
                        .await?;
                }
                tx.commit().await?;
                Ok(())
            })
            .await?;
        }

        Ok(())
    }
}
