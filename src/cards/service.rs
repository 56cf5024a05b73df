/// Card graph service
///
/// Presents a card and its label edges as one aggregate over the graph
/// table. Multi-row writes are not atomic: an interrupted save or delete can
/// leave orphan label edges or a card without labels. Storage errors are
/// never translated here.
use crate::cards::assembler::{CardAssembler, LabelAssembler};
use crate::cards::key::{self, GraphKey};
use crate::cards::models::{
    clean_labels, format_timestamp, new_card_id, normalize_timestamp, Card, CardInput, CardPage,
    PageOptions, FREQUENCY_OFTEN, FREQUENCY_SOMETIMES, NEVER_TESTED, PRACTICE,
};
use crate::config::CardsConfig;
use crate::cursor;
use crate::error::{CardError, CardResult};
use crate::metrics;
use crate::storage::{GraphRow, GraphTable, IndexName, IndexQuery, PageKey, QueryPage, RowKey, VertexMatch};
use chrono::Utc;
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Rows read per request from one card partition
const CARD_PARTITION_PAGE: usize = 256;

pub struct CardGraphService {
    table: Arc<dyn GraphTable>,
    config: CardsConfig,
}

impl CardGraphService {
    pub fn new(table: Arc<dyn GraphTable>, config: CardsConfig) -> Self {
        Self { table, config }
    }

    pub fn config(&self) -> &CardsConfig {
        &self.config
    }

    /// Create or update a card and reconcile its labels
    pub async fn save(&self, input: CardInput) -> CardResult<Card> {
        key::validate_segment("user id", &input.user_id)?;
        let requested_labels = input.labels.as_deref().map(clean_labels);
        let last_test_time = input
            .last_test_time
            .as_deref()
            .map(normalize_timestamp)
            .transpose()?
            .filter(|time| time != NEVER_TESTED);

        let (card, previous) = match input.id.clone() {
            None => {
                let now = Utc::now();
                let id = new_card_id(now);
                info!(user_id = %input.user_id, card_id = %id, "creating card");

                let mut labels = requested_labels.unwrap_or_default();
                if labels.is_empty() {
                    labels.push(FREQUENCY_OFTEN.to_string());
                }

                let card = Card {
                    user_id: input.user_id,
                    id,
                    side_a_text: present(input.side_a_text),
                    side_a_image_url: present(input.side_a_image_url),
                    side_b_text: present(input.side_b_text),
                    side_b_image_url: present(input.side_b_image_url),
                    last_test_time: Some(last_test_time.unwrap_or_else(|| format_timestamp(now))),
                    labels,
                };
                (card, None)
            }
            Some(id) => {
                key::validate_segment("card id", &id)?;
                let previous = self.find_one(&input.user_id, &id).await?;
                info!(
                    user_id = %input.user_id,
                    card_id = %id,
                    exists = previous.is_some(),
                    "updating card"
                );

                let base = previous
                    .clone()
                    .unwrap_or_else(|| Card::new(input.user_id.as_str(), id.as_str()));
                let card = Card {
                    side_a_text: patch(input.side_a_text, base.side_a_text),
                    side_a_image_url: patch(input.side_a_image_url, base.side_a_image_url),
                    side_b_text: patch(input.side_b_text, base.side_b_text),
                    side_b_image_url: patch(input.side_b_image_url, base.side_b_image_url),
                    last_test_time: last_test_time.or(base.last_test_time),
                    labels: requested_labels.unwrap_or(base.labels),
                    user_id: input.user_id,
                    id,
                };
                (card, previous)
            }
        };

        self.table.put(CardAssembler::to_entity(&card)).await?;
        self.reconcile_labels(&card, previous.as_ref()).await?;

        self.find_one(&card.user_id, &card.id).await?.ok_or_else(|| {
            CardError::Internal(format!("card {} vanished after save", card.id))
        })
    }

    /// Bring the persisted label edges in line with `card.labels`
    async fn reconcile_labels(&self, card: &Card, previous: Option<&Card>) -> CardResult<()> {
        let persisted: &[String] = previous.map(|p| p.labels.as_slice()).unwrap_or_default();
        let time_changed = previous
            .map(|p| p.last_test_time != card.last_test_time)
            .unwrap_or(false);

        let removed: Vec<RowKey> = persisted
            .iter()
            .filter(|label| !card.has_label(label))
            .map(|label| GraphKey::label_edge(card.user_id.as_str(), card.id.as_str(), label.as_str()).row_key())
            .collect();

        // Kept edges are rewritten when the copied idx went stale
        let written: Vec<GraphRow> = card
            .labels
            .iter()
            .filter(|label| time_changed || !persisted.contains(label))
            .map(|label| LabelAssembler::to_entity(card, label))
            .collect();

        if removed.is_empty() && written.is_empty() {
            return Ok(());
        }

        info!(
            user_id = %card.user_id,
            card_id = %card.id,
            removed = removed.len(),
            written = written.len(),
            "reconciling labels"
        );

        if !removed.is_empty() {
            self.table.batch_delete(removed).await?;
        }
        if !written.is_empty() {
            self.table.batch_put(written).await?;
        }

        Ok(())
    }

    /// The merged aggregate, or `None` when the card has no rows
    pub async fn find_one(&self, user_id: &str, id: &str) -> CardResult<Option<Card>> {
        debug!(user_id, card_id = id, "finding card");
        let rows = self.card_partition(user_id, id).await?;
        CardAssembler::to_model(&rows)
    }

    /// Every row of one card vertex, read page by page
    async fn card_partition(&self, user_id: &str, id: &str) -> CardResult<Vec<GraphRow>> {
        key::validate_segment("user id", user_id)?;
        key::validate_segment("card id", id)?;

        let vertex = key::card_vertex(user_id, id);
        let mut rows = Vec::new();
        let mut start = None;
        loop {
            let page = self
                .table
                .query_by_vertex(
                    VertexMatch::Exact(vertex.clone()),
                    start.take(),
                    CARD_PARTITION_PAGE,
                )
                .await?;
            rows.extend(page.rows);

            match page.last_evaluated {
                Some(last) => start = Some(last),
                None => return Ok(rows),
            }
        }
    }

    /// Remove the card row and every label edge; absent cards are a no-op
    pub async fn delete(&self, user_id: &str, id: &str) -> CardResult<()> {
        info!(user_id, card_id = id, "deleting card");

        let keys: Vec<RowKey> = self
            .card_partition(user_id, id)
            .await?
            .iter()
            .map(GraphRow::key)
            .collect();
        if keys.is_empty() {
            return Ok(());
        }

        self.table.batch_delete(keys).await
    }

    /// Attach a label to an existing card
    pub async fn attach_label(&self, user_id: &str, id: &str, label: &str) -> CardResult<Card> {
        key::validate_label(label)?;
        info!(user_id, card_id = id, label, "attaching label");

        let card = self
            .find_one(user_id, id)
            .await?
            .ok_or_else(|| CardError::NotFound(format!("card {} of user {}", id, user_id)))?;

        self.table.put(LabelAssembler::to_entity(&card, label)).await?;

        self.find_one(user_id, id).await?.ok_or_else(|| {
            CardError::Internal(format!("card {} vanished after attaching a label", id))
        })
    }

    /// Remove one label edge; no-op when absent
    pub async fn detach_label(&self, user_id: &str, id: &str, label: &str) -> CardResult<()> {
        key::validate_segment("user id", user_id)?;
        key::validate_segment("card id", id)?;
        key::validate_label(label)?;
        info!(user_id, card_id = id, label, "detaching label");

        let key = GraphKey::label_edge(user_id, id, label);
        self.table.delete(&key.vertex(), &key.edge()).await
    }

    /// Remove a label from every card of a user; returns the edges removed
    pub async fn delete_label(&self, user_id: &str, label: &str) -> CardResult<usize> {
        key::validate_segment("user id", user_id)?;
        key::validate_label(label)?;

        let mut keys = Vec::new();
        let mut start = None;
        loop {
            let query = IndexQuery::new(
                IndexName::Label,
                key::label_edge(label),
                self.config.default_page_size,
            )
            .with_sort_prefix(key::user_vertex_prefix(user_id))
            .starting_after(start.take());

            let page = self.table.query_by_index(query).await?;
            keys.extend(page.rows.iter().map(GraphRow::key));

            match page.last_evaluated {
                Some(last) => start = Some(last),
                None => break,
            }
        }

        info!(user_id, label, edges = keys.len(), "deleting label");
        if keys.is_empty() {
            return Ok(0);
        }

        let removed = keys.len();
        self.table.batch_delete(keys).await?;
        Ok(removed)
    }

    /// Remove every label edge of one card; returns the edges removed
    pub async fn delete_labels_on_card(&self, user_id: &str, id: &str) -> CardResult<usize> {
        let keys: Vec<RowKey> = self
            .card_partition(user_id, id)
            .await?
            .iter()
            .filter(|row| row.edge != row.vertex)
            .map(GraphRow::key)
            .collect();

        info!(user_id, card_id = id, edges = keys.len(), "deleting labels on card");
        if keys.is_empty() {
            return Ok(0);
        }

        let removed = keys.len();
        self.table.batch_delete(keys).await?;
        Ok(removed)
    }

    /// Cards of a user, newest first
    pub async fn find_by_user_id(&self, user_id: &str, options: PageOptions) -> CardResult<CardPage> {
        key::validate_segment("user id", user_id)?;
        debug!(user_id, "finding cards by user");

        let limit = self.page_size(options.page_size)?;
        let start = decode_cursor(options.cursor.as_deref(), user_id, None)?;

        let query = IndexQuery::new(IndexName::UserId, user_id, limit)
            .descending()
            .starting_after(start);
        let page = self.table.query_by_index(query).await?;
        self.expand(page).await
    }

    /// Cards of a user carrying a label, by card id
    pub async fn find_by_label(
        &self,
        user_id: &str,
        label: &str,
        options: PageOptions,
    ) -> CardResult<CardPage> {
        key::validate_segment("user id", user_id)?;
        key::validate_label(label)?;
        debug!(user_id, label, "finding cards by label");

        let limit = self.page_size(options.page_size)?;
        let partition = key::label_edge(label);
        let prefix = key::user_vertex_prefix(user_id);
        let start = decode_cursor(options.cursor.as_deref(), &partition, Some(&prefix))?;

        let query = IndexQuery::new(IndexName::Label, partition, limit)
            .with_sort_prefix(prefix)
            .starting_after(start);
        let page = self.table.query_by_index(query).await?;
        self.expand(page).await
    }

    /// Cards of a user carrying a label, least recently tested first
    pub async fn find_by_label_order_by_last_test_time(
        &self,
        user_id: &str,
        label: &str,
        options: PageOptions,
    ) -> CardResult<CardPage> {
        key::validate_segment("user id", user_id)?;
        key::validate_label(label)?;
        debug!(user_id, label, "finding cards by label and last test time");

        let limit = self.page_size(options.page_size)?;
        let partition = key::label_edge(label);
        let prefix = key::idx_user_prefix(user_id);
        let start = decode_cursor(options.cursor.as_deref(), &partition, Some(&prefix))?;

        let page = self
            .table
            .query_by_index(time_ordered(user_id, label, limit).starting_after(start))
            .await?;
        self.expand(page).await
    }

    /// Recompute the practice label of a user
    ///
    /// Often cards come first, sometimes cards fill what is left, both least
    /// recently tested first. The result is read back from the time index,
    /// polling until the new edges are visible.
    pub async fn new_practice_session(
        &self,
        user_id: &str,
        page_size: Option<usize>,
    ) -> CardResult<CardPage> {
        key::validate_segment("user id", user_id)?;
        let limit = self.checked_page_size(page_size, self.config.practice_page_size)?;

        let cleared = self.delete_label(user_id, PRACTICE).await?;

        let often = self.oldest_edges(user_id, FREQUENCY_OFTEN, limit).await?;
        let sometimes = self.oldest_edges(user_id, FREQUENCY_SOMETIMES, limit).await?;

        let mut seen = HashSet::new();
        let practice: Vec<GraphRow> = often
            .into_iter()
            .chain(sometimes)
            .filter(|row| seen.insert(row.vertex.clone()))
            .take(limit)
            .map(|row| LabelAssembler::retarget(&row, PRACTICE))
            .collect::<CardResult<_>>()?;

        info!(
            user_id,
            cleared,
            selected = practice.len(),
            "new practice session"
        );

        let selected: HashSet<String> = practice.iter().map(|row| row.vertex.clone()).collect();
        if !practice.is_empty() {
            self.table.batch_put(practice).await?;
        }

        self.await_practice_edges(user_id, &selected, limit).await
    }

    async fn oldest_edges(&self, user_id: &str, label: &str, limit: usize) -> CardResult<Vec<GraphRow>> {
        let page = self
            .table
            .query_by_index(time_ordered(user_id, label, limit))
            .await?;
        Ok(page.rows)
    }

    /// Poll the practice time index until it holds exactly the selected cards
    ///
    /// Rows of an earlier session may still be visible after their delete;
    /// the index counts as settled only once they are gone and every
    /// selected vertex shows up.
    async fn await_practice_edges(
        &self,
        user_id: &str,
        selected: &HashSet<String>,
        limit: usize,
    ) -> CardResult<CardPage> {
        let max_wait = self.config.consistency_max_wait();
        let interval = self.config.consistency_poll_interval();
        let expected = selected.len();
        let started = Instant::now();

        loop {
            metrics::record_practice_settle_poll();
            let page = self
                .table
                .query_by_index(time_ordered(user_id, PRACTICE, limit))
                .await?;

            let stale = page
                .rows
                .iter()
                .filter(|row| !selected.contains(&row.vertex))
                .count();
            let observed = page.rows.len() - stale;
            if stale == 0 && observed == expected {
                return self.expand(page).await;
            }

            let waited = started.elapsed();
            if waited >= max_wait {
                warn!(user_id, expected, observed, stale, "practice index did not settle");
                return Err(CardError::ConsistencyTimeout {
                    label: PRACTICE.to_string(),
                    expected,
                    observed,
                    waited_ms: waited.as_millis() as u64,
                });
            }

            debug!(user_id, expected, observed, stale, "waiting for practice index");
            tokio::time::sleep(interval.min(max_wait - waited)).await;
        }
    }

    /// Replace index rows by the aggregates of their cards
    async fn expand(&self, page: QueryPage) -> CardResult<CardPage> {
        let lookups = page.rows.iter().map(|row| async move {
            let key = GraphKey::parse(&row.vertex, &row.edge)?;
            let card = self.find_one(key.user_id(), key.card_id()).await?;
            if card.is_none() {
                debug!(vertex = %row.vertex, "card vanished before expansion");
            }
            Ok::<_, CardError>(card)
        });

        let items: Vec<Card> = try_join_all(lookups).await?.into_iter().flatten().collect();
        let next = page.last_evaluated.as_ref().map(cursor::encode).transpose()?;

        Ok(CardPage { items, next })
    }

    fn page_size(&self, requested: Option<usize>) -> CardResult<usize> {
        self.checked_page_size(requested, self.config.default_page_size)
    }

    fn checked_page_size(&self, requested: Option<usize>, default: usize) -> CardResult<usize> {
        match requested {
            Some(0) => Err(CardError::Validation(
                "pageSize must be at least 1".to_string(),
            )),
            Some(size) if size > self.config.max_page_size => Err(CardError::Validation(format!(
                "pageSize must be at most {}",
                self.config.max_page_size
            ))),
            Some(size) => Ok(size),
            None => Ok(default),
        }
    }
}

fn time_ordered(user_id: &str, label: &str, limit: usize) -> IndexQuery {
    IndexQuery::new(IndexName::LabelAndLastTestTime, key::label_edge(label), limit)
        .with_sort_prefix(key::idx_user_prefix(user_id))
}

/// Decode a cursor and check it was issued for this partition and user
fn decode_cursor(
    cursor: Option<&str>,
    partition: &str,
    sort_prefix: Option<&str>,
) -> CardResult<Option<PageKey>> {
    let Some(cursor) = cursor.filter(|c| !c.trim().is_empty()) else {
        return Ok(None);
    };

    let key: PageKey = cursor::decode(cursor)?;
    let in_scope = key.partition == partition
        && sort_prefix.map_or(true, |prefix| key.sort.starts_with(prefix));
    if !in_scope {
        return Err(CardError::InvalidCursor(
            "cursor was issued for a different query".to_string(),
        ));
    }

    Ok(Some(key))
}

/// Blank strings count as absent
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Input value wins; an empty string clears the field
fn patch(input: Option<String>, existing: Option<String>) -> Option<String> {
    match input {
        Some(value) if value.is_empty() => None,
        Some(value) => Some(value),
        None => existing,
    }
}
