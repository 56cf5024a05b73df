/// Mapping between card aggregates and graph rows
use crate::cards::key::{self, GraphKey};
use crate::cards::models::{Card, NEVER_TESTED};
use crate::error::{CardError, CardResult};
use crate::storage::{
    schema::{ATTR_IDX, ATTR_USER_INDEX_ID, ATTR_USER_INDEX_USER_ID},
    GraphRow,
};

pub const ATTR_SIDE_A_TEXT: &str = "sideAText";
pub const ATTR_SIDE_A_IMAGE_URL: &str = "sideAImageUrl";
pub const ATTR_SIDE_B_TEXT: &str = "sideBText";
pub const ATTR_SIDE_B_IMAGE_URL: &str = "sideBImageUrl";
pub const ATTR_LAST_TEST_TIME: &str = "lastTestTime";

/// Card row assembler
pub struct CardAssembler;

impl CardAssembler {
    /// Build the card row of an aggregate; labels are not part of it
    pub fn to_entity(card: &Card) -> GraphRow {
        let key = GraphKey::card(card.user_id.as_str(), card.id.as_str());
        let last_test_time = card.stored_last_test_time();

        GraphRow::new(key.vertex(), key.edge())
            .with_attribute(ATTR_USER_INDEX_USER_ID, card.user_id.as_str())
            .with_attribute(ATTR_USER_INDEX_ID, card.id.as_str())
            .with_optional_attribute(ATTR_SIDE_A_TEXT, card.side_a_text.as_deref())
            .with_optional_attribute(ATTR_SIDE_A_IMAGE_URL, card.side_a_image_url.as_deref())
            .with_optional_attribute(ATTR_SIDE_B_TEXT, card.side_b_text.as_deref())
            .with_optional_attribute(ATTR_SIDE_B_IMAGE_URL, card.side_b_image_url.as_deref())
            .with_attribute(ATTR_LAST_TEST_TIME, last_test_time)
            .with_attribute(
                ATTR_IDX,
                key::idx(&card.user_id, last_test_time, &card.id),
            )
    }

    /// Merge every row of one card vertex into its aggregate
    ///
    /// Labels keep the order the rows arrive in. Returns `None` for no rows.
    pub fn to_model(rows: &[GraphRow]) -> CardResult<Option<Card>> {
        let Some(first) = rows.first() else {
            return Ok(None);
        };

        let first_key = GraphKey::parse(&first.vertex, &first.edge)?;
        let mut card = Card::new(first_key.user_id(), first_key.card_id());
        let mut has_card_row = false;

        for row in rows {
            if row.vertex != first.vertex {
                return Err(CardError::MalformedRow(format!(
                    "rows of '{}' and '{}' cannot form one card",
                    first.vertex, row.vertex
                )));
            }

            match GraphKey::parse(&row.vertex, &row.edge)? {
                GraphKey::Card { .. } => {
                    has_card_row = true;
                    card.side_a_text = owned(row.attribute(ATTR_SIDE_A_TEXT));
                    card.side_a_image_url = owned(row.attribute(ATTR_SIDE_A_IMAGE_URL));
                    card.side_b_text = owned(row.attribute(ATTR_SIDE_B_TEXT));
                    card.side_b_image_url = owned(row.attribute(ATTR_SIDE_B_IMAGE_URL));
                    card.last_test_time = row
                        .attribute(ATTR_LAST_TEST_TIME)
                        .filter(|time| *time != NEVER_TESTED)
                        .map(str::to_string);
                }
                GraphKey::LabelEdge { label, .. } => card.labels.push(label),
            }
        }

        if !has_card_row {
            tracing::warn!(
                user_id = %card.user_id,
                card_id = %card.id,
                labels = card.labels.len(),
                "label edges without a card row"
            );
        }

        Ok(Some(card))
    }
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

/// Label edge assembler
pub struct LabelAssembler;

impl LabelAssembler {
    /// Build the edge attaching `label` to a card, inheriting its time key
    pub fn to_entity(card: &Card, label: &str) -> GraphRow {
        let key = GraphKey::label_edge(card.user_id.as_str(), card.id.as_str(), label);

        GraphRow::new(key.vertex(), key.edge())
            .with_optional_attribute(ATTR_LAST_TEST_TIME, card.last_test_time.as_deref())
            .with_attribute(
                ATTR_IDX,
                key::idx(&card.user_id, card.stored_last_test_time(), &card.id),
            )
    }

    /// Copy an existing row of a card onto a different label edge
    pub fn retarget(row: &GraphRow, label: &str) -> CardResult<GraphRow> {
        let source = GraphKey::parse(&row.vertex, &row.edge)?;
        let key = GraphKey::label_edge(source.user_id(), source.card_id(), label);

        let mut edge = GraphRow::new(key.vertex(), key.edge());
        if let Some(idx) = row.attribute(ATTR_IDX) {
            edge = edge.with_attribute(ATTR_IDX, idx);
        }
        Ok(edge.with_optional_attribute(
            ATTR_LAST_TEST_TIME,
            row.attribute(ATTR_LAST_TEST_TIME)
                .filter(|time| *time != NEVER_TESTED),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_card() -> Card {
        let mut card = Card::new("user1", "card1");
        card.side_a_text = Some("front".to_string());
        card.side_b_image_url = Some("https://img/back.png".to_string());
        card.last_test_time = Some("2019-01-01T00:00:00.001Z".to_string());
        card.labels = vec!["a".to_string(), "b".to_string()];
        card
    }

    #[test]
    fn test_card_row() {
        let row = CardAssembler::to_entity(&Card::new("user1", "card1"));
        assert_eq!(row.vertex, "card:user1|card1");
        assert_eq!(row.edge, "card:user1|card1");
        assert_eq!(row.attribute(ATTR_USER_INDEX_USER_ID), Some("user1"));
        assert_eq!(row.attribute(ATTR_USER_INDEX_ID), Some("card1"));
        assert_eq!(
            row.attribute(ATTR_IDX),
            Some("user1|1900-01-01T00:00:00.000Z|card1")
        );
        assert!(row.attribute(ATTR_SIDE_A_TEXT).is_none());
    }

    #[test]
    fn test_label_row_inherits_idx() {
        let card = sample_card();
        let row = LabelAssembler::to_entity(&card, "practice");
        assert_eq!(row.vertex, "card:user1|card1");
        assert_eq!(row.edge, "label:practice");
        assert_eq!(
            row.attribute(ATTR_IDX),
            CardAssembler::to_entity(&card).attribute(ATTR_IDX)
        );
        assert!(row.attribute(ATTR_USER_INDEX_USER_ID).is_none());
    }

    #[test]
    fn test_to_model_merges_rows() {
        let card = sample_card();
        let mut rows = vec![CardAssembler::to_entity(&card)];
        rows.extend(card.labels.iter().map(|l| LabelAssembler::to_entity(&card, l)));

        let model = CardAssembler::to_model(&rows).unwrap().unwrap();
        assert_eq!(model, card);
    }

    #[test]
    fn test_to_model_hides_sentinel_and_handles_empty() {
        let rows = vec![CardAssembler::to_entity(&Card::new("user1", "card1"))];
        let model = CardAssembler::to_model(&rows).unwrap().unwrap();
        assert_eq!(model.last_test_time, None);
        assert!(model.labels.is_empty());

        assert_eq!(CardAssembler::to_model(&[]).unwrap(), None);
    }

    #[test]
    fn test_to_model_orphan_edges() {
        let card = sample_card();
        let rows = vec![LabelAssembler::to_entity(&card, "a")];
        let model = CardAssembler::to_model(&rows).unwrap().unwrap();
        assert_eq!(model.labels, vec!["a"]);
        assert_eq!(model.side_a_text, None);
    }

    #[test]
    fn test_to_model_rejects_mixed_vertices() {
        let rows = vec![
            CardAssembler::to_entity(&Card::new("user1", "card1")),
            CardAssembler::to_entity(&Card::new("user1", "card2")),
        ];
        assert!(matches!(
            CardAssembler::to_model(&rows),
            Err(CardError::MalformedRow(_))
        ));
    }

    #[test]
    fn test_retarget() {
        let card = sample_card();
        let often = LabelAssembler::to_entity(&card, "frequency-often");
        let practice = LabelAssembler::retarget(&often, "practice").unwrap();
        assert_eq!(practice, LabelAssembler::to_entity(&card, "practice"));
    }
}
