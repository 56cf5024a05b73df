/// Card domain types
use crate::error::{CardError, CardResult};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// lastTestTime of a card that has never been tested
pub const NEVER_TESTED: &str = "1900-01-01T00:00:00.000Z";

pub const FREQUENCY_OFTEN: &str = "frequency-often";
pub const FREQUENCY_SOMETIMES: &str = "frequency-sometimes";
pub const PRACTICE: &str = "practice";

/// A card aggregate: the card row merged with its label edges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub user_id: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side_a_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side_a_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side_b_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side_b_image_url: Option<String>,
    /// `None` while the card has never been tested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_test_time: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl Card {
    /// Empty aggregate for a key
    pub fn new(user_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            id: id.into(),
            side_a_text: None,
            side_a_image_url: None,
            side_b_text: None,
            side_b_image_url: None,
            last_test_time: None,
            labels: Vec::new(),
        }
    }

    /// lastTestTime as stored, with the sentinel for untested cards
    pub fn stored_last_test_time(&self) -> &str {
        self.last_test_time.as_deref().unwrap_or(NEVER_TESTED)
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Input of a save: everything except the owner is optional
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardInput {
    pub user_id: String,
    /// Absent to create a new card
    pub id: Option<String>,
    /// Absent to keep the persisted label set
    pub labels: Option<Vec<String>>,
    pub side_a_text: Option<String>,
    pub side_a_image_url: Option<String>,
    pub side_b_text: Option<String>,
    pub side_b_image_url: Option<String>,
    pub last_test_time: Option<String>,
}

impl CardInput {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_labels<S: AsRef<str>>(mut self, labels: &[S]) -> Self {
        self.labels = Some(labels.iter().map(|l| l.as_ref().to_string()).collect());
        self
    }

    pub fn with_side_a_text(mut self, text: impl Into<String>) -> Self {
        self.side_a_text = Some(text.into());
        self
    }

    pub fn with_last_test_time(mut self, time: impl Into<String>) -> Self {
        self.last_test_time = Some(time.into());
        self
    }
}

impl From<Card> for CardInput {
    fn from(card: Card) -> Self {
        Self {
            user_id: card.user_id,
            id: Some(card.id),
            labels: Some(card.labels),
            side_a_text: card.side_a_text,
            side_a_image_url: card.side_a_image_url,
            side_b_text: card.side_b_text,
            side_b_image_url: card.side_b_image_url,
            last_test_time: card.last_test_time,
        }
    }
}

/// Paging options of the finders
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOptions {
    pub page_size: Option<usize>,
    /// Opaque token from a previous page
    pub cursor: Option<String>,
}

impl PageOptions {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: Some(page_size),
            cursor: None,
        }
    }

    pub fn after(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }
}

/// One page of expanded cards
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CardPage {
    pub items: Vec<Card>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

/// Render a timestamp with millisecond precision in UTC
pub fn format_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp and normalise it so lexical order is time order
pub fn normalize_timestamp(value: &str) -> CardResult<String> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|time| format_timestamp(time.with_timezone(&Utc)))
        .map_err(|e| CardError::Validation(format!("invalid lastTestTime '{}': {}", value, e)))
}

/// `{YYYYMMDDHHMMSS}-{uuid}`, lexically ordered by creation time
pub fn new_card_id(now: DateTime<Utc>) -> String {
    format!("{}-{}", now.format("%Y%m%d%H%M%S"), Uuid::new_v4())
}

/// Drop blank labels and repeats, keeping first occurrence order
pub fn clean_labels(labels: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        let label = label.trim();
        if !label.is_empty() && !cleaned.iter().any(|l| l == label) {
            cleaned.push(label.to_string());
        }
    }
    cleaned
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_timestamp() {
        assert_eq!(
            normalize_timestamp("2019-01-01T00:00:00.001Z").unwrap(),
            "2019-01-01T00:00:00.001Z"
        );
        assert_eq!(
            normalize_timestamp("2019-01-01T02:00:00+02:00").unwrap(),
            "2019-01-01T00:00:00.000Z"
        );
        assert_eq!(normalize_timestamp(NEVER_TESTED).unwrap(), NEVER_TESTED);
        assert!(matches!(
            normalize_timestamp("yesterday"),
            Err(CardError::Validation(_))
        ));
    }

    #[test]
    fn test_new_card_id_prefix() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 7, 9, 11).unwrap();
        let id = new_card_id(now);
        assert!(id.starts_with("20240305070911-"));
        assert_ne!(id, new_card_id(now));
    }

    #[test]
    fn test_clean_labels() {
        let labels = vec![
            "".to_string(),
            "b".to_string(),
            " a ".to_string(),
            "b".to_string(),
        ];
        assert_eq!(clean_labels(&labels), vec!["b", "a"]);
    }

    #[test]
    fn test_card_serializes_camel_case_without_absent_fields() {
        let mut card = Card::new("user1", "card1");
        card.side_a_text = Some("front".to_string());
        card.labels = vec![FREQUENCY_OFTEN.to_string()];

        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["userId"], "user1");
        assert_eq!(json["sideAText"], "front");
        assert!(json.get("lastTestTime").is_none());
        assert!(json.get("sideBText").is_none());
        assert_eq!(card.stored_last_test_time(), NEVER_TESTED);
    }

    #[test]
    fn test_card_into_input() {
        let mut card = Card::new("user1", "card1");
        card.labels = vec!["x".to_string()];
        let input = CardInput::from(card);
        assert_eq!(input.id.as_deref(), Some("card1"));
        assert_eq!(input.labels, Some(vec!["x".to_string()]));
    }
}
