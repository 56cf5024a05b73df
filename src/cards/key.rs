/// Vertex/edge key encoding
///
/// Every row of the card graph is addressed by a `GraphKey`. The string
/// forms are:
///
/// ```text
/// card row:   vertex = edge = "card:{userId}|{cardId}"
/// label edge: vertex = "card:{userId}|{cardId}", edge = "label:{name}"
/// idx:        "{userId}|{lastTestTime}|{cardId}"
/// ```
use crate::error::{CardError, CardResult};
use crate::storage::RowKey;

pub const CARD_PREFIX: &str = "card:";
pub const LABEL_PREFIX: &str = "label:";
pub const SEPARATOR: char = '|';

/// Typed address of one row in the card graph
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphKey {
    Card {
        user_id: String,
        card_id: String,
    },
    LabelEdge {
        user_id: String,
        card_id: String,
        label: String,
    },
}

impl GraphKey {
    pub fn card(user_id: impl Into<String>, card_id: impl Into<String>) -> Self {
        GraphKey::Card {
            user_id: user_id.into(),
            card_id: card_id.into(),
        }
    }

    pub fn label_edge(
        user_id: impl Into<String>,
        card_id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        GraphKey::LabelEdge {
            user_id: user_id.into(),
            card_id: card_id.into(),
            label: label.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            GraphKey::Card { user_id, .. } | GraphKey::LabelEdge { user_id, .. } => user_id,
        }
    }

    pub fn card_id(&self) -> &str {
        match self {
            GraphKey::Card { card_id, .. } | GraphKey::LabelEdge { card_id, .. } => card_id,
        }
    }

    /// Label name for an edge key, `None` for a card row
    pub fn label(&self) -> Option<&str> {
        match self {
            GraphKey::Card { .. } => None,
            GraphKey::LabelEdge { label, .. } => Some(label),
        }
    }

    pub fn vertex(&self) -> String {
        card_vertex(self.user_id(), self.card_id())
    }

    pub fn edge(&self) -> String {
        match self {
            GraphKey::Card { .. } => self.vertex(),
            GraphKey::LabelEdge { label, .. } => label_edge(label),
        }
    }

    pub fn row_key(&self) -> RowKey {
        RowKey {
            vertex: self.vertex(),
            edge: self.edge(),
        }
    }

    /// Parse a stored (vertex, edge) pair
    pub fn parse(vertex: &str, edge: &str) -> CardResult<Self> {
        let (user_id, card_id) = parse_vertex(vertex)?;

        if edge == vertex {
            return Ok(GraphKey::Card { user_id, card_id });
        }

        match edge.strip_prefix(LABEL_PREFIX) {
            Some(label) if !label.is_empty() => Ok(GraphKey::LabelEdge {
                user_id,
                card_id,
                label: label.to_string(),
            }),
            _ => Err(CardError::MalformedRow(format!(
                "edge '{}' is neither the card vertex nor a label",
                edge
            ))),
        }
    }
}

fn parse_vertex(vertex: &str) -> CardResult<(String, String)> {
    let malformed = || CardError::MalformedRow(format!("vertex '{}' is not a card vertex", vertex));

    let body = vertex.strip_prefix(CARD_PREFIX).ok_or_else(malformed)?;
    let (user_id, card_id) = body.split_once(SEPARATOR).ok_or_else(malformed)?;

    if user_id.is_empty() || card_id.is_empty() || card_id.contains(SEPARATOR) {
        return Err(malformed());
    }

    Ok((user_id.to_string(), card_id.to_string()))
}

/// `card:{userId}|{cardId}`
pub fn card_vertex(user_id: &str, card_id: &str) -> String {
    format!("{}{}{}{}", CARD_PREFIX, user_id, SEPARATOR, card_id)
}

/// `label:{name}`
pub fn label_edge(label: &str) -> String {
    format!("{}{}", LABEL_PREFIX, label)
}

/// Prefix shared by every vertex of one user
pub fn user_vertex_prefix(user_id: &str) -> String {
    format!("{}{}{}", CARD_PREFIX, user_id, SEPARATOR)
}

/// `{userId}|{lastTestTime}|{cardId}`
pub fn idx(user_id: &str, last_test_time: &str, card_id: &str) -> String {
    format!(
        "{}{}{}{}{}",
        user_id, SEPARATOR, last_test_time, SEPARATOR, card_id
    )
}

/// Prefix shared by every idx value of one user
pub fn idx_user_prefix(user_id: &str) -> String {
    format!("{}{}", user_id, SEPARATOR)
}

/// Reject identifiers that would break the key encoding
pub fn validate_segment(kind: &str, value: &str) -> CardResult<()> {
    if value.is_empty() {
        return Err(CardError::Validation(format!("{} cannot be empty", kind)));
    }
    if value.contains(SEPARATOR) {
        return Err(CardError::Validation(format!(
            "{} cannot contain '{}'",
            kind, SEPARATOR
        )));
    }
    Ok(())
}

/// Labels only live in the edge, so any non-blank name is accepted
pub fn validate_label(label: &str) -> CardResult<()> {
    if label.trim().is_empty() {
        return Err(CardError::Validation("label cannot be empty".to_string()));
    }
    Ok(())
}
