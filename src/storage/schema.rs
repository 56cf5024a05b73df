//! Card graph table schema constants
//!
//! ```text
//! Table: graph_row
//!
//! Primary Key:
//!   - vertex (String, Partition Key): "card:{userId}|{cardId}"
//!   - edge   (String, Sort Key):      vertex again for a card row,
//!                                     "label:{name}" for a label edge
//!
//! Attributes (string map, stored as JSON):
//!   - sideAText, sideAImageUrl, sideBText, sideBImageUrl (card rows)
//!   - lastTestTime (card rows)
//!   - idx: "{userId}|{lastTestTime}|{cardId}" (card rows and label edges)
//!   - UserIdIndex_userId, UserIdIndex_id (card rows only)
//!
//! Secondary indexes:
//!   - LabelIndex:             edge + vertex
//!   - LabelAndLastTestTime:   edge + idx
//!   - UserIdIndex:            UserIdIndex_userId + UserIdIndex_id
//! ```

/// Table holding every vertex and edge row
pub const TABLE_NAME: &str = "graph_row";

/// Composite time-ordering key, projected into the `idx` column
pub const ATTR_IDX: &str = "idx";

/// Owner of a card row, projected into the user index partition column
pub const ATTR_USER_INDEX_USER_ID: &str = "UserIdIndex_userId";

/// Card id of a card row, projected into the user index sort column
pub const ATTR_USER_INDEX_ID: &str = "UserIdIndex_id";

/// Column names backing the projected attributes
pub const COL_IDX: &str = "idx";
pub const COL_USER_INDEX_USER_ID: &str = "user_index_user_id";
pub const COL_USER_INDEX_ID: &str = "user_index_id";
