/// Flashcard graph service
///
/// Cards and their labels stored as a vertex/edge graph over a single
/// key-value table, with secondary-index pagination, label reconciliation
/// and practice session selection.

pub mod api;
pub mod cards;
pub mod config;
pub mod context;
pub mod cursor;
pub mod db;
pub mod error;
pub mod metrics;
pub mod server;
pub mod storage;
