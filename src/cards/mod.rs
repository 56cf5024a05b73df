/// Card graph: cards as vertices, labels as edges
///
/// A card is one card row plus one label-edge row per label, all sharing the
/// vertex `card:{userId}|{cardId}`.

pub mod assembler;
pub mod key;
pub mod models;
pub mod service;

pub use assembler::{CardAssembler, LabelAssembler};
pub use key::GraphKey;
pub use models::{
    Card, CardInput, CardPage, PageOptions, FREQUENCY_OFTEN, FREQUENCY_SOMETIMES, NEVER_TESTED,
    PRACTICE,
};
pub use service::CardGraphService;
