//! kinship-graph: In-memory contact relationship graph.
//!
//! The graph is the single arbiter between a contact document's structured
//! front-matter fields and its human-editable Related section. It owns gender
//! inference (a "mother" edge implies a female target) and reciprocity
//! checking (a "parent" edge implies a "child" edge back).

pub mod consistency;
pub mod gender;
pub mod graph;

pub use consistency::MissingReciprocal;
pub use gender::{GenderTables, NormalizedKind};
pub use graph::ContactGraph;
