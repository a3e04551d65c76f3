//! Relation graph data structures

mod accumulator;
mod relation;

#[cfg(test)]
mod tests;

pub use accumulator::{EdgeView, RelationGraph};
pub use relation::{Origin, Relation, RelationKind, Title};
