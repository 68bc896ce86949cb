//! In-memory aggregation operators over JSON documents.

pub mod document;
pub mod expression;
pub mod stages;

pub use expression::{Accumulator, Expression};
pub use stages::{Pipeline, SortDirection};

/**
 * A single row flowing through a pipeline.
 */
pub type Document = serde_json::Map<String, serde_json::Value>;
