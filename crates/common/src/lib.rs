//! Identifier types shared across the workspace.

pub mod types;

pub use types::{ObserverId, RecordId, SagaId};
