//! Domain layer types and invariants.

pub mod entities;
pub mod error;
pub mod news;
pub mod types;
