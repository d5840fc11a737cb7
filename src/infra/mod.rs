//! Infrastructure adapters and runtime bootstrap.

pub mod cache;
pub mod db;
pub mod deadline;
pub mod error;
pub mod http;
pub mod queue;
pub mod search;
pub mod shutdown;
pub mod telemetry;
