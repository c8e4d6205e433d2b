//! Persistence layer: processed message ids kept in a JSON file.

pub mod processed;

pub use processed::ProcessedStore;
