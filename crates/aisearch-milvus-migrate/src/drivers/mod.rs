//! Concrete source and target collaborators.
//!
//! - [`export`]: Parser for exported index definitions and JSON Lines documents
//! - [`memory`]: In-process [`SourceReader`](crate::core::SourceReader) and
//!   [`TargetWriter`](crate::core::TargetWriter) implementations
//!
//! Anything implementing the two core traits can be handed to the migrator
//! and the validator; these are the ones the CLI wires up.

pub mod export;
pub mod memory;

pub use export::{load_documents, load_index_definition, parse_index_definition};
pub use memory::{MemorySource, MemoryTarget};
