//! In-process collaborators.
//!
//! [`MemorySource`] serves an index from memory, usually loaded from an
//! export. [`MemoryTarget`] stands in for the vector database and can persist
//! itself to a directory so separate runs see the same collection.

mod reader;
mod writer;

pub use reader::MemorySource;
pub use writer::MemoryTarget;
