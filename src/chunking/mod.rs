//! Document chunking
//!
//! Accepted articles are stored as fixed-length character chunks, each
//! embedded and written as its own record.

mod splitter;

pub use splitter::*;
