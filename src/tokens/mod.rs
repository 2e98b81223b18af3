//! Usage accounting
//!
//! Token counts reported in `usage` blocks, computed locally with the
//! `cl100k_base` encoding since Notion does not report them.

pub mod counter;

pub use counter::TokenCounter;
