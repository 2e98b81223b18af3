//! Notion AI provider adapter
//!
//! - `session`: the shared authenticated upstream session
//! - `translate`: chat request to transcript body
//! - `parser` / `filter`: NDJSON event stream to clean text deltas
//! - `assembler`: deltas to SSE or a single completion object
//! - `provider`: the [`ChatProvider`] seam the HTTP layer talks to

pub mod assembler;
pub mod filter;
pub mod parser;
pub mod provider;
pub mod session;
pub mod translate;

pub use parser::{DeltaKind, TextDelta};
pub use provider::{ChatOutcome, ChatProvider, NotionProvider};
pub use session::{SessionManager, ThreadType, UpstreamSession, UpstreamThread};
