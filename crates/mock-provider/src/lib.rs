//! Test doubles for the description generator.
//!
//! - [`ScriptedProvider`] - replays queued provider replies and records requests
//! - [`DelayedProvider`] - wraps another provider with artificial latency
//! - [`MemoryStore`] - every store trait backed by in-memory maps
//! - [`fixtures`] - canned catalog items, valid content and reply bodies
//!
//! For production use the `groq-provider` and `database` crates instead.
//!
//! # Example
//!
//! ```rust
//! use catalog_core::ChatProvider;
//! use mock_provider::{fixtures, ScriptedProvider};
//!
//! let provider = ScriptedProvider::new();
//! provider.push(fixtures::completion_reply("{\"ok\": true}"));
//! assert_eq!(provider.name(), "ScriptedProvider");
//! ```

mod delayed;
pub mod fixtures;
mod scripted;
mod store;

pub use delayed::DelayedProvider;
pub use scripted::ScriptedProvider;
pub use store::{MemoryStore, EXPORT_LIMIT};
