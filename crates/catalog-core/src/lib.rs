//! Core types and collaborator traits for the product description generator.
//!
//! This crate provides the shared vocabulary for every other crate in the
//! workspace. It defines:
//!
//! - Domain types: [`Tier`], [`Mode`], [`GeneratedContent`],
//!   [`SimilarityVerdict`], [`QueueJob`], [`AuditEvent`],
//!   [`ItemGenerationState`], [`HealthSnapshot`]
//! - Collaborator traits: [`ChatProvider`], [`CatalogStore`],
//!   [`ConfigStore`], [`AuditSink`], [`QueueStore`], [`MonitorStore`],
//!   [`TaskScheduler`]
//! - [`ContentError`] - the generation error taxonomy
//! - [`text`] helpers for markup stripping and word counting
//!
//! # Example
//!
//! ```rust
//! use catalog_core::{SimilarityVerdict, Zone};
//!
//! let verdict = SimilarityVerdict::scored(0.72);
//! assert_eq!(verdict.zone, Zone::Block);
//! assert_eq!(verdict.percent, 72);
//! ```

mod chat;
mod clock;
mod error;
mod export;
mod prompt;
pub mod settings;
pub mod text;
mod trait_def;
mod types;

pub use chat::{ChatMessage, ChatRequest, RawReply};
pub use clock::{format_timestamp, timestamp_now, TIMESTAMP_FORMAT};
pub use error::{excerpt, ContentError, ParseEnumError, StoreError, TransportError, RAW_EXCERPT_CHARS};
pub use export::{write_audit_csv, AUDIT_COLUMNS};
pub use prompt::hash_prompt;
pub use settings::Settings;
pub use trait_def::{
    AuditSink, CatalogStore, ChatProvider, ConfigStore, MonitorStore, QueueStore, StoreResult,
    TaskScheduler,
};
pub use types::{
    AuditAction, AuditEvent, AuditFilter, AuditPage, AuditRecord, AuditSummary, CatalogItem,
    FallbackNotice, Field, GeneratedContent, HealthSnapshot, HealthStatus, ItemGenerationState,
    ItemId, ItemStateUpdate, JobStatus, JobTransition, Mode, ModelHealthRecord, ProductAttributes,
    QueueJob, QueueTotals, SimilarityVerdict, SpeedTier, Tier, VerdictNote, Zone,
};

// Re-export async_trait for convenience
pub use async_trait::async_trait;
