//! Description generation for catalog items.
//!
//! - [`GenerationPipeline`] - prompt, model resolution, provider call with
//!   one fallback retry, JSON repair and validation
//! - [`ModelResolver`] - per-call model choice from tier and settings
//! - [`FallbackRouter`] - model-error detection and the fallback notice
//! - [`HealthMonitor`] - weekly liveness probes for every current model
//! - [`DescriptionService`] - preview and save flows for a single item
//! - [`AuditRecorder`] - audit writes with per-item bookkeeping
//!
//! # Example
//!
//! ```rust
//! use catalog_core::{Mode, Tier};
//! use generator::budget;
//!
//! assert!(budget::max_tokens(Tier::High, Mode::Full) > budget::max_tokens(Tier::Low, Mode::MetaOnly));
//! ```

mod audit;
pub mod budget;
pub mod fallback;
mod health;
mod pipeline;
pub mod prompt;
pub mod repair;
mod resolver;
mod service;

pub use audit::AuditRecorder;
pub use fallback::FallbackRouter;
pub use health::{
    HealthMonitor, Notices, CHECK_INTERVAL, NO_API_KEY_REASON, PROBE_MAX_TOKENS, PROBE_PROMPT,
    PROBE_TIMEOUT,
};
pub use pipeline::{GenerationOutcome, GenerationPipeline};
pub use repair::RepairStrategy;
pub use resolver::{ModelResolver, Resolution};
pub use service::{DescriptionService, Preview, PreviewRequest, SaveRequest};
