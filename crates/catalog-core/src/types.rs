//! Domain types shared by every crate in the workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseEnumError;

/// Catalog item identifier.
pub type ItemId = i64;

/// Content-length and quality class of a generated item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Low,
    #[default]
    Mid,
    High,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Low => "low",
            Tier::Mid => "mid",
            Tier::High => "high",
        }
    }
}

/// Which subset of output fields a generation call produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Full,
    ShortOnly,
    MetaOnly,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Full => "full",
            Mode::ShortOnly => "short_only",
            Mode::MetaOnly => "meta_only",
        }
    }

    /// Output fields this mode asks the model for, in prompt order.
    pub fn fields(&self) -> &'static [Field] {
        match self {
            Mode::Full => &[Field::Short, Field::Long, Field::Meta],
            Mode::ShortOnly => &[Field::Short],
            Mode::MetaOnly => &[Field::Meta],
        }
    }
}

/// A single generated output field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Short,
    Long,
    Meta,
}

impl Field {
    /// JSON key used in the model's structured output.
    pub fn key(&self) -> &'static str {
        match self {
            Field::Short => "short_description",
            Field::Long => "long_description",
            Field::Meta => "meta_description",
        }
    }
}

/// Provider-side model classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedTier {
    Fast,
    Quality,
}

impl SpeedTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedTier::Fast => "fast",
            SpeedTier::Quality => "quality",
        }
    }
}

/// Similarity policy bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Zone {
    Allow,
    Warn,
    Block,
}

impl Zone {
    /// Lower bound (inclusive) of the block band.
    pub const BLOCK_THRESHOLD: f64 = 0.70;
    /// Lower bound (inclusive) of the warn band.
    pub const WARN_THRESHOLD: f64 = 0.60;

    /// Classify a similarity score.
    pub fn from_score(score: f64) -> Self {
        if score >= Self::BLOCK_THRESHOLD {
            Zone::Block
        } else if score >= Self::WARN_THRESHOLD {
            Zone::Warn
        } else {
            Zone::Allow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Allow => "allow",
            Zone::Warn => "warn",
            Zone::Block => "block",
        }
    }
}

/// Why a verdict was produced without a real comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictNote {
    InsufficientLength,
    NoExistingContent,
}

/// Result of comparing existing text with a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityVerdict {
    /// Cosine similarity in `[0, 1]`.
    pub score: f64,
    pub zone: Zone,
    /// `round(score * 100)`.
    pub percent: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<VerdictNote>,
}

impl SimilarityVerdict {
    /// Build a verdict from a computed score.
    pub fn scored(score: f64) -> Self {
        let score = score.clamp(0.0, 1.0);
        Self {
            score,
            zone: Zone::from_score(score),
            percent: (score * 100.0).round() as u32,
            note: None,
        }
    }

    /// An allow/0 verdict explaining why no comparison happened.
    pub fn inconclusive(note: VerdictNote) -> Self {
        Self {
            score: 0.0,
            zone: Zone::Allow,
            percent: 0,
            note: Some(note),
        }
    }
}

/// Generated (or existing) description fields.
///
/// Short and long are rich text, meta is plain text. A field is `None` when
/// the generation mode did not produce it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub short_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_description: Option<String>,
}

impl GeneratedContent {
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Short => self.short_description.as_deref(),
            Field::Long => self.long_description.as_deref(),
            Field::Meta => self.meta_description.as_deref(),
        }
    }

    pub fn set(&mut self, field: Field, value: Option<String>) {
        match field {
            Field::Short => self.short_description = value,
            Field::Long => self.long_description = value,
            Field::Meta => self.meta_description = value,
        }
    }

    /// Fields that are present and contain more than whitespace.
    pub fn present(&self) -> impl Iterator<Item = (Field, &str)> {
        [Field::Short, Field::Long, Field::Meta]
            .into_iter()
            .filter_map(|field| {
                self.get(field)
                    .filter(|text| !text.trim().is_empty())
                    .map(|text| (field, text))
            })
    }

    pub fn is_empty(&self) -> bool {
        self.present().next().is_none()
    }
}

/// Product data used to compose prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAttributes {
    pub title: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub subcategory: String,
    /// Rendered `Label: value` pairs.
    #[serde(default)]
    pub attributes: Vec<String>,
}

/// Per-item generation bookkeeping kept alongside the catalog item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemGenerationState {
    /// Locked items are never generated or overwritten.
    pub locked: bool,
    /// Stored tier; `None` means the default (mid).
    pub tier: Option<Tier>,
    /// Brand override used instead of the catalog brand attribute.
    pub brand: Option<String>,
    /// Model that produced the last successful generation.
    pub last_model: Option<String>,
    /// Processing flag; set while a queue job owns the item.
    pub generating: bool,
    pub last_generated_at: Option<String>,
    pub ai_status: Option<String>,
    pub last_action: Option<AuditAction>,
    pub last_similarity: Option<f64>,
}

impl ItemGenerationState {
    pub fn tier_or_default(&self) -> Tier {
        self.tier.unwrap_or_default()
    }
}

/// Partial update of an [`ItemGenerationState`].
///
/// `None` leaves a column untouched. The processing flag is deliberately
/// absent; it only moves through `try_claim`/`release_claim`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemStateUpdate {
    pub locked: Option<bool>,
    pub tier: Option<Tier>,
    pub brand: Option<String>,
    pub last_model: Option<String>,
    pub last_generated_at: Option<String>,
    pub ai_status: Option<String>,
    pub last_action: Option<AuditAction>,
    pub last_similarity: Option<f64>,
}

/// A catalog item as seen by the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem {
    pub id: ItemId,
    pub product: ProductAttributes,
    pub existing: GeneratedContent,
    pub state: ItemGenerationState,
}

impl CatalogItem {
    /// Brand after applying the per-item override.
    pub fn effective_brand(&self) -> &str {
        self.state
            .brand
            .as_deref()
            .filter(|brand| !brand.trim().is_empty())
            .unwrap_or(&self.product.brand)
    }

    /// Whether the item already has a non-empty long description.
    pub fn has_existing_description(&self) -> bool {
        self.existing
            .long_description
            .as_deref()
            .map(|text| !crate::text::strip_markup(text).trim().is_empty())
            .unwrap_or(false)
    }

    /// Title and brand words excluded from similarity comparison.
    pub fn noise_tokens(&self) -> Vec<String> {
        self.product
            .title
            .split_whitespace()
            .chain(self.effective_brand().split_whitespace())
            .map(str::to_string)
            .collect()
    }
}

/// Queue job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Generating,
    Complete,
    Failed,
    SkippedSimilarity,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Generating,
        JobStatus::Complete,
        JobStatus::Failed,
        JobStatus::SkippedSimilarity,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Generating => "generating",
            JobStatus::Complete => "complete",
            JobStatus::Failed => "failed",
            JobStatus::SkippedSimilarity => "skipped_similarity",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending | JobStatus::Generating)
    }
}

/// One row of the job table, keyed by item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueJob {
    pub item_id: ItemId,
    pub tier: Tier,
    pub status: JobStatus,
    pub queued_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub model_used: Option<String>,
}

/// A status change applied to a job row.
#[derive(Debug, Clone, PartialEq)]
pub enum JobTransition {
    Generating,
    Failed(String),
    SkippedSimilarity(String),
    Complete { model_used: String },
}

impl JobTransition {
    pub fn status(&self) -> JobStatus {
        match self {
            JobTransition::Generating => JobStatus::Generating,
            JobTransition::Failed(_) => JobStatus::Failed,
            JobTransition::SkippedSimilarity(_) => JobStatus::SkippedSimilarity,
            JobTransition::Complete { .. } => JobStatus::Complete,
        }
    }
}

/// Per-status job counts. Every status is present, zero-filled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTotals {
    pub pending: u64,
    pub generating: u64,
    pub complete: u64,
    pub failed: u64,
    pub skipped_similarity: u64,
    pub cancelled: u64,
}

impl QueueTotals {
    pub fn add(&mut self, status: JobStatus, count: u64) {
        let slot = match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::Generating => &mut self.generating,
            JobStatus::Complete => &mut self.complete,
            JobStatus::Failed => &mut self.failed,
            JobStatus::SkippedSimilarity => &mut self.skipped_similarity,
            JobStatus::Cancelled => &mut self.cancelled,
        };
        *slot += count;
    }

    pub fn get(&self, status: JobStatus) -> u64 {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Generating => self.generating,
            JobStatus::Complete => self.complete,
            JobStatus::Failed => self.failed,
            JobStatus::SkippedSimilarity => self.skipped_similarity,
            JobStatus::Cancelled => self.cancelled,
        }
    }
}

/// Audit event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Previewed,
    Saved,
    BlockedSimilarity,
    Rejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Previewed => "previewed",
            AuditAction::Saved => "saved",
            AuditAction::BlockedSimilarity => "blocked_similarity",
            AuditAction::Rejected => "rejected",
        }
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub item_id: ItemId,
    pub item_name: String,
    pub action: AuditAction,
    pub tier: Tier,
    pub mode: Mode,
    pub model_used: Option<String>,
    pub similarity_score: Option<f64>,
    pub similarity_zone: Option<Zone>,
    pub word_count_long: u32,
    pub word_count_short: u32,
    pub safety_passed: bool,
    pub rejection_reason: Option<String>,
    pub response_time_ms: Option<u64>,
    /// Set by the sink on append when empty.
    pub timestamp: Option<String>,
    pub actor_id: Option<String>,
}

impl AuditEvent {
    /// Start an event for an item with neutral defaults.
    pub fn new(item_id: ItemId, item_name: impl Into<String>, action: AuditAction) -> Self {
        Self {
            item_id,
            item_name: item_name.into(),
            action,
            tier: Tier::Mid,
            mode: Mode::Full,
            model_used: None,
            similarity_score: None,
            similarity_zone: None,
            word_count_long: 0,
            word_count_short: 0,
            safety_passed: action != AuditAction::Rejected,
            rejection_reason: None,
            response_time_ms: None,
            timestamp: None,
            actor_id: None,
        }
    }

    pub fn tier(mut self, tier: Tier) -> Self {
        self.tier = tier;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn model(mut self, model: Option<String>) -> Self {
        self.model_used = model;
        self
    }

    pub fn similarity(mut self, verdict: &SimilarityVerdict) -> Self {
        self.similarity_score = Some(verdict.score);
        self.similarity_zone = Some(verdict.zone);
        self
    }

    pub fn word_counts(mut self, content: &GeneratedContent) -> Self {
        self.word_count_long = content
            .long_description
            .as_deref()
            .map(crate::text::word_count)
            .unwrap_or(0) as u32;
        self.word_count_short = content
            .short_description
            .as_deref()
            .map(crate::text::word_count)
            .unwrap_or(0) as u32;
        self
    }

    pub fn rejected_because(mut self, reason: impl Into<String>) -> Self {
        self.safety_passed = false;
        self.rejection_reason = Some(reason.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.rejection_reason = Some(reason.into());
        self
    }

    pub fn response_time(mut self, millis: u64) -> Self {
        self.response_time_ms = Some(millis);
        self
    }

    pub fn actor(mut self, actor_id: Option<String>) -> Self {
        self.actor_id = actor_id;
        self
    }
}

/// A stored audit event with its row id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    #[serde(flatten)]
    pub event: AuditEvent,
}

/// Filters for audit queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    pub zone: Option<Zone>,
    pub item_id: Option<ItemId>,
}

/// One page of audit rows, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuditPage {
    pub rows: Vec<AuditRecord>,
    pub total: u64,
}

/// Aggregates over the whole audit table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total: u64,
    pub saved: u64,
    pub blocked_similarity: u64,
    pub rejected: u64,
    pub previewed: u64,
    /// Average similarity as a percentage, one decimal.
    pub avg_similarity_pct: Option<f64>,
    pub zone_block: u64,
    pub zone_warn: u64,
    pub zone_allow: u64,
    pub avg_response_ms: Option<f64>,
}

/// Probe outcome for a single model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelHealthRecord {
    pub model_id: String,
    pub speed_tier: SpeedTier,
    pub status: HealthStatus,
    pub reason: Option<String>,
    pub latency_ms: u64,
    pub checked_at: String,
}

/// Result of one health run. Replaces the previous snapshot entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub records: Vec<ModelHealthRecord>,
    /// Whether the stored catalog version matched the compiled-in one.
    pub catalog_ok: bool,
    pub checked_at: String,
}

impl HealthSnapshot {
    pub fn failures(&self) -> impl Iterator<Item = &ModelHealthRecord> {
        self.records
            .iter()
            .filter(|record| record.status == HealthStatus::Fail)
    }
}

/// Operator notice written when a model-level failure triggered a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackNotice {
    pub model: String,
    pub reason: String,
    pub fallback: String,
    pub time: String,
}

macro_rules! impl_str_enum {
    ($ty:ident, $name:literal, [$($variant:ident),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let value = value.trim();
                $(
                    if value.eq_ignore_ascii_case($ty::$variant.as_str()) {
                        return Ok($ty::$variant);
                    }
                )+
                Err(ParseEnumError {
                    kind: $name,
                    value: value.to_string(),
                })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_str_enum!(Tier, "tier", [Low, Mid, High]);
impl_str_enum!(Mode, "mode", [Full, ShortOnly, MetaOnly]);
impl_str_enum!(SpeedTier, "speed tier", [Fast, Quality]);
impl_str_enum!(Zone, "zone", [Allow, Warn, Block]);
impl_str_enum!(
    JobStatus,
    "job status",
    [Pending, Generating, Complete, Failed, SkippedSimilarity, Cancelled]
);
impl_str_enum!(
    AuditAction,
    "audit action",
    [Previewed, Saved, BlockedSimilarity, Rejected]
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_boundaries() {
        assert_eq!(Zone::from_score(0.70), Zone::Block);
        assert_eq!(Zone::from_score(0.60), Zone::Warn);
        assert_eq!(Zone::from_score(0.599999), Zone::Allow);
        assert_eq!(Zone::from_score(1.0), Zone::Block);
        assert_eq!(Zone::from_score(0.0), Zone::Allow);
    }

    #[test]
    fn test_scored_verdict_percent() {
        let verdict = SimilarityVerdict::scored(0.7449);
        assert_eq!(verdict.percent, 74);
        assert_eq!(verdict.zone, Zone::Block);
        assert!(verdict.note.is_none());
    }

    #[test]
    fn test_parse_enums() {
        assert_eq!("HIGH".parse::<Tier>().unwrap(), Tier::High);
        assert_eq!("short_only".parse::<Mode>().unwrap(), Mode::ShortOnly);
        assert_eq!(
            "skipped_similarity".parse::<JobStatus>().unwrap(),
            JobStatus::SkippedSimilarity
        );
        assert!("huge".parse::<Tier>().is_err());
    }

    #[test]
    fn test_mode_fields() {
        assert_eq!(Mode::Full.fields().len(), 3);
        assert_eq!(Mode::MetaOnly.fields(), &[Field::Meta]);
    }

    #[test]
    fn test_present_skips_blank_fields() {
        let content = GeneratedContent {
            short_description: Some("  ".to_string()),
            long_description: Some("<p>tekst</p>".to_string()),
            meta_description: None,
        };
        let present: Vec<Field> = content.present().map(|(field, _)| field).collect();
        assert_eq!(present, vec![Field::Long]);
    }

    #[test]
    fn test_noise_tokens_use_brand_override() {
        let item = CatalogItem {
            id: 7,
            product: ProductAttributes {
                title: "Fietstas Classic".to_string(),
                brand: "Oud".to_string(),
                ..Default::default()
            },
            existing: GeneratedContent::default(),
            state: ItemGenerationState {
                brand: Some("Basil".to_string()),
                ..Default::default()
            },
        };
        assert_eq!(item.noise_tokens(), vec!["Fietstas", "Classic", "Basil"]);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Generating.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::SkippedSimilarity.is_terminal());
    }
}
