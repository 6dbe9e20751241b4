//! Command-line interface.

use std::path::PathBuf;

use catalog_core::{AuditAction, ItemId, Mode, Tier, Zone};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "describer")]
#[command(about = "Generate, review and govern AI product descriptions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate content for one item without saving it
    Preview {
        item_id: ItemId,
        #[arg(long, default_value = "mid")]
        tier: Tier,
        #[arg(long, default_value = "full")]
        mode: Mode,
        /// Brand override stored on the item
        #[arg(long)]
        brand: Option<String>,
        /// Operator recorded in the audit log
        #[arg(long)]
        actor: Option<String>,
    },

    /// Save reviewed content for one item
    Save {
        item_id: ItemId,
        /// JSON file with short_description, long_description and meta_description (`-` for stdin)
        #[arg(long)]
        content: PathBuf,
        #[arg(long, default_value = "mid")]
        tier: Tier,
        #[arg(long, default_value = "full")]
        mode: Mode,
        #[arg(long)]
        brand: Option<String>,
        /// Similarity score shown with the preview (0.0 to 1.0)
        #[arg(long)]
        similarity: Option<f64>,
        #[arg(long)]
        actor: Option<String>,
    },

    /// Queue items for bulk generation
    Enqueue {
        #[arg(required = true)]
        item_ids: Vec<ItemId>,
    },

    /// Run queued jobs and the weekly health check until interrupted
    Worker,

    /// Queue totals and the most recent jobs
    Status,

    /// Cancel every pending job
    Cancel,

    /// Show the last health check, or run one
    Health {
        #[arg(long)]
        run: bool,
    },

    /// Show health failures and undelivered fallback notices
    Notices,

    /// Hide health failures until the next failing check
    Dismiss,

    #[command(subcommand)]
    Audit(AuditCommand),

    /// Toggle the lock on an item
    Lock { item_id: ItemId },

    /// Set an item's tier
    Tier { item_id: ItemId, tier: Tier },

    #[command(subcommand)]
    Settings(SettingsCommand),

    #[command(subcommand)]
    Catalog(CatalogCommand),
}

/// Audit log
#[derive(Debug, Subcommand)]
pub enum AuditCommand {
    /// One page of events, newest first
    List {
        #[arg(long)]
        action: Option<AuditAction>,
        #[arg(long)]
        zone: Option<Zone>,
        #[arg(long)]
        item: Option<ItemId>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        page_size: u32,
    },

    /// Write the most recent events as CSV
    Export {
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Totals, zone counts and averages
    Summary,
}

/// Runtime settings
#[derive(Debug, Subcommand)]
pub enum SettingsCommand {
    /// Print every setting
    Show,

    /// Change a setting
    Set { key: String, value: String },

    /// Models that may be picked for the `model` setting
    Models,
}

/// Catalog items
#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// Import items from a JSON array
    Import { file: PathBuf },

    /// List items with their generation state
    Items {
        #[arg(long, default_value_t = 0)]
        after: ItemId,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_preview_defaults() {
        let cli = Cli::try_parse_from(["describer", "preview", "42"]).unwrap();
        match cli.command {
            Command::Preview {
                item_id, tier, mode, ..
            } => {
                assert_eq!(item_id, 42);
                assert_eq!(tier, Tier::Mid);
                assert_eq!(mode, Mode::Full);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_enum_arguments() {
        let cli = Cli::try_parse_from([
            "describer", "audit", "list", "--action", "blocked_similarity", "--zone", "block",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Audit(AuditCommand::List {
                action: Some(AuditAction::BlockedSimilarity),
                zone: Some(Zone::Block),
                page: 1,
                ..
            })
        ));

        assert!(Cli::try_parse_from(["describer", "tier", "1", "ultra"]).is_err());
        assert!(Cli::try_parse_from(["describer", "enqueue"]).is_err());
    }
}
