//! Command-line front end for AI-generated product descriptions.
//!
//! Single items go through `preview` and `save`; batches through `enqueue`
//! and a long-running `worker`. Settings, the audit log and model health
//! are managed from the same binary.

mod app;
mod cli;
mod config;

use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use catalog_core::settings::keys;
use catalog_core::{
    write_audit_csv, AuditFilter, AuditSink, ConfigStore, GeneratedContent, Settings,
    SimilarityVerdict,
};
use clap::Parser;
use database::CatalogEntry;
use generator::{PreviewRequest, SaveRequest, CHECK_INTERVAL};
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::{apply_setting, App};
use crate::cli::{AuditCommand, CatalogCommand, Cli, Command, SettingsCommand};
use crate::config::Config;

type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() -> CliResult {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let mut app = App::build(&config).await?;

    let result = run(&mut app, cli.command).await;
    app.db.close().await;
    result
}

async fn run(app: &mut App, command: Command) -> CliResult {
    match command {
        Command::Preview {
            item_id,
            tier,
            mode,
            brand,
            actor,
        } => {
            let request = PreviewRequest {
                brand,
                actor,
                ..PreviewRequest::new(item_id, tier, mode)
            };
            print_json(&app.service.preview(request).await?)
        }

        Command::Save {
            item_id,
            content,
            tier,
            mode,
            brand,
            similarity,
            actor,
        } => {
            let content: GeneratedContent = serde_json::from_str(&read_input(&content)?)?;
            let saved = app
                .service
                .save(SaveRequest {
                    item_id,
                    content,
                    brand,
                    tier,
                    mode,
                    similarity: similarity.map(SimilarityVerdict::scored),
                    actor,
                })
                .await?;
            print_json(&saved)
        }

        Command::Enqueue { item_ids } => print_json(&app.queue.enqueue(&item_ids).await?),

        Command::Worker => run_worker(app).await,

        Command::Status => print_json(&app.queue.status().await?),

        Command::Cancel => print_json(&app.queue.cancel().await?),

        Command::Health { run } => {
            if run {
                return print_json(&app.health.run().await?);
            }
            match app.health.latest().await? {
                Some(snapshot) => print_json(&snapshot),
                None => {
                    println!("No health check has run yet. Use `describer health --run`.");
                    Ok(())
                }
            }
        }

        Command::Notices => print_json(&app.health.pending_notices().await?),

        Command::Dismiss => {
            app.health.dismiss_notice().await?;
            println!("Health notice dismissed.");
            Ok(())
        }

        Command::Audit(command) => run_audit(app, command).await,

        Command::Lock { item_id } => {
            let locked = app.service.toggle_lock(item_id).await?;
            println!(
                "Item {} is now {}.",
                item_id,
                if locked { "locked" } else { "unlocked" }
            );
            Ok(())
        }

        Command::Tier { item_id, tier } => {
            app.service.set_tier(item_id, tier).await?;
            println!("Item {} tier set to {}.", item_id, tier);
            Ok(())
        }

        Command::Settings(command) => run_settings(app, command).await,

        Command::Catalog(command) => run_catalog(app, command).await,
    }
}

/// Dispatch queue jobs until Ctrl-C, with a health check every week.
async fn run_worker(app: &mut App) -> CliResult {
    let tasks = app.take_tasks().ok_or("task receiver already taken")?;

    let health = app.health.clone();
    let health_loop = tokio::spawn(async move {
        let mut interval = tokio::time::interval(CHECK_INTERVAL);
        loop {
            interval.tick().await;
            match health.run().await {
                Ok(snapshot) => {
                    let failed = snapshot.failures().count();
                    if failed > 0 {
                        warn!(failed, "health check found failing models");
                    }
                }
                Err(err) => error!(error = %err, "health check failed"),
            }
        }
    });

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "could not listen for Ctrl-C");
        }
    };

    info!(provider = %app.provider_name, "worker running, press Ctrl-C to stop");
    app.queue.clone().run_worker(tasks, shutdown).await;
    health_loop.abort();
    Ok(())
}

async fn run_audit(app: &App, command: AuditCommand) -> CliResult {
    match command {
        AuditCommand::List {
            action,
            zone,
            item,
            page,
            page_size,
        } => {
            let filter = AuditFilter {
                action,
                zone,
                item_id: item,
            };
            print_json(&app.db.query(&filter, page, page_size.max(1)).await?)
        }

        AuditCommand::Export { out } => {
            let records = app.db.export_all().await?;
            match out {
                Some(path) => {
                    let file = fs::File::create(&path)?;
                    write_audit_csv(&records, BufWriter::new(file))?;
                    info!(rows = records.len(), path = %path.display(), "audit log exported");
                }
                None => write_audit_csv(&records, io::stdout().lock())?,
            }
            Ok(())
        }

        AuditCommand::Summary => print_json(&app.db.summary().await?),
    }
}

async fn run_settings(app: &App, command: SettingsCommand) -> CliResult {
    match command {
        SettingsCommand::Show => {
            let settings = Settings::new(app.db.as_ref());
            let api_key = match settings.api_key().await? {
                Some(_) => "(set)",
                None => "(not set)",
            };
            println!("{:<24}{}", keys::API_KEY, api_key);
            println!("{:<24}{}", keys::MODEL, settings.model_override().await?);
            println!("{:<24}{}", keys::DAILY_LIMIT, settings.daily_limit().await?);
            println!("{:<24}{}", keys::OVERWRITE, settings.overwrite().await?);
            println!("{:<24}{}", keys::CATALOG_VERSION, settings.catalog_version().await?);
            println!(
                "{:<24}{}",
                keys::HEALTH_NOTICE_DISMISSED,
                settings.notice_dismissed().await?
            );
            Ok(())
        }

        SettingsCommand::Set { key, value } => {
            let store: &dyn ConfigStore = app.db.as_ref();
            apply_setting(store, &app.registry, &app.provider_name, &key, &value).await?;
            println!("{} updated.", key);
            Ok(())
        }

        SettingsCommand::Models => {
            for option in app.registry.ui_options(&app.provider_name) {
                println!("{:<28}{}", option.id, option.label);
            }
            Ok(())
        }
    }
}

async fn run_catalog(app: &App, command: CatalogCommand) -> CliResult {
    match command {
        CatalogCommand::Import { file } => {
            let entries: Vec<CatalogEntry> = serde_json::from_str(&read_input(&file)?)?;
            let count = database::catalog::import_items(app.db.pool(), &entries).await?;
            println!("{} items imported.", count);
            Ok(())
        }

        CatalogCommand::Items { after, limit } => {
            let items = database::catalog::list_items(app.db.pool(), after, limit).await?;
            for item in items {
                println!(
                    "{:>8}  {:<40}  tier={:<4}  {}{}",
                    item.id,
                    item.product.title,
                    item.state.tier_or_default().as_str(),
                    if item.state.locked { "locked " } else { "" },
                    if item.has_existing_description() {
                        "described"
                    } else {
                        "empty"
                    }
                );
            }
            Ok(())
        }
    }
}

/// File contents, or stdin for `-`.
fn read_input(path: &Path) -> io::Result<String> {
    if path.as_os_str() == "-" {
        let mut input = String::new();
        io::stdin().read_to_string(&mut input)?;
        return Ok(input);
    }
    fs::read_to_string(path)
}

fn print_json<T: Serialize>(value: &T) -> CliResult {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
