use std::sync::Arc;

use uuid::Uuid;

use crate::config::{AppConfig, ConfigError, StorageBackend};
use crate::db::Database;
use crate::error::AppError;
use crate::models::OptionResult;
use crate::service::PollService;

// Operator commands run in their own process, so an in-memory store would
// be invisible to the server and gone on exit.
fn require_sqlite(config: &AppConfig, command: &'static str) -> Result<(), ConfigError> {
    match config.storage {
        StorageBackend::Sqlite => Ok(()),
        StorageBackend::Memory => Err(ConfigError::MemoryBackendOffline(command)),
    }
}

async fn open(
    config: &AppConfig,
    command: &'static str,
) -> Result<PollService<Database>, AppError> {
    require_sqlite(config, command)?;
    let database = Database::new(&config.database_url).await?;
    Ok(PollService::new(
        Arc::new(database),
        config.public_base_url.clone(),
    ))
}

pub(super) async fn create(
    config: &AppConfig,
    title: &str,
    options: &[String],
) -> Result<(), AppError> {
    let service = open(config, "create").await?;
    let created = service.create_poll(title, options).await?;
    println!("Created poll {}", created.poll_id);
    println!("Share this link: {}", created.link);
    Ok(())
}

pub(super) async fn show(config: &AppConfig, poll_id: Uuid) -> Result<(), AppError> {
    let service = open(config, "show").await?;
    let poll = service.get_poll(poll_id).await?;
    let status = if poll.is_finished { "closed" } else { "open" };

    println!("{} [{}]", poll.title, status);
    println!("Link: {}", service.poll_link(poll.id));
    for option in &poll.options {
        println!("  {}  {}", option.id, option.name);
    }
    Ok(())
}

pub(super) async fn close(config: &AppConfig, poll_id: Uuid) -> Result<(), AppError> {
    let service = open(config, "close").await?;
    service.close_poll(poll_id).await?;
    println!("Poll {} ended.", poll_id);
    Ok(())
}

pub(super) async fn results(config: &AppConfig, poll_id: Uuid) -> Result<(), AppError> {
    let service = open(config, "results").await?;
    let results = service.get_results(poll_id).await?;
    print!("{}", render_results(&results));
    Ok(())
}

pub(super) async fn purge(config: &AppConfig, poll_id: Uuid) -> Result<(), AppError> {
    let service = open(config, "purge").await?;
    service.purge_poll(poll_id).await?;
    println!("Poll {} deleted.", poll_id);
    Ok(())
}

/// Standings as a plain-text table; unranked options show "n/a".
fn render_results(results: &[OptionResult]) -> String {
    if results.is_empty() {
        return "No rankings available.\n".to_string();
    }

    let width = results
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Option".len());

    let mut out = format!("{:<4} {:<width$}  {:>12}  {:>6}\n", "#", "Option", "Average rank", "Votes");
    for (place, result) in results.iter().enumerate() {
        let average = if result.has_rankings() {
            format!("{:.2}", result.average_rank)
        } else {
            "n/a".to_string()
        };
        out.push_str(&format!(
            "{:<4} {:<width$}  {:>12}  {:>6}\n",
            place + 1,
            result.name,
            average,
            result.ranking_count
        ));
    }
    out
}
