//! Implementations of the `tix` subcommands.
//!
//! Results go to stdout; progress and diagnostics go through `tracing`
//! to stderr.

use anyhow::{Context, Result};

use support_rag_core::models::RetrievedTicket;
use support_rag_core::prompt::truncate_snippet;

use crate::config::Config;
use crate::engine::QueryEngine;
use crate::index::CollectionStats;

/// Open the index and populate it if empty.
pub async fn run_init(config: &Config) -> Result<()> {
    let engine = QueryEngine::from_config(config);
    let (collection, _) = engine.index().create_or_get_collection().await?;
    let count = collection.count().await?;
    println!(
        "Index ready at {} (collection '{}', {} tickets).",
        config.index.path.display(),
        collection.name(),
        count
    );
    Ok(())
}

/// Re-embed and upsert every ticket, regardless of the current count.
pub async fn run_index(config: &Config) -> Result<()> {
    let engine = QueryEngine::from_config(config);
    let written = engine.index().reindex().await?;
    println!(
        "Indexed {} tickets into '{}'.",
        written,
        engine.index().collection_name()
    );
    Ok(())
}

pub async fn run_reset(config: &Config) -> Result<()> {
    let engine = QueryEngine::from_config(config);
    engine
        .index()
        .reset()
        .await
        .context("Failed to reset index")?;
    println!("Index reset.");
    Ok(())
}

/// Answer a question. Always prints an answer; pipeline failures are
/// part of the answer text.
pub async fn run_ask(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let engine = QueryEngine::from_config(config);
    let answer = engine.resolve_query(query, k).await;
    println!("{}", answer);
    Ok(())
}

pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let engine = QueryEngine::from_config(config);
    let results = engine.try_query_top_k_tickets(query, k).await?;

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, ticket) in results.iter().enumerate() {
        print_result(i + 1, ticket);
    }
    Ok(())
}

fn print_result(rank: usize, ticket: &RetrievedTicket) {
    println!(
        "{}. [{:.3}] {} (ticket {})",
        rank, ticket.score, ticket.subject, ticket.ticket_id
    );
    println!(
        "    {}",
        truncate_snippet(&ticket.snippet).replace('\n', " ")
    );
    println!("    resolution: {}", ticket.resolution);
}

/// Print the first `n` valid tickets as JSON.
pub fn run_sample(config: &Config, n: usize) -> Result<()> {
    let source = crate::loader::TicketSource::new(&config.tickets.path);
    let tickets = source.get_ticket_sample(n);
    println!("{}", serde_json::to_string_pretty(&tickets)?);
    Ok(())
}

/// Print collection and ticket-file diagnostics as JSON.
///
/// Exits non-zero when the collection could not be read.
pub async fn run_stats(config: &Config) -> Result<()> {
    let engine = QueryEngine::from_config(config);
    let diagnostics = engine.diagnostics().await;
    println!("{}", serde_json::to_string_pretty(&diagnostics)?);

    if let CollectionStats::Error { message, .. } = &diagnostics.collection {
        anyhow::bail!("collection unavailable: {}", message);
    }
    Ok(())
}
