//! Ticket file loading.
//!
//! Reads the configured JSON ticket file and hands its text to
//! [`support_rag_core::tickets::parse_tickets`] for validation. Hard
//! failures (missing file, unreadable, malformed) surface as
//! [`RagError`]s; the sample and stats helpers never fail and degrade to
//! an empty list or an error descriptor instead.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use support_rag_core::models::{Ticket, TicketStats};
use support_rag_core::tickets::{parse_tickets, ParsedTickets};
use support_rag_core::{RagError, Result};

/// A JSON file of support tickets.
#[derive(Debug, Clone)]
pub struct TicketSource {
    path: PathBuf,
}

/// Result of [`TicketSource::get_ticket_stats`]: statistics, or a
/// descriptor of why they could not be computed.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TicketStatsReport {
    Stats(TicketStats),
    Error { error: String },
}

impl TicketSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate every ticket, keeping the drop count.
    ///
    /// # Errors
    ///
    /// - [`RagError::NotFound`] if the file does not exist.
    /// - [`RagError::Invalid`] if it is empty, unreadable, not a JSON
    ///   array, or holds no valid ticket.
    pub fn load(&self) -> Result<ParsedTickets> {
        if !self.path.exists() {
            error!(path = %self.path.display(), "tickets file not found");
            return Err(RagError::NotFound(self.path.display().to_string()));
        }

        info!(path = %self.path.display(), "loading tickets");

        let raw = std::fs::read_to_string(&self.path).map_err(|e| {
            RagError::Invalid(format!(
                "failed to read tickets file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        parse_tickets(&raw).inspect_err(|e| error!(error = %e, "error loading tickets"))
    }

    /// Load every valid ticket in source order.
    pub fn load_all_tickets(&self) -> Result<Vec<Ticket>> {
        self.load().map(|parsed| parsed.tickets)
    }

    /// The first `min(n, count)` valid tickets; empty on any failure.
    pub fn get_ticket_sample(&self, n: usize) -> Vec<Ticket> {
        match self.load_all_tickets() {
            Ok(mut tickets) => {
                tickets.truncate(n);
                tickets
            }
            Err(e) => {
                error!(error = %e, "error getting ticket sample");
                Vec::new()
            }
        }
    }

    /// Total count plus status and priority histograms.
    pub fn get_ticket_stats(&self) -> TicketStatsReport {
        match self.load_all_tickets() {
            Ok(tickets) => TicketStatsReport::Stats(TicketStats::from_tickets(&tickets)),
            Err(e) => {
                error!(error = %e, "error getting ticket stats");
                TicketStatsReport::Error {
                    error: e.to_string(),
                }
            }
        }
    }
}
