//! Core data models used throughout support-rag.
//!
//! These types represent the tickets, indexed documents, and retrieval
//! results that flow through the indexing and query pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Resolution stored in the index when a ticket carries none.
pub const DEFAULT_RESOLUTION: &str = "No resolution provided";
/// Status stored in the index when a ticket carries none.
pub const DEFAULT_STATUS: &str = "unknown";
/// Priority stored in the index when a ticket carries none.
pub const DEFAULT_PRIORITY: &str = "normal";

/// Metadata keys carried through the index alongside each document.
pub mod meta {
    pub const TICKET_ID: &str = "ticketId";
    pub const SUBJECT: &str = "ticketSubject";
    pub const RESOLUTION: &str = "ticketResolution";
    pub const STATUS: &str = "ticketStatus";
    pub const PRIORITY: &str = "ticketPriority";
    pub const CREATED_AT: &str = "created_at";
}

/// A validated support ticket.
///
/// Produced by [`crate::tickets::validate_ticket`]; `id`, `subject` and
/// `body` are guaranteed non-empty after trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: String,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Ticket {
    /// Subject and body joined by a blank line.
    ///
    /// Used verbatim as the indexed document text and as the snippet shown
    /// back to callers.
    pub fn document_text(&self) -> String {
        format!("{}\n\n{}", self.subject, self.body)
    }

    /// Text handed to the embedding model: [`document_text`](Self::document_text), trimmed.
    pub fn embedding_text(&self) -> String {
        self.document_text().trim().to_string()
    }

    /// Flat, string-valued metadata stored with the indexed document.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert(meta::TICKET_ID.to_string(), self.id.clone());
        m.insert(meta::SUBJECT.to_string(), self.subject.clone());
        m.insert(
            meta::RESOLUTION.to_string(),
            self.resolution
                .clone()
                .unwrap_or_else(|| DEFAULT_RESOLUTION.to_string()),
        );
        m.insert(
            meta::STATUS.to_string(),
            self.status
                .clone()
                .unwrap_or_else(|| DEFAULT_STATUS.to_string()),
        );
        m.insert(
            meta::PRIORITY.to_string(),
            self.priority
                .clone()
                .unwrap_or_else(|| DEFAULT_PRIORITY.to_string()),
        );
        m.insert(
            meta::CREATED_AT.to_string(),
            self.created_at.clone().unwrap_or_default(),
        );
        m
    }
}

/// One ticket as stored in the vector index.
///
/// `id` is the index key: upserting the same id overwrites the record.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub id: String,
    pub document: String,
    pub metadata: BTreeMap<String, String>,
    pub embedding: Vec<f32>,
}

impl IndexedDocument {
    /// Build the index record for a ticket from its embedding.
    pub fn from_ticket(ticket: &Ticket, embedding: Vec<f32>) -> Self {
        Self {
            id: ticket.id.clone(),
            document: ticket.document_text(),
            metadata: ticket.metadata(),
            embedding,
        }
    }
}

/// A ticket returned by similarity search, ranked by `score` descending.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedTicket {
    pub ticket_id: String,
    pub subject: String,
    /// Full document text (subject + blank line + body).
    pub snippet: String,
    pub resolution: String,
    /// `max(0, 1 - distance)`.
    pub score: f64,
}

/// Counts and histograms over the valid tickets in the source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketStats {
    pub total_tickets: usize,
    pub status_breakdown: BTreeMap<String, usize>,
    pub priority_breakdown: BTreeMap<String, usize>,
}

impl TicketStats {
    /// Tally status and priority over `tickets`; absent values count as `"unknown"`.
    pub fn from_tickets(tickets: &[Ticket]) -> Self {
        let mut status_breakdown = BTreeMap::new();
        let mut priority_breakdown = BTreeMap::new();
        for t in tickets {
            let status = t.status.clone().unwrap_or_else(|| "unknown".to_string());
            let priority = t.priority.clone().unwrap_or_else(|| "unknown".to_string());
            *status_breakdown.entry(status).or_insert(0) += 1;
            *priority_breakdown.entry(priority).or_insert(0) += 1;
        }
        Self {
            total_tickets: tickets.len(),
            status_breakdown,
            priority_breakdown,
        }
    }
}
