//! Ticket validation.
//!
//! Parses raw JSON ticket data into [`Ticket`]s. Validation is per-record
//! and lenient: a malformed ticket is logged and dropped, and only a
//! source with zero usable tickets is an error.
//!
//! Reading the file itself is left to the app crate; this module only
//! sees the text.

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{RagError, Result};
use crate::models::Ticket;

/// Fields every ticket must carry, non-empty after trimming.
pub const REQUIRED_FIELDS: [&str; 3] = ["id", "subject", "body"];

/// The outcome of parsing a ticket source.
#[derive(Debug, Clone)]
pub struct ParsedTickets {
    /// Valid tickets, in source order.
    pub tickets: Vec<Ticket>,
    /// Number of records that failed validation.
    pub dropped: usize,
}

/// Parse and validate the contents of a ticket file.
///
/// # Errors
///
/// Returns [`RagError::Invalid`] when the text is blank, is not valid
/// JSON, is not a JSON array, or contains no valid ticket.
pub fn parse_tickets(raw: &str) -> Result<ParsedTickets> {
    if raw.trim().is_empty() {
        return Err(RagError::Invalid("tickets file is empty".into()));
    }

    let value: Value = serde_json::from_str(raw)
        .map_err(|e| RagError::Invalid(format!("invalid JSON in tickets file: {}", e)))?;

    let records = match value {
        Value::Array(items) => items,
        _ => {
            return Err(RagError::Invalid(
                "tickets data must be a list of ticket objects".into(),
            ))
        }
    };

    let total = records.len();
    let tickets: Vec<Ticket> = records
        .iter()
        .enumerate()
        .filter_map(|(i, record)| validate_ticket(record, i))
        .collect();
    let dropped = total - tickets.len();

    info!(
        valid = tickets.len(),
        total, dropped, "loaded valid tickets out of total"
    );

    if tickets.is_empty() {
        return Err(RagError::Invalid(
            "no valid tickets found in the data file".into(),
        ));
    }

    Ok(ParsedTickets { tickets, dropped })
}

/// Validate a single ticket record.
///
/// Returns `None` (after logging why) if the record is not an object or
/// lacks a non-empty `id`, `subject`, or `body`. String, number, and bool
/// values are coerced to strings; `null` counts as missing. Only text that
/// is blank after coercion is empty, so `0` and `false` pass as `"0"` and
/// `"false"`.
pub fn validate_ticket(record: &Value, index: usize) -> Option<Ticket> {
    let obj = match record.as_object() {
        Some(o) => o,
        None => {
            warn!(index, "ticket is not an object, skipping");
            return None;
        }
    };

    for field in REQUIRED_FIELDS {
        match obj.get(field) {
            None => {
                warn!(index, field, "ticket missing required field, skipping");
                return None;
            }
            Some(v) => {
                let empty = coerce_string(v)
                    .map(|s| s.trim().is_empty())
                    .unwrap_or(true);
                if empty {
                    warn!(index, field, "ticket has empty required field, skipping");
                    return None;
                }
            }
        }
    }

    let text = |key: &str| obj.get(key).and_then(coerce_string);

    Some(Ticket {
        id: text("id")?.trim().to_string(),
        subject: text("subject")?,
        body: text("body")?,
        resolution: text("resolution"),
        status: text("status"),
        priority: text("priority"),
        created_at: text("created_at"),
    })
}

/// Coerce a JSON scalar to its string form. `null` yields `None`;
/// arrays and objects yield their compact JSON text.
fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
