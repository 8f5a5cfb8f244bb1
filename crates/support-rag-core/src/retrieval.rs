//! Retrieval scoring and hit mapping.
//!
//! Turns raw [`QueryHit`]s from a [`VectorIndex`](crate::store::VectorIndex)
//! into ranked [`RetrievedTicket`]s. Hits the index returned only partially
//! are skipped one at a time; they never abort the batch.

use tracing::{error, warn};

use crate::models::{meta, RetrievedTicket};
use crate::store::QueryHit;

/// Default for a hit whose metadata lacks a ticket id.
pub const UNKNOWN_TICKET_ID: &str = "unknown";
/// Default for a hit whose metadata lacks a subject.
pub const NO_SUBJECT: &str = "No subject";
/// Default for a hit whose metadata lacks a resolution.
pub const NO_RESOLUTION_AVAILABLE: &str = "No resolution available";

/// Convert an index distance to a similarity score: `max(0, 1 - distance)`.
pub fn similarity_from_distance(distance: f32) -> f64 {
    (1.0 - distance as f64).max(0.0)
}

/// Cap `k` at `max_k`, logging when the request exceeds it.
pub fn clamp_top_k(k: usize, max_k: usize) -> usize {
    if k > max_k {
        warn!(requested = k, max = max_k, "top-k value capped");
        max_k
    } else {
        k
    }
}

/// Map index hits to retrieved tickets, preserving hit order.
pub fn hits_to_tickets(hits: Vec<QueryHit>) -> Vec<RetrievedTicket> {
    hits.into_iter()
        .enumerate()
        .filter_map(|(idx, hit)| match hit_to_ticket(hit) {
            Ok(t) => Some(t),
            Err(reason) => {
                error!(index = idx, reason, "error processing search result, skipping");
                None
            }
        })
        .collect()
}

fn hit_to_ticket(hit: QueryHit) -> Result<RetrievedTicket, &'static str> {
    let metadata = hit.metadata.ok_or("missing metadata")?;
    let snippet = hit.document.ok_or("missing document")?;
    let distance = hit.distance.ok_or("missing distance")?;
    if distance.is_nan() {
        return Err("distance is NaN");
    }

    let field = |key: &str, default: &str| {
        metadata
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    };

    Ok(RetrievedTicket {
        ticket_id: field(meta::TICKET_ID, UNKNOWN_TICKET_ID),
        subject: field(meta::SUBJECT, NO_SUBJECT),
        snippet,
        resolution: field(meta::RESOLUTION, NO_RESOLUTION_AVAILABLE),
        score: similarity_from_distance(distance),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn hit(id: &str, distance: Option<f32>, meta_pairs: &[(&str, &str)]) -> QueryHit {
        QueryHit {
            id: id.to_string(),
            document: Some(format!("doc {}", id)),
            metadata: Some(
                meta_pairs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            distance,
        }
    }

    #[test]
    fn test_score_is_clamped_at_zero() {
        assert!((similarity_from_distance(0.25) - 0.75).abs() < 1e-9);
        assert_eq!(similarity_from_distance(1.0), 0.0);
        assert_eq!(similarity_from_distance(1.7), 0.0);
        assert_eq!(similarity_from_distance(0.0), 1.0);
    }

    #[test]
    fn test_clamp_top_k() {
        assert_eq!(clamp_top_k(3, 10), 3);
        assert_eq!(clamp_top_k(10, 10), 10);
        assert_eq!(clamp_top_k(50, 10), 10);
    }

    #[test]
    fn test_metadata_defaults_applied() {
        let tickets = hits_to_tickets(vec![hit("x", Some(0.5), &[])]);
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].ticket_id, UNKNOWN_TICKET_ID);
        assert_eq!(tickets[0].subject, NO_SUBJECT);
        assert_eq!(tickets[0].resolution, NO_RESOLUTION_AVAILABLE);
        assert_eq!(tickets[0].snippet, "doc x");
    }

    #[test]
    fn test_malformed_hit_skipped_not_fatal() {
        let mut broken = hit("b", Some(0.1), &[]);
        broken.metadata = None;
        let tickets = hits_to_tickets(vec![
            hit("a", Some(0.1), &[(meta::TICKET_ID, "A")]),
            broken,
            hit("c", None, &[]),
            hit("d", Some(0.3), &[(meta::TICKET_ID, "D"), (meta::RESOLUTION, "fixed")]),
        ]);
        let ids: Vec<&str> = tickets.iter().map(|t| t.ticket_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "D"]);
        assert_eq!(tickets[1].resolution, "fixed");
    }
}
