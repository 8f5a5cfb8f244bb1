//! RAG prompt assembly.
//!
//! Builds the text sent to the generative model: a persona and answering
//! guidelines, the user's question, then one block per retrieved case in
//! rank order. With no cases, a short general-knowledge prompt is used
//! instead.

use std::fmt::Write;

use crate::models::RetrievedTicket;

/// Descriptions longer than this many characters are cut and marked.
pub const SNIPPET_MAX_CHARS: usize = 200;

const SECTION_RULE_WIDTH: usize = 50;
const CASE_RULE_WIDTH: usize = 30;

const SYSTEM_PREAMBLE: &str = "You are an expert customer support assistant with access to a comprehensive knowledge base of historical support tickets. Your role is to provide accurate, helpful, and actionable answers based on how similar issues have been resolved in the past.

IMPORTANT GUIDELINES:
- Provide a direct, helpful answer to the user's question
- Base your response primarily on the ticket resolutions provided below
- If the context doesn't contain enough information, supplement with general support knowledge
- Be concise but thorough in your explanations
- Include actionable steps when applicable
- Do NOT mention ticket IDs, scores, or refer to \"the context below\"
- Write as if you're directly answering the customer

";

/// Build the prompt for `query` grounded in `tickets`.
pub fn build_rag_prompt(query: &str, tickets: &[RetrievedTicket]) -> String {
    if tickets.is_empty() {
        return build_fallback_prompt(query);
    }

    let mut prompt = String::from(SYSTEM_PREAMBLE);
    let _ = write!(prompt, "## User Question:\n{}\n\n", query);
    prompt.push_str("## Relevant Support Cases:\n");
    prompt.push_str(&"=".repeat(SECTION_RULE_WIDTH));
    prompt.push('\n');

    for ticket in tickets {
        let _ = writeln!(prompt, "Case: {}", ticket.subject);
        let _ = writeln!(prompt, "Description: {}", truncate_snippet(&ticket.snippet));
        let _ = writeln!(prompt, "Resolution: {}", ticket.resolution);
        let _ = writeln!(prompt, "Relevance: {}", format_relevance(ticket.score));
        prompt.push_str(&"-".repeat(CASE_RULE_WIDTH));
        prompt.push('\n');
    }

    prompt.push_str("\n## Your Response:\n");
    prompt
}

fn build_fallback_prompt(query: &str) -> String {
    format!(
        "You are a helpful customer support assistant. The user has asked: \"{}\"\n\n\
         Unfortunately, I couldn't find any relevant historical support tickets to answer this question. \
         Please provide a helpful response based on general support knowledge, and suggest that the user \
         contact support directly for more specific assistance.\n\nAnswer:",
        query
    )
}

/// Cut `snippet` to [`SNIPPET_MAX_CHARS`] characters, appending `...` if cut.
pub fn truncate_snippet(snippet: &str) -> String {
    if snippet.chars().count() > SNIPPET_MAX_CHARS {
        let mut cut: String = snippet.chars().take(SNIPPET_MAX_CHARS).collect();
        cut.push_str("...");
        cut
    } else {
        snippet.to_string()
    }
}

/// Render a `[0, 1]` score as a percentage with one decimal, e.g. `87.5%`.
pub fn format_relevance(score: f64) -> String {
    format!("{:.1}%", score * 100.0)
}
