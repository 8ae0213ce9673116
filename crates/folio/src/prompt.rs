//! Prompt construction for project summaries.

use crate::types::Entity;

/// Upper bound on summary length requested from the model.
pub const SUMMARY_WORD_LIMIT: usize = 80;

/// Build the summary prompt for one entity.
pub fn build_prompt(entity: &Entity) -> String {
    format!(
        "Generate a concise, impactful summary (under {SUMMARY_WORD_LIMIT} words) of the following \
         project for a technical recruiter. Highlight its key objective, technologies used, and \
         main achievement in 2-3 bullet points.\n\nProject Title: {}\nDetails: {}",
        entity.title(),
        entity.details().join("\n")
    )
}
