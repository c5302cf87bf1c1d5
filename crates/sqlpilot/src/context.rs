//! Prompt-context assembly
//!
//! Pure functions: identical inputs always render identical text, and empty sections are left
//! out entirely so the context never starts or ends with a separator.

use crate::vector_store::ScoredRecord;

const SECTION_SEPARATOR: &str = "\n\n";

/// Render retrieved examples, optional schema text and optional history into one context string
pub fn build(
  records: &[ScoredRecord],
  schema_text: Option<&str>,
  session_history: Option<&str>,
) -> String {
  let mut sections = Vec::with_capacity(3);

  if let Some(schema) = non_empty(schema_text) {
    sections.push(format!("Database Schema:\n{schema}"));
  }
  if let Some(history) = non_empty(session_history) {
    sections.push(format!("Previous Interactions:\n{history}"));
  }
  if !records.is_empty() {
    let blocks: Vec<String> = records.iter().map(render_record).collect();
    sections.push(format!("Similar Examples:\n{}", blocks.join(SECTION_SEPARATOR)));
  }

  sections.join(SECTION_SEPARATOR)
}

/// Fixed four-line block for one retrieved example
pub fn render_record(record: &ScoredRecord) -> String {
  format!(
    "Prompt: {}\nSQL: {}\nExplanation: {}\nSimilarity Score: {:.4}",
    record.prompt,
    record.sql,
    record.explanation.as_deref().filter(|e| !e.trim().is_empty()).unwrap_or("N/A"),
    record.similarity_score
  )
}

fn non_empty(text: Option<&str>) -> Option<&str> {
  text.map(str::trim).filter(|t| !t.is_empty())
}
