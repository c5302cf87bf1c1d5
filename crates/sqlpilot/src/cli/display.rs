//! Display formatting utilities for CLI output

use colored::*;

use crate::suggestion_log::ModelStats;
use crate::vector_store::ScoredRecord;

/// One ranked retrieval hit
pub fn format_record(rank: usize, record: &ScoredRecord) -> String {
  let mut out = format!(
    "{} {} {}\n    {}",
    format!("{rank}.").cyan(),
    record.prompt.bold(),
    format!("(score {:.4}, relevance {:.4})", record.similarity_score, record.relevance()).dimmed(),
    record.sql.green()
  );
  if let Some(explanation) = record.explanation.as_deref().filter(|e| !e.trim().is_empty()) {
    out.push_str(&format!("\n    {}", explanation.dimmed()));
  }
  out
}

pub fn format_stats(stats: &ModelStats) -> String {
  format!(
    "{}\n  suggestions: {}  accepted: {} ({:.1}%)  dismissed: {} ({:.1}%)\n  latency ms: avg {:.1}  min {}  max {}",
    stats.model_name.blue().bold(),
    stats.total,
    stats.accepted,
    stats.acceptance_rate() * 100.0,
    stats.dismissed,
    stats.rejection_rate() * 100.0,
    stats.avg_latency_ms,
    stats.min_latency_ms,
    stats.max_latency_ms
  )
}
