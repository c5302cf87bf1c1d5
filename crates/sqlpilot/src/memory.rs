//! Rolling window of recent prompt/response pairs folded into later prompts

use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
  pub prompt: String,
  pub response: String,
}

/// Bounded FIFO; the oldest exchange is evicted once `capacity` is reached
#[derive(Debug, Clone)]
pub struct SessionMemory {
  entries: VecDeque<Exchange>,
  capacity: usize,
}

impl SessionMemory {
  pub fn new(capacity: usize) -> Self {
    Self { entries: VecDeque::with_capacity(capacity), capacity }
  }

  pub fn push(&mut self, prompt: &str, response: &str) {
    if self.capacity == 0 {
      return;
    }
    if self.entries.len() >= self.capacity {
      self.entries.pop_front();
    }
    self.entries.push_back(Exchange { prompt: prompt.to_string(), response: response.to_string() });
  }

  pub fn clear(&mut self) {
    self.entries.clear();
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn iter(&self) -> impl Iterator<Item = &Exchange> {
    self.entries.iter()
  }

  /// Oldest first, one `User:`/`Assistant:` pair per exchange
  pub fn render(&self) -> String {
    self
      .entries
      .iter()
      .map(|e| format!("User: {}\nAssistant: {}", e.prompt, e.response))
      .collect::<Vec<_>>()
      .join("\n")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_fifo_eviction_at_capacity() {
    let mut memory = SessionMemory::new(3);
    for i in 0..5 {
      memory.push(&format!("q{i}"), &format!("a{i}"));
    }

    assert_eq!(memory.len(), 3);
    let prompts: Vec<_> = memory.iter().map(|e| e.prompt.as_str()).collect();
    assert_eq!(prompts, vec!["q2", "q3", "q4"]);
  }

  #[test]
  fn test_render_and_clear() {
    let mut memory = SessionMemory::new(2);
    assert_eq!(memory.render(), "");

    memory.push("select orders", "SELECT * FROM orders");
    memory.push("count", "SELECT COUNT(*) FROM orders");
    assert_eq!(
      memory.render(),
      "User: select orders\nAssistant: SELECT * FROM orders\nUser: count\nAssistant: SELECT COUNT(*) FROM orders"
    );

    memory.clear();
    assert!(memory.is_empty());
    assert_eq!(memory.capacity(), 2);
  }
}
