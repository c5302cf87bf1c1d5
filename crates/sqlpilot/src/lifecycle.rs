//! Ghost-text suggestion lifecycle
//!
//! A two-state machine (`Idle`, `SuggestionDisplayed`) driven by abstract [`Event`]s. It owns the
//! only [`SuggestionState`], talks to the UI through a [`GhostSink`] and never returns an error to
//! its driver: sink and log failures are traced and the transition still completes.

use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::engine::SuggestionEngine;
use crate::suggestion_log::{LogEntry, Status, SuggestionLog};

const GHOST_PREFIX: &str = "  -- suggestion: ";

/// Input signals from the event source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  Capture { text: String, window_title: String },
  Accept,
  Dismiss,
  Reset,
}

/// What a handled event did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
  Displayed,
  Accepted,
  Dismissed,
  Ignored(String),
  Reset,
  NoOp,
}

/// Where ghost text is drawn
pub trait GhostSink: Send {
  fn display(&mut self, text: &str) -> std::io::Result<()>;

  /// Erase the last `n_chars` characters of ghost text
  fn remove(&mut self, n_chars: usize) -> std::io::Result<()>;

  fn commit(&mut self, text: &str) -> std::io::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct SuggestionState {
  pub displayed: bool,
  pub ghost_text: String,
  pub pending_suggestion: String,
  pub captured_input: String,
  pub built_context: String,
  pub started_at: Option<Instant>,
  pub latency: Duration,
  pub failed: bool,
}

/// Everything one interactive session needs, passed in explicitly
pub struct Session {
  pub engine: SuggestionEngine,
  pub log: SuggestionLog,
  pub window_names: Vec<String>,
}

impl Session {
  pub fn new(engine: SuggestionEngine, log: SuggestionLog, window_names: Vec<String>) -> Self {
    Self { engine, log, window_names }
  }

  /// Case-insensitive substring match; an empty list accepts every window
  pub fn is_target_window(&self, window_title: &str) -> bool {
    if self.window_names.is_empty() {
      return true;
    }
    let title = window_title.to_lowercase();
    self.window_names.iter().any(|name| title.contains(&name.to_lowercase()))
  }
}

pub struct SuggestionLifecycle<S: GhostSink> {
  session: Session,
  sink: S,
  state: SuggestionState,
}

impl<S: GhostSink> SuggestionLifecycle<S> {
  pub fn new(session: Session, sink: S) -> Self {
    Self { session, sink, state: SuggestionState::default() }
  }

  pub fn state(&self) -> &SuggestionState {
    &self.state
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn sink(&self) -> &S {
    &self.sink
  }

  /// Handle queued events one at a time until every sender is dropped
  pub async fn run(&mut self, mut events: mpsc::Receiver<Event>) {
    while let Some(event) = events.recv().await {
      let transition = self.handle(event).await;
      tracing::debug!(?transition, "event handled");
    }
    tracing::debug!("event source closed");
  }

  pub async fn handle(&mut self, event: Event) -> Transition {
    match event {
      Event::Capture { text, window_title } => self.capture(text, &window_title).await,
      Event::Accept => self.accept(),
      Event::Dismiss => self.dismiss(),
      Event::Reset => {
        self.session.engine.reset();
        Transition::Reset
      }
    }
  }

  async fn capture(&mut self, text: String, window_title: &str) -> Transition {
    if !self.session.is_target_window(window_title) {
      let reason = format!("window '{window_title}' is not a tracked target");
      tracing::info!("capture ignored: {reason}");
      return Transition::Ignored(reason);
    }

    // A newer capture supersedes whatever is on display, even an empty one
    let superseded = self.dismiss() == Transition::Dismissed;
    if text.trim().is_empty() {
      tracing::warn!("empty capture, nothing to suggest");
      return if superseded { Transition::Dismissed } else { Transition::NoOp };
    }

    let started_at = Instant::now();
    let generation = self.session.engine.generate(&text).await;
    let ghost_text = format!("{GHOST_PREFIX}{}", generation.suggestion);
    if let Err(e) = self.sink.display(&ghost_text) {
      tracing::error!(error = %e, "failed to display ghost text");
    }

    self.state = SuggestionState {
      displayed: true,
      ghost_text,
      pending_suggestion: generation.suggestion,
      captured_input: text,
      built_context: generation.retrieved_context,
      started_at: Some(started_at),
      latency: generation.latency,
      failed: generation.failed,
    };
    Transition::Displayed
  }

  fn accept(&mut self) -> Transition {
    if !self.state.displayed {
      return Transition::NoOp;
    }
    // The sentinel is never committed as if it were SQL
    if self.state.failed {
      return self.dismiss();
    }

    self.clear_ghost();
    if let Err(e) = self.sink.commit(&self.state.pending_suggestion) {
      tracing::error!(error = %e, "failed to commit suggestion");
    }
    self.finish(Status::Accepted);
    Transition::Accepted
  }

  fn dismiss(&mut self) -> Transition {
    if !self.state.displayed {
      return Transition::NoOp;
    }

    self.clear_ghost();
    self.finish(Status::Dismissed);
    Transition::Dismissed
  }

  fn clear_ghost(&mut self) {
    let n_chars = self.state.ghost_text.chars().count();
    if let Err(e) = self.sink.remove(n_chars) {
      tracing::error!(error = %e, "failed to remove ghost text");
    }
  }

  /// Log the outcome and return to `Idle`
  fn finish(&mut self, status: Status) {
    let state = std::mem::take(&mut self.state);
    let engine = &self.session.engine;
    let entry = LogEntry {
      timestamp: Utc::now(),
      model_name: engine.model_name().to_string(),
      status,
      user_input: state.captured_input,
      retrieved_context: state.built_context,
      suggestion: state.pending_suggestion,
      latency_ms: state.latency.as_millis() as u64,
      vector_store_kind: engine.vector_store_kind().as_str().to_string(),
      embedding_model: engine.embedding_model().to_string(),
    };

    match self.session.log.append(&entry) {
      Ok(()) => tracing::info!(%status, latency_ms = entry.latency_ms, "suggestion logged"),
      Err(e) => tracing::error!(error = %e, "failed to write suggestion log"),
    }
  }
}
