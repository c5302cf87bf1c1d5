//! Line-oriented terminal driver: stdin lines become lifecycle events, ghost text goes to stdout

use colored::*;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::lifecycle::{Event, GhostSink};

/// What one line of terminal input asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineCommand {
  Event(Event),
  Quit,
}

/// Map a stdin line to an event. Captures carry `window_title` as their source window.
pub fn parse_line(line: &str, window_title: &str) -> LineCommand {
  match line.trim() {
    // A bare tab trims to the empty string as well
    "" | ":accept" => LineCommand::Event(Event::Accept),
    ":dismiss" => LineCommand::Event(Event::Dismiss),
    ":reset" => LineCommand::Event(Event::Reset),
    ":quit" | ":q" => LineCommand::Quit,
    text => LineCommand::Event(Event::Capture {
      text: text.to_string(),
      window_title: window_title.to_string(),
    }),
  }
}

/// Read stdin until EOF or `:quit`, forwarding events; dropping the sender ends the session
pub async fn forward_stdin(events: mpsc::Sender<Event>, window_title: String) {
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  loop {
    let line = match lines.next_line().await {
      Ok(Some(line)) => line,
      Ok(None) => break,
      Err(e) => {
        tracing::error!(error = %e, "failed to read stdin");
        break;
      }
    };

    match parse_line(&line, &window_title) {
      LineCommand::Quit => break,
      LineCommand::Event(event) => {
        if events.send(event).await.is_err() {
          break;
        }
      }
    }
  }
}

/// Ghost text rendered dimmed on the current line; commits print in green
pub struct TerminalSink<W: Write + Send> {
  out: W,
}

impl<W: Write + Send> TerminalSink<W> {
  pub fn new(out: W) -> Self {
    Self { out }
  }

  pub fn into_inner(self) -> W {
    self.out
  }
}

impl TerminalSink<std::io::Stdout> {
  pub fn stdout() -> Self {
    Self::new(std::io::stdout())
  }
}

impl<W: Write + Send> GhostSink for TerminalSink<W> {
  fn display(&mut self, text: &str) -> std::io::Result<()> {
    write!(self.out, "{}", text.dimmed())?;
    self.out.flush()
  }

  fn remove(&mut self, n_chars: usize) -> std::io::Result<()> {
    let back = "\u{8}".repeat(n_chars);
    write!(self.out, "{back}{}{back}", " ".repeat(n_chars))?;
    self.out.flush()
  }

  fn commit(&mut self, text: &str) -> std::io::Result<()> {
    writeln!(self.out, "{}", text.green())?;
    self.out.flush()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn capture(text: &str) -> LineCommand {
    LineCommand::Event(Event::Capture { text: text.to_string(), window_title: "sql workbench".into() })
  }

  #[test]
  fn test_parse_line_commands() {
    assert_eq!(parse_line("", "sql workbench"), LineCommand::Event(Event::Accept));
    assert_eq!(parse_line("\t", "sql workbench"), LineCommand::Event(Event::Accept));
    assert_eq!(parse_line(":accept\n", "sql workbench"), LineCommand::Event(Event::Accept));
    assert_eq!(parse_line(":dismiss", "sql workbench"), LineCommand::Event(Event::Dismiss));
    assert_eq!(parse_line(":reset", "sql workbench"), LineCommand::Event(Event::Reset));
    assert_eq!(parse_line(":quit", "sql workbench"), LineCommand::Quit);
  }

  #[test]
  fn test_plain_text_is_a_capture() {
    assert_eq!(parse_line("SELECT * FROM orders", "sql workbench"), capture("SELECT * FROM orders"));
  }

  #[test]
  fn test_sink_erases_exactly_what_it_drew() {
    let mut sink = TerminalSink::new(Vec::new());
    sink.display("  -- suggestion: SELECT 1").unwrap();
    sink.remove(3).unwrap();
    sink.commit("SELECT 1").unwrap();

    let out = String::from_utf8(sink.into_inner()).unwrap();
    assert!(out.contains("  -- suggestion: SELECT 1"));
    assert!(out.contains("\u{8}\u{8}\u{8}   \u{8}\u{8}\u{8}"));
    assert!(out.ends_with('\n'));
  }
}
