//! Diagnostics. Replaces the original's `report-and-exit` with the
//! result-typed scheme floated as a redesign in the spec's design notes:
//! every fallible parser entry point returns [`PResult<T>`], and the actual
//! message is recorded in a [`DiagnosticSink`] *before* the `Err(Fatal)` is
//! returned, so a caller that wants to keep going past one error can do so
//! at a declaration or statement boundary.

use std::fmt;
use crate::lexer::Span;

/// The kind of problem, matching the taxonomy of spec §7.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
  /// Fatal at the point of detection; the enclosing parse returns `Err(Fatal)`.
  Error,
  /// Recoverable; parsing proceeds unchanged.
  Warning,
}

/// A single diagnostic. Carries only rendered text, not a structured error
/// code enum, because the corpus of messages (syntax, redefinition, tag-kind
/// mismatch, semantic) is open-ended and driven by `format!` call sites
/// exactly as in the original.
#[derive(Clone, Debug)]
pub struct Diagnostic {
  /// Error or warning.
  pub severity: Severity,
  /// Source location the diagnostic is anchored to, if known.
  pub span: Option<Span>,
  /// Rendered message text.
  pub message: String,
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.span {
      Some(sp) => write!(f, "{:?}: {}: {}", sp, kind_tag(self.severity), self.message),
      None => write!(f, "{}: {}", kind_tag(self.severity), self.message),
    }
  }
}

fn kind_tag(s: Severity) -> &'static str {
  match s { Severity::Error => "error", Severity::Warning => "warning" }
}

/// Marker returned in the `Err` case of [`PResult`]. Carries no payload: the
/// diagnostic itself already lives in the [`DiagnosticSink`] by the time this
/// is constructed, so there is nothing left to thread through `?`.
#[derive(Clone, Copy, Debug)]
pub struct Fatal;

/// The result type returned by every fallible parser entry point.
pub type PResult<T> = Result<T, Fatal>;

/// Accumulates diagnostics for one compilation. Never itself exits the
/// process or panics; `push_error` leaves it to the caller to propagate
/// `Err(Fatal)` via `?`.
#[derive(Default)]
pub struct DiagnosticSink {
  diagnostics: Vec<Diagnostic>,
  error_count: u32,
}

impl DiagnosticSink {
  /// Create an empty sink.
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Record an error and return the `Fatal` marker to propagate with `?`.
  pub fn error(&mut self, span: Option<Span>, message: impl Into<String>) -> Fatal {
    let message = message.into();
    log::error!("{message}");
    self.diagnostics.push(Diagnostic { severity: Severity::Error, span, message });
    self.error_count += 1;
    Fatal
  }

  /// Record a warning. Does not short-circuit parsing. If `escalate` is set
  /// (from [`crate::config::Options::warnings_as_errors`]) the warning is
  /// recorded as an error instead, but still does not itself return `Fatal`
  /// — the caller decides whether escalated warnings should abort.
  pub fn warn(&mut self, span: Option<Span>, message: impl Into<String>, escalate: bool) {
    let message = message.into();
    log::warn!("{message}");
    let severity = if escalate { self.error_count += 1; Severity::Error } else { Severity::Warning };
    self.diagnostics.push(Diagnostic { severity, span, message });
  }

  /// All diagnostics recorded so far, in emission order.
  #[must_use] pub fn diagnostics(&self) -> &[Diagnostic] { &self.diagnostics }

  /// Number of `Severity::Error` diagnostics recorded (including escalated warnings).
  #[must_use] pub fn error_count(&self) -> u32 { self.error_count }

  /// Whether any error has been recorded.
  #[must_use] pub fn has_errors(&self) -> bool { self.error_count > 0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn error_increments_count_and_returns_fatal() {
    let mut sink = DiagnosticSink::new();
    let Fatal = sink.error(None, "bad token");
    assert_eq!(sink.error_count(), 1);
    assert!(sink.has_errors());
  }

  #[test]
  fn warning_does_not_count_as_error_unless_escalated() {
    let mut sink = DiagnosticSink::new();
    sink.warn(None, "implicit int", false);
    assert!(!sink.has_errors());
    sink.warn(None, "implicit int again", true);
    assert!(sink.has_errors());
    assert_eq!(sink.error_count(), 1);
  }
}
