//! Error kinds surfaced by the workstream engine.
//!
//! Everything fallible returns `color_eyre::Result`; the variants below are
//! wrapped inside the report so callers can `downcast_ref::<EngineError>()`
//! to tell a missing workstream apart from a tracker outage.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  /// The item was never loaded into a project cache, or the tracker does not
  /// know it. Not retried.
  #[error("{kind} {key} not found{hint}")]
  NotFound {
    kind: &'static str,
    key: String,
    hint: &'static str,
  },

  /// I/O failure talking to the issue tracker that no fallback could absorb.
  #[error("issue tracker request failed during {step}: {message}")]
  DataSource { step: &'static str, message: String },

  /// Caller-level deadline for long multi-tree operations.
  #[error("{operation} did not finish within {seconds}s")]
  Timeout {
    operation: &'static str,
    seconds: u64,
  },
}

impl EngineError {
  pub fn workstream_not_loaded(key: &str) -> Self {
    Self::NotFound {
      kind: "workstream",
      key: key.to_string(),
      hint: " (load the project's workstreams first)",
    }
  }

  pub fn issue_not_found(key: &str) -> Self {
    Self::NotFound {
      kind: "issue",
      key: key.to_string(),
      hint: "",
    }
  }

  pub fn data_source(step: &'static str, err: impl std::fmt::Display) -> Self {
    Self::DataSource {
      step,
      message: err.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::Report;

  #[test]
  fn test_not_found_message_mentions_loading() {
    let err = EngineError::workstream_not_loaded("WS-1");
    assert_eq!(
      err.to_string(),
      "workstream WS-1 not found (load the project's workstreams first)"
    );
  }

  #[test]
  fn test_downcast_through_report() {
    let report: Report = EngineError::issue_not_found("ABC-9").into();
    assert!(matches!(
      report.downcast_ref::<EngineError>(),
      Some(EngineError::NotFound { kind: "issue", .. })
    ));
  }
}
