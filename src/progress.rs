//! Progress events for long-running tree builds and orphan scans.
//!
//! Events are pushed one at a time into a caller-supplied [`ProgressSink`].
//! A closed sink never aborts the work in flight: results still land in the
//! caches for the next caller.

use serde::Serialize;
use tokio::sync::mpsc;

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
  Processing {
    step: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress: Option<u8>,
  },
  Complete {
    step: String,
    message: String,
    data: serde_json::Value,
  },
  Error {
    step: String,
    message: String,
  },
}

impl ProgressEvent {
  pub fn processing(step: &str, message: impl Into<String>, progress: Option<u8>) -> Self {
    Self::Processing {
      step: step.to_string(),
      message: message.into(),
      progress: progress.map(|p| p.min(100)),
    }
  }

  pub fn complete(step: &str, message: impl Into<String>, data: serde_json::Value) -> Self {
    Self::Complete {
      step: step.to_string(),
      message: message.into(),
      data,
    }
  }

  pub fn error(step: &str, message: impl Into<String>) -> Self {
    Self::Error {
      step: step.to_string(),
      message: message.into(),
    }
  }

  pub fn is_terminal(&self) -> bool {
    !matches!(self, Self::Processing { .. })
  }

  /// Render as a server-sent-event frame.
  pub fn to_sse(&self) -> String {
    let json = serde_json::to_string(self).unwrap_or_else(|e| {
      format!(r#"{{"status":"error","step":"encode","message":"{e}"}}"#)
    });
    format!("data: {json}\n\n")
  }
}

/// Receiver of progress events.
pub trait ProgressSink: Send + Sync {
  fn emit(&self, event: ProgressEvent);
}

/// Discards everything.
pub struct NullSink;

impl ProgressSink for NullSink {
  fn emit(&self, _event: ProgressEvent) {}
}

impl ProgressSink for mpsc::UnboundedSender<ProgressEvent> {
  fn emit(&self, event: ProgressEvent) {
    // Receiver gone means the caller stopped listening; keep working
    let _ = self.send(event);
  }
}

/// Percentage of `done` over `total`, clamped to 0..=100.
pub fn percent(done: usize, total: usize) -> u8 {
  if total == 0 {
    return 100;
  }
  ((done.min(total) * 100) / total) as u8
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_processing_serializes_tagged() {
    let ev = ProgressEvent::processing("children", "round 1", Some(20));
    let v = serde_json::to_value(&ev).unwrap();
    assert_eq!(
      v,
      json!({"status": "processing", "step": "children", "message": "round 1", "progress": 20})
    );
  }

  #[test]
  fn test_progress_omitted_when_none() {
    let ev = ProgressEvent::processing("cache", "checking", None);
    let v = serde_json::to_value(&ev).unwrap();
    assert!(v.get("progress").is_none());
  }

  #[test]
  fn test_sse_frame() {
    let ev = ProgressEvent::error("tree", "boom");
    assert_eq!(
      ev.to_sse(),
      "data: {\"status\":\"error\",\"step\":\"tree\",\"message\":\"boom\"}\n\n"
    );
    assert!(ev.is_terminal());
  }

  #[test]
  fn test_closed_channel_does_not_panic() {
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    tx.emit(ProgressEvent::processing("x", "y", None));
  }

  #[test]
  fn test_percent() {
    assert_eq!(percent(0, 4), 0);
    assert_eq!(percent(1, 4), 25);
    assert_eq!(percent(9, 4), 100);
    assert_eq!(percent(0, 0), 100);
  }
}
