//! Hierarchy retrieval, roll-up and orphan detection over an
//! [`IssueDataSource`](crate::source::IssueDataSource).

pub mod aggregate;
pub mod mismatch;
pub mod orphans;
pub mod tree;

use chrono::Duration;

/// Knobs shared by the tree builder, the orphan detector and the caches.
#[derive(Debug, Clone)]
pub struct EngineSettings {
  /// Issue type name that marks a workstream.
  pub workstream_type: String,
  pub cache_ttl: Duration,
  pub max_cache_entries: usize,
  /// Upper bound on batched levels in one traversal.
  pub max_rounds: usize,
  /// Deadline for building every workstream of a project.
  pub build_all_timeout: std::time::Duration,
}

impl Default for EngineSettings {
  fn default() -> Self {
    Self {
      workstream_type: "Workstream".to_string(),
      cache_ttl: Duration::days(7),
      max_cache_entries: 500,
      max_rounds: 10,
      build_all_timeout: std::time::Duration::from_secs(300),
    }
  }
}
