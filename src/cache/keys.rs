//! Cache keys for query-shaped entries.

use sha2::{Digest, Sha256};

/// Keys for caches that store query results rather than single issues.
#[derive(Clone, Debug)]
pub enum QueryKey<'a> {
  /// Every project visible to the account
  Projects,
  /// One project's record and workstream listing
  Project { key: &'a str },
  /// Free-form report query
  Report { jql: &'a str },
}

impl QueryKey<'_> {
  pub fn cache_key(&self) -> String {
    match self {
      Self::Projects => "projects".to_string(),
      Self::Project { key } => format!("project:{key}"),
      Self::Report { jql } => {
        // SHA256 keeps long JQL strings to a fixed-length key
        let mut hasher = Sha256::new();
        hasher.update(format!("report:{}", normalize_jql(jql)).as_bytes());
        format!("report:{}", hex::encode(hasher.finalize()))
      }
    }
  }

  pub fn description(&self) -> String {
    match self {
      Self::Projects => "all projects".to_string(),
      Self::Project { key } => format!("project {key}"),
      Self::Report { jql } => format!("report: {jql}"),
    }
  }
}

/// Normalize JQL for consistent hashing.
/// Trims whitespace, collapses runs of spaces and lowercases.
fn normalize_jql(jql: &str) -> String {
  jql
    .split_whitespace()
    .collect::<Vec<_>>()
    .join(" ")
    .to_lowercase()
}
