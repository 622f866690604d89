//! The issue-tracker seam consumed by the engine.

use async_trait::async_trait;
use color_eyre::Result;
use std::collections::HashMap;

use crate::model::{IssueLite, IssueNode, Project};

/// One parent/child edge returned by a batched children lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildLink {
  pub parent_key: String,
  pub child_key: String,
  /// Known number of children of `child_key`, when the tracker can tell
  /// without another request. `Some(0)` lets the builder skip probing a leaf.
  pub child_count: Option<usize>,
}

impl ChildLink {
  pub fn new(parent_key: impl Into<String>, child_key: impl Into<String>) -> Self {
    Self {
      parent_key: parent_key.into(),
      child_key: child_key.into(),
      child_count: None,
    }
  }

  pub fn with_child_count(mut self, count: usize) -> Self {
    self.child_count = Some(count);
    self
  }
}

/// Fields requested when hydrating tree nodes.
pub const DETAIL_FIELDS: &[&str] = &[
  "summary",
  "issuetype",
  "status",
  "account",
  "timeoriginalestimate",
  "timespent",
  "timeestimate",
  "issuelinks",
];

/// Access to the external issue tracker.
///
/// Every `*_many` call is a single logical request regardless of how many
/// keys it carries. Returned nodes never have children attached.
#[async_trait]
pub trait IssueDataSource: Send + Sync {
  async fn projects(&self) -> Result<Vec<Project>>;

  /// Full query, used for non-hierarchical reports.
  async fn query_issues(&self, query: &str) -> Result<Vec<IssueNode>>;

  /// Minimal-field query, used for workstream listings.
  async fn query_issues_lite(&self, query: &str) -> Result<Vec<IssueLite>>;

  /// Query selecting the workstreams of a project, fed to `query_issues_lite`.
  fn workstream_query(&self, project_key: &str, workstream_type: &str) -> String;

  /// Immediate children of one issue.
  async fn children_of(&self, key: &str) -> Result<Vec<IssueNode>>;

  /// Immediate children of every key in `keys`, as parent/child edges.
  async fn children_of_many(&self, keys: &[String]) -> Result<Vec<ChildLink>>;

  /// Hydrate `fields` for every key in `keys`. Unknown keys are left out.
  async fn details_of_many(&self, keys: &[String], fields: &[&str]) -> Result<Vec<IssueNode>>;

  /// Bulk fetch with all fields.
  async fn issues_by_keys(&self, keys: &[String]) -> Result<Vec<IssueNode>>;

  /// Immediate parent of every key; `None` for issues without one.
  async fn parent_of_many(&self, keys: &[String]) -> Result<HashMap<String, Option<String>>>;
}
