//! Domain records shared by the engine, the data source and the CLI.
//!
//! Effort figures are fractional days. `None` means the tracker has no value
//! for the field, which is different from an explicit zero.

use serde::{Deserialize, Serialize};

/// Tracker project metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
  pub id: String,
  pub key: String,
  pub name: String,
}

/// A cross-reference from one issue to another. Not ownership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLink {
  pub linked_issue_key: String,
}

/// Minimal issue representation used for workstream listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLite {
  pub key: String,
  pub summary: String,
  #[serde(rename = "type")]
  pub issue_type: String,
  pub status: String,
  pub account: Option<String>,
}

/// A hydrated issue and, once a tree is assembled, its owned children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueNode {
  pub key: String,
  pub summary: String,
  #[serde(rename = "type")]
  pub issue_type: String,
  pub status: String,
  pub account: Option<String>,
  pub child_count: usize,
  pub original_estimate: Option<f64>,
  pub time_spent: Option<f64>,
  pub time_remaining: Option<f64>,
  #[serde(default)]
  pub children: Vec<IssueNode>,
  #[serde(default)]
  pub links: Vec<IssueLink>,
  /// Roll-up computed on demand, never part of cached state.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub aggregated: Option<Rollup>,
}

impl IssueNode {
  /// A node with only a key, every other field empty.
  pub fn new(key: impl Into<String>) -> Self {
    Self {
      key: key.into(),
      summary: String::new(),
      issue_type: String::new(),
      status: String::new(),
      account: None,
      child_count: 0,
      original_estimate: None,
      time_spent: None,
      time_remaining: None,
      children: Vec::new(),
      links: Vec::new(),
      aggregated: None,
    }
  }

  /// Copy of this node's own fields with no children attached.
  pub fn detached(&self) -> Self {
    Self {
      children: Vec::new(),
      child_count: 0,
      aggregated: None,
      ..self.clone()
    }
  }

  /// Attach children, keeping `child_count` in step.
  pub fn with_children(mut self, children: Vec<IssueNode>) -> Self {
    self.child_count = children.len();
    self.children = children;
    self
  }

  pub fn is_workstream(&self, workstream_type: &str) -> bool {
    self.issue_type.eq_ignore_ascii_case(workstream_type)
  }

  /// Account value when it is set to something other than the "None" marker.
  pub fn effective_account(&self) -> Option<&str> {
    effective_account(self.account.as_deref())
  }

  /// Number of nodes in this subtree, the node itself included.
  pub fn node_count(&self) -> usize {
    1 + self.children.iter().map(IssueNode::node_count).sum::<usize>()
  }

  /// Number of levels below this node (0 for a leaf).
  pub fn depth(&self) -> usize {
    self
      .children
      .iter()
      .map(|c| c.depth() + 1)
      .max()
      .unwrap_or(0)
  }

  /// Depth-first search for a node by key.
  #[cfg(test)]
  pub fn find(&self, key: &str) -> Option<&IssueNode> {
    if self.key == key {
      return Some(self);
    }
    self.children.iter().find_map(|c| c.find(key))
  }
}

impl From<IssueLite> for IssueNode {
  fn from(lite: IssueLite) -> Self {
    Self {
      summary: lite.summary,
      issue_type: lite.issue_type,
      status: lite.status,
      account: lite.account,
      ..IssueNode::new(lite.key)
    }
  }
}

/// Treat empty and literal "None" accounts as unset.
pub fn effective_account(account: Option<&str>) -> Option<&str> {
  account
    .map(str::trim)
    .filter(|a| !a.is_empty() && !a.eq_ignore_ascii_case("none"))
}

/// Sum of one effort field over a subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RolledField {
  pub total: f64,
  /// Whether any node in the subtree had a non-null value for the field.
  pub has_source: bool,
}

impl RolledField {
  pub fn own(value: Option<f64>) -> Self {
    Self {
      total: value.unwrap_or(0.0),
      has_source: value.is_some(),
    }
  }

  pub fn add(self, other: RolledField) -> Self {
    Self {
      total: self.total + other.total,
      has_source: self.has_source || other.has_source,
    }
  }

  /// `None` when nothing in the subtree reported a value.
  pub fn value(&self) -> Option<f64> {
    self.has_source.then_some(self.total)
  }
}

/// Aggregated effort for a node and all its descendants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollup {
  pub original_estimate: RolledField,
  pub time_spent: RolledField,
  pub time_remaining: RolledField,
}

/// Project metadata plus its top-level workstreams (shallow nodes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
  pub project: Project,
  pub issues: Vec<IssueNode>,
}
