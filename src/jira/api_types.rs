//! Serde-deserializable types matching Jira API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use serde::Deserialize;
use std::collections::HashMap;

use crate::model::{IssueLink, IssueLite, IssueNode, Project};

// ============================================================================
// Common nested field types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiStatus {
  pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiIssueType {
  pub name: String,
  #[serde(default)]
  pub subtask: bool,
}

#[derive(Debug, Deserialize)]
pub struct ApiIssueRef {
  pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiIssueLink {
  #[serde(rename = "inwardIssue")]
  pub inward_issue: Option<ApiIssueRef>,
  #[serde(rename = "outwardIssue")]
  pub outward_issue: Option<ApiIssueRef>,
}

// ============================================================================
// Issue fields - shared by every search
// ============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct ApiIssueFields {
  #[serde(default)]
  pub summary: String,
  pub status: Option<ApiStatus>,
  #[serde(rename = "issuetype")]
  pub issue_type: Option<ApiIssueType>,
  pub parent: Option<ApiIssueRef>,
  #[serde(default)]
  pub subtasks: Vec<ApiIssueRef>,
  #[serde(rename = "issuelinks", default)]
  pub issue_links: Vec<ApiIssueLink>,
  /// Seconds
  #[serde(rename = "timeoriginalestimate")]
  pub time_original_estimate: Option<i64>,
  /// Seconds
  #[serde(rename = "timespent")]
  pub time_spent: Option<i64>,
  /// Seconds
  #[serde(rename = "timeestimate")]
  pub time_estimate: Option<i64>,
  // Catch-all for custom fields (like the account)
  #[serde(flatten)]
  pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiIssue {
  pub key: String,
  #[serde(default)]
  pub fields: ApiIssueFields,
}

// ============================================================================
// Search endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiSearchResponse {
  #[serde(default)]
  pub issues: Vec<ApiIssue>,
  #[serde(rename = "startAt", default)]
  pub start_at: u64,
  #[serde(rename = "maxResults", default)]
  pub max_results: u64,
  #[serde(default)]
  pub total: u64,
}

// ============================================================================
// Project endpoint response
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiProject {
  pub id: String,
  pub key: String,
  pub name: String,
}

impl From<ApiProject> for Project {
  fn from(p: ApiProject) -> Self {
    Project {
      id: p.id,
      key: p.key,
      name: p.name,
    }
  }
}

// ============================================================================
// Conversions to domain types
// ============================================================================

/// How tracker fields map onto domain values.
#[derive(Debug, Clone)]
pub struct FieldMapping {
  pub account_field: Option<String>,
  pub seconds_per_day: f64,
}

impl FieldMapping {
  fn account(&self, fields: &ApiIssueFields) -> Option<String> {
    let field = self.account_field.as_deref()?;
    extract_account_value(fields.extra.get(field))
  }

  fn days(&self, seconds: Option<i64>) -> Option<f64> {
    seconds.map(|s| s as f64 / self.seconds_per_day)
  }
}

impl ApiIssue {
  pub fn parent_key(&self) -> Option<&str> {
    self.fields.parent.as_ref().map(|p| p.key.as_str())
  }

  /// Sub-tasks cannot have children in Jira.
  pub fn is_subtask(&self) -> bool {
    self
      .fields
      .issue_type
      .as_ref()
      .map(|t| t.subtask)
      .unwrap_or(false)
  }

  pub fn into_lite(self, mapping: &FieldMapping) -> IssueLite {
    let account = mapping.account(&self.fields);
    let f = self.fields;
    IssueLite {
      key: self.key,
      summary: f.summary,
      issue_type: f.issue_type.map(|t| t.name).unwrap_or_default(),
      status: f.status.map(|s| s.name).unwrap_or_default(),
      account,
    }
  }

  pub fn into_node(self, mapping: &FieldMapping) -> IssueNode {
    let account = mapping.account(&self.fields);
    let f = self.fields;
    IssueNode {
      summary: f.summary,
      issue_type: f.issue_type.map(|t| t.name).unwrap_or_default(),
      status: f.status.map(|s| s.name).unwrap_or_default(),
      account,
      child_count: f.subtasks.len(),
      original_estimate: mapping.days(f.time_original_estimate),
      time_spent: mapping.days(f.time_spent),
      time_remaining: mapping.days(f.time_estimate),
      links: f
        .issue_links
        .into_iter()
        .filter_map(|l| l.outward_issue.or(l.inward_issue))
        .map(|r| IssueLink {
          linked_issue_key: r.key,
        })
        .collect(),
      ..IssueNode::new(self.key)
    }
  }
}

// ============================================================================
// Helpers
// ============================================================================

/// Extract the account from a custom field.
/// Account fields can be:
/// - A string (account name)
/// - An object with "value" (select list) or "name" (Tempo account)
/// - null
fn extract_account_value(value: Option<&serde_json::Value>) -> Option<String> {
  let value = value?;

  if let Some(s) = value.as_str() {
    return Some(s.to_string());
  }

  if let Some(obj) = value.as_object() {
    for field in ["value", "name"] {
      if let Some(v) = obj.get(field).and_then(|v| v.as_str()) {
        return Some(v.to_string());
      }
    }
  }

  None
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn mapping() -> FieldMapping {
    FieldMapping {
      account_field: Some("customfield_10100".to_string()),
      seconds_per_day: 8.0 * 3600.0,
    }
  }

  fn parse(value: serde_json::Value) -> ApiIssue {
    serde_json::from_value(value).unwrap()
  }

  #[test]
  fn test_into_node_converts_seconds_to_days() {
    let issue = parse(json!({
      "key": "PAY-7",
      "fields": {
        "summary": "Settle invoices",
        "status": {"name": "In Progress"},
        "issuetype": {"name": "Story", "subtask": false},
        "timeoriginalestimate": 57600,
        "timespent": 14400,
        "timeestimate": null,
        "customfield_10100": {"id": 3, "value": "Foo (Chargeable)"},
        "issuelinks": [
          {"type": {"name": "Relates"}, "outwardIssue": {"key": "OPS-1"}},
          {"type": {"name": "Blocks"}, "inwardIssue": {"key": "OPS-2"}}
        ]
      }
    }));

    let node = issue.into_node(&mapping());

    assert_eq!(node.key, "PAY-7");
    assert_eq!(node.issue_type, "Story");
    assert_eq!(node.original_estimate, Some(2.0));
    assert_eq!(node.time_spent, Some(0.5));
    assert_eq!(node.time_remaining, None);
    assert_eq!(node.account.as_deref(), Some("Foo (Chargeable)"));
    let linked: Vec<&str> = node
      .links
      .iter()
      .map(|l| l.linked_issue_key.as_str())
      .collect();
    assert_eq!(linked, vec!["OPS-1", "OPS-2"]);
  }

  #[test]
  fn test_missing_fields_default() {
    let node = parse(json!({"key": "A-1"})).into_node(&mapping());
    assert_eq!(node.summary, "");
    assert_eq!(node.account, None);
    assert!(node.links.is_empty());
  }

  #[test]
  fn test_subtask_and_parent() {
    let issue = parse(json!({
      "key": "A-2",
      "fields": {"issuetype": {"name": "Sub-task", "subtask": true}, "parent": {"key": "A-1"}}
    }));
    assert!(issue.is_subtask());
    assert_eq!(issue.parent_key(), Some("A-1"));
  }

  #[test]
  fn test_extract_account_value() {
    assert_eq!(
      extract_account_value(Some(&json!("Plain"))),
      Some("Plain".to_string())
    );
    assert_eq!(
      extract_account_value(Some(&json!({"name": "Tempo"}))),
      Some("Tempo".to_string())
    );
    assert_eq!(extract_account_value(Some(&json!(null))), None);
    assert_eq!(extract_account_value(None), None);
  }

  #[test]
  fn test_lite_without_account_field() {
    let m = FieldMapping {
      account_field: None,
      seconds_per_day: 28800.0,
    };
    let lite = parse(json!({
      "key": "WS-1",
      "fields": {"summary": "Billing", "issuetype": {"name": "Workstream"}}
    }))
    .into_lite(&m);
    assert_eq!(lite.issue_type, "Workstream");
    assert_eq!(lite.account, None);
  }
}
