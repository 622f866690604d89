//! Scripted in-memory issue tracker for engine tests.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::model::{IssueLink, IssueLite, IssueNode, Project};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::source::{ChildLink, IssueDataSource};

/// Number of calls made to each primitive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
  pub projects: usize,
  pub query_issues: usize,
  pub query_issues_lite: usize,
  pub children_of: usize,
  pub children_of_many: usize,
  pub details_of_many: usize,
  pub issues_by_keys: usize,
  pub parent_of_many: usize,
}

#[derive(Default)]
pub struct FakeSource {
  issues: BTreeMap<String, IssueNode>,
  /// (parent, child) in insertion order
  edges: Vec<(String, String)>,
  projects: Vec<Project>,
  endless_chain: Option<String>,
  endless_ancestry: Option<String>,
  child_counts: bool,
  latency: Option<Duration>,
  failures: Mutex<HashSet<String>>,
  calls: Mutex<CallCounts>,
  detail_requests: Mutex<Vec<Vec<String>>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FakeSource {
  pub fn new() -> Self {
    Self::default()
  }

  fn ensure(&mut self, key: &str) -> &mut IssueNode {
    self.issues.entry(key.to_string()).or_insert_with(|| IssueNode {
      issue_type: "Task".to_string(),
      summary: format!("Issue {key}"),
      ..IssueNode::new(key)
    })
  }

  pub fn with_project(mut self, key: &str, name: &str) -> Self {
    self.projects.push(Project {
      id: (self.projects.len() + 1).to_string(),
      key: key.to_string(),
      name: name.to_string(),
    });
    self
  }

  pub fn with_issue(mut self, key: &str, issue_type: &str, account: Option<&str>) -> Self {
    let issue = self.ensure(key);
    issue.issue_type = issue_type.to_string();
    issue.account = account.map(String::from);
    self
  }

  pub fn with_effort(
    mut self,
    key: &str,
    estimate: Option<f64>,
    spent: Option<f64>,
    remaining: Option<f64>,
  ) -> Self {
    let issue = self.ensure(key);
    issue.original_estimate = estimate;
    issue.time_spent = spent;
    issue.time_remaining = remaining;
    self
  }

  pub fn with_child(mut self, parent: &str, child: &str) -> Self {
    self.ensure(parent);
    self.ensure(child);
    self.edges.push((parent.to_string(), child.to_string()));
    self
  }

  pub fn with_link(mut self, from: &str, to: &str) -> Self {
    self.ensure(to);
    self.with_dangling_link(from, to)
  }

  /// Link to a key the tracker will not return.
  pub fn with_dangling_link(mut self, from: &str, to: &str) -> Self {
    self.ensure(from).links.push(IssueLink {
      linked_issue_key: to.to_string(),
    });
    self
  }

  /// `{prefix}-n` has the single child `{prefix}-(n+1)`, forever.
  pub fn with_endless_chain(mut self, prefix: &str) -> Self {
    self.endless_chain = Some(prefix.to_string());
    self
  }

  /// `{prefix}-n` has the parent `{prefix}-(n+1)`, forever.
  pub fn with_endless_ancestry(mut self, prefix: &str) -> Self {
    self.endless_ancestry = Some(prefix.to_string());
    self
  }

  /// Report exact child counts on children edges.
  pub fn reporting_child_counts(mut self) -> Self {
    self.child_counts = true;
    self
  }

  /// Delay every children request.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.latency = Some(latency);
    self
  }

  pub fn failing(self, primitive: &str) -> Self {
    lock(&self.failures).insert(primitive.to_string());
    self
  }

  pub fn recover(&self, primitive: &str) {
    lock(&self.failures).remove(primitive);
  }

  pub fn calls(&self) -> CallCounts {
    *lock(&self.calls)
  }

  /// Keys passed to each `details_of_many` call.
  pub fn detail_requests(&self) -> Vec<Vec<String>> {
    lock(&self.detail_requests).clone()
  }

  fn record(&self, primitive: &str, bump: impl FnOnce(&mut CallCounts)) -> Result<()> {
    bump(&mut *lock(&self.calls));
    if lock(&self.failures).contains(primitive) {
      return Err(eyre!("injected failure in {primitive}"));
    }
    Ok(())
  }

  fn generated(prefix: &Option<String>, key: &str) -> Option<(String, u64)> {
    let prefix = prefix.as_deref()?;
    let n = key.strip_prefix(prefix)?.strip_prefix('-')?.parse().ok()?;
    Some((prefix.to_string(), n))
  }

  fn issue(&self, key: &str) -> Option<IssueNode> {
    if let Some(issue) = self.issues.get(key) {
      return Some(issue.clone());
    }
    let generated = Self::generated(&self.endless_chain, key)
      .or_else(|| Self::generated(&self.endless_ancestry, key));
    generated.map(|_| IssueNode {
      issue_type: "Task".to_string(),
      ..IssueNode::new(key)
    })
  }

  fn children(&self, key: &str) -> Vec<String> {
    if let Some((prefix, n)) = Self::generated(&self.endless_chain, key) {
      return vec![format!("{prefix}-{}", n + 1)];
    }
    self
      .edges
      .iter()
      .filter(|(p, _)| p == key)
      .map(|(_, c)| c.clone())
      .collect()
  }

  fn parent(&self, key: &str) -> Option<String> {
    if let Some((prefix, n)) = Self::generated(&self.endless_ancestry, key) {
      return Some(format!("{prefix}-{}", n + 1));
    }
    self
      .edges
      .iter()
      .find(|(_, c)| c == key)
      .map(|(p, _)| p.clone())
  }

  fn lookup(&self, keys: &[String]) -> Vec<IssueNode> {
    keys.iter().filter_map(|k| self.issue(k)).collect()
  }
}

#[async_trait]
impl IssueDataSource for FakeSource {
  async fn projects(&self) -> Result<Vec<Project>> {
    self.record("projects", |c| c.projects += 1)?;
    Ok(self.projects.clone())
  }

  async fn query_issues(&self, _query: &str) -> Result<Vec<IssueNode>> {
    self.record("query_issues", |c| c.query_issues += 1)?;
    Ok(self.issues.values().cloned().collect())
  }

  async fn query_issues_lite(&self, query: &str) -> Result<Vec<IssueLite>> {
    self.record("query_issues_lite", |c| c.query_issues_lite += 1)?;
    let mut parts = query.splitn(3, ':').skip(1);
    let (Some(project), Some(issue_type)) = (parts.next(), parts.next()) else {
      return Err(eyre!("unexpected query {query}"));
    };
    let prefix = format!("{project}-");

    Ok(
      self
        .issues
        .values()
        .filter(|i| i.key.starts_with(&prefix) && i.is_workstream(issue_type))
        .map(|i| IssueLite {
          key: i.key.clone(),
          summary: i.summary.clone(),
          issue_type: i.issue_type.clone(),
          status: i.status.clone(),
          account: i.account.clone(),
        })
        .collect(),
    )
  }

  fn workstream_query(&self, project_key: &str, workstream_type: &str) -> String {
    format!("ws:{project_key}:{workstream_type}")
  }

  async fn children_of(&self, key: &str) -> Result<Vec<IssueNode>> {
    self.record("children_of", |c| c.children_of += 1)?;
    Ok(self.lookup(&self.children(key)))
  }

  async fn children_of_many(&self, keys: &[String]) -> Result<Vec<ChildLink>> {
    self.record("children_of_many", |c| c.children_of_many += 1)?;
    if let Some(latency) = self.latency {
      tokio::time::sleep(latency).await;
    }

    let mut links = Vec::new();
    for parent in keys {
      for child in self.children(parent) {
        let mut link = ChildLink::new(parent.clone(), child.clone());
        if self.child_counts {
          link = link.with_child_count(self.children(&child).len());
        }
        links.push(link);
      }
    }
    Ok(links)
  }

  async fn details_of_many(&self, keys: &[String], _fields: &[&str]) -> Result<Vec<IssueNode>> {
    self.record("details_of_many", |c| c.details_of_many += 1)?;
    lock(&self.detail_requests).push(keys.to_vec());
    Ok(self.lookup(keys))
  }

  async fn issues_by_keys(&self, keys: &[String]) -> Result<Vec<IssueNode>> {
    self.record("issues_by_keys", |c| c.issues_by_keys += 1)?;
    Ok(self.lookup(keys))
  }

  async fn parent_of_many(&self, keys: &[String]) -> Result<HashMap<String, Option<String>>> {
    self.record("parent_of_many", |c| c.parent_of_many += 1)?;
    Ok(
      keys
        .iter()
        .filter(|k| self.issue(k).is_some())
        .map(|k| (k.clone(), self.parent(k)))
        .collect(),
    )
  }
}

/// Keeps every event in memory.
#[derive(Default)]
pub struct RecordingSink {
  events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<ProgressEvent> {
    lock(&self.events).clone()
  }

  pub fn last(&self) -> Option<ProgressEvent> {
    self.events().pop()
  }
}

impl ProgressSink for RecordingSink {
  fn emit(&self, event: ProgressEvent) {
    lock(&self.events).push(event);
  }
}
