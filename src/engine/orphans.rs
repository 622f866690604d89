//! Linked-issue ancestor reconstruction.
//!
//! Starting from every issue a workstream tree links to, parents are looked
//! up one batched level at a time until every chain ends or the round limit
//! is hit. Parent references are keys into the report, never ownership.

use color_eyre::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::model::IssueNode;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::source::IssueDataSource;

use super::tree::TreeBuilder;

/// An issue found while walking up from a linked issue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainedIssue {
  pub issue: IssueNode,
  /// Key of the parent, when one was found and fetched.
  pub parent: Option<String>,
  /// 0 for linked issues, n for their n-th ancestors.
  pub level: usize,
  /// False when the tracker could not return the issue itself.
  pub resolved: bool,
}

/// Result of [`OrphanDetector::detect`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanReport {
  pub workstream: IssueNode,
  pub linked_issues_with_ancestors: Vec<ChainedIssue>,
  pub depth_limited: bool,
  #[serde(skip)]
  index: HashMap<String, usize>,
}

impl OrphanReport {
  fn new(workstream: IssueNode) -> Self {
    Self {
      workstream,
      linked_issues_with_ancestors: Vec::new(),
      depth_limited: false,
      index: HashMap::new(),
    }
  }

  fn push(&mut self, issue: IssueNode, level: usize, resolved: bool) {
    if self.index.contains_key(&issue.key) {
      return;
    }
    self
      .index
      .insert(issue.key.clone(), self.linked_issues_with_ancestors.len());
    self.linked_issues_with_ancestors.push(ChainedIssue {
      issue: issue.detached(),
      parent: None,
      level,
      resolved,
    });
  }

  fn set_parent(&mut self, key: &str, parent: &str) {
    if let Some(&i) = self.index.get(key) {
      self.linked_issues_with_ancestors[i].parent = Some(parent.to_string());
    }
  }

  pub fn get(&self, key: &str) -> Option<&ChainedIssue> {
    self
      .index
      .get(key)
      .map(|&i| &self.linked_issues_with_ancestors[i])
  }

  /// The issues the workstream links to directly.
  pub fn linked(&self) -> impl Iterator<Item = &ChainedIssue> {
    self
      .linked_issues_with_ancestors
      .iter()
      .filter(|c| c.level == 0)
  }

  /// Ancestors of `key`, nearest first. Stops on a repeated key.
  pub fn ancestors(&self, key: &str) -> Vec<&ChainedIssue> {
    let mut out = Vec::new();
    let mut visited = HashSet::from([key.to_string()]);
    let mut current = self.get(key).and_then(|c| c.parent.as_deref());

    while let Some(parent_key) = current {
      if !visited.insert(parent_key.to_string()) {
        break;
      }
      let Some(parent) = self.get(parent_key) else {
        break;
      };
      out.push(parent);
      current = parent.parent.as_deref();
    }

    out
  }

  /// Nearest ancestor of `key` whose type is `workstream_type`.
  pub fn owning_workstream(&self, key: &str, workstream_type: &str) -> Option<&ChainedIssue> {
    self
      .ancestors(key)
      .into_iter()
      .find(|c| c.issue.is_workstream(workstream_type))
  }
}

/// Every linked key referenced anywhere in `tree`, deduplicated in walk order.
pub fn collect_link_keys(tree: &IssueNode) -> Vec<String> {
  fn walk(node: &IssueNode, seen: &mut HashSet<String>, out: &mut Vec<String>) {
    for link in &node.links {
      if seen.insert(link.linked_issue_key.clone()) {
        out.push(link.linked_issue_key.clone());
      }
    }
    for child in &node.children {
      walk(child, seen, out);
    }
  }

  let mut seen = HashSet::new();
  let mut out = Vec::new();
  walk(tree, &mut seen, &mut out);
  out
}

pub struct OrphanDetector {
  source: Arc<dyn IssueDataSource>,
  trees: Arc<TreeBuilder>,
  max_rounds: usize,
}

impl OrphanDetector {
  pub fn new(source: Arc<dyn IssueDataSource>, trees: Arc<TreeBuilder>, max_rounds: usize) -> Self {
    Self {
      source,
      trees,
      max_rounds: max_rounds.max(1),
    }
  }

  /// Build the workstream tree, fetch every issue it links to, then walk
  /// their parent chains.
  ///
  /// Batch failures end the affected chains with no parent instead of
  /// failing the scan. Only a failure to build the workstream tree itself
  /// is returned as an error.
  pub async fn detect(&self, workstream_key: &str, sink: &dyn ProgressSink) -> Result<OrphanReport> {
    let built = self.trees.build(workstream_key, sink).await?;
    let link_keys = collect_link_keys(&built.tree);
    let mut report = OrphanReport::new(built.tree);

    if link_keys.is_empty() {
      debug!(workstream = workstream_key, "no linked issues");
      return Ok(report);
    }

    sink.emit(ProgressEvent::processing(
      "linked",
      format!("Fetching {} linked issues", link_keys.len()),
      Some(40),
    ));

    let mut current = match self.source.issues_by_keys(&link_keys).await {
      Ok(issues) => {
        let returned: Vec<String> = issues.iter().map(|i| i.key.clone()).collect();
        for issue in issues {
          report.push(issue, 0, true);
        }
        returned
      }
      Err(err) => {
        warn!(workstream = workstream_key, error = %err, "linked issue lookup failed");
        Vec::new()
      }
    };

    // References the tracker could not return stay visible as placeholders
    for key in &link_keys {
      if report.get(key).is_none() {
        report.push(IssueNode::new(key.clone()), 0, false);
      }
    }

    let mut rounds = 0;
    while !current.is_empty() {
      if rounds >= self.max_rounds {
        warn!(
          workstream = workstream_key,
          rounds,
          pending = current.len(),
          "round limit reached while walking ancestors"
        );
        report.depth_limited = true;
        break;
      }
      rounds += 1;

      sink.emit(ProgressEvent::processing(
        "ancestors",
        format!("Resolving parents of {} issues (level {rounds})", current.len()),
        Some((40 + 5 * rounds).min(95) as u8),
      ));

      current = self.next_level(&mut report, &current, rounds).await;
    }

    info!(
      workstream = workstream_key,
      linked = link_keys.len(),
      chained = report.linked_issues_with_ancestors.len(),
      rounds,
      "orphan scan finished"
    );

    Ok(report)
  }

  /// Resolve parents for `level_keys`, record them, and return the keys of
  /// newly fetched parents.
  async fn next_level(&self, report: &mut OrphanReport, level_keys: &[String], level: usize) -> Vec<String> {
    let parents = match self.source.parent_of_many(level_keys).await {
      Ok(p) => p,
      Err(err) => {
        warn!(level, error = %err, "parent lookup failed, ending chains");
        return Vec::new();
      }
    };

    let edges: Vec<(&String, &String)> = level_keys
      .iter()
      .filter_map(|k| parents.get(k).and_then(Option::as_ref).map(|p| (k, p)))
      .collect();

    let mut to_fetch = Vec::new();
    for (_, parent) in &edges {
      if report.get(parent).is_none() && !to_fetch.contains(*parent) {
        to_fetch.push((*parent).clone());
      }
    }

    let mut fetched = Vec::new();
    if !to_fetch.is_empty() {
      match self.source.issues_by_keys(&to_fetch).await {
        Ok(issues) => {
          for issue in issues {
            fetched.push(issue.key.clone());
            report.push(issue, level, true);
          }
        }
        Err(err) => {
          warn!(level, error = %err, "parent fetch failed, ending chains");
          return Vec::new();
        }
      }
    }

    for (child, parent) in edges {
      if report.get(parent).is_some() {
        report.set_parent(child, parent);
      }
    }

    fetched
  }
}
