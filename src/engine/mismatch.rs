//! Billing-account consistency checks.
//!
//! Each workstream-typed node sets the expected account for everything
//! beneath it until a nested workstream overrides it. A non-workstream issue
//! whose own account is set (and not "None") and differs from a set expected
//! account is a mismatch. Each issue is reported at most once.

use serde::Serialize;
use std::collections::HashSet;

use crate::model::IssueNode;

use super::orphans::OrphanReport;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountMismatch {
  pub key: String,
  pub summary: String,
  pub account: String,
  pub expected_account: String,
  /// Workstream that set the expected account.
  pub workstream_key: String,
  /// Tree node that links to the issue, for mismatches found through links.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub linked_from: Option<String>,
}

/// Expected account in effect at some point of the walk.
#[derive(Clone, Copy)]
struct Scope<'a> {
  workstream_key: &'a str,
  account: Option<&'a str>,
}

struct Checker<'a> {
  workstream_type: &'a str,
  reported: HashSet<String>,
  out: Vec<AccountMismatch>,
}

impl<'a> Checker<'a> {
  fn new(workstream_type: &'a str) -> Self {
    Self {
      workstream_type,
      reported: HashSet::new(),
      out: Vec::new(),
    }
  }

  fn check(&mut self, issue: &IssueNode, scope: Option<Scope<'_>>, linked_from: Option<&str>) {
    if issue.is_workstream(self.workstream_type) || self.reported.contains(&issue.key) {
      return;
    }
    let Some(scope) = scope else { return };
    let (Some(actual), Some(expected)) = (issue.effective_account(), scope.account) else {
      return;
    };
    if actual == expected {
      return;
    }

    self.reported.insert(issue.key.clone());
    self.out.push(AccountMismatch {
      key: issue.key.clone(),
      summary: issue.summary.clone(),
      account: actual.to_string(),
      expected_account: expected.to_string(),
      workstream_key: scope.workstream_key.to_string(),
      linked_from: linked_from.map(String::from),
    });
  }

  fn scope_for<'n>(&self, node: &'n IssueNode, inherited: Option<Scope<'n>>) -> Option<Scope<'n>> {
    if node.is_workstream(self.workstream_type) {
      Some(Scope {
        workstream_key: &node.key,
        account: node.effective_account(),
      })
    } else {
      inherited
    }
  }

  fn walk_tree(&mut self, node: &IssueNode, inherited: Option<Scope<'_>>) {
    self.check(node, inherited, None);
    let scope = self.scope_for(node, inherited);
    for child in &node.children {
      self.walk_tree(child, scope);
    }
  }

  fn walk_links(&mut self, node: &IssueNode, inherited: Option<Scope<'_>>, report: &OrphanReport) {
    let scope = self.scope_for(node, inherited);
    for link in &node.links {
      if let Some(linked) = report.get(&link.linked_issue_key) {
        if linked.resolved {
          self.check(&linked.issue, scope, Some(&node.key));
        }
      }
    }
    for child in &node.children {
      self.walk_links(child, scope, report);
    }
  }
}

/// Mismatches among the descendants of the workstreams in `tree`.
pub fn find_account_mismatches(tree: &IssueNode, workstream_type: &str) -> Vec<AccountMismatch> {
  let mut checker = Checker::new(workstream_type);
  checker.walk_tree(tree, None);
  checker.out
}

/// Tree mismatches, then linked issues checked against the account in
/// effect where they are referenced.
pub fn find_report_mismatches(report: &OrphanReport, workstream_type: &str) -> Vec<AccountMismatch> {
  let mut checker = Checker::new(workstream_type);
  checker.walk_tree(&report.workstream, None);
  checker.walk_links(&report.workstream, None, report);
  checker.out
}

#[cfg(test)]
mod tests {
  use super::*;

  fn issue(key: &str, issue_type: &str, account: Option<&str>) -> IssueNode {
    IssueNode {
      issue_type: issue_type.to_string(),
      account: account.map(String::from),
      ..IssueNode::new(key)
    }
  }

  #[test]
  fn test_differing_account_reported_once() {
    let tree = issue("W", "Workstream", Some("Foo (Chargeable)")).with_children(vec![issue(
      "L",
      "Task",
      Some("Foo"),
    )]);

    let found = find_account_mismatches(&tree, "Workstream");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, "L");
    assert_eq!(found[0].expected_account, "Foo (Chargeable)");
    assert_eq!(found[0].workstream_key, "W");
  }

  #[test]
  fn test_none_or_matching_account_not_reported() {
    let tree = issue("W", "Workstream", Some("Foo (Chargeable)")).with_children(vec![
      issue("A", "Task", Some("None")),
      issue("B", "Task", Some("Foo (Chargeable)")),
      issue("C", "Task", None),
    ]);
    assert!(find_account_mismatches(&tree, "Workstream").is_empty());
  }

  #[test]
  fn test_workstream_without_account_expects_nothing() {
    let tree = issue("W", "Workstream", Some("None"))
      .with_children(vec![issue("A", "Task", Some("Anything"))]);
    assert!(find_account_mismatches(&tree, "Workstream").is_empty());
  }

  #[test]
  fn test_nested_workstream_overrides_expected() {
    let tree = issue("W", "Workstream", Some("Foo")).with_children(vec![issue(
      "W2",
      "Workstream",
      Some("Bar"),
    )
    .with_children(vec![
      issue("A", "Task", Some("Bar")),
      issue("B", "Task", Some("Foo")),
    ])]);

    let found = find_account_mismatches(&tree, "Workstream");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, "B");
    assert_eq!(found[0].workstream_key, "W2");
  }

  #[test]
  fn test_nested_workstream_itself_not_reported() {
    let tree = issue("W", "Workstream", Some("Foo"))
      .with_children(vec![issue("W2", "Workstream", Some("Bar"))]);
    assert!(find_account_mismatches(&tree, "Workstream").is_empty());
  }

  #[test]
  fn test_issue_without_workstream_ancestor_ignored() {
    let tree = issue("E", "Epic", Some("Foo")).with_children(vec![issue("A", "Task", Some("Bar"))]);
    assert!(find_account_mismatches(&tree, "Workstream").is_empty());
  }
}
