//! Bottom-up effort roll-up.
//!
//! A node's aggregate is its own value (0 when unset) plus the aggregates of
//! its children. Own fields are never touched; results go into
//! [`IssueNode::aggregated`] on a copy, and the root's value is the roll-up
//! of the whole tree.

use crate::model::{IssueNode, Rollup, RolledField};

/// Copy of `node` with `aggregated` filled in on every node of the subtree.
pub fn annotate(node: &IssueNode) -> IssueNode {
  let children: Vec<IssueNode> = node.children.iter().map(annotate).collect();
  let rollup = children
    .iter()
    .filter_map(|c| c.aggregated)
    .fold(own(node), combine);

  let mut copy = node.detached().with_children(children);
  copy.aggregated = Some(rollup);
  copy
}

fn own(node: &IssueNode) -> Rollup {
  Rollup {
    original_estimate: RolledField::own(node.original_estimate),
    time_spent: RolledField::own(node.time_spent),
    time_remaining: RolledField::own(node.time_remaining),
  }
}

fn combine(acc: Rollup, child: Rollup) -> Rollup {
  Rollup {
    original_estimate: acc.original_estimate.add(child.original_estimate),
    time_spent: acc.time_spent.add(child.time_spent),
    time_remaining: acc.time_remaining.add(child.time_remaining),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn aggregate(node: &IssueNode) -> Rollup {
    annotate(node).aggregated.unwrap()
  }

  fn effort(key: &str, estimate: Option<f64>, spent: Option<f64>) -> IssueNode {
    IssueNode {
      original_estimate: estimate,
      time_spent: spent,
      ..IssueNode::new(key)
    }
  }

  #[test]
  fn test_root_plus_children() {
    let root = effort("R", Some(2.0), Some(1.0)).with_children(vec![
      effort("A", Some(3.0), Some(0.0)),
      effort("B", Some(0.0), Some(5.0)),
    ]);

    let rollup = aggregate(&root);
    assert_eq!(rollup.original_estimate.total, 5.0);
    assert_eq!(rollup.time_spent.total, 6.0);
    assert_eq!(rollup.time_remaining.value(), None);
  }

  #[test]
  fn test_leaf_equals_own_value() {
    let leaf = effort("L", Some(1.5), None);
    let rollup = aggregate(&leaf);
    assert_eq!(rollup.original_estimate.value(), Some(1.5));
    assert_eq!(rollup.time_spent.value(), None);
  }

  #[test]
  fn test_deep_sum_matches_descendant_total() {
    let tree = effort("R", Some(1.0), None).with_children(vec![
      effort("A", None, None).with_children(vec![
        effort("A1", Some(2.0), Some(1.0)),
        effort("A2", Some(0.5), None),
      ]),
      effort("B", Some(4.0), None),
    ]);

    assert_eq!(aggregate(&tree).original_estimate.total, 7.5);
    assert_eq!(aggregate(&tree).time_spent.total, 1.0);
  }

  #[test]
  fn test_annotate_keeps_own_fields() {
    let tree = effort("R", None, None).with_children(vec![effort("A", Some(3.0), None)]);
    let annotated = annotate(&tree);

    assert_eq!(annotated.original_estimate, None);
    assert_eq!(annotated.child_count, 1);
    let root_rollup = annotated.aggregated.unwrap();
    assert_eq!(root_rollup.original_estimate.value(), Some(3.0));
    let child_rollup = annotated.children[0].aggregated.unwrap();
    assert_eq!(child_rollup.original_estimate.value(), Some(3.0));
    assert!(tree.aggregated.is_none());
  }

  #[test]
  fn test_all_null_is_zero_without_source() {
    let tree = effort("R", None, None).with_children(vec![effort("A", None, None)]);
    let rollup = aggregate(&tree);
    assert_eq!(rollup.original_estimate.total, 0.0);
    assert!(!rollup.original_estimate.has_source);
  }
}
