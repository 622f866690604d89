//! Level-order, batched retrieval of an issue hierarchy.
//!
//! One `children_of_many` request per level turns a tree of N issues into
//! O(depth) requests. Field hydration is a single `details_of_many` request
//! for every key not already in the detail cache. The assembled tree is
//! cached under its root key.

use color_eyre::Result;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::CacheLayer;
use crate::error::EngineError;
use crate::model::IssueNode;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::source::{ChildLink, IssueDataSource, DETAIL_FIELDS};

/// How much of the hierarchy a cached tree holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Expansion {
  /// Every level was walked (up to the round limit).
  Full,
  /// Fallback result: the root and its immediate children only.
  Shallow,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedTree {
  pub root: IssueNode,
  pub expansion: Expansion,
  /// The build that produced `root` stopped at the round limit.
  pub depth_limited: bool,
}

/// Result of [`TreeBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuiltTree {
  pub tree: IssueNode,
  pub expansion: Expansion,
  pub from_cache: bool,
  /// Batched children requests issued for this build.
  pub rounds: usize,
  /// Traversal stopped at the round limit with keys still unexpanded.
  pub depth_limited: bool,
}

/// Parent/child edges discovered level by level.
#[derive(Debug, Default)]
struct Hierarchy {
  children: HashMap<String, Vec<String>>,
  /// Every key seen, root first, in discovery order.
  keys: Vec<String>,
  seen: HashSet<String>,
  rounds: usize,
  depth_limited: bool,
}

impl Hierarchy {
  fn new(root: &str) -> Self {
    let mut h = Self::default();
    h.keys.push(root.to_string());
    h.seen.insert(root.to_string());
    h
  }

  /// Record one level of edges and return the next frontier.
  ///
  /// A child already seen elsewhere in the hierarchy is a cycle in the
  /// tracker data; the edge is dropped so assembly stays acyclic.
  fn record(&mut self, links: Vec<ChildLink>) -> Vec<String> {
    let mut frontier = Vec::new();

    for link in links {
      if !self.seen.insert(link.child_key.clone()) {
        warn!(
          parent = %link.parent_key,
          child = %link.child_key,
          "issue already in hierarchy, ignoring edge"
        );
        continue;
      }

      self.keys.push(link.child_key.clone());
      self
        .children
        .entry(link.parent_key)
        .or_default()
        .push(link.child_key.clone());

      if link.child_count != Some(0) {
        frontier.push(link.child_key);
      }
    }

    frontier
  }
}

/// Builds and caches workstream trees.
pub struct TreeBuilder {
  source: Arc<dyn IssueDataSource>,
  trees: Arc<CacheLayer<CachedTree>>,
  details: Arc<CacheLayer<IssueNode>>,
  max_rounds: usize,
}

impl TreeBuilder {
  pub fn new(
    source: Arc<dyn IssueDataSource>,
    trees: Arc<CacheLayer<CachedTree>>,
    details: Arc<CacheLayer<IssueNode>>,
    max_rounds: usize,
  ) -> Self {
    Self {
      source,
      trees,
      details,
      max_rounds: max_rounds.max(1),
    }
  }

  /// Cached tree for `root_key`, whatever its expansion.
  pub fn cached(&self, root_key: &str) -> Option<CachedTree> {
    self.trees.get(root_key)
  }

  /// Build the full tree under `root_key`, serving a fully expanded cached
  /// tree when one is present.
  ///
  /// A failed batched children or details request falls back to a
  /// one-level tree. Only failures to fetch the root itself are returned as
  /// errors.
  pub async fn build(&self, root_key: &str, sink: &dyn ProgressSink) -> Result<BuiltTree> {
    sink.emit(ProgressEvent::processing(
      "cache",
      format!("Checking cache for {root_key}"),
      Some(0),
    ));

    match self.cached(root_key) {
      Some(cached) if cached.expansion == Expansion::Full => {
        debug!(root = root_key, "tree served from cache");
        return Ok(BuiltTree {
          tree: cached.root,
          expansion: Expansion::Full,
          from_cache: true,
          rounds: 0,
          depth_limited: cached.depth_limited,
        });
      }
      Some(_) => debug!(root = root_key, "cached tree is shallow, rebuilding"),
      None => {}
    }

    self.trees.cleanup();
    self.details.cleanup();

    let hierarchy = match self.collect_hierarchy(root_key, sink).await {
      Ok(h) => h,
      Err(err) => {
        warn!(root = root_key, error = %err, "batched children lookup failed, using one-level fallback");
        return self.fallback(root_key, sink).await;
      }
    };

    sink.emit(ProgressEvent::processing(
      "details",
      format!("Loading details for {} issues", hierarchy.keys.len()),
      Some(60),
    ));
    let details = match self.hydrate(&hierarchy.keys).await {
      Ok(d) => d,
      Err(err) => {
        warn!(root = root_key, error = %err, "batched details lookup failed, using one-level fallback");
        return self.fallback(root_key, sink).await;
      }
    };

    sink.emit(ProgressEvent::processing(
      "assemble",
      "Assembling tree",
      Some(90),
    ));
    let tree =
      assemble(root_key, &hierarchy, &details).ok_or_else(|| EngineError::issue_not_found(root_key))?;

    info!(
      root = root_key,
      nodes = tree.node_count(),
      depth = tree.depth(),
      rounds = hierarchy.rounds,
      "tree built"
    );

    self.trees.set(
      root_key,
      CachedTree {
        root: tree.clone(),
        expansion: Expansion::Full,
        depth_limited: hierarchy.depth_limited,
      },
    );

    Ok(BuiltTree {
      tree,
      expansion: Expansion::Full,
      from_cache: false,
      rounds: hierarchy.rounds,
      depth_limited: hierarchy.depth_limited,
    })
  }

  /// Walk the hierarchy one batched request per level.
  async fn collect_hierarchy(&self, root_key: &str, sink: &dyn ProgressSink) -> Result<Hierarchy> {
    let mut hierarchy = Hierarchy::new(root_key);
    let mut frontier = vec![root_key.to_string()];

    while !frontier.is_empty() {
      if hierarchy.rounds >= self.max_rounds {
        warn!(
          root = root_key,
          rounds = hierarchy.rounds,
          pending = frontier.len(),
          "round limit reached, returning partial tree"
        );
        hierarchy.depth_limited = true;
        sink.emit(ProgressEvent::processing(
          "depth-limit",
          format!(
            "Stopped after {} levels with {} issues unexpanded",
            hierarchy.rounds,
            frontier.len()
          ),
          None,
        ));
        break;
      }
      hierarchy.rounds += 1;

      sink.emit(ProgressEvent::processing(
        "children",
        format!(
          "Fetching level {} ({} issues)",
          hierarchy.rounds,
          frontier.len()
        ),
        Some((10 + 5 * hierarchy.rounds).min(55) as u8),
      ));

      let links = self.source.children_of_many(&frontier).await?;
      debug!(
        root = root_key,
        round = hierarchy.rounds,
        edges = links.len(),
        "children level fetched"
      );
      frontier = hierarchy.record(links);
    }

    Ok(hierarchy)
  }

  /// Details for every key, fetching only the ones not already cached.
  async fn hydrate(&self, keys: &[String]) -> Result<HashMap<String, IssueNode>> {
    let mut details = HashMap::with_capacity(keys.len());
    let mut missing = Vec::new();

    for key in keys {
      match self.details.get(key) {
        Some(node) => {
          details.insert(key.clone(), node);
        }
        None => missing.push(key.clone()),
      }
    }

    if !missing.is_empty() {
      debug!(
        cached = details.len(),
        missing = missing.len(),
        "hydrating issue details"
      );
      let fetched = self
        .source
        .details_of_many(&missing, DETAIL_FIELDS)
        .await
        .map_err(|e| EngineError::data_source("details", e))?;

      for node in fetched {
        let node = node.detached();
        self.details.set(node.key.clone(), node.clone());
        details.insert(node.key.clone(), node);
      }
    }

    Ok(details)
  }

  async fn fallback(&self, root_key: &str, sink: &dyn ProgressSink) -> Result<BuiltTree> {
    sink.emit(ProgressEvent::processing(
      "fallback",
      format!("Batched lookup failed, fetching direct children of {root_key}"),
      None,
    ));
    self.build_shallow(root_key).await
  }

  /// Root plus its immediate children, no recursion.
  async fn build_shallow(&self, root_key: &str) -> Result<BuiltTree> {
    let root = match self.details.get(root_key) {
      Some(node) => node,
      None => self
        .source
        .details_of_many(&[root_key.to_string()], DETAIL_FIELDS)
        .await
        .map_err(|e| EngineError::data_source("details", e))?
        .into_iter()
        .find(|n| n.key == root_key)
        .ok_or_else(|| EngineError::issue_not_found(root_key))?,
    };

    let children: Vec<IssueNode> = self
      .source
      .children_of(root_key)
      .await
      .map_err(|e| EngineError::data_source("children", e))?
      .iter()
      .map(IssueNode::detached)
      .collect();

    for child in &children {
      self.details.set(child.key.clone(), child.clone());
    }

    let tree = root.detached().with_children(children);
    self.trees.set(
      root_key,
      CachedTree {
        root: tree.clone(),
        expansion: Expansion::Shallow,
        depth_limited: false,
      },
    );

    Ok(BuiltTree {
      tree,
      expansion: Expansion::Shallow,
      from_cache: false,
      rounds: 0,
      depth_limited: false,
    })
  }
}

/// Assemble the subtree under `key`, children first.
///
/// Keys the tracker returned no details for are dropped with a warning.
fn assemble(
  key: &str,
  hierarchy: &Hierarchy,
  details: &HashMap<String, IssueNode>,
) -> Option<IssueNode> {
  let Some(base) = details.get(key) else {
    warn!(key, "no details returned for issue, leaving it out of the tree");
    return None;
  };

  let children = hierarchy
    .children
    .get(key)
    .map(|keys| {
      keys
        .iter()
        .filter_map(|k| assemble(k, hierarchy, details))
        .collect()
    })
    .unwrap_or_default();

  Some(base.detached().with_children(children))
}
