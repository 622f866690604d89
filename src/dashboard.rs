//! Operations exposed to the presentation layer.
//!
//! `Dashboard` owns every cache and wires the tree builder and orphan
//! detector to one [`IssueDataSource`]. Long operations report through a
//! [`ProgressSink`] and always end with a `complete` or `error` event.

use color_eyre::{eyre::eyre, Report, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{CacheLayer, CacheStats, QueryKey};
use crate::engine::aggregate::annotate;
use crate::engine::mismatch::{find_account_mismatches, find_report_mismatches, AccountMismatch};
use crate::engine::orphans::{OrphanDetector, OrphanReport};
use crate::engine::tree::{CachedTree, Expansion, TreeBuilder};
use crate::engine::EngineSettings;
use crate::error::EngineError;
use crate::model::{IssueNode, Project, ProjectRecord};
use crate::progress::{percent, NullSink, ProgressEvent, ProgressSink};
use crate::source::IssueDataSource;

/// Orphan report plus the account mismatches found in it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanScan {
  #[serde(flatten)]
  pub report: OrphanReport,
  pub mismatches: Vec<AccountMismatch>,
  /// Linked issue key to the nearest workstream above it, when one was found.
  pub owning_workstreams: BTreeMap<String, String>,
}

pub struct Dashboard {
  source: Arc<dyn IssueDataSource>,
  settings: EngineSettings,
  projects: CacheLayer<Vec<Project>>,
  records: CacheLayer<ProjectRecord>,
  reports: CacheLayer<Vec<IssueNode>>,
  trees: Arc<CacheLayer<CachedTree>>,
  details: Arc<CacheLayer<IssueNode>>,
  builder: Arc<TreeBuilder>,
  orphans: OrphanDetector,
}

impl Dashboard {
  pub fn new(source: Arc<dyn IssueDataSource>, settings: EngineSettings) -> Self {
    let ttl = settings.cache_ttl;
    let cap = settings.max_cache_entries;

    let trees = Arc::new(CacheLayer::new("trees", ttl, cap));
    let details = Arc::new(CacheLayer::new("issues", ttl, cap));
    let builder = Arc::new(TreeBuilder::new(
      source.clone(),
      trees.clone(),
      details.clone(),
      settings.max_rounds,
    ));
    let orphans = OrphanDetector::new(source.clone(), builder.clone(), settings.max_rounds);

    Self {
      source,
      projects: CacheLayer::new("projects", ttl, cap),
      records: CacheLayer::new("project_records", ttl, cap),
      reports: CacheLayer::new("reports", ttl, cap),
      trees,
      details,
      builder,
      orphans,
      settings,
    }
  }

  pub fn settings(&self) -> &EngineSettings {
    &self.settings
  }

  pub async fn get_projects(&self) -> Result<Vec<Project>> {
    let key = QueryKey::Projects.cache_key();
    if let Some(projects) = self.projects.get(&key) {
      return Ok(projects);
    }

    let projects = self
      .source
      .projects()
      .await
      .map_err(|e| EngineError::data_source("projects", e))?;
    self.projects.set(key, projects.clone());
    Ok(projects)
  }

  /// Workstreams of a project as shallow nodes (no children).
  pub async fn get_project_workstreams(&self, project_key: &str) -> Result<Vec<IssueNode>> {
    let query_key = QueryKey::Project { key: project_key };
    let key = query_key.cache_key();
    if let Some(record) = self.records.get(&key) {
      return Ok(record.issues);
    }

    let project = self
      .get_projects()
      .await?
      .into_iter()
      .find(|p| p.key.eq_ignore_ascii_case(project_key))
      .ok_or_else(|| EngineError::NotFound {
        kind: "project",
        key: project_key.to_string(),
        hint: "",
      })?;

    let query = self
      .source
      .workstream_query(&project.key, &self.settings.workstream_type);
    let issues: Vec<IssueNode> = self
      .source
      .query_issues_lite(&query)
      .await
      .map_err(|e| EngineError::data_source("workstreams", e))?
      .into_iter()
      .map(IssueNode::from)
      .collect();

    info!(
      project = %project.key,
      workstreams = issues.len(),
      "loaded {}",
      query_key.description()
    );
    self.records.set(
      key,
      ProjectRecord {
        project,
        issues: issues.clone(),
      },
    );
    Ok(issues)
  }

  /// Full, aggregated tree under a workstream loaded by
  /// [`get_project_workstreams`](Self::get_project_workstreams).
  pub async fn get_workstream_tree(
    &self,
    workstream_key: &str,
    sink: &dyn ProgressSink,
  ) -> Result<IssueNode> {
    let result = async {
      self.ensure_loaded(workstream_key)?;
      let built = self.builder.build(workstream_key, sink).await?;

      sink.emit(ProgressEvent::processing(
        "aggregate",
        "Rolling up effort",
        Some(95),
      ));
      Ok::<_, Report>(WorkstreamTree {
        account_mismatches: find_account_mismatches(&built.tree, &self.settings.workstream_type),
        tree: annotate(&built.tree),
        expansion: built.expansion,
        from_cache: built.from_cache,
        rounds: built.rounds,
        depth_limited: built.depth_limited,
      })
    }
    .await;

    finish(sink, "tree", result, |t| {
      format!("Loaded {} issues under {}", t.tree.node_count(), t.tree.key)
    })
    .map(|t| t.tree)
  }

  /// Linked-issue ancestor chains for a workstream, with account mismatches.
  pub async fn detect_orphans(
    &self,
    workstream_key: &str,
    sink: &dyn ProgressSink,
  ) -> Result<OrphanScan> {
    let result = async {
      self.ensure_loaded(workstream_key)?;
      self.cleanup();

      let mut report = self.orphans.detect(workstream_key, sink).await?;
      let ws_type = &self.settings.workstream_type;
      let mismatches = find_report_mismatches(&report, ws_type);
      let owning_workstreams = report
        .linked()
        .filter_map(|linked| {
          let owner = report.owning_workstream(&linked.issue.key, ws_type)?;
          Some((linked.issue.key.clone(), owner.issue.key.clone()))
        })
        .collect();
      report.workstream = annotate(&report.workstream);
      Ok::<_, Report>(OrphanScan {
        report,
        mismatches,
        owning_workstreams,
      })
    }
    .await;

    finish(sink, "orphans", result, |scan| {
      format!(
        "{} linked issues, {} account mismatches",
        scan.report.linked().count(),
        scan.mismatches.len()
      )
    })
  }

  /// Build every workstream tree of a project, one after another, within
  /// the configured deadline.
  pub async fn build_all_workstreams(
    &self,
    project_key: &str,
    sink: &dyn ProgressSink,
  ) -> Result<Vec<IssueNode>> {
    let deadline = self.settings.build_all_timeout;

    let result: Result<Vec<IssueNode>> = async {
      let workstreams = self.get_project_workstreams(project_key).await?;
      self.cleanup();
      let total = workstreams.len();

      let work = async {
        let mut trees = Vec::with_capacity(total);
        for (i, ws) in workstreams.iter().enumerate() {
          sink.emit(ProgressEvent::processing(
            "build-all",
            format!("Building {} ({}/{})", ws.key, i + 1, total),
            Some(percent(i, total)),
          ));
          let built = self.builder.build(&ws.key, &NullSink).await?;
          trees.push(annotate(&built.tree));
        }
        Ok::<_, Report>(trees)
      };

      match tokio::time::timeout(deadline, work).await {
        Ok(trees) => trees,
        Err(_) => {
          warn!(project = project_key, "building all workstreams timed out");
          Err(
            EngineError::Timeout {
              operation: "building all workstreams",
              seconds: deadline.as_secs(),
            }
            .into(),
          )
        }
      }
    }
    .await;

    finish(sink, "build-all", result, |trees| {
      let remaining: f64 = trees
        .iter()
        .filter_map(|t| t.aggregated?.time_remaining.value())
        .sum();
      format!(
        "Built {} workstream trees, {:.1} days remaining",
        trees.len(),
        remaining
      )
    })
  }

  /// Non-hierarchical report query, cached by normalised JQL.
  pub async fn run_report(&self, jql: &str) -> Result<Vec<IssueNode>> {
    let key = QueryKey::Report { jql }.cache_key();
    if let Some(issues) = self.reports.get(&key) {
      return Ok(issues);
    }

    let issues = self
      .source
      .query_issues(jql)
      .await
      .map_err(|e| EngineError::data_source("report", e))?;
    self.reports.set(key, issues.clone());
    Ok(issues)
  }

  pub fn clear_cache(&self) {
    self.projects.clear();
    self.records.clear();
    self.reports.clear();
    self.trees.clear();
    self.details.clear();
    info!("all caches cleared");
  }

  pub fn cache_stats(&self) -> Vec<CacheStats> {
    vec![
      self.projects.stats(),
      self.records.stats(),
      self.reports.stats(),
      self.trees.stats(),
      self.details.stats(),
    ]
  }

  fn cleanup(&self) {
    self.projects.cleanup();
    self.records.cleanup();
    self.reports.cleanup();
  }

  fn ensure_loaded(&self, workstream_key: &str) -> Result<()> {
    self
      .records
      .find_map(|_, record| {
        record
          .issues
          .iter()
          .any(|i| i.key == workstream_key)
          .then_some(())
      })
      .ok_or_else(|| EngineError::workstream_not_loaded(workstream_key).into())
  }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WorkstreamTree {
  tree: IssueNode,
  account_mismatches: Vec<AccountMismatch>,
  expansion: Expansion,
  from_cache: bool,
  /// Batched children requests issued; 0 when served from cache.
  rounds: usize,
  depth_limited: bool,
}

/// Emit the terminal event for `result` and pass it through.
fn finish<T: Serialize>(
  sink: &dyn ProgressSink,
  step: &str,
  result: Result<T>,
  message: impl FnOnce(&T) -> String,
) -> Result<T> {
  let value = match result {
    Ok(value) => value,
    Err(err) => {
      sink.emit(ProgressEvent::error(step, format!("{err:#}")));
      return Err(err);
    }
  };

  match serde_json::to_value(&value) {
    Ok(data) => {
      sink.emit(ProgressEvent::complete(step, message(&value), data));
      Ok(value)
    }
    Err(e) => {
      let err = eyre!("Failed to encode {} result: {}", step, e);
      sink.emit(ProgressEvent::error(step, err.to_string()));
      Err(err)
    }
  }
}
