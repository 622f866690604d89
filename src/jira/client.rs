use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::collections::HashMap;
use tracing::debug;
use url::form_urlencoded;

use crate::config::Config;
use crate::jira::api_types::{ApiIssue, ApiProject, ApiSearchResponse, FieldMapping};
use crate::jira::jql::{self, KEY_CHUNK};
use crate::model::{IssueLite, IssueNode, Project};
use crate::source::{ChildLink, IssueDataSource, DETAIL_FIELDS};

const PAGE_SIZE: u64 = 100;

const LITE_FIELDS: &[&str] = &["summary", "issuetype", "status", "account"];
const EDGE_FIELDS: &[&str] = &["parent", "issuetype"];
const PARENT_FIELDS: &[&str] = &["parent"];
const EXTRA_FULL_FIELDS: &[&str] = &["parent", "subtasks"];

/// Jira API client wrapper
#[derive(Clone)]
pub struct JiraClient {
  client: gouqi::r#async::Jira,
  mapping: FieldMapping,
}

impl JiraClient {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;

    let credentials = if config.jira.is_cloud() {
      gouqi::Credentials::Basic(config.jira.email.clone(), token)
    } else {
      gouqi::Credentials::Bearer(token)
    };

    let client = gouqi::r#async::Jira::new(&config.jira.url, credentials)
      .map_err(|e| eyre!("Failed to create Jira client: {}", e))?;

    Ok(Self {
      client,
      mapping: FieldMapping {
        account_field: config.jira.account_field.clone(),
        seconds_per_day: config.workstreams.hours_per_day * 3600.0,
      },
    })
  }

  /// Translate logical field names into Jira field ids.
  fn field_ids(&self, fields: &[&str]) -> Vec<String> {
    fields
      .iter()
      .filter_map(|f| match *f {
        "account" => self.mapping.account_field.clone(),
        other => Some(other.to_string()),
      })
      .collect()
  }

  fn full_fields(&self) -> Vec<String> {
    let mut fields = self.field_ids(DETAIL_FIELDS);
    fields.extend(EXTRA_FULL_FIELDS.iter().map(|f| f.to_string()));
    fields
  }

  /// Run a JQL search, following pagination until every result is fetched.
  async fn search(&self, jql: &str, fields: &[String]) -> Result<Vec<ApiIssue>> {
    let mut all_issues = Vec::new();
    let mut start_at = 0u64;
    let fields = fields.join(",");

    loop {
      let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("jql", jql)
        .append_pair("fields", &fields)
        .append_pair("startAt", &start_at.to_string())
        .append_pair("maxResults", &PAGE_SIZE.to_string())
        .finish();

      let response: ApiSearchResponse = self
        .client
        .get("api", &format!("/search?{}", query))
        .await
        .map_err(|e| eyre!("Failed to search issues ({}): {}", jql, e))?;

      let issues_count = response.issues.len() as u64;
      all_issues.extend(response.issues);

      // Check if we've fetched all issues
      if issues_count == 0 || response.start_at + issues_count >= response.total {
        break;
      }
      start_at = response.start_at + issues_count.min(response.max_results.max(1));
    }

    debug!(jql, results = all_issues.len(), "search complete");
    Ok(all_issues)
  }

  /// Search keys in chunks, issuing the chunk requests concurrently.
  async fn search_keys(
    &self,
    keys: &[String],
    clause: fn(&[String]) -> String,
    fields: &[String],
  ) -> Result<Vec<ApiIssue>> {
    if keys.is_empty() {
      return Ok(Vec::new());
    }

    let chunks = keys
      .chunks(KEY_CHUNK)
      .map(|chunk| async move { self.search(&clause(chunk), fields).await });
    let results = try_join_all(chunks).await?;

    Ok(results.into_iter().flatten().collect())
  }

  fn to_nodes(&self, issues: Vec<ApiIssue>) -> Vec<IssueNode> {
    issues
      .into_iter()
      .map(|i| i.into_node(&self.mapping))
      .collect()
  }
}

#[async_trait]
impl IssueDataSource for JiraClient {
  async fn projects(&self) -> Result<Vec<Project>> {
    let projects: Vec<ApiProject> = self
      .client
      .get("api", "/project")
      .await
      .map_err(|e| eyre!("Failed to get projects: {}", e))?;

    Ok(projects.into_iter().map(Project::from).collect())
  }

  async fn query_issues(&self, query: &str) -> Result<Vec<IssueNode>> {
    let issues = self.search(query, &self.full_fields()).await?;
    Ok(self.to_nodes(issues))
  }

  async fn query_issues_lite(&self, query: &str) -> Result<Vec<IssueLite>> {
    let issues = self.search(query, &self.field_ids(LITE_FIELDS)).await?;
    Ok(
      issues
        .into_iter()
        .map(|i| i.into_lite(&self.mapping))
        .collect(),
    )
  }

  fn workstream_query(&self, project_key: &str, workstream_type: &str) -> String {
    jql::workstreams(project_key, workstream_type)
  }

  async fn children_of(&self, key: &str) -> Result<Vec<IssueNode>> {
    let issues = self.search(&jql::parent_is(key), &self.full_fields()).await?;
    Ok(self.to_nodes(issues))
  }

  async fn children_of_many(&self, keys: &[String]) -> Result<Vec<ChildLink>> {
    let issues = self
      .search_keys(keys, jql::parent_in, &self.field_ids(EDGE_FIELDS))
      .await?;

    Ok(
      issues
        .iter()
        .filter_map(|issue| {
          let parent = issue.parent_key()?;
          let link = ChildLink::new(parent, issue.key.clone());
          Some(if issue.is_subtask() {
            link.with_child_count(0)
          } else {
            link
          })
        })
        .collect(),
    )
  }

  async fn details_of_many(&self, keys: &[String], fields: &[&str]) -> Result<Vec<IssueNode>> {
    let issues = self
      .search_keys(keys, jql::key_in, &self.field_ids(fields))
      .await?;
    Ok(self.to_nodes(issues))
  }

  async fn issues_by_keys(&self, keys: &[String]) -> Result<Vec<IssueNode>> {
    let issues = self
      .search_keys(keys, jql::key_in, &self.full_fields())
      .await?;
    Ok(self.to_nodes(issues))
  }

  async fn parent_of_many(&self, keys: &[String]) -> Result<HashMap<String, Option<String>>> {
    let issues = self
      .search_keys(keys, jql::key_in, &self.field_ids(PARENT_FIELDS))
      .await?;

    Ok(
      issues
        .into_iter()
        .map(|issue| {
          let parent = issue.parent_key().map(String::from);
          (issue.key, parent)
        })
        .collect(),
    )
  }
}
