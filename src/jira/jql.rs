//! JQL fragments for the batched lookups.

/// Keys per `key in (...)` / `parent in (...)` clause. Longer clauses hit
/// URL length limits on some Jira deployments.
pub const KEY_CHUNK: usize = 100;

/// Quote a value for use inside JQL.
pub fn quote(value: &str) -> String {
  format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn key_list(keys: &[String]) -> String {
  keys
    .iter()
    .map(|k| quote(k))
    .collect::<Vec<_>>()
    .join(", ")
}

pub fn key_in(keys: &[String]) -> String {
  format!("key in ({})", key_list(keys))
}

pub fn parent_in(keys: &[String]) -> String {
  format!("parent in ({}) ORDER BY key", key_list(keys))
}

pub fn parent_is(key: &str) -> String {
  format!("parent = {} ORDER BY key", quote(key))
}

pub fn workstreams(project_key: &str, issue_type: &str) -> String {
  format!(
    "project = {} AND issuetype = {} ORDER BY key",
    quote(project_key),
    quote(issue_type)
  )
}
