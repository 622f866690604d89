//! Jira REST implementation of the issue data source.

mod api_types;
mod client;
mod jql;

pub use client::JiraClient;
