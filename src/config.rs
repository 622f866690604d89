use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::engine::EngineSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub jira: JiraConfig,
  #[serde(default)]
  pub workstreams: WorkstreamsConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
  /// Auto-detect based on URL: .atlassian.net = cloud, else on-premise
  #[default]
  Auto,
  /// Jira Cloud - uses Basic auth (email + API token as password)
  Cloud,
  /// Jira On-premise - uses Bearer auth (PAT)
  Onpremise,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JiraConfig {
  pub url: String,
  pub email: String,
  /// Custom field holding the billing account (e.g., "customfield_10100")
  pub account_field: Option<String>,
  /// Authentication type: auto, cloud, or onpremise
  #[serde(default)]
  pub auth_type: AuthType,
}

impl JiraConfig {
  pub fn is_cloud(&self) -> bool {
    match self.auth_type {
      AuthType::Cloud => true,
      AuthType::Onpremise => false,
      AuthType::Auto => self.url.contains(".atlassian.net"),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkstreamsConfig {
  /// Issue type name that marks a workstream
  pub issue_type: String,
  /// Working hours in one day of effort
  pub hours_per_day: f64,
}

impl Default for WorkstreamsConfig {
  fn default() -> Self {
    Self {
      issue_type: "Workstream".to_string(),
      hours_per_day: 8.0,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub ttl_days: i64,
  pub max_entries: usize,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      ttl_days: 7,
      max_entries: 500,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
  /// Maximum batched levels walked per traversal
  pub max_rounds: usize,
  pub build_all_timeout_secs: u64,
}

impl Default for LimitsConfig {
  fn default() -> Self {
    Self {
      max_rounds: 10,
      build_all_timeout_secs: 300,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./wsdash.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/wsdash/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/wsdash/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("wsdash.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("wsdash").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if config.workstreams.hours_per_day <= 0.0 {
      return Err(eyre!("workstreams.hours_per_day must be positive"));
    }
    if config.cache.ttl_days <= 0 {
      return Err(eyre!("cache.ttl_days must be positive"));
    }

    Ok(config)
  }

  /// Engine knobs derived from this configuration.
  pub fn engine_settings(&self) -> EngineSettings {
    EngineSettings {
      workstream_type: self.workstreams.issue_type.clone(),
      cache_ttl: chrono::Duration::days(self.cache.ttl_days),
      max_cache_entries: self.cache.max_entries,
      max_rounds: self.limits.max_rounds,
      build_all_timeout: std::time::Duration::from_secs(self.limits.build_all_timeout_secs),
    }
  }

  /// Get the Jira API token from environment variables.
  ///
  /// Checks WSDASH_JIRA_TOKEN first, then JIRA_API_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("WSDASH_JIRA_TOKEN")
      .or_else(|_| std::env::var("JIRA_API_TOKEN"))
      .map_err(|_| {
        eyre!(
          "Jira API token not found. Set WSDASH_JIRA_TOKEN or JIRA_API_TOKEN environment variable."
        )
      })
  }
}
