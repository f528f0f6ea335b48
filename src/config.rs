use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::loader::retry::RetryConfig;
use crate::loader::CommitPolicy;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
  /// Snapshot file path or http(s) URL
  pub source: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  /// Seconds between refreshes in watch mode
  #[serde(default = "default_refresh_secs")]
  pub refresh_secs: u64,
}

fn default_refresh_secs() -> u64 {
  30
}

impl Default for Config {
  fn default() -> Self {
    Self {
      source: None,
      cache: CacheConfig::default(),
      retry: RetryConfig::default(),
      refresh_secs: default_refresh_secs(),
    }
  }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
  /// How long a loaded snapshot is reused before fetching again
  pub stale_after_secs: u64,
  pub policy: CommitPolicy,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_after_secs: 300,
      policy: CommitPolicy::default(),
    }
  }
}

impl CacheConfig {
  pub fn stale_time(&self) -> Duration {
    Duration::from_secs(self.stale_after_secs)
  }
}

impl Config {
  /// Load the config file, or defaults when there is none.
  ///
  /// An explicit path must exist. Otherwise `./cosplan.yaml` is tried before
  /// `$XDG_CONFIG_HOME/cosplan/config.yaml`. Every field has a default and the
  /// snapshot source can come from `--source` or `COSPLAN_SOURCE` instead (see
  /// [`Config::resolve_source`]), so running without a config file is normal.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = match explicit_path {
      Some(p) if !p.exists() => return Err(eyre!("Config file not found: {}", p.display())),
      Some(p) => Some(p.to_path_buf()),
      None => Self::find_config_file(),
    };

    path.map_or_else(|| Ok(Self::default()), |p| Self::load_from_path(&p))
  }

  fn find_config_file() -> Option<PathBuf> {
    let user = dirs::config_dir().map(|dir| dir.join("cosplan").join("config.yaml"));
    std::iter::once(PathBuf::from("cosplan.yaml"))
      .chain(user)
      .find(|path| path.exists())
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    // An empty file deserializes to unit; treat it as all defaults
    if contents.trim().is_empty() {
      return Self::parse("{}");
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Resolve the snapshot location: `--source`, then `COSPLAN_SOURCE`, then
  /// `source:` from the config file. Having none of them is an error.
  pub fn resolve_source(&self, cli: Option<&str>) -> Result<String> {
    cli
      .map(String::from)
      .or_else(|| std::env::var("COSPLAN_SOURCE").ok())
      .or_else(|| self.source.clone())
      .ok_or_else(|| {
        eyre!(
          "No project source configured. Pass --source, set COSPLAN_SOURCE, \
           or add `source:` to ~/.config/cosplan/config.yaml"
        )
      })
  }

  pub fn refresh_interval(&self) -> Duration {
    Duration::from_secs(self.refresh_secs.max(1))
  }

  /// Bearer token for HTTP sources, from COSPLAN_API_TOKEN.
  pub fn api_token() -> Option<String> {
    std::env::var("COSPLAN_API_TOKEN")
      .ok()
      .filter(|t| !t.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_full_config() {
    let config = Config::parse(
      r#"
source: https://api.example.com/projects/p-1
refreshSecs: 10
cache:
  staleAfterSecs: 60
  policy: last-settled
retry:
  maxRetries: 5
  timeoutMs: 2000
"#,
    )
    .unwrap();

    assert_eq!(config.source.as_deref(), Some("https://api.example.com/projects/p-1"));
    assert_eq!(config.refresh_interval(), Duration::from_secs(10));
    assert_eq!(config.cache.stale_time(), Duration::from_secs(60));
    assert_eq!(config.cache.policy, CommitPolicy::LastSettled);
    assert_eq!(config.retry.max_retries, 5);
    assert_eq!(config.retry.timeout_ms, 2000);
    assert_eq!(config.retry.initial_delay_ms, 1000);
  }

  #[test]
  fn test_defaults() {
    let config = Config::parse("").unwrap();

    assert_eq!(config.source, None);
    assert_eq!(config.refresh_secs, 30);
    assert_eq!(config.cache.stale_after_secs, 300);
    assert_eq!(config.cache.policy, CommitPolicy::LatestRequest);
    assert_eq!(config.retry.max_retries, 3);
  }

  #[test]
  fn test_load_from_explicit_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cosplan.yaml");
    std::fs::write(&path, "source: ./marin.yaml\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.source.as_deref(), Some("./marin.yaml"));
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nope/cosplan.yaml"))).unwrap_err();
    assert!(err.to_string().starts_with("Config file not found"));
  }

  #[test]
  fn test_invalid_policy_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cosplan.yaml");
    std::fs::write(&path, "cache:\n  policy: whenever\n").unwrap();

    let err = Config::load(Some(&path)).unwrap_err();
    assert!(err.to_string().starts_with("Failed to parse config file"));
  }

  #[test]
  fn test_command_line_source_wins() {
    let config = Config {
      source: Some("from-file.yaml".to_string()),
      ..Config::default()
    };

    assert_eq!(
      config.resolve_source(Some("from-cli.yaml")).unwrap(),
      "from-cli.yaml"
    );
  }

  #[test]
  fn test_source_resolution_order() {
    let config = Config {
      source: Some("from-file.yaml".to_string()),
      ..Config::default()
    };

    std::env::set_var("COSPLAN_SOURCE", "from-env.yaml");
    let from_env = config.resolve_source(None).unwrap();
    let without_file = Config::default().resolve_source(None).unwrap();
    std::env::remove_var("COSPLAN_SOURCE");

    assert_eq!(from_env, "from-env.yaml");
    assert_eq!(without_file, "from-env.yaml");
    assert_eq!(config.resolve_source(None).unwrap(), "from-file.yaml");
    assert!(Config::default()
      .resolve_source(None)
      .unwrap_err()
      .to_string()
      .starts_with("No project source configured"));
  }
}
