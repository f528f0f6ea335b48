//! Where project snapshots come from: a local file or a REST endpoint.

use color_eyre::{eyre::eyre, Result};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

use crate::loader::retry::{self, RetryPolicy};

use super::types::{Project, ProjectResource, ProjectSnapshot, Task};

/// Snapshot source, chosen from the configured location.
#[derive(Debug, Clone)]
pub enum SnapshotSource {
  File(FileSource),
  Http(HttpSource),
}

impl SnapshotSource {
  /// `http(s)://` locations become an `HttpSource`, anything else a file path.
  pub fn from_location(location: &str, token: Option<String>, retry: RetryPolicy) -> Result<Self> {
    match Url::parse(location) {
      Ok(url) if matches!(url.scheme(), "http" | "https") => {
        Ok(Self::Http(HttpSource::new(url, token, retry)?))
      }
      _ => Ok(Self::File(FileSource::new(location))),
    }
  }

  pub async fn fetch(&self) -> Result<ProjectSnapshot> {
    match self {
      Self::File(source) => source.fetch().await,
      Self::Http(source) => source.fetch().await,
    }
  }

  pub fn describe(&self) -> String {
    match self {
      Self::File(source) => source.path.display().to_string(),
      Self::Http(source) => source.base.to_string(),
    }
  }
}

/// Snapshot stored in a JSON (`.json`) or YAML (anything else) file.
#[derive(Debug, Clone)]
pub struct FileSource {
  path: PathBuf,
}

impl FileSource {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub async fn fetch(&self) -> Result<ProjectSnapshot> {
    let contents = tokio::fs::read_to_string(&self.path)
      .await
      .map_err(|e| eyre!("Failed to read snapshot {}: {}", self.path.display(), e))?;

    parse_snapshot(&self.path, &contents)
  }
}

fn parse_snapshot(path: &Path, contents: &str) -> Result<ProjectSnapshot> {
  let is_json = path
    .extension()
    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

  if is_json {
    serde_json::from_str(contents)
      .map_err(|e| eyre!("Failed to parse snapshot {}: {}", path.display(), e))
  } else {
    serde_yaml::from_str(contents)
      .map_err(|e| eyre!("Failed to parse snapshot {}: {}", path.display(), e))
  }
}

/// Snapshot assembled from a REST API.
///
/// The base URL addresses the project itself; its resources and tasks live
/// under `<base>/resources` and `<base>/tasks`. The three requests run in
/// parallel, each with its own retries.
#[derive(Debug, Clone)]
pub struct HttpSource {
  client: reqwest::Client,
  base: Url,
  token: Option<String>,
  retry: RetryPolicy,
}

impl HttpSource {
  pub fn new(base: Url, token: Option<String>, retry: RetryPolicy) -> Result<Self> {
    if base.cannot_be_a_base() {
      return Err(eyre!("Snapshot URL {} cannot be used as a base", base));
    }

    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      token,
      retry,
    })
  }

  /// Project, resources and tasks endpoints, in that order.
  pub fn endpoints(&self) -> Result<[Url; 3]> {
    Ok([
      self.base.clone(),
      self.child("resources")?,
      self.child("tasks")?,
    ])
  }

  fn child(&self, segment: &str) -> Result<Url> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| eyre!("Snapshot URL {} cannot be used as a base", self.base))?
      .pop_if_empty()
      .push(segment);
    Ok(url)
  }

  pub async fn fetch(&self) -> Result<ProjectSnapshot> {
    let ops: Vec<_> = self
      .endpoints()?
      .into_iter()
      .map(|url| move || self.get_json(url.clone()))
      .collect();

    let mut parts = retry::parallel(&self.retry, ops, retry::DEFAULT_MAX_CONCURRENCY)
      .await?
      .into_iter();

    let project: Project = decode(parts.next(), "project")?;
    let resources: Vec<ProjectResource> = decode(parts.next(), "resources")?;
    let tasks: Vec<Task> = decode(parts.next(), "tasks")?;

    Ok(ProjectSnapshot {
      project,
      resources,
      tasks,
    })
  }

  async fn get_json(&self, url: Url) -> Result<Value> {
    debug!(%url, "requesting snapshot part");

    let mut request = self.client.get(url.clone()).header(ACCEPT, "application/json");
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(|e| {
      if e.is_connect() || e.is_timeout() || e.is_request() {
        eyre!("Network error requesting {}: {}", url, e)
      } else {
        eyre!("Request to {} failed: {}", url, e)
      }
    })?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(eyre!("{} returned {}: {}", url, status, body.trim()));
    }

    response
      .json()
      .await
      .map_err(|e| eyre!("Invalid JSON from {}: {}", url, e))
  }
}

fn decode<T: DeserializeOwned>(part: Option<Value>, what: &str) -> Result<T> {
  let value = part.ok_or_else(|| eyre!("Missing {} in snapshot response", what))?;
  serde_json::from_value(value).map_err(|e| eyre!("Failed to parse {}: {}", what, e))
}
