use chrono::{DateTime, NaiveDate, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::progress::ResourceStatus;

/// Lifecycle of a cosplay project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
  #[default]
  Planning,
  InProgress,
  Completed,
  Archived,
}

impl ProjectStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Planning => "planning",
      Self::InProgress => "in-progress",
      Self::Completed => "completed",
      Self::Archived => "archived",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
  pub id: String,
  pub character: String,
  #[serde(default)]
  pub series: Option<String>,
  #[serde(default)]
  pub status: ProjectStatus,
  #[serde(default)]
  pub deadline: Option<NaiveDate>,
  #[serde(default)]
  pub updated_at: Option<DateTime<Utc>>,
}

/// A resource linked into a project. The link carries its own status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectResource {
  pub resource_id: String,
  pub name: String,
  #[serde(default)]
  pub status: ResourceStatus,
  #[serde(default = "default_quantity")]
  pub quantity: u32,
}

fn default_quantity() -> u32 {
  1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id: String,
  pub title: String,
  #[serde(default)]
  pub completed: bool,
  /// Set for resource-level tasks, absent for project-level tasks
  #[serde(default)]
  pub resource_id: Option<String>,
}

impl Task {
  pub fn is_project_level(&self) -> bool {
    self.resource_id.is_none()
  }
}

/// Everything needed to compute a project's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSnapshot {
  pub project: Project,
  #[serde(default)]
  pub resources: Vec<ProjectResource>,
  #[serde(default)]
  pub tasks: Vec<Task>,
}

impl ProjectSnapshot {
  /// Project-level tasks as (completed, total).
  pub fn project_task_counts(&self) -> (u32, u32) {
    count(self.tasks.iter().filter(|t| t.is_project_level()))
  }

  /// Tasks attached to a resource as (completed, total).
  pub fn resource_task_counts(&self, resource_id: &str) -> (u32, u32) {
    count(
      self
        .tasks
        .iter()
        .filter(|t| t.resource_id.as_deref() == Some(resource_id)),
    )
  }

  /// SHA256 over the canonical JSON form, for cheap change detection.
  pub fn fingerprint(&self) -> Result<String> {
    let bytes =
      serde_json::to_vec(self).map_err(|e| eyre!("Failed to serialize snapshot: {}", e))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
  }
}

fn count<'a>(tasks: impl Iterator<Item = &'a Task>) -> (u32, u32) {
  tasks.fold((0, 0), |(done, total), task| {
    (done + u32::from(task.completed), total + 1)
  })
}
