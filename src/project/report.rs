//! Progress report for one project snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

use crate::progress::{as_percent, ProjectProgressInput, ResourceProgressInput, ResourceStatus};

use super::types::{ProjectSnapshot, ProjectStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRow {
  pub resource_id: String,
  pub name: String,
  pub status: ResourceStatus,
  pub completed_tasks: u32,
  pub total_tasks: u32,
  /// Hybrid progress in [0, 1]
  pub progress: f64,
  pub percent: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReport {
  pub project_id: String,
  pub character: String,
  pub series: Option<String>,
  pub status: ProjectStatus,
  /// Overall completion, 0-100
  pub percent: u32,
  /// Project-level tasks only
  pub completed_tasks: u32,
  pub total_tasks: u32,
  pub resources: Vec<ResourceRow>,
  pub generated_at: DateTime<Utc>,
}

impl ProgressReport {
  pub fn from_snapshot(snapshot: &ProjectSnapshot) -> Self {
    warn_orphan_tasks(snapshot);

    let resources: Vec<ResourceRow> = snapshot
      .resources
      .iter()
      .map(|resource| {
        let (completed_tasks, total_tasks) = snapshot.resource_task_counts(&resource.resource_id);
        let progress = ResourceProgressInput {
          status: resource.status,
          completed_task_count: completed_tasks,
          total_task_count: total_tasks,
        }
        .progress();

        ResourceRow {
          resource_id: resource.resource_id.clone(),
          name: resource.name.clone(),
          status: resource.status,
          completed_tasks,
          total_tasks,
          progress,
          percent: as_percent(progress),
        }
      })
      .collect();

    let (completed_tasks, total_tasks) = snapshot.project_task_counts();
    let percent = ProjectProgressInput {
      project_completed_task_count: completed_tasks,
      project_total_task_count: total_tasks,
      resource_progress_values: resources.iter().map(|r| r.progress).collect(),
      resource_count: resources.len() as u32,
    }
    .progress();

    Self {
      project_id: snapshot.project.id.clone(),
      character: snapshot.project.character.clone(),
      series: snapshot.project.series.clone(),
      status: snapshot.project.status,
      percent,
      completed_tasks,
      total_tasks,
      resources,
      generated_at: Utc::now(),
    }
  }
}

/// Tasks pointing at a resource the project does not link count towards nothing.
fn warn_orphan_tasks(snapshot: &ProjectSnapshot) {
  let linked: HashSet<&str> = snapshot
    .resources
    .iter()
    .map(|r| r.resource_id.as_str())
    .collect();

  for task in &snapshot.tasks {
    if let Some(resource_id) = task.resource_id.as_deref() {
      if !linked.contains(resource_id) {
        warn!(
          project = %snapshot.project.id,
          task = %task.id,
          resource = resource_id,
          "task references a resource that is not linked to the project"
        );
      }
    }
  }
}

impl fmt::Display for ProgressReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.character)?;
    if let Some(series) = &self.series {
      write!(f, " ({})", series)?;
    }
    writeln!(f, "  [{}]", self.status.as_str())?;
    writeln!(
      f,
      "Progress: {:>3}%   Project tasks: {}/{}",
      self.percent, self.completed_tasks, self.total_tasks
    )?;

    if self.resources.is_empty() {
      return Ok(());
    }

    writeln!(f, "Resources:")?;
    for row in &self.resources {
      writeln!(
        f,
        "  {:<24} {:<12} {:>3}/{:<3} {:>3}%",
        row.name,
        row.status.as_str(),
        row.completed_tasks,
        row.total_tasks,
        row.percent
      )?;
    }
    Ok(())
  }
}
