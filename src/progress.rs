//! Hybrid progress calculation for resources and projects.
//!
//! A resource's progress blends its procurement status with the completion of
//! its own tasks. A project's progress blends its project-level task ratio with
//! the average progress of its resources. Both signals weigh half.
//!
//! Percentages are rounded half away from zero (`f64::round`), so 12.5 becomes 13.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Procurement status of a resource within a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceStatus {
  #[default]
  Needed,
  Acquired,
  InProgress,
  Completed,
}

impl ResourceStatus {
  /// Fixed progress contribution of the status alone.
  pub fn baseline(self) -> f64 {
    match self {
      Self::Needed => 0.0,
      Self::Acquired => 0.25,
      Self::InProgress => 0.5,
      Self::Completed => 1.0,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Needed => "needed",
      Self::Acquired => "acquired",
      Self::InProgress => "in-progress",
      Self::Completed => "completed",
    }
  }
}

impl fmt::Display for ResourceStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Progress of a single resource in `[0, 1]`.
///
/// Without tasks the status baseline is returned as is. Counts are not
/// validated: `completed_tasks > total_tasks` yields a value above 1.
pub fn resource_progress(status: ResourceStatus, completed_tasks: u32, total_tasks: u32) -> f64 {
  let baseline = status.baseline();
  if total_tasks == 0 {
    return baseline;
  }
  let task_completion = f64::from(completed_tasks) / f64::from(total_tasks);
  (baseline + task_completion) / 2.0
}

/// Project completion as a whole percentage.
///
/// - no project tasks but some resources: resource average only
/// - project tasks but no resources: task ratio only
/// - otherwise: the mean of both (0 when both are absent)
///
/// `resource_values` is summed and divided by `resource_count`, which callers
/// normally set to `resource_values.len()`.
pub fn project_progress(
  completed_tasks: u32,
  total_tasks: u32,
  resource_values: &[f64],
  resource_count: u32,
) -> u32 {
  let task_ratio = if total_tasks > 0 {
    f64::from(completed_tasks) / f64::from(total_tasks)
  } else {
    0.0
  };
  let resource_average = if resource_count > 0 {
    resource_values.iter().sum::<f64>() / f64::from(resource_count)
  } else {
    0.0
  };

  let fraction = if total_tasks == 0 && resource_count > 0 {
    resource_average
  } else if total_tasks > 0 && resource_count == 0 {
    task_ratio
  } else {
    (task_ratio + resource_average) / 2.0
  };
  as_percent(fraction)
}

/// Whole percentage of a fraction, rounded half away from zero.
pub fn as_percent(fraction: f64) -> u32 {
  // `as` saturates, so negative or NaN inputs land on 0
  (fraction * 100.0).round() as u32
}

/// Inputs for `resource_progress`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceProgressInput {
  pub status: ResourceStatus,
  pub completed_task_count: u32,
  pub total_task_count: u32,
}

impl ResourceProgressInput {
  pub fn progress(&self) -> f64 {
    resource_progress(
      self.status,
      self.completed_task_count,
      self.total_task_count,
    )
  }
}

/// Inputs for `project_progress`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectProgressInput {
  pub project_completed_task_count: u32,
  pub project_total_task_count: u32,
  pub resource_progress_values: Vec<f64>,
  pub resource_count: u32,
}

impl ProjectProgressInput {
  /// Build the input from a project's task counts and its resources.
  pub fn from_resources(
    completed_tasks: u32,
    total_tasks: u32,
    resources: &[ResourceProgressInput],
  ) -> Self {
    let resource_progress_values: Vec<f64> = resources.iter().map(|r| r.progress()).collect();
    Self {
      project_completed_task_count: completed_tasks,
      project_total_task_count: total_tasks,
      resource_count: resource_progress_values.len() as u32,
      resource_progress_values,
    }
  }

  pub fn progress(&self) -> u32 {
    project_progress(
      self.project_completed_task_count,
      self.project_total_task_count,
      &self.resource_progress_values,
      self.resource_count,
    )
  }
}
