//! Cosplay project tracking.
//!
//! - `loader`: cached, observable async data loading with retries
//! - `progress`: hybrid progress for resources and projects
//! - `project`: project snapshots, their sources, and progress reports
//!
//! `app`, `config` and `event` drive the `cosplan` binary.

pub mod app;
pub mod config;
pub mod event;
pub mod loader;
pub mod progress;
pub mod project;
