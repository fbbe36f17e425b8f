//! # Value types shared with collaborators.
//!
//! Small identifier and descriptor types exchanged with the scheduler actor,
//! the app repository, and the task tracker. The core never interprets app
//! or deployment contents; it only routes them.

use std::fmt;

/// Path-like application identifier (e.g. `/infra/redis`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AppId(String);

impl AppId {
    /// Creates an app id from a path-like string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AppId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of a single launched task.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Application definition as stored by the app repository.
///
/// Only the attributes the core routes are modeled; validation and
/// persistence belong to the repository collaborator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppDefinition {
    /// Application identifier.
    pub id: AppId,
    /// Version tag assigned by the repository.
    pub version: String,
    /// Desired instance count.
    pub instances: u32,
}

/// A deployment plan computed by an external planner.
///
/// The core hands plans to the scheduler actor and echoes them back from
/// `list_running_deployments`; it never inspects the steps.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeploymentPlan {
    /// Unique plan identifier.
    pub id: String,
    /// Applications affected by this plan.
    pub affected_apps: Vec<AppId>,
}
