//! Request and response types of the Databricks Jobs API (2.0).
//!
//! Field names follow the documented `runs/submit` and `runs/get` schemas.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;
use std::fmt;

/// Body of a `runs/submit` request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct JobSpec {
    #[serde(rename = "run_name")]
    pub name: String,
    pub new_cluster: NewCluster,
    pub notebook_task: NotebookTask,
    pub libraries: Vec<Library>,
}

/// An on-demand cluster created for the run and torn down afterwards.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NewCluster {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spark_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_type_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_workers: Option<u32>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub spark_env_vars: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NotebookTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notebook_path: Option<String>,
    pub base_parameters: BTreeMap<String, String>,
}

/// A library installed on the cluster before the task starts.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Library {
    Pypi(PypiLibrary),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PypiLibrary {
    pub package: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
}

impl Library {
    pub fn pypi(package: &str) -> Self {
        Library::Pypi(PypiLibrary { package: package.to_string(), repo: None })
    }
}

/// Identifier of a submitted run, as returned by `runs/submit`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub i64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct SubmitRunResponse {
    pub(crate) run_id: RunId,
}

/// Subset of the `runs/get` response the submitter looks at.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub state: RunState,
    #[serde(default)]
    pub run_page_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct RunState {
    pub life_cycle_state: LifeCycleState,
    #[serde(default)]
    pub result_state: Option<ResultState>,
    #[serde(default)]
    pub state_message: Option<String>,
}

/// Lifecycle of a run. Values the API adds later land in `Unknown`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifeCycleState {
    Queued,
    Pending,
    Running,
    Terminating,
    Terminated,
    Skipped,
    InternalError,
    Blocked,
    WaitingForRetry,
    Unknown(String),
}

impl LifeCycleState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "QUEUED",
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
            Self::Skipped => "SKIPPED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Blocked => "BLOCKED",
            Self::WaitingForRetry => "WAITING_FOR_RETRY",
            Self::Unknown(state) => state,
        }
    }

    /// Whether the run has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated | Self::Skipped | Self::InternalError)
    }
}

impl From<&str> for LifeCycleState {
    fn from(state: &str) -> Self {
        match state {
            "QUEUED" => Self::Queued,
            "PENDING" => Self::Pending,
            "RUNNING" => Self::Running,
            "TERMINATING" => Self::Terminating,
            "TERMINATED" => Self::Terminated,
            "SKIPPED" => Self::Skipped,
            "INTERNAL_ERROR" => Self::InternalError,
            "BLOCKED" => Self::Blocked,
            "WAITING_FOR_RETRY" => Self::WaitingForRetry,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for LifeCycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LifeCycleState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let state = String::deserialize(deserializer)?;
        Ok(LifeCycleState::from(state.as_str()))
    }
}

/// Outcome of a finished run. Only logged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResultState {
    Success,
    Failed,
    TimedOut,
    Canceled,
    Unknown(String),
}

impl From<&str> for ResultState {
    fn from(state: &str) -> Self {
        match state {
            "SUCCESS" => Self::Success,
            "FAILED" => Self::Failed,
            "TIMEDOUT" => Self::TimedOut,
            "CANCELED" => Self::Canceled,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("SUCCESS"),
            Self::Failed => f.write_str("FAILED"),
            Self::TimedOut => f.write_str("TIMEDOUT"),
            Self::Canceled => f.write_str("CANCELED"),
            Self::Unknown(state) => f.write_str(state),
        }
    }
}

impl<'de> Deserialize<'de> for ResultState {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let state = String::deserialize(deserializer)?;
        Ok(ResultState::from(state.as_str()))
    }
}
