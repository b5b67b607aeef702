//! Command-line and environment configuration of the two steps.

use crate::error::{StepError, StepErrorKind};
use crate::poll::PollOptions;

use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Prefix AzureML uses for intermediate outputs on the default datastore.
pub const OUTPUT_PREFIX: &str = "azureml";
/// Name of the step's output as declared in the component definition.
pub const OUTPUT_SLOT: &str = "output_path";

pub const RUN_ID_VAR: &str = "AZUREML_RUN_ID";

/// Variables forwarded to the cluster so tracking lands in AzureML.
pub const TRACKING_VARS: [&str; 6] = [
    "MLFLOW_TRACKING_URI",
    RUN_ID_VAR,
    "MLFLOW_EXPERIMENT_ID",
    "MLFLOW_TRACKING_TOKEN",
    "MLFLOW_RUN_ID",
    "MLFLOW_EXPERIMENT_NAME",
];

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "databricks-control")]
#[command(about = "Submit a Databricks notebook run on a new cluster and wait for it to terminate.",
          long_about = None)
]
pub struct SubmitArgs {
    /// Databricks workspace URL
    #[arg(long, env = "DATABRICKS_HOST")]
    pub databricks_host: String,

    /// Workspace path of the notebook to run
    #[arg(long = "notebook_path", alias = "notebook-path")]
    pub notebook_path: Option<String>,

    /// Key Vault URI holding the Databricks token
    #[arg(long, env = "KEYVAULT_URL")]
    pub keyvault_url: String,

    /// Name of the secret holding the Databricks token
    #[arg(long, env = "KEYVAULT_SECRET_NAME")]
    pub keyvault_secret_name: String,

    #[arg(long)]
    pub num_workers: Option<u32>,

    #[arg(long)]
    pub node_type_id: Option<String>,

    #[arg(long)]
    pub spark_version: Option<String>,

    /// Seconds between two status checks
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_SECS)]
    pub poll_interval_secs: u64,

    /// Give up after this many status checks
    #[arg(long)]
    pub max_poll_attempts: Option<u32>,

    /// Give up after waiting this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl SubmitArgs {
    pub fn poll_options(&self) -> PollOptions {
        PollOptions {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_attempts: self.max_poll_attempts,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "table-loader")]
#[command(about = "Load a Parquet file or folder and print it as a table.", long_about = None)]
pub struct LoaderArgs {
    /// Parquet file, or folder of Parquet part files
    #[arg(long)]
    pub input: PathBuf,
}

/// Identifiers the AzureML run environment provides to the step.
#[derive(Debug, Clone, PartialEq)]
pub struct RunEnvironment {
    pub run_id: String,
    /// Tracking variables in [`TRACKING_VARS`] order; `None` when unset.
    pub tracking: Vec<(&'static str, Option<String>)>,
}

impl RunEnvironment {
    pub fn from_env() -> Result<Self, StepError> {
        RunEnvironment::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, StepError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let run_id = lookup(RUN_ID_VAR)
            .filter(|run_id| !run_id.is_empty())
            .ok_or_else(|| StepError::new(StepErrorKind::MissingEnvironment(RUN_ID_VAR)))?;

        let tracking = TRACKING_VARS
            .iter()
            .map(|&name| (name, lookup(name)))
            .collect();

        Ok(RunEnvironment { run_id, tracking })
    }

    /// `azureml/<run id>/output_path`, where downstream steps expect the output.
    pub fn output_folder(&self) -> String {
        format!("{}/{}/{}", OUTPUT_PREFIX, self.run_id, OUTPUT_SLOT)
    }
}
