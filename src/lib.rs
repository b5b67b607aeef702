#![doc = include_str!("../README.md")]

mod client;
pub mod config;
mod error;
mod io;
mod job;
pub mod logging;
mod poll;
mod submit;
#[cfg(test)]
mod testing;
mod vault;

pub use client::{ClientError, DatabricksJobsClient, JobService, JobsClientBuilder};
pub use error::StepError;
pub use io::{IoError, Table, load_table};
pub use job::{JobSpec, LifeCycleState, Library, NewCluster, NotebookTask, PypiLibrary, ResultState, Run, RunId, RunState};
pub use poll::{PollOptions, wait_for_termination};
pub use submit::{OUTPUT_FOLDER_PARAMETER, TRACKING_LIBRARY, build_job_spec, submit_and_wait};
pub use vault::{AccessToken, DefaultCredential, KeyVaultClient, Secret, SecretStore, TokenCredential, VaultError};
