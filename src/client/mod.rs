//! Client for the Databricks Jobs API.

mod builder;
pub(crate) mod error;
mod jobs;

pub use builder::JobsClientBuilder;
pub use error::ClientError;
pub use jobs::DatabricksJobsClient;

use crate::job::{JobSpec, Run, RunId};

/// The two Jobs API calls the submitter makes.
#[allow(async_fn_in_trait)]
pub trait JobService {
    /// Submit a one-time run and return its id.
    async fn submit_run(&self, spec: &JobSpec) -> Result<RunId, ClientError>;

    /// Fetch the current state of a run.
    async fn get_run(&self, run_id: RunId) -> Result<Run, ClientError>;
}
