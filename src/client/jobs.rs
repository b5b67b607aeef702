use crate::client::JobService;
use crate::client::error::{ClientError, ClientErrorKind};
use crate::job::{JobSpec, Run, RunId, SubmitRunResponse};

use serde::de::DeserializeOwned;
use tracing::debug;

const SUBMIT_RUN: &str = "/api/2.0/jobs/runs/submit";
const GET_RUN: &str = "/api/2.0/jobs/runs/get";

/// Jobs API client bound to one workspace.
///
/// Built by [`JobsClientBuilder`](crate::JobsClientBuilder), which sets
/// the bearer token as a default header.
#[derive(Clone, Debug)]
pub struct DatabricksJobsClient {
    http: reqwest::Client,
    endpoint: String,
}

impl DatabricksJobsClient {
    pub(crate) fn new(http: reqwest::Client, endpoint: String) -> Self {
        DatabricksJobsClient { http, endpoint }
    }

    pub(crate) fn url(&self, route: &str) -> String {
        format!("{}{}", self.endpoint, route)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder, endpoint: String) -> Result<T, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|source| ClientError::new(ClientErrorKind::Request {
                source, endpoint: endpoint.clone()
            }))?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(error) => {
                    debug!(%endpoint, %error, "failed to read the error response body");
                    String::new()
                }
            };
            return Err(ClientError::new(ClientErrorKind::Status { status, endpoint, body }));
        }

        response
            .json::<T>()
            .await
            .map_err(|source| ClientError::new(ClientErrorKind::Decode { source, endpoint }))
    }
}

impl JobService for DatabricksJobsClient {
    async fn submit_run(&self, spec: &JobSpec) -> Result<RunId, ClientError> {
        let endpoint = self.url(SUBMIT_RUN);
        debug!(%endpoint, run_name = %spec.name, "POST runs/submit");

        let response: SubmitRunResponse = self
            .send(self.http.post(&endpoint).json(spec), endpoint)
            .await?;

        Ok(response.run_id)
    }

    async fn get_run(&self, run_id: RunId) -> Result<Run, ClientError> {
        let endpoint = self.url(GET_RUN);
        debug!(%endpoint, %run_id, "GET runs/get");

        let request = self.http.get(&endpoint).query(&[("run_id", run_id.0)]);
        self.send(request, endpoint).await
    }
}
