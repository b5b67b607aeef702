use crate::client::error::{ClientError, ClientErrorKind};
use crate::client::jobs::DatabricksJobsClient;

use http::header::{self, HeaderMap, HeaderValue};
use std::env;
use url::Url;

/// Parses and validates the Databricks workspace host and assembles
/// an authenticated [`DatabricksJobsClient`].
///
/// The host may be given as a full URL (`https://adb-123.4.azuredatabricks.net`)
/// or as a bare hostname, in which case `https` is assumed. Any path on the
/// host is dropped; API routes are resolved against the workspace root.
///
/// The token is sent as `Authorization: Bearer <token>` on every request.
#[derive(Clone)]
pub struct JobsClientBuilder {
    pub(crate) host: Url,
    pub(crate) token: Option<String>,
    pub(crate) user_agent: String,
}

impl std::fmt::Debug for JobsClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobsClientBuilder")
            .field("host", &self.host.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl JobsClientBuilder {
    /// Create builder and validate the workspace host.
    pub fn new(host: &str) -> Result<JobsClientBuilder, ClientError> {
        Ok(JobsClientBuilder {
            host: JobsClientBuilder::parse_host(host)?,
            token: None,
            user_agent: JobsClientBuilder::create_user_agent(None),
        })
    }

    pub fn token(mut self, token: &str) -> Self {
        self.token = Some(format!("Bearer {token}"));
        self
    }

    pub fn user_agent(mut self, user_agent: &str) -> Self {
        self.user_agent = JobsClientBuilder::create_user_agent(Some(user_agent));
        self
    }

    pub(crate) fn endpoint(&self) -> String {
        self.host.as_str().trim_end_matches('/').to_string()
    }

    pub(crate) fn headers(&self) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();

        let user_agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|source| ClientError::new(ClientErrorKind::InvalidHeader {
                source, header: "user-agent"
            }))?;
        headers.insert(header::USER_AGENT, user_agent);

        if let Some(token) = &self.token {
            let mut token = HeaderValue::from_str(token)
                .map_err(|source| ClientError::new(ClientErrorKind::InvalidHeader {
                    source, header: "authorization"
                }))?;
            token.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, token);
        }

        Ok(headers)
    }

    pub fn build(self) -> Result<DatabricksJobsClient, ClientError> {
        let http = reqwest::Client::builder()
            .default_headers(self.headers()?)
            .build()
            .map_err(|source| ClientError::new(ClientErrorKind::Build(source)))?;

        Ok(DatabricksJobsClient::new(http, self.endpoint()))
    }

    pub(crate) fn create_user_agent(user_agent: Option<&str>) -> String {
        let user_agent = user_agent.unwrap_or("_DATABRICKS_STEP_RUST");
        let pkg_version = env!("CARGO_PKG_VERSION");
        let os = env::consts::OS.to_lowercase();

        format!("{} os/{} databricks_step/{}", user_agent, os, pkg_version)
    }

    pub(crate) fn parse_host(host: &str) -> Result<Url, ClientError> {
        let invalid = |source: Option<url::ParseError>, msg: &str| {
            ClientError::new(ClientErrorKind::InvalidHost {
                source,
                host: host.to_string(),
                msg: msg.to_string(),
            })
        };

        let trimmed = host.trim();
        if trimmed.is_empty() {
            return Err(invalid(None, "the host must not be empty"));
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{trimmed}")
        };

        let mut url = Url::parse(&with_scheme)
            .map_err(|source| invalid(Some(source), "failed to parse host"))?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(invalid(None, "the host must use 'https://'"));
        }

        if url.host_str().is_none_or(str::is_empty) {
            return Err(invalid(None, "the hostname must not be empty"));
        }

        url.set_path("/");
        url.set_query(None);
        url.set_fragment(None);

        Ok(url)
    }
}
