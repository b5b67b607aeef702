//! Azure AD token acquisition.
//!
//! [`DefaultCredential`] is a chain over the sources available to a pipeline
//! step: a service principal configured through the environment, then the
//! managed identity of the compute the step runs on.

use crate::vault::error::{VaultError, VaultErrorKind};

use serde::Deserialize;
use std::env;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_TIMEOUT: Duration = Duration::from_secs(5);

/// A bearer token for one scope.
#[derive(Clone)]
pub struct AccessToken {
    token: String,
}

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        AccessToken { token: token.into() }
    }

    pub fn secret(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

#[allow(async_fn_in_trait)]
pub trait TokenCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, VaultError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Clone, PartialEq)]
pub(crate) enum CredentialSource {
    ClientSecret {
        authority_host: String,
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
    ManagedIdentity {
        endpoint: ManagedIdentityEndpoint,
        client_id: Option<String>,
    },
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientSecret { tenant_id, client_id, .. } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            Self::ManagedIdentity { endpoint, client_id } => f
                .debug_struct("ManagedIdentity")
                .field("endpoint", endpoint)
                .field("client_id", client_id)
                .finish(),
        }
    }
}

#[derive(Clone, PartialEq)]
pub(crate) enum ManagedIdentityEndpoint {
    /// `IDENTITY_ENDPOINT` / `IDENTITY_HEADER`.
    AppService { endpoint: String, header: String },
    /// `MSI_ENDPOINT` / `MSI_SECRET`, as set on AzureML compute.
    MachineLearning { endpoint: String, secret: String },
    Imds,
}

impl fmt::Debug for ManagedIdentityEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AppService { endpoint, .. } => write!(f, "AppService({endpoint})"),
            Self::MachineLearning { endpoint, .. } => write!(f, "MachineLearning({endpoint})"),
            Self::Imds => write!(f, "Imds"),
        }
    }
}

impl CredentialSource {
    fn name(&self) -> &'static str {
        match self {
            Self::ClientSecret { .. } => "EnvironmentCredential",
            Self::ManagedIdentity { .. } => "ManagedIdentityCredential",
        }
    }

    fn request(&self, http: &reqwest::Client, scope: &str) -> (reqwest::RequestBuilder, String) {
        match self {
            Self::ClientSecret { authority_host, tenant_id, client_id, client_secret } => {
                let endpoint = format!(
                    "{}/{}/oauth2/v2.0/token",
                    authority_host.trim_end_matches('/'),
                    tenant_id
                );
                let request = http.post(&endpoint).form(&[
                    ("client_id", client_id.as_str()),
                    ("client_secret", client_secret.as_str()),
                    ("scope", scope),
                    ("grant_type", "client_credentials"),
                ]);
                (request, endpoint)
            }
            Self::ManagedIdentity { endpoint, client_id } => {
                let resource = scope.trim_end_matches("/.default");
                match endpoint {
                    ManagedIdentityEndpoint::AppService { endpoint, header } => {
                        let mut request = http
                            .get(endpoint)
                            .header("X-IDENTITY-HEADER", header)
                            .query(&[("api-version", "2019-08-01"), ("resource", resource)]);
                        if let Some(client_id) = client_id {
                            request = request.query(&[("client_id", client_id)]);
                        }
                        (request, endpoint.clone())
                    }
                    ManagedIdentityEndpoint::MachineLearning { endpoint, secret } => {
                        let mut request = http
                            .get(endpoint)
                            .header("secret", secret)
                            .query(&[("api-version", "2017-09-01"), ("resource", resource)]);
                        if let Some(client_id) = client_id {
                            request = request.query(&[("clientid", client_id)]);
                        }
                        (request, endpoint.clone())
                    }
                    ManagedIdentityEndpoint::Imds => {
                        let mut request = http
                            .get(IMDS_ENDPOINT)
                            .header("Metadata", "true")
                            .timeout(IMDS_TIMEOUT)
                            .query(&[("api-version", "2018-02-01"), ("resource", resource)]);
                        if let Some(client_id) = client_id {
                            request = request.query(&[("client_id", client_id)]);
                        }
                        (request, IMDS_ENDPOINT.to_string())
                    }
                }
            }
        }
    }

    async fn get_token(&self, http: &reqwest::Client, scope: &str) -> Result<AccessToken, VaultError> {
        let (request, endpoint) = self.request(http, scope);

        let response = request
            .send()
            .await
            .map_err(|source| VaultError::new(VaultErrorKind::Request {
                source, endpoint: endpoint.clone()
            }))?;

        let status = response.status();
        if !status.is_success() {
            let message = match response.text().await {
                Ok(message) => message,
                Err(error) => {
                    debug!(%endpoint, %error, "failed to read the error response body");
                    String::new()
                }
            };
            return Err(VaultError::new(VaultErrorKind::Status { status, endpoint, message }));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|source| VaultError::new(VaultErrorKind::Decode { source, endpoint }))?;

        Ok(AccessToken::new(body.access_token))
    }
}

/// Tries each configured source in turn and returns the first token.
#[derive(Clone, Debug)]
pub struct DefaultCredential {
    http: reqwest::Client,
    pub(crate) sources: Vec<CredentialSource>,
}

impl DefaultCredential {
    /// Configure the chain from the process environment.
    pub fn from_env() -> Result<Self, VaultError> {
        DefaultCredential::from_lookup(|name| env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, VaultError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|source| VaultError::new(VaultErrorKind::Build(source)))?;

        Ok(DefaultCredential { http, sources: DefaultCredential::sources(lookup) })
    }

    pub(crate) fn sources<F>(lookup: F) -> Vec<CredentialSource>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());
        let mut sources = vec![];

        if let (Some(tenant_id), Some(client_id), Some(client_secret)) = (
            var("AZURE_TENANT_ID"),
            var("AZURE_CLIENT_ID"),
            var("AZURE_CLIENT_SECRET"),
        ) {
            sources.push(CredentialSource::ClientSecret {
                authority_host: var("AZURE_AUTHORITY_HOST")
                    .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
                tenant_id,
                client_id,
                client_secret,
            });
        }

        let endpoint = match (
            var("IDENTITY_ENDPOINT"),
            var("IDENTITY_HEADER"),
            var("MSI_ENDPOINT"),
            var("MSI_SECRET"),
        ) {
            (Some(endpoint), Some(header), _, _) => ManagedIdentityEndpoint::AppService { endpoint, header },
            (_, _, Some(endpoint), Some(secret)) => ManagedIdentityEndpoint::MachineLearning { endpoint, secret },
            _ => ManagedIdentityEndpoint::Imds,
        };

        sources.push(CredentialSource::ManagedIdentity {
            endpoint,
            client_id: var("DEFAULT_IDENTITY_CLIENT_ID").or_else(|| var("AZURE_CLIENT_ID")),
        });

        sources
    }
}

impl TokenCredential for DefaultCredential {
    async fn get_token(&self, scope: &str) -> Result<AccessToken, VaultError> {
        let mut failures = vec![];

        for source in &self.sources {
            match source.get_token(&self.http, scope).await {
                Ok(token) => {
                    info!("authenticated with {}", source.name());
                    return Ok(token);
                }
                Err(error) => {
                    debug!(source = source.name(), %error, "credential source failed");
                    failures.push(format!("{}: {}", source.name(), error));
                }
            }
        }

        Err(VaultError::new(VaultErrorKind::CredentialUnavailable(failures)))
    }
}
