//! Azure Key Vault secret retrieval.

mod credential;
pub(crate) mod error;

pub use credential::{AccessToken, DefaultCredential, TokenCredential};
pub use error::VaultError;

use error::VaultErrorKind;
use serde::Deserialize;
use std::fmt;
use tracing::debug;
use url::Url;

const KEYVAULT_SCOPE: &str = "https://vault.azure.net/.default";
const KEYVAULT_API_VERSION: &str = "7.4";

/// A secret value. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

#[allow(async_fn_in_trait)]
pub trait SecretStore {
    async fn get_secret(&self, name: &str) -> Result<Secret, VaultError>;
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String,
}

#[derive(Debug, Deserialize)]
struct KeyVaultErrorBody {
    error: KeyVaultErrorDetail,
}

#[derive(Debug, Deserialize)]
struct KeyVaultErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Reads secrets from one vault with a bearer token from `C`.
#[derive(Clone, Debug)]
pub struct KeyVaultClient<C = DefaultCredential> {
    http: reqwest::Client,
    vault_url: Url,
    credential: C,
}

impl<C: TokenCredential> KeyVaultClient<C> {
    pub fn new(vault_url: &str, credential: C) -> Result<Self, VaultError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|source| VaultError::new(VaultErrorKind::Build(source)))?;

        Ok(KeyVaultClient {
            http,
            vault_url: KeyVaultClient::<C>::parse_vault_url(vault_url)?,
            credential,
        })
    }

    pub(crate) fn parse_vault_url(vault_url: &str) -> Result<Url, VaultError> {
        let invalid = |source: Option<url::ParseError>, msg: &str| {
            VaultError::new(VaultErrorKind::InvalidVaultUrl {
                source,
                vault_url: vault_url.to_string(),
                msg: msg.to_string(),
            })
        };

        let mut url = Url::parse(vault_url.trim())
            .map_err(|source| invalid(Some(source), "failed to parse vault URL"))?;

        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(invalid(None, "the vault URL must use 'https://'"));
        }

        url.set_path("/");
        url.set_query(None);
        url.set_fragment(None);

        Ok(url)
    }

    pub(crate) fn secret_url(&self, name: &str) -> Url {
        let mut url = self.vault_url.clone();
        // http(s) URLs can always be a base
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["secrets", name]);
        }
        url.query_pairs_mut().append_pair("api-version", KEYVAULT_API_VERSION);
        url
    }
}

impl<C: TokenCredential> SecretStore for KeyVaultClient<C> {
    async fn get_secret(&self, name: &str) -> Result<Secret, VaultError> {
        let token = self.credential.get_token(KEYVAULT_SCOPE).await?;

        let url = self.secret_url(name);
        let endpoint = url.to_string();
        debug!(%endpoint, "GET secret");

        let response = self.http
            .get(url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|source| VaultError::new(VaultErrorKind::Request {
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
            let message = match serde_json::from_str::<KeyVaultErrorBody>(&body) {
                Ok(KeyVaultErrorBody { error: KeyVaultErrorDetail { code, message } }) => format!(
                    "{} {}",
                    code.unwrap_or_default(),
                    message.unwrap_or_default()
                ).trim().to_string(),
                Err(_) => body,
            };
            return Err(VaultError::new(VaultErrorKind::Status { status, endpoint, message }));
        }

        let bundle: SecretBundle = response
            .json()
            .await
            .map_err(|source| VaultError::new(VaultErrorKind::Decode { source, endpoint }))?;

        Ok(Secret::new(bundle.value))
    }
}
