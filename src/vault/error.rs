use std::error::Error;
use std::fmt;


/// Errors raised while obtaining a token or reading a secret.
#[derive(Debug)]
#[non_exhaustive]
pub struct VaultError {
    pub(crate) kind: VaultErrorKind
}

impl VaultError {
    pub(crate) fn new(kind: VaultErrorKind) -> Self {
        VaultError { kind }
    }
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VaultError: {}", self.kind)
    }
}

impl Error for VaultError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		Some(&self.kind)
	}
}

#[derive(Debug)]
pub(crate) enum VaultErrorKind {
    Build(reqwest::Error),
    CredentialUnavailable(Vec<String>),
    Decode { source: reqwest::Error, endpoint: String },
    InvalidVaultUrl { source: Option<url::ParseError>, vault_url: String, msg: String },
    Request { source: reqwest::Error, endpoint: String },
    Status { status: http::StatusCode, endpoint: String, message: String },
}

impl fmt::Display for VaultErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build(_) => write!(f, "Failed to build the HTTP client."),
            Self::CredentialUnavailable(attempts) => write!(
                f, "No credential could provide a token: [{}]", attempts.join("; ")
            ),
            Self::Decode { endpoint, .. } => write!(f, "Failed to decode the response of '{endpoint}'."),
            Self::InvalidVaultUrl { vault_url, msg, .. } => write!(
                f, "Failed to parse the vault URL '{vault_url}': {msg}. Please use the vault URI, e.g., 'https://my-vault.vault.azure.net/'."
            ),
            Self::Request { endpoint, .. } => write!(f, "Request to '{endpoint}' failed."),
            Self::Status { status, endpoint, message } => write!(
                f, "Request to '{endpoint}' failed with status '{status}': {message}"
            ),
        }
    }
}

impl Error for VaultErrorKind {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::Build(source) => Some(source),
			Self::Decode { source, .. } => Some(source),
			Self::InvalidVaultUrl { source, .. } => match source {
                Some(src) => Some(src),
                None => None
            },
			Self::Request { source, .. } => Some(source),
			_ => None,
		}
	}
}
