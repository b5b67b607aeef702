use std::error::Error;
use std::fmt;
use url;


/// Errors raised while talking to the Databricks Jobs API.
#[derive(Debug)]
#[non_exhaustive]
pub struct ClientError {
    pub(crate) kind: ClientErrorKind
}

impl ClientError {
    pub(crate) fn new(kind: ClientErrorKind) -> Self {
        ClientError { kind }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientError: {}", self.kind)
    }
}

impl Error for ClientError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		Some(&self.kind)
	}
}

#[derive(Debug)]
pub(crate) enum ClientErrorKind {
    Build(reqwest::Error),
    Decode { source: reqwest::Error, endpoint: String },
    InvalidHeader { source: http::header::InvalidHeaderValue, header: &'static str },
    InvalidHost { source: Option<url::ParseError>, host: String, msg: String },
    Request { source: reqwest::Error, endpoint: String },
    Status { status: http::StatusCode, endpoint: String, body: String },
}

impl fmt::Display for ClientErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build(_) => write!(f, "Failed to build the HTTP client."),
            Self::Decode { endpoint, .. } => write!(f, "Failed to decode the response of '{endpoint}'."),
            Self::InvalidHeader { header, .. } => write!(f, "Value of header '{header}' is not a valid header value."),
            Self::InvalidHost { host, msg, .. } => write!(
                f, "Failed to parse the Databricks host '{host}': {msg}. Please use the workspace URL, e.g., 'https://adb-1234567890123456.7.azuredatabricks.net'."
            ),
            Self::Request { endpoint, .. } => write!(f, "Request to '{endpoint}' failed."),
            Self::Status { status, endpoint, body } => write!(
                f, "Request to '{endpoint}' failed with status '{status}': {body}"
            ),
        }
    }
}

impl Error for ClientErrorKind {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::Build(source) => Some(source),
			Self::Decode { source, .. } => Some(source),
			Self::InvalidHeader { source, .. } => Some(source),
			Self::InvalidHost { source, .. } => match source {
                Some(src) => Some(src),
                None => None
            },
			Self::Request { source, .. } => Some(source),
			Self::Status { .. } => None,
		}
	}
}
