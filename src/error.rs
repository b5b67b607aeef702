use crate::client::ClientError;
use crate::io::IoError;
use crate::job::RunId;
use crate::vault::VaultError;

use core::fmt;
use std::error::Error;
use std::time::Duration;

/// Wraps every failure of a pipeline step into one error type.
#[derive(Debug)]
pub struct StepError {
    pub(crate) kind: StepErrorKind,
}

impl StepError {
    pub(crate) fn new(kind: StepErrorKind) -> Self {
        StepError { kind }
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StepError: {}", self.kind)
    }
}

impl Error for StepError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		Some(&self.kind)
	}
}

impl From<ClientError> for StepError {
    fn from(error: ClientError) -> Self {
        StepError::new(StepErrorKind::Client(error))
    }
}

impl From<VaultError> for StepError {
    fn from(error: VaultError) -> Self {
        StepError::new(StepErrorKind::Vault(error))
    }
}

impl From<IoError> for StepError {
    fn from(error: IoError) -> Self {
        StepError::new(StepErrorKind::Io(error))
    }
}

#[derive(Debug)]
pub(crate) enum StepErrorKind {
    Cancelled { stage: &'static str },
    Client(ClientError),
    Io(IoError),
    MissingEnvironment(&'static str),
    PollAttemptsExhausted { run_id: RunId, attempts: u32 },
    PollCancelled { run_id: RunId },
    PollTimeout { run_id: RunId, timeout: Duration },
    Vault(VaultError),
}

impl fmt::Display for StepErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled { stage } => write!(f, "Cancelled while {stage}"),
            Self::Client(_) => write!(f, "Databricks client error"),
            Self::Io(_) => write!(f, "Table loading error"),
            Self::MissingEnvironment(name) => write!(f, "Environment variable '{name}' is not set"),
            Self::PollAttemptsExhausted { run_id, attempts } => write!(
                f, "Run {run_id} did not terminate after {attempts} status checks"
            ),
            Self::PollCancelled { run_id } => write!(f, "Stopped waiting for run {run_id}"),
            Self::PollTimeout { run_id, timeout } => write!(
                f, "Run {run_id} did not terminate within {}s", timeout.as_secs()
            ),
            Self::Vault(_) => write!(f, "Key Vault error"),
        }
    }
}

impl Error for StepErrorKind {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			Self::Client(source) => Some(source),
			Self::Io(source) => Some(source),
			Self::Vault(source) => Some(source),
			_ => None,
		}
	}
}
