use fhircohort_core::UnresolvableReference;
use thiserror::Error;

/// Errors raised while talking to the FHIR server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} from {url}: {message}")]
    Status {
        status: u16,
        url: String,
        message: String,
    },

    #[error("Failed to parse response JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not open session to {base_url}: {message}")]
    Connect { base_url: String, message: String },

    #[error("Bundle paging revisits {url}")]
    PagingLoop { url: String },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unresolvable reference: {0}")]
    Reference(#[from] UnresolvableReference),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<ClientError>,
    },
}

impl ClientError {
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    pub fn connect(base_url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connect {
            base_url: base_url.into(),
            message: message.into(),
        }
    }

    /// HTTP status of the failed request, if the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::RetriesExhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Whether asking the server again can change the outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::PagingLoop { .. })
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
