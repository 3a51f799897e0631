use reqwest::StatusCode;
use std::path::PathBuf;

use crate::job::JobState;
use crate::util::retriable_status;

pub type Result<T, E = Error> = std::result::Result<T, E>;

const RESUME_HINT: &str =
    "the job is kept on the server; rerun with identical parameters to resume it";

/// Broad failure class of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing credentials or environment.
    Config,
    /// Invalid user input (dates, coordinates, request fields).
    Validation,
    /// Connection, TLS or mid-stream failure, or a retriable HTTP status
    /// that outlasted the transport retries.
    Transport,
    /// Malformed or schema-violating server response, or a rejected request.
    Protocol,
    /// The store reported warnings on its status page.
    Service,
    /// Terminal `failed` job state or retry exhaustion.
    Job,
    /// Downloaded size differs from the declared size.
    Integrity,
    /// Local file read/write failure.
    Io,
    /// A wait was interrupted by the caller.
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{}:{line}: unrecognized credential entry `{content}`", .path.display())]
    CredentialSyntax {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("could not connect to {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("transfer from {url} was interrupted")]
    Interrupted {
        url: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    Http {
        status: StatusCode,
        url: String,
        message: String,
    },

    #[error("unexpected response from {url}: {reason}")]
    Protocol { url: String, reason: String },

    #[error("job {id} reported unrecognized state [{state}]")]
    InvalidState { id: String, state: String },

    #[error("data store reports warnings, refusing to submit: {}", .warnings.join("; "))]
    ServiceWarning { warnings: Vec<String> },

    #[error("job {id} failed: {message}")]
    JobFailed { id: String, message: String },

    #[error("job {id} still {state} after {attempts} polls; {}", RESUME_HINT)]
    RetriesExhausted {
        id: String,
        state: JobState,
        attempts: usize,
    },

    #[error("waiting for job {id} was cancelled; {}", RESUME_HINT)]
    Cancelled { id: String },

    #[error("download of job {id} is incomplete: received {actual} byte(s), expected {expected}")]
    Integrity {
        id: String,
        expected: u64,
        actual: u64,
    },

    #[error("failed to {action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) | Error::CredentialSyntax { .. } => ErrorKind::Config,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Transport { .. } | Error::Interrupted { .. } => ErrorKind::Transport,
            Error::Http { status, .. } if retriable_status(status.as_u16()) => {
                ErrorKind::Transport
            }
            Error::Http { .. } | Error::Protocol { .. } | Error::InvalidState { .. } => {
                ErrorKind::Protocol
            }
            Error::ServiceWarning { .. } => ErrorKind::Service,
            Error::JobFailed { .. } | Error::RetriesExhausted { .. } => ErrorKind::Job,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::Integrity { .. } => ErrorKind::Integrity,
            Error::Io { .. } => ErrorKind::Io,
        }
    }

    /// Whether repeating the same call could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transport { .. } | Error::Interrupted { .. } => true,
            Error::Http { status, .. } => retriable_status(status.as_u16()),
            _ => false,
        }
    }

    pub(crate) fn protocol(url: &str, reason: impl Into<String>) -> Self {
        Error::Protocol {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct ApiErrorResponse {
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) reason: Option<String>,
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) detail: Option<String>,
    // Some endpoints nest the payload as {"error": {"message":...,"reason":...}}
    #[serde(default)]
    pub(crate) error: Option<Box<ApiErrorResponse>>,
}

impl ApiErrorResponse {
    fn headline(&self) -> &str {
        self.message
            .as_deref()
            .or(self.title.as_deref())
            .or_else(|| self.error.as_deref().map(ApiErrorResponse::headline))
            .unwrap_or("")
    }

    fn explanation(&self) -> &str {
        self.reason
            .as_deref()
            .or(self.detail.as_deref())
            .or_else(|| self.error.as_deref().map(ApiErrorResponse::explanation))
            .unwrap_or("")
    }
}

pub(crate) fn http_error(status: StatusCode, url: &str, body: &str) -> Error {
    let payload = serde_json::from_str::<ApiErrorResponse>(body).unwrap_or_default();
    let headline = payload.headline();
    let explanation = payload.explanation();

    // Licence not accepted is the most common 403; point at the fix.
    let looks_like_licence = status == StatusCode::FORBIDDEN
        && (headline.to_lowercase().contains("licence")
            || explanation.to_lowercase().contains("licence"));

    let message = if looks_like_licence {
        format!(
            "ADS returned 403: the dataset licence has not been accepted.\n\nHow to fix:\n1) Sign in at https://ads.atmosphere.copernicus.eu\n2) Open the dataset page and accept its licence\n3) Re-run this program\n\nServer message: {} {}",
            headline, explanation
        )
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        format!(
            "ADS authentication failed (HTTP {}).\n- Check that `key:` in the credential file is `<UID>:<APIKEY>`\n- Check that `url:` points at the Atmosphere Data Store\n\nServer message: {} {}\nrequest: {}",
            status.as_u16(),
            headline,
            explanation,
            url
        )
    } else if status == StatusCode::NOT_FOUND {
        format!(
            "ADS endpoint not found (HTTP 404).\n- The configured base URL may be wrong (expected e.g. https://ads.atmosphere.copernicus.eu/api/v2)\n\nServer message: {} {}\nrequest: {}",
            headline, explanation, url
        )
    } else if headline.is_empty() && explanation.is_empty() {
        format!("API request failed: HTTP {} for url ({})\n{}", status.as_u16(), url, body)
    } else {
        format!(
            "API request failed: HTTP {} for url ({})\n{}\n{}",
            status.as_u16(),
            url,
            headline,
            explanation
        )
    };

    Error::Http {
        status,
        url: url.to_string(),
        message,
    }
}
