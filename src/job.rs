use std::fmt;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::util::urljoin;

/// Server-side lifecycle state of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    /// Anything the service should never report; carries the raw value.
    Invalid(String),
}

impl JobState {
    pub fn from_wire(state: &str) -> Self {
        match state {
            "queued" => JobState::Queued,
            "running" => JobState::Running,
            "completed" => JobState::Completed,
            "failed" => JobState::Failed,
            other => JobState::Invalid(other.to_string()),
        }
    }

    /// Queued or running.
    pub fn is_pending(&self) -> bool {
        matches!(self, JobState::Queued | JobState::Running)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Queued => f.write_str("queued"),
            JobState::Running => f.write_str("running"),
            JobState::Completed => f.write_str("completed"),
            JobState::Failed => f.write_str("failed"),
            JobState::Invalid(raw) => write!(f, "invalid ({})", raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    /// Download URL.
    pub location: String,
    /// Expected content length (bytes).
    pub content_length: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: String,
    pub state: JobState,
    /// Only set once the job is completed.
    pub remote: Option<RemoteFile>,
    /// Server explanation for a failed job.
    pub error: Option<String>,
}

impl Job {
    /// Builds a job from a submission response, which must carry `request_id`.
    pub(crate) fn from_submit_reply(body: &str, base_url: &str, url: &str) -> Result<Self> {
        let reply = JobReply::parse(body, base_url, url)?;
        let id = reply
            .request_id
            .ok_or_else(|| Error::protocol(url, "missing string field `request_id`"))?;
        Ok(Self {
            id,
            state: reply.state,
            remote: reply.remote,
            error: reply.error,
        })
    }

    /// Overwrites state, download info and error from a task status response.
    pub(crate) fn apply_reply(&mut self, body: &str, base_url: &str, url: &str) -> Result<()> {
        let reply = JobReply::parse(body, base_url, url)?;
        if let Some(id) = reply.request_id.as_deref() {
            if id != self.id {
                return Err(Error::protocol(
                    url,
                    format!("status reply is for job {} instead of {}", id, self.id),
                ));
            }
        }
        self.state = reply.state;
        self.remote = reply.remote;
        self.error = reply.error;
        Ok(())
    }

    /// The download target of a completed job.
    pub fn remote_file(&self) -> Result<&RemoteFile> {
        match (&self.state, &self.remote) {
            (JobState::Completed, Some(remote)) => Ok(remote),
            _ => Err(Error::Validation(format!(
                "job {} has no result to download (state {})",
                self.id, self.state
            ))),
        }
    }
}

/// Decoded `{state, request_id, location, content_length, error}` object.
#[derive(Debug)]
struct JobReply {
    state: JobState,
    request_id: Option<String>,
    remote: Option<RemoteFile>,
    error: Option<String>,
}

impl JobReply {
    fn parse(body: &str, base_url: &str, url: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| Error::protocol(url, format!("response is not JSON: {}", e)))?;
        let obj = value
            .as_object()
            .ok_or_else(|| Error::protocol(url, "response is not a JSON object"))?;

        let state = JobState::from_wire(required_str(obj, "state", url)?);
        let request_id = optional_str(obj, "request_id", url)?.map(str::to_string);

        let remote = if state == JobState::Completed {
            let location = required_str(obj, "location", url)?;
            let content_length = obj
                .get("content_length")
                .ok_or_else(|| Error::protocol(url, "missing field `content_length`"))?
                .as_u64()
                .ok_or_else(|| {
                    Error::protocol(url, "field `content_length` is not a byte count")
                })?;
            Some(RemoteFile {
                location: urljoin(base_url, location),
                content_length,
            })
        } else {
            None
        };

        let error = if state == JobState::Failed {
            Some(failure_message(obj))
        } else {
            None
        };

        Ok(Self {
            state,
            request_id,
            remote,
            error,
        })
    }
}

fn required_str<'a>(obj: &'a Map<String, Value>, field: &str, url: &str) -> Result<&'a str> {
    optional_str(obj, field, url)?
        .ok_or_else(|| Error::protocol(url, format!("missing string field `{}`", field)))
}

fn optional_str<'a>(
    obj: &'a Map<String, Value>,
    field: &str,
    url: &str,
) -> Result<Option<&'a str>> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(Error::protocol(
            url,
            format!("field `{}` is not a string", field),
        )),
    }
}

fn failure_message(obj: &Map<String, Value>) -> String {
    let error = obj.get("error");
    let field = |name: &str| {
        error
            .and_then(|e| e.get(name))
            .and_then(Value::as_str)
            .unwrap_or("")
    };
    let (message, reason) = (field("message"), field("reason"));
    match (message.is_empty(), reason.is_empty()) {
        (true, true) => "request failed".to_string(),
        (false, true) => message.to_string(),
        (true, false) => reason.to_string(),
        (false, false) => format!("{}. {}", message, reason),
    }
}
