use reqwest::Method;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::config::Credential;
use crate::error::{Error, Result, http_error};
use crate::job::Job;
use crate::lifecycle;
use crate::request::ProductRequest;
use crate::util::retriable_status;

// Upper bound for pre-allocating the download buffer from a declared length.
const MAX_PREALLOC: u64 = 64 * 1024 * 1024;

/// Runtime behaviour of a [`Client`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-request HTTP timeout.
    pub timeout: Duration,
    /// Maximum number of status polls before giving up on a queued/running job.
    pub max_retries: usize,
    /// Fixed wait between two polls.
    pub poll_interval: Duration,
    /// Delete the job on the server once its result is stored locally.
    pub delete_after_download: bool,
    /// Extra attempts for a request that failed to connect or hit a retriable status.
    pub transport_retries: usize,
    pub transport_retry_sleep: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_retries: 120,
            poll_interval: Duration::from_secs(60),
            delete_after_download: true,
            transport_retries: 3,
            transport_retry_sleep: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_delete_after_download(mut self, delete: bool) -> Self {
        self.delete_after_download = delete;
        self
    }

    pub fn with_transport_retries(mut self, retries: usize, sleep: Duration) -> Self {
        self.transport_retries = retries;
        self.transport_retry_sleep = sleep;
        self
    }
}

/// Contents of `status.json`. A missing or `null` list reads as empty.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServiceStatus {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub warning: Vec<Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub info: Vec<Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<Vec<Value>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl ServiceStatus {
    /// Fails when the store announces any warning.
    pub fn ensure_operational(&self) -> Result<()> {
        if self.warning.is_empty() {
            return Ok(());
        }
        Err(Error::ServiceWarning {
            warnings: self.warning.iter().map(describe_notice).collect(),
        })
    }
}

fn describe_notice(notice: &Value) -> String {
    match notice {
        Value::String(s) => s.clone(),
        Value::Object(o) => o
            .get("message")
            .or_else(|| o.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| notice.to_string()),
        other => other.to_string(),
    }
}

/// The five remote operations the job lifecycle is built on.
pub trait JobApi {
    fn service_status(&self) -> Result<ServiceStatus>;
    fn submit(&self, product: &str, body: &Value) -> Result<Job>;
    /// Refreshes `job` in place from the server.
    fn poll(&self, job: &mut Job) -> Result<()>;
    /// Fetches the complete result of a completed job into memory.
    fn download(&self, job: &Job) -> Result<Vec<u8>>;
    fn delete(&self, job: &Job) -> Result<()>;
}

/// Blocking Atmosphere Data Store client holding one HTTP session.
#[derive(Debug, Clone)]
pub struct Client {
    credential: Credential,
    config: ClientConfig,
    http: HttpClient,
}

impl Client {
    /// Creates a client from the credential file named by `ADSAPI_RC`.
    pub fn from_env(config: ClientConfig) -> Result<Self> {
        Self::new(Credential::load(None)?, config)
    }

    pub fn new(credential: Credential, config: ClientConfig) -> Result<Self> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("cams-download/{}", env!("CARGO_PKG_VERSION")))
                .unwrap_or(HeaderValue::from_static("cams-download")),
        );

        let mut builder = HttpClient::builder()
            .default_headers(default_headers)
            .timeout(config.timeout);

        if !credential.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(|source| Error::Transport {
            url: credential.base_url.clone(),
            source,
        })?;

        Ok(Self {
            credential,
            config,
            http,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs a full retrieval: status check, submit, wait, download and optional
    /// cleanup. Returns the path of the stored file.
    pub fn retrieve(
        &self,
        request: &ProductRequest,
        output_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        lifecycle::retrieve(self, request, output_dir, &self.config, cancel)
    }

    fn base_url(&self) -> &str {
        self.credential.base_url.trim_end_matches('/')
    }

    fn task_url(&self, job: &Job) -> String {
        format!("{}/tasks/{}", self.base_url(), job.id)
    }

    fn apply_auth(&self, req: RequestBuilder) -> RequestBuilder {
        req.basic_auth(&self.credential.user, Some(&self.credential.secret))
    }

    /// Sends one request and returns the body of a successful response.
    fn api_call(&self, method: Method, url: &str, body: Option<&Value>) -> Result<String> {
        let resp = self.robust_request(url, method.is_idempotent(), || {
            let mut req = self.apply_auth(self.http.request(method.clone(), url));
            if let Some(body) = body {
                req = req.json(body);
            }
            req.send()
        })?;

        let status = resp.status();
        let text = resp.text().map_err(|source| Error::Transport {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(http_error(status, url, &text));
        }
        Ok(text)
    }

    /// Sends the request built by `f`, retrying transient failures up to
    /// `transport_retries` times.
    ///
    /// A request that is not idempotent (a submission) is only replayed when
    /// the server cannot have acted on it: the connection was never
    /// established, or the reply was 429 or 503. A timeout or a gateway error
    /// may follow an accepted submission, so those are returned as is.
    fn robust_request<F>(&self, url: &str, idempotent: bool, mut f: F) -> Result<Response>
    where
        F: FnMut() -> std::result::Result<Response, reqwest::Error>,
    {
        let mut tries = 0usize;
        loop {
            match f() {
                Ok(resp) => {
                    let code = resp.status().as_u16();
                    let replayable = if idempotent {
                        retriable_status(code)
                    } else {
                        matches!(code, 429 | 503)
                    };
                    if replayable && tries < self.config.transport_retries {
                        tries += 1;
                        warn!(%url, status = code, attempt = tries, "retriable HTTP status, retrying");
                        thread::sleep(self.config.transport_retry_sleep);
                        continue;
                    }
                    return Ok(resp);
                }
                Err(source) => {
                    let replayable = idempotent || source.is_connect();
                    if !replayable || tries >= self.config.transport_retries {
                        return Err(Error::Transport {
                            url: url.to_string(),
                            source,
                        });
                    }
                    tries += 1;
                    warn!(%url, error = %source, attempt = tries, "request failed, retrying");
                    thread::sleep(self.config.transport_retry_sleep);
                }
            }
        }
    }
}

impl JobApi for Client {
    fn service_status(&self) -> Result<ServiceStatus> {
        let url = format!("{}/status.json", self.base_url());
        let text = self.api_call(Method::GET, &url, None)?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| Error::protocol(&url, format!("response is not JSON: {}", e)))?;
        if !value.is_object() {
            return Err(Error::protocol(&url, "response is not a JSON object"));
        }
        serde_json::from_value(value).map_err(|e| Error::protocol(&url, e.to_string()))
    }

    fn submit(&self, product: &str, body: &Value) -> Result<Job> {
        let url = format!("{}/resources/{}", self.base_url(), product);
        debug!(%url, %body, "submitting request");
        let text = self.api_call(Method::POST, &url, Some(body))?;
        Job::from_submit_reply(&text, self.base_url(), &url)
    }

    fn poll(&self, job: &mut Job) -> Result<()> {
        let url = self.task_url(job);
        let text = self.api_call(Method::GET, &url, None)?;
        job.apply_reply(&text, self.base_url(), &url)
    }

    fn download(&self, job: &Job) -> Result<Vec<u8>> {
        let file = job.remote_file()?;
        let url = file.location.as_str();
        let mut resp =
            self.robust_request(url, true, || self.apply_auth(self.http.get(url)).send())?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(http_error(status, url, &text));
        }

        let mut body = Vec::with_capacity(file.content_length.min(MAX_PREALLOC) as usize);
        resp.read_to_end(&mut body)
            .map_err(|source| Error::Interrupted {
                url: url.to_string(),
                source,
            })?;
        Ok(body)
    }

    fn delete(&self, job: &Job) -> Result<()> {
        let url = self.task_url(job);
        // A single attempt; deletion is cleanup.
        let resp = self
            .apply_auth(self.http.delete(&url))
            .send()
            .map_err(|source| Error::Transport {
                url: url.clone(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().unwrap_or_default();
            return Err(http_error(status, &url, &text));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn default_config_polls_at_a_fixed_interval() {
        let cfg = ClientConfig::default()
            .with_max_retries(5)
            .with_poll_interval(Duration::from_secs(2))
            .with_delete_after_download(false);
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert!(!cfg.delete_after_download);
    }

    #[test]
    fn quiet_status_is_operational() {
        let status: ServiceStatus = serde_json::from_value(json!({"info": ["all good"]})).unwrap();
        assert!(status.ensure_operational().is_ok());
    }

    #[test]
    fn null_notice_lists_are_empty() {
        let status: ServiceStatus =
            serde_json::from_value(json!({"warning": null, "info": null})).unwrap();
        assert_eq!(status, ServiceStatus::default());
        assert!(status.ensure_operational().is_ok());
    }

    #[test]
    fn warnings_block_submission() {
        let status: ServiceStatus = serde_json::from_value(json!({
            "warning": ["maintenance", {"message": "queue paused"}, 42]
        }))
        .unwrap();
        let err = status.ensure_operational().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Service);
        match err {
            Error::ServiceWarning { warnings } => {
                assert_eq!(warnings, vec!["maintenance", "queue paused", "42"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn client_builds_without_tls_verification() {
        let credential = Credential {
            base_url: "https://ads.example/api/v2/".into(),
            user: "u".into(),
            secret: "s".into(),
            verify_tls: false,
        };
        let client = Client::new(credential, ClientConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://ads.example/api/v2");
    }
}
