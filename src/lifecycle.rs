use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::client::{ClientConfig, JobApi};
use crate::download;
use crate::error::{Error, Result};
use crate::job::{Job, JobState};
use crate::request::ProductRequest;

/// Runs one request end to end: submit, poll at a fixed interval, download,
/// clean up. Returns the path of the stored file.
pub fn retrieve<A: JobApi + ?Sized>(
    api: &A,
    request: &ProductRequest,
    output_dir: &Path,
    config: &ClientConfig,
    cancel: &CancelToken,
) -> Result<PathBuf> {
    api.service_status()?.ensure_operational()?;

    let body = request.to_body()?;
    let target = request.destination(output_dir);
    let product = request.kind().product_name();

    let mut job = api.submit(product, &body)?;
    info!(job = %job.id, %product, state = %job.state, "request submitted");

    wait_for_completion(api, &mut job, config, cancel)?;
    let path = download::fetch_to(api, &job, &target)?;

    if config.delete_after_download {
        match api.delete(&job) {
            Ok(()) => info!(job = %job.id, "deleted job on server"),
            Err(e) => warn!(job = %job.id, error = %e, "could not delete job on server"),
        }
    }
    Ok(path)
}

/// Polls `job` until it leaves the queued/running states.
///
/// At most `config.max_retries` polls are made, each preceded by a wait of
/// `config.poll_interval`. Returns once the job is completed.
pub fn wait_for_completion<A: JobApi + ?Sized>(
    api: &A,
    job: &mut Job,
    config: &ClientConfig,
    cancel: &CancelToken,
) -> Result<()> {
    let mut polls = 0usize;
    loop {
        match &job.state {
            JobState::Completed => return Ok(()),
            JobState::Failed => {
                return Err(Error::JobFailed {
                    id: job.id.clone(),
                    message: job
                        .error
                        .clone()
                        .unwrap_or_else(|| "request failed".to_string()),
                });
            }
            JobState::Invalid(raw) => {
                return Err(Error::InvalidState {
                    id: job.id.clone(),
                    state: raw.clone(),
                });
            }
            JobState::Queued | JobState::Running => {}
        }

        if polls >= config.max_retries {
            return Err(Error::RetriesExhausted {
                id: job.id.clone(),
                state: job.state.clone(),
                attempts: polls,
            });
        }
        if cancel.wait(config.poll_interval) {
            return Err(Error::Cancelled { id: job.id.clone() });
        }

        let previous = job.state.clone();
        api.poll(job)?;
        polls += 1;
        if job.state != previous {
            info!(job = %job.id, state = %job.state, polls, "job state changed");
        }
    }
}
