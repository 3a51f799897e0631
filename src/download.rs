use std::path::{Path, PathBuf};

use tracing::info;

use crate::client::JobApi;
use crate::error::{Error, Result};
use crate::job::Job;

/// Downloads the result of a completed `job`, checks its size against the
/// declared length and stores it at `target`. Nothing is written on mismatch.
pub(crate) fn fetch_to<A: JobApi + ?Sized>(api: &A, job: &Job, target: &Path) -> Result<PathBuf> {
    let expected = job.remote_file()?.content_length;
    let body = api.download(job)?;
    verify_length(job, expected, &body)?;

    std::fs::write(target, &body).map_err(|source| Error::Io {
        action: "write",
        path: target.to_path_buf(),
        source,
    })?;
    info!(job = %job.id, bytes = body.len(), path = %target.display(), "stored result");
    Ok(target.to_path_buf())
}

fn verify_length(job: &Job, expected: u64, body: &[u8]) -> Result<()> {
    let actual = body.len() as u64;
    if actual != expected {
        return Err(Error::Integrity {
            id: job.id.clone(),
            expected,
            actual,
        });
    }
    Ok(())
}
