//! Polling for asynchronous provider jobs (video renders, upload processing).

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::StageError;

/// What a single status check reported
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus<T> {
    /// Still queued or running
    Pending,

    /// Finished with a result
    Done(T),

    /// Provider reports the job failed
    Failed(String),
}

/// Why polling stopped without a result
#[derive(Debug)]
pub enum PollFailure {
    Failed(String),
    TimedOut(Duration),
    Check(StageError),
}

/// Poll `check` every `interval` until the job is done, fails, or `timeout`
/// elapses. The first check happens immediately.
pub async fn poll_job<T, F, Fut>(
    job_id: &str,
    interval: Duration,
    timeout: Duration,
    mut check: F,
) -> Result<T, PollFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<JobStatus<T>, StageError>>,
{
    let started = Instant::now();
    let mut polls = 0u32;

    loop {
        polls += 1;
        match check().await.map_err(PollFailure::Check)? {
            JobStatus::Done(value) => {
                debug!(job_id, polls, "Job finished");
                return Ok(value);
            }
            JobStatus::Failed(message) => return Err(PollFailure::Failed(message)),
            JobStatus::Pending => {}
        }

        let waited = started.elapsed();
        if waited >= timeout {
            return Err(PollFailure::TimedOut(waited));
        }

        debug!(job_id, polls, "Job pending");
        tokio::time::sleep(interval.min(timeout - waited)).await;
    }
}
