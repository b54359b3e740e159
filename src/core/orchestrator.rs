// src/core/orchestrator.rs

//! Fault-isolated fan-out of a batch of jobs.
//!
//! Every job that is not skipped runs on its own tokio task, all at once,
//! with no concurrency cap. A job's failure (an `Err`, a panic while building
//! or polling its future, or a lost task) is turned into an `Error` record at
//! that job's boundary and never reaches its siblings or the caller.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::error::ProbeError;
use crate::core::models::JobResult;

/// The work a job performs. Invoked at most once.
pub type JobExecute<P> = Box<dyn FnOnce() -> BoxFuture<'static, Result<P, ProbeError>> + Send>;

/// Evaluated synchronously before launch; `true` means the job never starts.
pub type JobSkip = Box<dyn Fn() -> bool + Send>;

/// A named unit of scheduling.
pub struct JobSpec<P> {
    pub name: String,
    pub execute: JobExecute<P>,
    pub skip: Option<JobSkip>,
}

impl<P> JobSpec<P> {
    pub fn new<F>(name: impl Into<String>, execute: F) -> Self
    where
        F: FnOnce() -> BoxFuture<'static, Result<P, ProbeError>> + Send + 'static,
    {
        Self { name: name.into(), execute: Box::new(execute), skip: None }
    }

    pub fn with_skip<S>(mut self, skip: S) -> Self
    where
        S: Fn() -> bool + Send + 'static,
    {
        self.skip = Some(Box::new(skip));
        self
    }
}

impl<P> std::fmt::Debug for JobSpec<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSpec")
            .field("name", &self.name)
            .field("has_skip", &self.skip.is_some())
            .finish()
    }
}

enum Launched<P> {
    Settled(JobResult<P>),
    Running { name: String, started: Instant, handle: tokio::task::JoinHandle<JobResult<P>> },
}

/// Runs every job concurrently and returns one result per job, in submission order.
///
/// Waits for all jobs to settle. There is no batch-wide timeout and no
/// cancellation: a slow job prolongs the batch without holding up the others.
pub async fn run_jobs<P>(jobs: Vec<JobSpec<P>>) -> Vec<JobResult<P>>
where
    P: Send + 'static,
{
    info!(jobs = jobs.len(), "Launching job batch.");

    let launched: Vec<Launched<P>> = jobs.into_iter().map(launch).collect();

    let results = join_all(launched.into_iter().map(|job| async move {
        match job {
            Launched::Settled(result) => result,
            Launched::Running { name, started, handle } => match handle.await {
                Ok(result) => result,
                Err(e) => {
                    // Only reachable if the runtime drops the task; panics are caught inside it.
                    warn!(job = %name, error = %e, "Job task did not complete.");
                    JobResult::failure(&name, elapsed_ms(started), ProbeError::Join(e.to_string()).to_string())
                }
            },
        }
    }))
    .await;

    info!(jobs = results.len(), "Job batch settled.");
    results
}

fn launch<P>(job: JobSpec<P>) -> Launched<P>
where
    P: Send + 'static,
{
    let JobSpec { name, execute, skip } = job;
    let checked = Instant::now();

    if let Some(skip) = skip {
        match panic::catch_unwind(AssertUnwindSafe(|| skip())) {
            Ok(true) => {
                debug!(job = %name, "Skip predicate matched, job not started.");
                return Launched::Settled(JobResult::skipped(&name, elapsed_ms(checked)));
            }
            Ok(false) => {}
            Err(cause) => {
                let message = ProbeError::Panicked(format!("skip predicate: {}", panic_message(cause.as_ref()))).to_string();
                warn!(job = %name, error = %message, "Skip predicate panicked.");
                return Launched::Settled(JobResult::failure(&name, elapsed_ms(checked), message));
            }
        }
    }

    let task_name = name.clone();
    let started = Instant::now();
    let handle = tokio::spawn(async move {
        let started = Instant::now();
        debug!(job = %task_name, "Job started.");
        let outcome = AssertUnwindSafe(async move { execute().await }).catch_unwind().await;
        let duration = elapsed_ms(started);

        match outcome {
            Ok(Ok(data)) => {
                debug!(job = %task_name, duration, "Job succeeded.");
                JobResult::success(&task_name, duration, data)
            }
            Ok(Err(e)) => {
                debug!(job = %task_name, duration, error = %e, "Job failed.");
                JobResult::failure(&task_name, duration, e.to_string())
            }
            Err(cause) => {
                let message = ProbeError::Panicked(panic_message(cause.as_ref())).to_string();
                warn!(job = %task_name, duration, error = %message, "Job panicked.");
                JobResult::failure(&task_name, duration, message)
            }
        }
    });

    Launched::Running { name, started, handle }
}

fn elapsed_ms(since: Instant) -> u64 {
    u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(cause: &(dyn Any + Send)) -> String {
    if let Some(s) = cause.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = cause.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::JobStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn sleeping(name: &str, ms: u64, value: u32) -> JobSpec<u32> {
        JobSpec::new(name, move || {
            async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(value)
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn results_follow_submission_order_not_completion_order() {
        let jobs = vec![sleeping("slow", 80, 1), sleeping("fast", 5, 2), sleeping("medium", 30, 3)];
        let results = run_jobs(jobs).await;
        let names: Vec<_> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["slow", "fast", "medium"]);
        assert_eq!(results[1].data, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn jobs_run_concurrently_and_time_themselves() {
        let started = Instant::now();
        let results = run_jobs(vec![sleeping("a", 100, 1), sleeping("b", 100, 2), sleeping("c", 20, 3)]).await;
        let wall = started.elapsed();

        assert!(wall < Duration::from_millis(150), "batch took {wall:?}");
        assert!((100..110).contains(&results[0].duration));
        assert!((20..30).contains(&results[2].duration));
    }

    #[tokio::test]
    async fn an_err_is_recorded_without_affecting_siblings() {
        let failing: JobSpec<u32> =
            JobSpec::new("broken", || async { Err(ProbeError::Dns("NXDOMAIN".into())) }.boxed());
        let results = run_jobs(vec![sleeping("ok", 1, 7), failing]).await;

        assert_eq!(results[0].status, JobStatus::Success);
        assert_eq!(results[1].status, JobStatus::Error);
        assert_eq!(results[1].error.as_deref(), Some("DNS Error: NXDOMAIN"));
        assert!(results[1].data.is_none());
    }

    #[tokio::test]
    async fn a_panic_while_building_the_future_is_contained() {
        let exploding: JobSpec<u32> =
            JobSpec::new("sync-panic", || -> BoxFuture<'static, Result<u32, ProbeError>> { panic!("boom before await") });
        let results = run_jobs(vec![exploding, sleeping("ok", 1, 1)]).await;

        assert_eq!(results[0].status, JobStatus::Error);
        assert!(results[0].error.as_deref().unwrap().contains("boom before await"));
        assert_eq!(results[1].status, JobStatus::Success);
    }

    #[tokio::test]
    async fn a_panic_while_polling_is_contained() {
        let exploding: JobSpec<u32> = JobSpec::new("async-panic", || {
            async {
                tokio::task::yield_now().await;
                let missing: Option<u32> = None;
                Ok(missing.expect("boom after await"))
            }
            .boxed()
        });
        let results = run_jobs(vec![exploding]).await;
        assert_eq!(results[0].status, JobStatus::Error);
        assert!(!results[0].error.as_deref().unwrap().is_empty());
    }

    #[tokio::test]
    async fn skipped_jobs_are_never_executed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let spy = Arc::clone(&calls);
        let job: JobSpec<u32> = JobSpec::new("skipped", move || {
            spy.fetch_add(1, Ordering::SeqCst);
            async { Ok(1) }.boxed()
        })
        .with_skip(|| true);

        let results = run_jobs(vec![job]).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(results[0].status, JobStatus::Skipped);
        assert!(results[0].data.is_none() && results[0].error.is_none());
    }

    #[tokio::test]
    async fn a_panicking_skip_predicate_is_an_error() {
        let job: JobSpec<u32> = JobSpec::new("bad-skip", || async { Ok(1) }.boxed())
            .with_skip(|| panic!("predicate exploded"));
        let results = run_jobs(vec![job, sleeping("ok", 1, 1)]).await;
        assert_eq!(results[0].status, JobStatus::Error);
        assert_eq!(results[1].status, JobStatus::Success);
    }

    #[tokio::test]
    async fn every_job_yields_exactly_one_result() {
        let mut jobs = Vec::new();
        for i in 0..40u32 {
            let job = match i % 3 {
                0 => sleeping(&format!("ok-{i}"), 1, i),
                1 => JobSpec::new(format!("err-{i}"), || async { Err(ProbeError::Parse("bad".into())) }.boxed()),
                _ => sleeping(&format!("skip-{i}"), 1, i).with_skip(|| true),
            };
            jobs.push(job);
        }
        let results = run_jobs(jobs).await;
        assert_eq!(results.len(), 40);
        let by = |s: JobStatus| results.iter().filter(|r| r.status == s).count();
        assert_eq!(by(JobStatus::Success) + by(JobStatus::Error) + by(JobStatus::Skipped), 40);
        assert_eq!(by(JobStatus::Skipped), 13);
    }

    #[tokio::test]
    async fn an_empty_batch_returns_nothing() {
        let results: Vec<JobResult<u32>> = run_jobs(Vec::new()).await;
        assert!(results.is_empty());
    }
}
