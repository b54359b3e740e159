// src/core/mod.rs

//! Reconnaissance engine: the job catalog, the orchestrator that runs it,
//! the probes, the technology classifier, and the merge into one report.

pub mod aggregate;
pub mod catalog;
pub mod error;
pub mod fingerprint;
pub mod models;
pub mod orchestrator;
pub mod scanner;

use std::sync::Arc;

use tokio::time::Instant;
use tracing::info;
use url::Url;

use crate::config::ScanConfig;
use self::aggregate::ResultAggregate;
use self::error::ReconError;
use self::fingerprint::Classifier;
use self::models::{ReconReport, RunSummary};
use self::orchestrator::run_jobs;
use self::scanner::ProbeContext;

/// Runs every catalog job against `url` and consolidates the outcome.
///
/// Individual probe failures never surface here; they are recorded in the
/// report. An `Err` means the run could not start at all.
pub async fn run_reconnaissance(url: &Url, config: &ScanConfig) -> Result<ReconReport, ReconError> {
    let classifier = Arc::new(Classifier::builtin()?);
    run_reconnaissance_with(url, config, classifier).await
}

/// Same as [`run_reconnaissance`] with a caller-supplied classifier.
pub async fn run_reconnaissance_with(
    url: &Url,
    config: &ScanConfig,
    classifier: Arc<Classifier>,
) -> Result<ReconReport, ReconError> {
    let started = Instant::now();
    let ctx = Arc::new(ProbeContext::new(url, config, classifier)?);
    info!(target = %url, disabled = config.disabled_jobs.len(), "Starting reconnaissance.");

    let jobs = run_jobs(catalog::build_jobs(ctx)).await;
    let results = ResultAggregate::from_jobs(&jobs);
    let wall_time = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let summary = RunSummary::from_jobs(&jobs, wall_time);

    info!(
        successful = summary.successful,
        failed = summary.failed,
        skipped = summary.skipped,
        wall_time,
        "Reconnaissance finished."
    );
    Ok(ReconReport { jobs, results, summary })
}
