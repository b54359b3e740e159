// src/core/scanner/fingerprint_scanner.rs

use std::collections::HashMap;

use tracing::{debug, info};

use super::{header_pairs, ProbeContext};
use crate::core::error::ProbeError;
use crate::core::models::Technology;

/// Fetches the target page and runs the shared classifier over its markup and headers.
///
/// The classifier never fails, so the probe only fails when the page cannot be fetched.
pub async fn run_fingerprint_scan(ctx: &ProbeContext) -> Result<Vec<Technology>, ProbeError> {
    info!(target = %ctx.url, "Starting technology fingerprint scan.");
    let page = ctx.fetch_page().await?;

    let headers: HashMap<String, String> = header_pairs(&page.headers).into_iter().collect();
    debug!(headers = headers.len(), bytes = page.body.len(), "Classifying page.");

    let technologies = ctx.classifier.detect(&page.body, &headers);
    info!(detected = technologies.len(), "Fingerprint scan finished.");
    Ok(technologies)
}
