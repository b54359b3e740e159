// src/config.rs

use std::collections::HashSet;
use std::time::Duration;

use tracing::warn;

/// Environment variable overriding the per-probe timeout, in milliseconds.
pub const TIMEOUT_ENV: &str = "VANGUARD_RECON_TIMEOUT_MS";
/// Environment variable overriding the HTTP user agent.
pub const USER_AGENT_ENV: &str = "VANGUARD_RECON_USER_AGENT";
/// Comma separated job names that must not run.
pub const DISABLED_JOBS_ENV: &str = "VANGUARD_RECON_DISABLED_JOBS";
/// Environment variable overriding the response body cap, in bytes.
pub const MAX_BODY_ENV: &str = "VANGUARD_RECON_MAX_BODY_BYTES";
/// API key for the PageSpeed Insights quality probe.
pub const PAGESPEED_KEY_ENV: &str = "GOOGLE_CLOUD_API_KEY";

const DEFAULT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_REDIRECTS: usize = 10;
const DEFAULT_MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Settings shared by every probe of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Upper bound for a single probe. There is no batch-wide limit.
    pub probe_timeout: Duration,
    pub user_agent: String,
    pub disabled_jobs: HashSet<String>,
    pub pagespeed_api_key: Option<String>,
    pub max_redirects: usize,
    /// Response bodies are truncated after this many bytes.
    pub max_body_bytes: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            user_agent: format!("VanguardRecon/{}", env!("CARGO_PKG_VERSION")),
            disabled_jobs: HashSet::new(),
            pagespeed_api_key: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ScanConfig {
    /// Defaults, overridden by whatever the environment provides.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => config.probe_timeout = Duration::from_millis(ms),
                _ => warn!(variable = TIMEOUT_ENV, value = %raw, "Ignoring invalid timeout."),
            }
        }
        if let Some(raw) = lookup(MAX_BODY_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(bytes) if bytes > 0 => config.max_body_bytes = bytes,
                _ => warn!(variable = MAX_BODY_ENV, value = %raw, "Ignoring invalid body cap."),
            }
        }
        if let Some(agent) = lookup(USER_AGENT_ENV).filter(|a| !a.trim().is_empty()) {
            config.user_agent = agent;
        }
        if let Some(raw) = lookup(DISABLED_JOBS_ENV) {
            config.disable_jobs(raw.split(','));
        }
        config.pagespeed_api_key = lookup(PAGESPEED_KEY_ENV).filter(|k| !k.trim().is_empty());
        config
    }

    /// Adds job names to the disabled set, ignoring blanks.
    pub fn disable_jobs<'a>(&mut self, names: impl IntoIterator<Item = &'a str>) {
        self.disabled_jobs.extend(
            names.into_iter().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string),
        );
    }

    pub fn is_disabled(&self, job: &str) -> bool {
        self.disabled_jobs.contains(job)
    }
}
