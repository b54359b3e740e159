// src/core/catalog.rs

//! The fixed set of reconnaissance jobs.
//!
//! Each entry names a job, the report field it owns, the conditions under
//! which it is skipped, and the probe it runs. Adding a job means adding a
//! row here and a field to [`AggregateField`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use strum::Display;
use tracing::debug;
use url::Url;

use crate::config::ScanConfig;
use crate::core::aggregate::AggregateField;
use crate::core::error::ProbeError;
use crate::core::models::ProbePayload;
use crate::core::orchestrator::JobSpec;
use crate::core::scanner::{
    content_scanner, dns_scanner, external_scanner, fingerprint_scanner, headers_scanner, ssl_scanner, ProbeContext,
};

pub type ProbeFuture = BoxFuture<'static, Result<ProbePayload, ProbeError>>;

/// Starts a probe. Called at most once per run, on the job's own task.
pub type ProbeRunner = fn(Arc<ProbeContext>) -> ProbeFuture;

pub struct JobDescriptor {
    pub name: &'static str,
    pub field: AggregateField,
    /// Only meaningful against an `https://` target.
    pub requires_https: bool,
    /// Needs `ScanConfig::pagespeed_api_key`.
    pub requires_api_key: bool,
    pub run: ProbeRunner,
}

impl JobDescriptor {
    const fn new(name: &'static str, field: AggregateField, run: ProbeRunner) -> Self {
        Self { name, field, requires_https: false, requires_api_key: false, run }
    }

    const fn https_only(mut self) -> Self {
        self.requires_https = true;
        self
    }

    const fn needs_api_key(mut self) -> Self {
        self.requires_api_key = true;
        self
    }
}

impl std::fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("name", &self.name)
            .field("field", &self.field)
            .field("requires_https", &self.requires_https)
            .field("requires_api_key", &self.requires_api_key)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SkipReason {
    Disabled,
    RequiresHttps,
    MissingApiKey,
}

pub static CATALOG: &[JobDescriptor] = &[
    JobDescriptor::new("get-ip", AggregateField::Ip, |ctx| {
        async move { dns_scanner::resolve_ip(&ctx).await.map(ProbePayload::Ip) }.boxed()
    }),
    JobDescriptor::new("dns", AggregateField::Dns, |ctx| {
        async move { dns_scanner::lookup_records(&ctx).await.map(ProbePayload::Dns) }.boxed()
    }),
    JobDescriptor::new("txt-records", AggregateField::TxtRecords, |ctx| {
        async move { dns_scanner::lookup_txt_records(&ctx).await.map(ProbePayload::TxtRecords) }.boxed()
    }),
    JobDescriptor::new("mail-config", AggregateField::MailConfig, |ctx| {
        async move { dns_scanner::run_mail_config(&ctx).await.map(ProbePayload::MailConfig) }.boxed()
    }),
    JobDescriptor::new("caa", AggregateField::Caa, |ctx| {
        async move { dns_scanner::lookup_caa(&ctx).await.map(ProbePayload::Caa) }.boxed()
    }),
    JobDescriptor::new("ssl", AggregateField::Ssl, |ctx| {
        async move { ssl_scanner::run_ssl_scan(&ctx).await.map(ProbePayload::Ssl) }.boxed()
    })
    .https_only(),
    JobDescriptor::new("domain", AggregateField::Domain, |ctx| {
        async move { external_scanner::lookup_rdap(&ctx).await.map(ProbePayload::Domain) }.boxed()
    }),
    JobDescriptor::new("headers", AggregateField::Headers, |ctx| {
        async move { headers_scanner::collect_headers(&ctx).await.map(ProbePayload::Headers) }.boxed()
    }),
    JobDescriptor::new("cookies", AggregateField::Cookies, |ctx| {
        async move { headers_scanner::collect_cookies(&ctx).await.map(ProbePayload::Cookies) }.boxed()
    }),
    JobDescriptor::new("http-security", AggregateField::HttpSecurity, |ctx| {
        async move { headers_scanner::run_http_security(&ctx).await.map(ProbePayload::HttpSecurity) }.boxed()
    }),
    JobDescriptor::new("hsts", AggregateField::Hsts, |ctx| {
        async move { headers_scanner::analyze_hsts(&ctx).await.map(ProbePayload::Hsts) }.boxed()
    })
    .https_only(),
    JobDescriptor::new("firewall", AggregateField::Firewall, |ctx| {
        async move { headers_scanner::detect_firewall(&ctx).await.map(ProbePayload::Firewall) }.boxed()
    }),
    JobDescriptor::new("tech-stack", AggregateField::TechStack, |ctx| {
        async move { fingerprint_scanner::run_fingerprint_scan(&ctx).await.map(ProbePayload::TechStack) }.boxed()
    }),
    JobDescriptor::new("social-tags", AggregateField::SocialTags, |ctx| {
        async move { content_scanner::extract_social_tags(&ctx).await.map(ProbePayload::SocialTags) }.boxed()
    }),
    JobDescriptor::new("linked-pages", AggregateField::LinkedPages, |ctx| {
        async move { content_scanner::list_linked_pages(&ctx).await.map(ProbePayload::LinkedPages) }.boxed()
    }),
    JobDescriptor::new("robots-txt", AggregateField::RobotsTxt, |ctx| {
        async move { content_scanner::fetch_robots_txt(&ctx).await.map(ProbePayload::RobotsTxt) }.boxed()
    }),
    JobDescriptor::new("security-txt", AggregateField::SecurityTxt, |ctx| {
        async move { content_scanner::fetch_security_txt(&ctx).await.map(ProbePayload::SecurityTxt) }.boxed()
    }),
    JobDescriptor::new("sitemap", AggregateField::Sitemap, |ctx| {
        async move { content_scanner::fetch_sitemap(&ctx).await.map(ProbePayload::Sitemap) }.boxed()
    }),
    JobDescriptor::new("status", AggregateField::Status, |ctx| {
        async move { headers_scanner::check_status(&ctx).await.map(ProbePayload::Status) }.boxed()
    }),
    JobDescriptor::new("redirects", AggregateField::Redirects, |ctx| {
        async move { headers_scanner::follow_redirects(&ctx).await.map(ProbePayload::Redirects) }.boxed()
    }),
    JobDescriptor::new("archives", AggregateField::Archives, |ctx| {
        async move { external_scanner::fetch_archive_stats(&ctx).await.map(ProbePayload::Archives) }.boxed()
    }),
    JobDescriptor::new("quality", AggregateField::Quality, |ctx| {
        async move { external_scanner::fetch_quality_scores(&ctx).await.map(ProbePayload::Quality) }.boxed()
    })
    .needs_api_key(),
];

/// Why `descriptor` must not run against `url` under `config`, if it must not.
pub fn skip_reason(descriptor: &JobDescriptor, config: &ScanConfig, url: &Url) -> Option<SkipReason> {
    if config.is_disabled(descriptor.name) {
        Some(SkipReason::Disabled)
    } else if descriptor.requires_https && url.scheme() != "https" {
        Some(SkipReason::RequiresHttps)
    } else if descriptor.requires_api_key && config.pagespeed_api_key.is_none() {
        Some(SkipReason::MissingApiKey)
    } else {
        None
    }
}

/// Turns the catalog into orchestrator jobs sharing one context.
pub fn build_jobs(ctx: Arc<ProbeContext>) -> Vec<JobSpec<ProbePayload>> {
    let limit = ctx.config.probe_timeout;
    CATALOG
        .iter()
        .map(|descriptor| {
            let run_ctx = Arc::clone(&ctx);
            let skip_ctx = Arc::clone(&ctx);
            JobSpec::new(descriptor.name, move || with_timeout(limit, (descriptor.run)(run_ctx))).with_skip(
                move || match skip_reason(descriptor, &skip_ctx.config, &skip_ctx.url) {
                    Some(reason) => {
                        debug!(job = descriptor.name, %reason, "Job will be skipped.");
                        true
                    }
                    None => false,
                },
            )
        })
        .collect()
}

/// Fails the probe with [`ProbeError::Timeout`] once `limit` has passed.
pub fn with_timeout(limit: Duration, probe: ProbeFuture) -> ProbeFuture {
    async move {
        match tokio::time::timeout(limit, probe).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeError::Timeout { after_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX) }),
        }
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::IpInfo;
    use std::collections::HashSet;
    use strum::IntoEnumIterator;

    fn find(name: &str) -> &'static JobDescriptor {
        CATALOG.iter().find(|d| d.name == name).unwrap()
    }

    #[test]
    fn job_names_are_unique() {
        let names: HashSet<_> = CATALOG.iter().map(|d| d.name).collect();
        assert_eq!(names.len(), CATALOG.len());
    }

    #[test]
    fn every_field_has_exactly_one_writer() {
        for field in AggregateField::iter() {
            let writers: Vec<_> = CATALOG.iter().filter(|d| d.field == field).map(|d| d.name).collect();
            assert_eq!(writers.len(), 1, "field {field} written by {writers:?}");
        }
        assert_eq!(CATALOG.len(), AggregateField::iter().count());
    }

    #[test]
    fn disabled_jobs_are_skipped() {
        let mut config = ScanConfig::default();
        config.disable_jobs(["dns"]);
        let url = Url::parse("https://example.com").unwrap();
        assert_eq!(skip_reason(find("dns"), &config, &url), Some(SkipReason::Disabled));
        assert_eq!(skip_reason(find("get-ip"), &config, &url), None);
    }

    #[test]
    fn https_only_jobs_are_skipped_for_plain_http() {
        let config = ScanConfig::default();
        let plain = Url::parse("http://example.com").unwrap();
        let secure = Url::parse("https://example.com").unwrap();
        for name in ["ssl", "hsts"] {
            assert_eq!(skip_reason(find(name), &config, &plain), Some(SkipReason::RequiresHttps));
            assert_eq!(skip_reason(find(name), &config, &secure), None);
        }
        assert_eq!(skip_reason(find("headers"), &config, &plain), None);
    }

    #[test]
    fn quality_needs_an_api_key() {
        let url = Url::parse("https://example.com").unwrap();
        let mut config = ScanConfig::default();
        assert_eq!(skip_reason(find("quality"), &config, &url), Some(SkipReason::MissingApiKey));
        config.pagespeed_api_key = Some("key".into());
        assert_eq!(skip_reason(find("quality"), &config, &url), None);
        assert_eq!(SkipReason::MissingApiKey.to_string(), "missing-api-key");
    }

    #[tokio::test]
    async fn every_probe_writes_its_own_field() {
        let page = br#"<html><head><title>Local</title></head><body><a href="/a">a</a></body></html>"#;
        let url = crate::core::scanner::testing::serve_http(page.to_vec()).await;
        let config = ScanConfig { probe_timeout: Duration::from_secs(2), ..ScanConfig::default() };
        let classifier = Arc::new(crate::core::fingerprint::Classifier::builtin().unwrap());
        let ctx = Arc::new(ProbeContext::new(&url, &config, classifier).unwrap());

        let outcomes = futures::future::join_all(
            CATALOG.iter().map(|d| with_timeout(config.probe_timeout, (d.run)(Arc::clone(&ctx)))),
        )
        .await;

        let mut succeeded = HashSet::new();
        for (descriptor, outcome) in CATALOG.iter().zip(outcomes) {
            if let Ok(payload) = outcome {
                assert_eq!(payload.field(), descriptor.field, "{} wrote the wrong field", descriptor.name);
                succeeded.insert(descriptor.name);
            }
        }
        for name in ["headers", "cookies", "firewall", "tech-stack", "social-tags", "linked-pages", "status"] {
            assert!(succeeded.contains(name), "{name} failed against the local server");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probes_time_out() {
        let slow: ProbeFuture = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ProbePayload::Ip(IpInfo { ip: "127.0.0.1".into(), family: 4, addresses: Vec::new() }))
        }
        .boxed();
        let outcome = with_timeout(Duration::from_millis(250), slow).await;
        assert!(matches!(outcome, Err(ProbeError::Timeout { after_ms: 250 })));
    }

    #[tokio::test]
    async fn fast_probes_pass_through() {
        let fast: ProbeFuture = async { Err(ProbeError::NotFound("robots.txt".into())) }.boxed();
        let outcome = with_timeout(Duration::from_secs(1), fast).await;
        assert_eq!(outcome.unwrap_err().to_string(), "Nothing found: robots.txt");
    }
}
