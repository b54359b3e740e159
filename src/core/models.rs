// src/core/models.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::core::aggregate::{AggregateField, ResultAggregate};

// --- Reusable Finding Types ---

// An enumeration representing the severity level of a finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

// A struct representing an analysis finding, containing a severity level and a string code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisFinding {
    pub severity: Severity,
    pub code: String,
}

impl AnalysisFinding {
    pub fn new(severity: Severity, code: &str) -> Self {
        Self { severity, code: code.to_string() }
    }
}

// --- Job Execution Models ---

/// Final state of a job once it has settled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Success,
    Error,
    Skipped,
}

/// Execution record of a single job.
///
/// `data` is only present on success, `error` only on failure. A record is
/// built exactly once, when the job settles, and never touched again.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult<P = ProbePayload> {
    pub name: String,
    pub status: JobStatus,
    /// Milliseconds spent in this job alone.
    pub duration: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<P>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<P> JobResult<P> {
    pub fn success(name: &str, duration: u64, data: P) -> Self {
        Self { name: name.to_string(), status: JobStatus::Success, duration, data: Some(data), error: None }
    }

    pub fn failure(name: &str, duration: u64, error: String) -> Self {
        let error = if error.trim().is_empty() { "unknown error".to_string() } else { error };
        Self { name: name.to_string(), status: JobStatus::Error, duration, data: None, error: Some(error) }
    }

    pub fn skipped(name: &str, duration: u64) -> Self {
        Self { name: name.to_string(), status: JobStatus::Skipped, duration, data: None, error: None }
    }
}

/// Counts derived from a finished batch.
///
/// `total_time` is the *aggregate probe-time*: the sum of every job's own
/// duration. Jobs run concurrently, so it is usually far larger than
/// `wall_time`, the span of the batch as seen by the caller.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_time: u64,
    pub wall_time: u64,
}

impl RunSummary {
    pub fn from_jobs<P>(jobs: &[JobResult<P>], wall_time: u64) -> Self {
        let count = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();
        Self {
            successful: count(JobStatus::Success),
            failed: count(JobStatus::Error),
            skipped: count(JobStatus::Skipped),
            total_time: jobs.iter().map(|j| j.duration).sum(),
            wall_time,
        }
    }
}

/// Everything a reconnaissance run produces.
#[derive(Debug, Clone, Serialize)]
pub struct ReconReport {
    pub jobs: Vec<JobResult>,
    pub results: ResultAggregate,
    pub summary: RunSummary,
}

// --- Fingerprint Models ---

/// Coarse trust rating of a detection. Ordered so that `High` compares greatest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum TechCategory {
    Framework,
    Cms,
    Analytics,
    Cdn,
    Security,
    Bundler,
    CssFramework,
    Library,
    Server,
    Backend,
}

/// A technology detected on the target page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Technology {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<TechCategory>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
}

impl Technology {
    pub fn new(name: impl Into<String>, confidence: Confidence) -> Self {
        Self { name: name.into(), version: None, confidence, category: None, evidence: Vec::new() }
    }

    pub fn with_version(mut self, version: Option<String>) -> Self {
        self.version = version.filter(|v| !v.is_empty());
        self
    }

    pub fn with_category(mut self, category: TechCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }
}

// --- DNS Models ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpInfo {
    pub ip: String,
    pub family: u8,
    pub addresses: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MxRecord {
    pub priority: u16,
    pub exchange: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsRecords {
    pub a: Vec<String>,
    pub aaaa: Vec<String>,
    pub mx: Vec<MxRecord>,
    pub ns: Vec<String>,
    pub cname: Vec<String>,
    pub txt: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxtRecords {
    pub entries: BTreeMap<String, String>,
    pub raw: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpfData {
    pub record: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DmarcData {
    pub record: String,
    pub policy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DkimRecord {
    pub selector: String,
    pub record: String,
}

// Mail authentication records found for the domain, plus the findings derived from them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MailConfig {
    pub spf: Option<SpfData>,
    pub dmarc: Option<DmarcData>,
    pub dkim: Vec<DkimRecord>,
    pub analysis: Vec<AnalysisFinding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaaRecords {
    pub records: Vec<String>,
}

// --- SSL/TLS Models ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SslCertificate {
    pub subject_name: String,
    pub issuer_name: String,
    pub serial_number: String,
    pub signature_algorithm: String,
    pub subject_alt_names: Vec<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub days_until_expiry: i64,
    pub is_valid: bool,
    pub analysis: Vec<AnalysisFinding>,
}

// --- Domain Registration Models ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DomainInfo {
    pub handle: Option<String>,
    pub registrar: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub expires: Option<String>,
    pub nameservers: Vec<String>,
    pub status: Vec<String>,
}

// --- HTTP Models ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderData {
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HttpSecurity {
    pub strict_transport_security: Option<HeaderData>,
    pub content_security_policy: Option<HeaderData>,
    pub x_frame_options: Option<HeaderData>,
    pub x_content_type_options: Option<HeaderData>,
    pub referrer_policy: Option<HeaderData>,
    pub permissions_policy: Option<HeaderData>,
    pub analysis: Vec<AnalysisFinding>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HstsPolicy {
    pub present: bool,
    pub max_age: Option<u64>,
    pub include_sub_domains: bool,
    pub preload: bool,
    /// Meets the browser preload list requirements (one year, subdomains, preload).
    pub preload_eligible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CookieList {
    pub cookies: Vec<Cookie>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallInfo {
    pub has_waf: bool,
    pub waf: Option<String>,
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteStatus {
    pub is_up: bool,
    pub status_code: u16,
    pub response_time_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedirectChain {
    pub redirects: Vec<String>,
}

// --- Content Models ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SocialTags {
    pub title: Option<String>,
    pub description: Option<String>,
    pub keywords: Option<String>,
    pub canonical_url: Option<String>,
    pub theme_color: Option<String>,
    pub open_graph: BTreeMap<String, String>,
    pub twitter: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinkedPages {
    pub internal: Vec<String>,
    pub external: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RobotsRule {
    pub directive: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RobotsTxt {
    pub rules: Vec<RobotsRule>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityTxt {
    pub is_present: bool,
    pub found_at: Option<String>,
    pub is_pgp_signed: bool,
    pub fields: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Sitemap {
    pub source: String,
    pub urls: Vec<String>,
}

// --- Third-Party Service Models ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArchiveStats {
    pub first_scan: Option<String>,
    pub last_scan: Option<String>,
    pub total_scans: usize,
    pub change_count: usize,
    pub average_page_size: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QualityScores {
    pub performance: Option<f64>,
    pub accessibility: Option<f64>,
    pub best_practices: Option<f64>,
    pub seo: Option<f64>,
}

// --- Probe Payload ---

/// Typed output of a probe. Each variant belongs to exactly one report field.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum ProbePayload {
    Ip(IpInfo),
    Dns(DnsRecords),
    TxtRecords(TxtRecords),
    MailConfig(MailConfig),
    Caa(CaaRecords),
    Ssl(SslCertificate),
    Domain(DomainInfo),
    Headers(BTreeMap<String, String>),
    Cookies(CookieList),
    HttpSecurity(HttpSecurity),
    Hsts(HstsPolicy),
    Firewall(FirewallInfo),
    TechStack(Vec<Technology>),
    SocialTags(SocialTags),
    LinkedPages(LinkedPages),
    RobotsTxt(RobotsTxt),
    SecurityTxt(SecurityTxt),
    Sitemap(Sitemap),
    Status(SiteStatus),
    Redirects(RedirectChain),
    Archives(ArchiveStats),
    Quality(QualityScores),
}

impl ProbePayload {
    /// The report field this payload is written to.
    pub fn field(&self) -> AggregateField {
        match self {
            ProbePayload::Ip(_) => AggregateField::Ip,
            ProbePayload::Dns(_) => AggregateField::Dns,
            ProbePayload::TxtRecords(_) => AggregateField::TxtRecords,
            ProbePayload::MailConfig(_) => AggregateField::MailConfig,
            ProbePayload::Caa(_) => AggregateField::Caa,
            ProbePayload::Ssl(_) => AggregateField::Ssl,
            ProbePayload::Domain(_) => AggregateField::Domain,
            ProbePayload::Headers(_) => AggregateField::Headers,
            ProbePayload::Cookies(_) => AggregateField::Cookies,
            ProbePayload::HttpSecurity(_) => AggregateField::HttpSecurity,
            ProbePayload::Hsts(_) => AggregateField::Hsts,
            ProbePayload::Firewall(_) => AggregateField::Firewall,
            ProbePayload::TechStack(_) => AggregateField::TechStack,
            ProbePayload::SocialTags(_) => AggregateField::SocialTags,
            ProbePayload::LinkedPages(_) => AggregateField::LinkedPages,
            ProbePayload::RobotsTxt(_) => AggregateField::RobotsTxt,
            ProbePayload::SecurityTxt(_) => AggregateField::SecurityTxt,
            ProbePayload::Sitemap(_) => AggregateField::Sitemap,
            ProbePayload::Status(_) => AggregateField::Status,
            ProbePayload::Redirects(_) => AggregateField::Redirects,
            ProbePayload::Archives(_) => AggregateField::Archives,
            ProbePayload::Quality(_) => AggregateField::Quality,
        }
    }
}
