// src/core/aggregate.rs

//! The consolidated report of a run, keyed by semantic field.
//!
//! Jobs never write here while they run. Once every job has settled the
//! orchestrator's caller folds the successful payloads in, one at a time, on a
//! single task. Each field has exactly one owning job; a second write to the
//! same field is rejected rather than silently overwriting the first.

use std::collections::BTreeMap;

use serde::Serialize;
use strum::{Display, EnumIter};
use tracing::{debug, error};

use crate::core::error::AggregateError;
use crate::core::models::{
    ArchiveStats, CaaRecords, CookieList, DnsRecords, DomainInfo, FirewallInfo, HstsPolicy,
    HttpSecurity, IpInfo, JobResult, JobStatus, LinkedPages, MailConfig, ProbePayload,
    QualityScores, RedirectChain, RobotsTxt, SecurityTxt, SiteStatus, Sitemap, SocialTags,
    SslCertificate, Technology, TxtRecords,
};

/// Names of the report fields, as they appear in serialized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
#[strum(serialize_all = "camelCase")]
pub enum AggregateField {
    Ip,
    Dns,
    TxtRecords,
    MailConfig,
    Caa,
    Ssl,
    Domain,
    Headers,
    Cookies,
    HttpSecurity,
    Hsts,
    Firewall,
    TechStack,
    SocialTags,
    LinkedPages,
    RobotsTxt,
    SecurityTxt,
    Sitemap,
    Status,
    Redirects,
    Archives,
    Quality,
}

/// One optional slot per field. Absent fields are omitted from JSON, so
/// "probe failed or was skipped" never looks like "probe found nothing".
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultAggregate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns: Option<DnsRecords>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txt_records: Option<TxtRecords>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mail_config: Option<MailConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caa: Option<CaaRecords>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl: Option<SslCertificate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<DomainInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<CookieList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_security: Option<HttpSecurity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hsts: Option<HstsPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firewall: Option<FirewallInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_stack: Option<Vec<Technology>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub social_tags: Option<SocialTags>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_pages: Option<LinkedPages>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub robots_txt: Option<RobotsTxt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_txt: Option<SecurityTxt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sitemap: Option<Sitemap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SiteStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirects: Option<RedirectChain>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archives: Option<ArchiveStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityScores>,
}

fn fill<T>(slot: &mut Option<T>, value: T, field: AggregateField) -> Result<(), AggregateError> {
    if slot.is_some() {
        return Err(AggregateError::FieldAlreadyWritten(field));
    }
    *slot = Some(value);
    Ok(())
}

impl ResultAggregate {
    /// Writes a payload into the field it belongs to.
    ///
    /// Fails if the field is already occupied; the existing value is kept.
    pub fn insert(&mut self, payload: ProbePayload) -> Result<(), AggregateError> {
        let field = payload.field();
        match payload {
            ProbePayload::Ip(v) => fill(&mut self.ip, v, field),
            ProbePayload::Dns(v) => fill(&mut self.dns, v, field),
            ProbePayload::TxtRecords(v) => fill(&mut self.txt_records, v, field),
            ProbePayload::MailConfig(v) => fill(&mut self.mail_config, v, field),
            ProbePayload::Caa(v) => fill(&mut self.caa, v, field),
            ProbePayload::Ssl(v) => fill(&mut self.ssl, v, field),
            ProbePayload::Domain(v) => fill(&mut self.domain, v, field),
            ProbePayload::Headers(v) => fill(&mut self.headers, v, field),
            ProbePayload::Cookies(v) => fill(&mut self.cookies, v, field),
            ProbePayload::HttpSecurity(v) => fill(&mut self.http_security, v, field),
            ProbePayload::Hsts(v) => fill(&mut self.hsts, v, field),
            ProbePayload::Firewall(v) => fill(&mut self.firewall, v, field),
            ProbePayload::TechStack(v) => fill(&mut self.tech_stack, v, field),
            ProbePayload::SocialTags(v) => fill(&mut self.social_tags, v, field),
            ProbePayload::LinkedPages(v) => fill(&mut self.linked_pages, v, field),
            ProbePayload::RobotsTxt(v) => fill(&mut self.robots_txt, v, field),
            ProbePayload::SecurityTxt(v) => fill(&mut self.security_txt, v, field),
            ProbePayload::Sitemap(v) => fill(&mut self.sitemap, v, field),
            ProbePayload::Status(v) => fill(&mut self.status, v, field),
            ProbePayload::Redirects(v) => fill(&mut self.redirects, v, field),
            ProbePayload::Archives(v) => fill(&mut self.archives, v, field),
            ProbePayload::Quality(v) => fill(&mut self.quality, v, field),
        }
    }

    /// Builds the aggregate from a settled batch. Only successful jobs contribute.
    pub fn from_jobs(jobs: &[JobResult]) -> Self {
        let mut aggregate = Self::default();
        for job in jobs.iter().filter(|j| j.status == JobStatus::Success) {
            let Some(payload) = job.data.clone() else { continue };
            let field = payload.field();
            match aggregate.insert(payload) {
                Ok(()) => debug!(job = %job.name, %field, "Merged job payload into report."),
                Err(e) => error!(job = %job.name, error = %e, "Conflicting writer, payload dropped."),
            }
        }
        aggregate
    }

    /// Whether the given field holds a value.
    pub fn contains(&self, field: AggregateField) -> bool {
        match field {
            AggregateField::Ip => self.ip.is_some(),
            AggregateField::Dns => self.dns.is_some(),
            AggregateField::TxtRecords => self.txt_records.is_some(),
            AggregateField::MailConfig => self.mail_config.is_some(),
            AggregateField::Caa => self.caa.is_some(),
            AggregateField::Ssl => self.ssl.is_some(),
            AggregateField::Domain => self.domain.is_some(),
            AggregateField::Headers => self.headers.is_some(),
            AggregateField::Cookies => self.cookies.is_some(),
            AggregateField::HttpSecurity => self.http_security.is_some(),
            AggregateField::Hsts => self.hsts.is_some(),
            AggregateField::Firewall => self.firewall.is_some(),
            AggregateField::TechStack => self.tech_stack.is_some(),
            AggregateField::SocialTags => self.social_tags.is_some(),
            AggregateField::LinkedPages => self.linked_pages.is_some(),
            AggregateField::RobotsTxt => self.robots_txt.is_some(),
            AggregateField::SecurityTxt => self.security_txt.is_some(),
            AggregateField::Sitemap => self.sitemap.is_some(),
            AggregateField::Status => self.status.is_some(),
            AggregateField::Redirects => self.redirects.is_some(),
            AggregateField::Archives => self.archives.is_some(),
            AggregateField::Quality => self.quality.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::CaaRecords;
    use strum::IntoEnumIterator;

    fn ip(addr: &str) -> ProbePayload {
        ProbePayload::Ip(IpInfo { ip: addr.into(), family: 4, addresses: vec![addr.into()] })
    }

    #[test]
    fn second_write_to_a_field_is_rejected_and_first_value_kept() {
        let mut aggregate = ResultAggregate::default();
        aggregate.insert(ip("192.0.2.1")).unwrap();
        let err = aggregate.insert(ip("192.0.2.2")).unwrap_err();
        assert_eq!(err, AggregateError::FieldAlreadyWritten(AggregateField::Ip));
        assert_eq!(aggregate.ip.unwrap().ip, "192.0.2.1");
    }

    #[test]
    fn only_successful_jobs_reach_the_report() {
        let jobs = vec![
            JobResult::success("get-ip", 50, ip("192.0.2.1")),
            JobResult::failure("dns", 10, "DNS Error: timeout".into()),
            JobResult::skipped("quality", 0),
        ];
        let aggregate = ResultAggregate::from_jobs(&jobs);
        assert!(aggregate.contains(AggregateField::Ip));
        assert!(!aggregate.contains(AggregateField::Dns));
        assert!(!aggregate.contains(AggregateField::Quality));
        assert_eq!(jobs[0].data.as_ref(), Some(&ip("192.0.2.1")));
    }

    #[test]
    fn absent_fields_are_omitted_but_empty_payloads_are_kept() {
        let mut aggregate = ResultAggregate::default();
        aggregate.insert(ProbePayload::Caa(CaaRecords::default())).unwrap();
        let json = serde_json::to_value(&aggregate).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(json["caa"]["records"], serde_json::json!([]));
        assert!(obj.get("ip").is_none());
    }

    #[test]
    fn field_names_match_serialized_keys() {
        assert_eq!(AggregateField::HttpSecurity.to_string(), "httpSecurity");
        assert_eq!(AggregateField::TxtRecords.to_string(), "txtRecords");
        assert_eq!(AggregateField::iter().count(), 22);
    }
}
