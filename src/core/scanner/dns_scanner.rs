// src/core/scanner/dns_scanner.rs

use std::collections::BTreeMap;
use std::net::IpAddr;

use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use tracing::{debug, info, warn};

use super::ProbeContext;
use crate::core::error::ProbeError;
use crate::core::models::{
    AnalysisFinding, CaaRecords, DkimRecord, DmarcData, DnsRecords, IpInfo, MailConfig, MxRecord, Severity, SpfData,
    TxtRecords,
};

/// A list of common DKIM selectors to check for when a specific one is not known.
const COMMON_DKIM_SELECTORS: &[&str] = &["google", "selector1", "selector2", "default", "dkim", "k1", "mail"];

fn is_no_records(e: &ResolveError) -> bool {
    matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

/// Resolves the target host to its addresses. The first one is reported as the IP.
pub async fn resolve_ip(ctx: &ProbeContext) -> Result<IpInfo, ProbeError> {
    info!(target = %ctx.host, "Resolving target address.");
    let lookup = ctx.resolver.lookup_ip(ctx.host.as_str()).await?;
    let addresses: Vec<IpAddr> = lookup.iter().collect();
    let first = addresses.first().ok_or_else(|| ProbeError::NotFound(format!("no address for {}", ctx.host)))?;

    let family = if first.is_ipv4() { 4 } else { 6 };
    debug!(ip = %first, family, count = addresses.len(), "Address resolved.");
    Ok(IpInfo {
        ip: first.to_string(),
        family,
        addresses: addresses.iter().map(IpAddr::to_string).collect(),
    })
}

/// Collects the common record types for the target host.
///
/// A missing record type yields an empty list. The probe fails only when
/// neither an A nor an AAAA lookup could be answered.
pub async fn lookup_records(ctx: &ProbeContext) -> Result<DnsRecords, ProbeError> {
    let host = ctx.host.as_str();
    info!(target = host, "Starting DNS record lookups.");
    let resolver = &ctx.resolver;

    let (a, aaaa, mx, ns, cname, txt) = tokio::join!(
        resolver.ipv4_lookup(host),
        resolver.ipv6_lookup(host),
        resolver.mx_lookup(host),
        resolver.ns_lookup(ctx.root_domain()),
        resolver.lookup(host, RecordType::CNAME),
        resolver.txt_lookup(host)
    );

    if let (Err(a_err), Err(aaaa_err)) = (&a, &aaaa) {
        if !is_no_records(a_err) || !is_no_records(aaaa_err) {
            warn!(target = host, error = %a_err, "Address lookups failed.");
            return Err(ProbeError::Dns(a_err.to_string()));
        }
    }

    let records = DnsRecords {
        a: or_empty(a.map(|l| l.iter().map(|r| r.to_string()).collect()), "A"),
        aaaa: or_empty(aaaa.map(|l| l.iter().map(|r| r.to_string()).collect()), "AAAA"),
        mx: or_empty(
            mx.map(|l| {
                l.iter()
                    .map(|r| MxRecord { priority: r.preference(), exchange: r.exchange().to_utf8() })
                    .collect()
            }),
            "MX",
        ),
        ns: or_empty(ns.map(|l| l.iter().map(|r| r.to_string()).collect()), "NS"),
        cname: or_empty(cname.map(|l| l.iter().map(|r| r.to_string()).collect()), "CNAME"),
        txt: or_empty(txt.map(|l| l.iter().map(|r| r.to_string()).collect()), "TXT"),
    };
    info!(a = records.a.len(), aaaa = records.aaaa.len(), mx = records.mx.len(), "DNS record lookups finished.");
    Ok(records)
}

fn or_empty<T>(result: Result<Vec<T>, ResolveError>, kind: &str) -> Vec<T> {
    result.unwrap_or_else(|e| {
        if is_no_records(&e) {
            debug!(kind, "No records of this type.");
        } else {
            warn!(kind, error = %e, "Record lookup failed.");
        }
        Vec::new()
    })
}

/// Reads the TXT records of the root domain and splits `key=value` entries.
pub async fn lookup_txt_records(ctx: &ProbeContext) -> Result<TxtRecords, ProbeError> {
    let target = ctx.root_domain();
    debug!(target, "Looking up TXT records.");
    let raw: Vec<String> = match ctx.resolver.txt_lookup(target).await {
        Ok(lookup) => lookup.iter().map(|r| r.to_string()).collect(),
        Err(e) if is_no_records(&e) => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    Ok(split_txt_entries(raw))
}

/// Splits each record on its first `=`. Records without one are kept only in `raw`.
pub fn split_txt_entries(raw: Vec<String>) -> TxtRecords {
    let mut entries = BTreeMap::new();
    for record in &raw {
        if let Some((key, value)) = record.split_once('=') {
            let key = key.trim();
            if !key.is_empty() {
                entries.entry(key.to_string()).or_insert_with(|| value.trim().to_string());
            }
        }
    }
    TxtRecords { entries, raw }
}

/// Runs the mail authentication lookups (SPF, DMARC, DKIM) and analyzes them.
pub async fn run_mail_config(ctx: &ProbeContext) -> Result<MailConfig, ProbeError> {
    let root_target = ctx.root_domain();
    info!(target = %root_target, "Starting mail configuration scan.");

    let (spf, dmarc, dkim) = tokio::join!(
        lookup_spf(&ctx.resolver, root_target),
        lookup_dmarc(&ctx.resolver, root_target),
        lookup_dkim(&ctx.resolver, root_target)
    );

    let mut config = MailConfig { spf: spf?, dmarc: dmarc?, dkim, analysis: Vec::new() };
    config.analysis = analyze_mail_config(&config);
    info!(findings = %config.analysis.len(), "Mail configuration scan finished.");
    Ok(config)
}

/// Derives findings from the mail authentication records.
pub fn analyze_mail_config(config: &MailConfig) -> Vec<AnalysisFinding> {
    let mut analyses = Vec::new();

    match &config.dmarc {
        Some(dmarc) => {
            if dmarc.policy.as_deref() == Some("none") {
                debug!("DMARC analysis: Found policy 'none', adding Warning.");
                analyses.push(AnalysisFinding::new(Severity::Warning, "DNS_DMARC_POLICY_NONE"));
            }
        }
        None => analyses.push(AnalysisFinding::new(Severity::Critical, "DNS_DMARC_MISSING")),
    }

    match &config.spf {
        Some(spf) if spf.record.ends_with("~all") => {
            analyses.push(AnalysisFinding::new(Severity::Info, "DNS_SPF_POLICY_SOFTFAIL"));
        }
        Some(spf) if spf.record.ends_with("?all") => {
            analyses.push(AnalysisFinding::new(Severity::Info, "DNS_SPF_POLICY_NEUTRAL"));
        }
        Some(spf) if spf.record.ends_with("+all") => {
            analyses.push(AnalysisFinding::new(Severity::Critical, "DNS_SPF_POLICY_PASS_ALL"));
        }
        Some(_) => {}
        None => analyses.push(AnalysisFinding::new(Severity::Warning, "DNS_SPF_MISSING")),
    }

    if config.dkim.is_empty() {
        analyses.push(AnalysisFinding::new(Severity::Info, "DNS_DKIM_MISSING"));
    }

    analyses
}

/// SPF records are stored in TXT records and start with "v=spf1".
async fn lookup_spf(resolver: &TokioAsyncResolver, target: &str) -> Result<Option<SpfData>, ProbeError> {
    debug!(target, "Looking up SPF record.");
    match resolver.txt_lookup(target).await {
        Ok(txt_records) => Ok(txt_records
            .iter()
            .map(|r| r.to_string())
            .find(|r| r.starts_with("v=spf1"))
            .map(|record| SpfData { record })),
        Err(e) if is_no_records(&e) => Ok(None),
        Err(e) => {
            warn!(target, error = %e, "SPF lookup failed.");
            Err(e.into())
        }
    }
}

/// DMARC records are stored in a TXT record at the `_dmarc` subdomain.
async fn lookup_dmarc(resolver: &TokioAsyncResolver, target: &str) -> Result<Option<DmarcData>, ProbeError> {
    let dmarc_target = format!("_dmarc.{target}");
    debug!(target = %dmarc_target, "Looking up DMARC record.");
    match resolver.txt_lookup(dmarc_target.as_str()).await {
        Ok(txt_records) => Ok(txt_records
            .iter()
            .map(|r| r.to_string())
            .find(|r| r.starts_with("v=DMARC1"))
            .map(|record| DmarcData { policy: dmarc_policy(&record), record })),
        Err(e) if is_no_records(&e) => Ok(None),
        Err(e) => {
            warn!(target = %dmarc_target, error = %e, "DMARC lookup failed.");
            Err(e.into())
        }
    }
}

/// Value of the `p=` tag.
pub fn dmarc_policy(record: &str) -> Option<String> {
    record
        .split(';')
        .map(str::trim)
        .find_map(|tag| tag.strip_prefix("p="))
        .map(|p| p.trim().to_string())
}

/// DKIM records live at `selector._domainkey.domain`. Selectors that do not exist are common.
async fn lookup_dkim(resolver: &TokioAsyncResolver, target: &str) -> Vec<DkimRecord> {
    let mut found_records = Vec::new();
    for selector in COMMON_DKIM_SELECTORS {
        let dkim_target = format!("{selector}._domainkey.{target}");
        match resolver.txt_lookup(dkim_target.as_str()).await {
            Ok(txt_records) => {
                found_records.extend(
                    txt_records
                        .iter()
                        .map(|r| r.to_string())
                        .filter(|r| r.starts_with("v=DKIM1"))
                        .map(|record| DkimRecord { selector: selector.to_string(), record }),
                );
            }
            Err(e) if is_no_records(&e) => {}
            Err(e) => warn!(selector, target = %dkim_target, error = %e, "DKIM lookup for this selector failed."),
        }
    }
    debug!(target, count = found_records.len(), "DKIM lookups finished.");
    found_records
}

/// Looks up CAA (Certification Authority Authorization) records for the root domain.
pub async fn lookup_caa(ctx: &ProbeContext) -> Result<CaaRecords, ProbeError> {
    let target = ctx.root_domain();
    debug!(target, "Looking up CAA records.");
    match ctx.resolver.lookup(target, RecordType::CAA).await {
        Ok(caa_lookup) => {
            let records: Vec<String> = caa_lookup.iter().map(|r| r.to_string()).collect();
            info!(count = %records.len(), "Found CAA records.");
            Ok(CaaRecords { records })
        }
        Err(e) if is_no_records(&e) => Ok(CaaRecords::default()),
        Err(e) => {
            warn!(target, error = %e, "CAA lookup failed.");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has(findings: &[AnalysisFinding], code: &str) -> bool {
        findings.iter().any(|f| f.code == code)
    }

    #[test]
    fn txt_entries_split_on_first_equals() {
        let records = split_txt_entries(vec![
            "google-site-verification=abc=def".to_string(),
            "v=spf1 include:_spf.example.com -all".to_string(),
            "just some text".to_string(),
        ]);
        assert_eq!(records.entries.get("google-site-verification").map(String::as_str), Some("abc=def"));
        assert_eq!(records.entries.get("v").map(String::as_str), Some("spf1 include:_spf.example.com -all"));
        assert_eq!(records.entries.len(), 2);
        assert_eq!(records.raw.len(), 3);
    }

    #[test]
    fn dmarc_policy_is_extracted() {
        assert_eq!(dmarc_policy("v=DMARC1; p=reject; rua=mailto:d@example.com").as_deref(), Some("reject"));
        assert_eq!(dmarc_policy("v=DMARC1;p=none").as_deref(), Some("none"));
        assert_eq!(dmarc_policy("v=DMARC1; sp=none"), None);
    }

    #[test]
    fn missing_records_produce_findings() {
        let findings = analyze_mail_config(&MailConfig::default());
        assert!(has(&findings, "DNS_DMARC_MISSING"));
        assert!(has(&findings, "DNS_SPF_MISSING"));
        assert!(has(&findings, "DNS_DKIM_MISSING"));
    }

    #[test]
    fn weak_policies_are_flagged() {
        let config = MailConfig {
            spf: Some(SpfData { record: "v=spf1 include:mail.example.com ~all".into() }),
            dmarc: Some(DmarcData { record: "v=DMARC1; p=none".into(), policy: Some("none".into()) }),
            dkim: vec![DkimRecord { selector: "google".into(), record: "v=DKIM1; k=rsa".into() }],
            analysis: Vec::new(),
        };
        let findings = analyze_mail_config(&config);
        assert!(has(&findings, "DNS_DMARC_POLICY_NONE"));
        assert!(has(&findings, "DNS_SPF_POLICY_SOFTFAIL"));
        assert!(!has(&findings, "DNS_DKIM_MISSING"));
    }

    #[test]
    fn strict_configuration_has_no_findings() {
        let config = MailConfig {
            spf: Some(SpfData { record: "v=spf1 -all".into() }),
            dmarc: Some(DmarcData { record: "v=DMARC1; p=reject".into(), policy: Some("reject".into()) }),
            dkim: vec![DkimRecord { selector: "default".into(), record: "v=DKIM1; p=MIGf".into() }],
            analysis: Vec::new(),
        };
        assert!(analyze_mail_config(&config).is_empty());
    }
}
