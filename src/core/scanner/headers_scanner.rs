// src/core/scanner/headers_scanner.rs

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, LOCATION, SET_COOKIE, STRICT_TRANSPORT_SECURITY};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{header_pairs, ProbeContext};
use crate::core::error::ProbeError;
use crate::core::models::{
    AnalysisFinding, Cookie, CookieList, FirewallInfo, HeaderData, HstsPolicy, HttpSecurity, RedirectChain, Severity,
    SiteStatus,
};

/// One year, the minimum `max-age` accepted by the HSTS preload list.
const HSTS_PRELOAD_MIN_AGE: u64 = 31_536_000;

/// Header signatures of common web application firewalls: (header, value fragment, product).
/// An empty fragment matches on the header's presence alone.
const WAF_SIGNATURES: &[(&str, &str, &str)] = &[
    ("server", "cloudflare", "Cloudflare"),
    ("cf-ray", "", "Cloudflare"),
    ("server", "akamaighost", "Akamai"),
    ("x-akamai-transformed", "", "Akamai"),
    ("server", "sucuri", "Sucuri"),
    ("x-sucuri-id", "", "Sucuri"),
    ("x-sucuri-cache", "", "Sucuri"),
    ("x-iinfo", "", "Imperva Incapsula"),
    ("x-cdn", "incapsula", "Imperva Incapsula"),
    ("server", "awselb", "AWS Elastic Load Balancer"),
    ("x-amzn-waf-action", "", "AWS WAF"),
    ("server", "big-ip", "F5 BIG-IP"),
    ("x-wa-info", "", "F5 BIG-IP"),
    ("server", "barracuda", "Barracuda"),
    ("server", "ddos-guard", "DDoS-Guard"),
    ("x-datadome", "", "DataDome"),
    ("server", "fortiweb", "FortiWeb"),
    ("x-fw-hash", "", "Wordfence"),
    ("server", "yunjiasu", "Baidu Yunjiasu"),
    ("x-powered-by-anquanbao", "", "Anquanbao"),
    ("server", "safeline", "SafeLine"),
];

/// Checks for the presence of a specific HTTP header in a `HeaderMap`.
fn check_header(headers: &HeaderMap, name: &str) -> Option<HeaderData> {
    let value = headers.get(name)?;
    match value.to_str() {
        Ok(s) => Some(HeaderData { value: s.to_string() }),
        Err(_) => {
            warn!(header_name = name, "Header found but contained invalid UTF-8.");
            Some(HeaderData { value: "[Invalid UTF-8]".to_string() })
        }
    }
}

/// Every response header of the target page.
pub async fn collect_headers(ctx: &ProbeContext) -> Result<BTreeMap<String, String>, ProbeError> {
    let page = ctx.fetch_page().await?;
    let headers = header_pairs(&page.headers);
    info!(count = headers.len(), "Collected response headers.");
    Ok(headers)
}

/// Runs a scan for common security-related HTTP headers.
pub async fn run_http_security(ctx: &ProbeContext) -> Result<HttpSecurity, ProbeError> {
    info!(target = %ctx.url, "Starting security headers scan.");
    let page = ctx.fetch_page().await?;
    let security = inspect_security_headers(&page.headers);
    info!(findings = %security.analysis.len(), "Security headers scan finished.");
    Ok(security)
}

pub fn inspect_security_headers(headers: &HeaderMap) -> HttpSecurity {
    let mut results = HttpSecurity {
        strict_transport_security: check_header(headers, "strict-transport-security"),
        content_security_policy: check_header(headers, "content-security-policy"),
        x_frame_options: check_header(headers, "x-frame-options"),
        x_content_type_options: check_header(headers, "x-content-type-options"),
        referrer_policy: check_header(headers, "referrer-policy"),
        permissions_policy: check_header(headers, "permissions-policy"),
        analysis: Vec::new(),
    };
    results.analysis = analyze_security_headers(&results);
    results
}

/// Creates a finding for each missing security header.
fn analyze_security_headers(results: &HttpSecurity) -> Vec<AnalysisFinding> {
    let checks = [
        (results.strict_transport_security.is_none(), Severity::Warning, "HEADERS_HSTS_MISSING"),
        (results.content_security_policy.is_none(), Severity::Warning, "HEADERS_CSP_MISSING"),
        (results.x_frame_options.is_none(), Severity::Warning, "HEADERS_X_FRAME_OPTIONS_MISSING"),
        (results.x_content_type_options.is_none(), Severity::Info, "HEADERS_X_CONTENT_TYPE_OPTIONS_MISSING"),
        (results.referrer_policy.is_none(), Severity::Info, "HEADERS_REFERRER_POLICY_MISSING"),
        (results.permissions_policy.is_none(), Severity::Info, "HEADERS_PERMISSIONS_POLICY_MISSING"),
    ];
    checks
        .into_iter()
        .filter(|(missing, _, _)| *missing)
        .map(|(_, severity, code)| {
            debug!(code, "Security header missing.");
            AnalysisFinding::new(severity, code)
        })
        .collect()
}

pub async fn analyze_hsts(ctx: &ProbeContext) -> Result<HstsPolicy, ProbeError> {
    let page = ctx.fetch_page().await?;
    let value = page.headers.get(STRICT_TRANSPORT_SECURITY).and_then(|v| v.to_str().ok());
    let policy = parse_hsts(value);
    debug!(present = policy.present, preload_eligible = policy.preload_eligible, "HSTS policy parsed.");
    Ok(policy)
}

/// Parses a `Strict-Transport-Security` value. Directives are case-insensitive.
pub fn parse_hsts(value: Option<&str>) -> HstsPolicy {
    let Some(value) = value else {
        return HstsPolicy::default();
    };

    let mut policy = HstsPolicy { present: true, ..HstsPolicy::default() };
    for directive in value.split(';').map(str::trim).filter(|d| !d.is_empty()) {
        let (name, argument) = match directive.split_once('=') {
            Some((name, argument)) => (name.trim(), Some(argument.trim().trim_matches('"'))),
            None => (directive, None),
        };
        match name.to_ascii_lowercase().as_str() {
            "max-age" => policy.max_age = argument.and_then(|a| a.parse().ok()),
            "includesubdomains" => policy.include_sub_domains = true,
            "preload" => policy.preload = true,
            _ => {}
        }
    }
    policy.preload_eligible = policy.include_sub_domains
        && policy.preload
        && policy.max_age.is_some_and(|age| age >= HSTS_PRELOAD_MIN_AGE);
    policy
}

pub async fn collect_cookies(ctx: &ProbeContext) -> Result<CookieList, ProbeError> {
    let page = ctx.fetch_page().await?;
    let cookies: Vec<Cookie> = page
        .headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(parse_set_cookie)
        .collect();
    info!(count = cookies.len(), "Collected cookies.");
    Ok(CookieList { cookies })
}

/// Parses one `Set-Cookie` value. Attribute names are lowercased; flags map to an empty value.
pub fn parse_set_cookie(header: &str) -> Option<Cookie> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let attributes = parts
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|attribute| match attribute.split_once('=') {
            Some((k, v)) => (k.trim().to_ascii_lowercase(), v.trim().to_string()),
            None => (attribute.to_ascii_lowercase(), String::new()),
        })
        .collect();

    Some(Cookie { name: name.to_string(), value: value.trim().to_string(), attributes })
}

pub async fn detect_firewall(ctx: &ProbeContext) -> Result<FirewallInfo, ProbeError> {
    let page = ctx.fetch_page().await?;
    let info = identify_waf(&header_pairs(&page.headers));
    info!(has_waf = info.has_waf, waf = ?info.waf, "Firewall detection finished.");
    Ok(info)
}

/// Matches lowercase header pairs against the known WAF signatures. The first match wins.
pub fn identify_waf(headers: &BTreeMap<String, String>) -> FirewallInfo {
    WAF_SIGNATURES
        .iter()
        .find_map(|(header, fragment, product)| {
            let value = headers.get(*header)?;
            value.to_ascii_lowercase().contains(fragment).then(|| FirewallInfo {
                has_waf: true,
                waf: Some(product.to_string()),
                evidence: Some(format!("{header}: {value}")),
            })
        })
        .unwrap_or_default()
}

/// Whether the target answers, and how fast.
pub async fn check_status(ctx: &ProbeContext) -> Result<SiteStatus, ProbeError> {
    let started = Instant::now();
    let response = ctx.http.get(ctx.url.clone()).send().await?;
    let response_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let status = response.status();
    info!(status = %status, response_time_ms, "Status check finished.");
    Ok(SiteStatus { is_up: !status.is_server_error(), status_code: status.as_u16(), response_time_ms })
}

/// Walks the redirect chain hop by hop, up to `max_redirects` hops.
pub async fn follow_redirects(ctx: &ProbeContext) -> Result<RedirectChain, ProbeError> {
    let mut current = ctx.url.clone();
    let mut redirects = Vec::new();

    for _ in 0..ctx.config.max_redirects {
        let response = ctx.no_redirect_http.get(current.clone()).send().await?;
        if !response.status().is_redirection() {
            break;
        }
        let Some(location) = response.headers().get(LOCATION).and_then(|l| l.to_str().ok()) else {
            warn!(url = %current, "Redirect without a usable Location header.");
            break;
        };
        let next = current
            .join(location)
            .map_err(|e| ProbeError::Parse(format!("bad Location `{location}`: {e}")))?;
        debug!(from = %current, to = %next, "Following redirect.");
        redirects.push(next.to_string());
        current = next;
    }

    info!(hops = redirects.len(), "Redirect chain resolved.");
    Ok(RedirectChain { redirects })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn missing_security_headers_are_reported() {
        let mut headers = HeaderMap::new();
        headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
        let security = inspect_security_headers(&headers);

        assert_eq!(security.x_frame_options.as_ref().map(|h| h.value.as_str()), Some("DENY"));
        let codes: Vec<_> = security.analysis.iter().map(|f| f.code.as_str()).collect();
        assert!(codes.contains(&"HEADERS_HSTS_MISSING"));
        assert!(codes.contains(&"HEADERS_CSP_MISSING"));
        assert!(!codes.contains(&"HEADERS_X_FRAME_OPTIONS_MISSING"));
        assert_eq!(codes.len(), 5);
    }

    #[test]
    fn hsts_preload_policy_is_eligible() {
        let policy = parse_hsts(Some("max-age=63072000; includeSubDomains; preload"));
        assert!(policy.present && policy.include_sub_domains && policy.preload);
        assert_eq!(policy.max_age, Some(63_072_000));
        assert!(policy.preload_eligible);
    }

    #[test]
    fn short_hsts_policy_is_not_eligible() {
        let policy = parse_hsts(Some("Max-Age=\"86400\"; INCLUDESUBDOMAINS; preload"));
        assert_eq!(policy.max_age, Some(86_400));
        assert!(policy.include_sub_domains);
        assert!(!policy.preload_eligible);

        let absent = parse_hsts(None);
        assert!(!absent.present);
        assert_eq!(absent.max_age, None);
    }

    #[test]
    fn set_cookie_attributes_are_parsed() {
        let cookie = parse_set_cookie("sid=abc123; Path=/; Secure; HttpOnly; SameSite=Lax").unwrap();
        assert_eq!(cookie.name, "sid");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.attributes.get("path").map(String::as_str), Some("/"));
        assert_eq!(cookie.attributes.get("secure").map(String::as_str), Some(""));
        assert_eq!(cookie.attributes.get("samesite").map(String::as_str), Some("Lax"));

        assert!(parse_set_cookie("no-equals-sign").is_none());
        assert!(parse_set_cookie("=orphan").is_none());
    }

    #[test]
    fn waf_is_identified_from_headers() {
        let mut headers = BTreeMap::new();
        headers.insert("server".to_string(), "cloudflare".to_string());
        let info = identify_waf(&headers);
        assert!(info.has_waf);
        assert_eq!(info.waf.as_deref(), Some("Cloudflare"));
        assert_eq!(info.evidence.as_deref(), Some("server: cloudflare"));

        let mut plain = BTreeMap::new();
        plain.insert("server".to_string(), "nginx".to_string());
        assert_eq!(identify_waf(&plain), FirewallInfo::default());
    }

    #[test]
    fn presence_only_signatures_match_any_value() {
        let mut headers = BTreeMap::new();
        headers.insert("x-iinfo".to_string(), "12-3456-0 0NNN RT(1) q(0 -1 -1 0)".to_string());
        assert_eq!(identify_waf(&headers).waf.as_deref(), Some("Imperva Incapsula"));
    }
}
