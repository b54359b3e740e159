// src/core/scanner/external_scanner.rs

//! Probes backed by third-party services: RDAP registry data, the Wayback
//! Machine CDX index, and PageSpeed Insights.

use serde_json::Value;
use tracing::{debug, info};

use super::ProbeContext;
use crate::config::PAGESPEED_KEY_ENV;
use crate::core::error::ProbeError;
use crate::core::models::{ArchiveStats, DomainInfo, QualityScores};

const RDAP_ENDPOINT: &str = "https://rdap.org/domain/";
const WAYBACK_CDX_ENDPOINT: &str = "https://web.archive.org/cdx/search/cdx";
const PAGESPEED_ENDPOINT: &str = "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";
const PAGESPEED_CATEGORIES: &[&str] = &["PERFORMANCE", "ACCESSIBILITY", "BEST_PRACTICES", "SEO"];

async fn get_json(ctx: &ProbeContext, request: reqwest::RequestBuilder) -> Result<Value, ProbeError> {
    let response = request.send().await?.error_for_status()?;
    debug!(url = %response.url(), target = %ctx.host, "External service answered.");
    Ok(response.json::<Value>().await?)
}

/// Registration data for the root domain from the RDAP bootstrap service.
pub async fn lookup_rdap(ctx: &ProbeContext) -> Result<DomainInfo, ProbeError> {
    let url = format!("{RDAP_ENDPOINT}{}", ctx.root_domain());
    info!(url = %url, "Querying RDAP.");
    let body = get_json(ctx, ctx.http.get(&url)).await?;
    Ok(parse_rdap(&body))
}

pub fn parse_rdap(body: &Value) -> DomainInfo {
    let event = |action: &str| {
        body["events"].as_array().and_then(|events| {
            events
                .iter()
                .find(|e| e["eventAction"].as_str() == Some(action))
                .and_then(|e| e["eventDate"].as_str())
                .map(str::to_string)
        })
    };

    let registrar = body["entities"].as_array().and_then(|entities| {
        entities
            .iter()
            .find(|e| e["roles"].as_array().is_some_and(|roles| roles.iter().any(|r| r == "registrar")))
            .and_then(vcard_full_name)
    });

    DomainInfo {
        handle: body["handle"].as_str().map(str::to_string),
        registrar,
        created: event("registration"),
        updated: event("last changed"),
        expires: event("expiration"),
        nameservers: body["nameservers"]
            .as_array()
            .map(|ns| {
                ns.iter()
                    .filter_map(|n| n["ldhName"].as_str())
                    .map(str::to_ascii_lowercase)
                    .collect()
            })
            .unwrap_or_default(),
        status: body["status"]
            .as_array()
            .map(|s| s.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default(),
    }
}

/// The `fn` property of an entity's jCard: `["vcard", [["fn", {}, "text", "Name"], ...]]`.
fn vcard_full_name(entity: &Value) -> Option<String> {
    entity["vcardArray"][1]
        .as_array()?
        .iter()
        .find(|property| property[0] == "fn")
        .and_then(|property| property[3].as_str())
        .map(str::to_string)
}

/// Snapshot statistics for the target host from the Wayback Machine.
pub async fn fetch_archive_stats(ctx: &ProbeContext) -> Result<ArchiveStats, ProbeError> {
    let request = ctx.http.get(WAYBACK_CDX_ENDPOINT).query(&[
        ("url", ctx.host.as_str()),
        ("output", "json"),
        ("fl", "timestamp,statuscode,digest,length,offset"),
    ]);
    info!(target = %ctx.host, "Querying the Wayback Machine.");
    let body = get_json(ctx, request).await?;
    summarize_cdx(&body)
}

/// Summarizes CDX rows. The first row is the column header.
pub fn summarize_cdx(body: &Value) -> Result<ArchiveStats, ProbeError> {
    let rows = body.as_array().ok_or_else(|| ProbeError::Parse("CDX response is not an array".to_string()))?;
    let snapshots: Vec<&[Value]> = rows.iter().skip(1).filter_map(|r| r.as_array().map(Vec::as_slice)).collect();
    if snapshots.is_empty() {
        return Err(ProbeError::NotFound("no archived snapshots".to_string()));
    }

    let column = |row: &[Value], index: usize| row.get(index).and_then(Value::as_str).map(str::to_string);

    let mut change_count = 0;
    let mut previous_digest: Option<String> = None;
    let mut total_size: u64 = 0;
    for &row in &snapshots {
        let digest = column(row, 2);
        if previous_digest.is_some() && digest != previous_digest {
            change_count += 1;
        }
        previous_digest = digest;
        total_size += column(row, 3).and_then(|l| l.parse::<u64>().ok()).unwrap_or(0);
    }

    Ok(ArchiveStats {
        first_scan: snapshots.first().and_then(|&row| column(row, 0)),
        last_scan: snapshots.last().and_then(|&row| column(row, 0)),
        total_scans: snapshots.len(),
        change_count,
        average_page_size: total_size / snapshots.len() as u64,
    })
}

/// Lighthouse category scores from PageSpeed Insights. Needs an API key.
pub async fn fetch_quality_scores(ctx: &ProbeContext) -> Result<QualityScores, ProbeError> {
    let key = ctx.config.pagespeed_api_key.as_deref().ok_or(ProbeError::MissingApiKey(PAGESPEED_KEY_ENV))?;

    let mut query: Vec<(&str, &str)> = vec![("url", ctx.url.as_str()), ("key", key)];
    query.extend(PAGESPEED_CATEGORIES.iter().map(|c| ("category", *c)));
    info!(target = %ctx.url, "Querying PageSpeed Insights.");
    let body = get_json(ctx, ctx.http.get(PAGESPEED_ENDPOINT).query(&query)).await?;
    parse_pagespeed(&body)
}

pub fn parse_pagespeed(body: &Value) -> Result<QualityScores, ProbeError> {
    let categories = &body["lighthouseResult"]["categories"];
    if !categories.is_object() {
        return Err(ProbeError::Parse("PageSpeed response has no lighthouse categories".to_string()));
    }
    let score = |name: &str| categories[name]["score"].as_f64();
    Ok(QualityScores {
        performance: score("performance"),
        accessibility: score("accessibility"),
        best_practices: score("best-practices"),
        seo: score("seo"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rdap_response_is_summarized() {
        let body = json!({
            "handle": "2336799_DOMAIN_COM-VRSN",
            "status": ["client delete prohibited", "client transfer prohibited"],
            "events": [
                {"eventAction": "registration", "eventDate": "1995-08-14T04:00:00Z"},
                {"eventAction": "expiration", "eventDate": "2030-08-13T04:00:00Z"},
                {"eventAction": "last changed", "eventDate": "2024-08-14T07:01:34Z"}
            ],
            "entities": [
                {"roles": ["technical"], "vcardArray": ["vcard", [["fn", {}, "text", "Someone Else"]]]},
                {"roles": ["registrar"], "vcardArray": ["vcard", [["version", {}, "text", "4.0"], ["fn", {}, "text", "RESERVED-IANA"]]]}
            ],
            "nameservers": [{"ldhName": "A.IANA-SERVERS.NET"}, {"ldhName": "B.IANA-SERVERS.NET"}]
        });
        let info = parse_rdap(&body);
        assert_eq!(info.handle.as_deref(), Some("2336799_DOMAIN_COM-VRSN"));
        assert_eq!(info.registrar.as_deref(), Some("RESERVED-IANA"));
        assert_eq!(info.created.as_deref(), Some("1995-08-14T04:00:00Z"));
        assert_eq!(info.expires.as_deref(), Some("2030-08-13T04:00:00Z"));
        assert_eq!(info.updated.as_deref(), Some("2024-08-14T07:01:34Z"));
        assert_eq!(info.nameservers, ["a.iana-servers.net", "b.iana-servers.net"]);
        assert_eq!(info.status.len(), 2);
    }

    #[test]
    fn sparse_rdap_response_gives_empty_fields() {
        assert_eq!(parse_rdap(&json!({})), DomainInfo::default());
    }

    #[test]
    fn cdx_rows_are_summarized() {
        let body = json!([
            ["timestamp", "statuscode", "digest", "length", "offset"],
            ["20010101000000", "200", "AAA", "1000", "0"],
            ["20050101000000", "200", "AAA", "2000", "0"],
            ["20100101000000", "200", "BBB", "3000", "0"],
            ["20200101000000", "200", "CCC", "bad", "0"]
        ]);
        let stats = summarize_cdx(&body).unwrap();
        assert_eq!(stats.total_scans, 4);
        assert_eq!(stats.first_scan.as_deref(), Some("20010101000000"));
        assert_eq!(stats.last_scan.as_deref(), Some("20200101000000"));
        assert_eq!(stats.change_count, 2);
        assert_eq!(stats.average_page_size, 1500);
    }

    #[test]
    fn empty_cdx_index_is_not_found() {
        assert!(matches!(summarize_cdx(&json!([])), Err(ProbeError::NotFound(_))));
        assert!(matches!(summarize_cdx(&json!({"error": "x"})), Err(ProbeError::Parse(_))));
    }

    #[test]
    fn pagespeed_scores_are_read() {
        let body = json!({"lighthouseResult": {"categories": {
            "performance": {"score": 0.91},
            "accessibility": {"score": 1.0},
            "best-practices": {"score": 0.78},
            "seo": {"score": null}
        }}});
        let scores = parse_pagespeed(&body).unwrap();
        assert_eq!(scores.performance, Some(0.91));
        assert_eq!(scores.best_practices, Some(0.78));
        assert_eq!(scores.seo, None);
        assert!(parse_pagespeed(&json!({"error": {}})).is_err());
    }
}
