// src/core/scanner/content_scanner.rs

//! Probes that read what the site publishes: page metadata, links, and the
//! well-known text files next to it.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::ProbeContext;
use crate::core::error::ProbeError;
use crate::core::models::{LinkedPages, RobotsRule, RobotsTxt, SecurityTxt, SocialTags, Sitemap};

const SECURITY_TXT_PATHS: &[&str] = &["/.well-known/security.txt", "/security.txt"];
const PGP_SIGNED_HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
const PGP_SIGNATURE_HEADER: &str = "-----BEGIN PGP SIGNATURE-----";
const SITEMAP_LOC: &str = r"(?is)<loc>\s*(.*?)\s*</loc>";

/// Elements matching `css`. An unparsable selector matches nothing.
fn select<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(e) => {
            warn!(selector = css, error = %e, "Invalid CSS selector.");
            Vec::new()
        }
    }
}

pub async fn extract_social_tags(ctx: &ProbeContext) -> Result<SocialTags, ProbeError> {
    let page = ctx.fetch_page().await?;
    let tags = parse_social_tags(&page.body);
    info!(open_graph = tags.open_graph.len(), twitter = tags.twitter.len(), "Social tags extracted.");
    Ok(tags)
}

/// Reads the title, the descriptive meta tags, the canonical link and the
/// Open Graph and Twitter card properties. The first occurrence of a key wins.
pub fn parse_social_tags(html: &str) -> SocialTags {
    let document = Html::parse_document(html);
    let mut tags = SocialTags {
        title: select(&document, "title")
            .first()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty()),
        ..SocialTags::default()
    };

    for meta in select(&document, "meta[content]") {
        let element = meta.value();
        let Some(key) = element.attr("property").or_else(|| element.attr("name")) else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let content = element.attr("content").unwrap_or_default().trim().to_string();

        if let Some(property) = key.strip_prefix("og:") {
            tags.open_graph.entry(property.to_string()).or_insert(content);
        } else if let Some(property) = key.strip_prefix("twitter:") {
            tags.twitter.entry(property.to_string()).or_insert(content);
        } else {
            let slot = match key.as_str() {
                "description" => &mut tags.description,
                "keywords" => &mut tags.keywords,
                "theme-color" => &mut tags.theme_color,
                _ => continue,
            };
            slot.get_or_insert(content);
        }
    }

    tags.canonical_url = select(&document, "link[rel][href]")
        .into_iter()
        .find(|link| {
            link.value()
                .attr("rel")
                .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("canonical")))
        })
        .and_then(|link| link.value().attr("href"))
        .map(str::to_string);

    tags
}

pub async fn list_linked_pages(ctx: &ProbeContext) -> Result<LinkedPages, ProbeError> {
    let page = ctx.fetch_page().await?;
    let links = parse_linked_pages(&page.body, &page.final_url);
    info!(internal = links.internal.len(), external = links.external.len(), "Linked pages listed.");
    Ok(links)
}

/// Splits the page's anchors into links on the same site and links elsewhere.
///
/// Links are resolved against `base`, stripped of fragments and deduplicated
/// in document order. Only http and https targets are kept; nothing is followed.
pub fn parse_linked_pages(html: &str, base: &Url) -> LinkedPages {
    let document = Html::parse_document(html);
    let site = base.host_str().map(strip_www);
    let mut seen = HashSet::new();
    let mut links = LinkedPages::default();

    for anchor in select(&document, "a[href]") {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let Ok(mut target) = base.join(href) else {
            debug!(href, "Skipping unresolvable link.");
            continue;
        };
        if !matches!(target.scheme(), "http" | "https") {
            continue;
        }
        target.set_fragment(None);

        let target_string = target.to_string();
        if !seen.insert(target_string.clone()) {
            continue;
        }
        if target.host_str().map(strip_www) == site {
            links.internal.push(target_string);
        } else {
            links.external.push(target_string);
        }
    }
    links
}

fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

pub async fn fetch_robots_txt(ctx: &ProbeContext) -> Result<RobotsTxt, ProbeError> {
    let (url, text) = ctx
        .fetch_text("/robots.txt")
        .await?
        .ok_or_else(|| ProbeError::NotFound("robots.txt".to_string()))?;
    let robots = parse_robots_txt(&text);
    info!(url = %url, rules = robots.rules.len(), "robots.txt parsed.");
    Ok(robots)
}

/// One rule per `Directive: value` line, comments and blank lines dropped.
pub fn parse_robots_txt(text: &str) -> RobotsTxt {
    let rules = text
        .lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter_map(|line| line.split_once(':'))
        .map(|(directive, value)| (directive.trim(), value.trim()))
        .filter(|(directive, _)| !directive.is_empty() && !directive.contains(char::is_whitespace))
        .map(|(directive, value)| RobotsRule { directive: directive.to_string(), value: value.to_string() })
        .collect();
    RobotsTxt { rules }
}

/// Looks for security.txt at its well-known location, then at the site root.
///
/// Absence is a result, not a failure. The probe fails only if every location errored.
pub async fn fetch_security_txt(ctx: &ProbeContext) -> Result<SecurityTxt, ProbeError> {
    let mut errors = Vec::new();
    for path in SECURITY_TXT_PATHS {
        match ctx.fetch_text(path).await {
            Ok(Some((url, text))) if !looks_like_html(&text) => {
                let (fields, is_pgp_signed) = parse_security_txt(&text);
                info!(url = %url, fields = fields.len(), is_pgp_signed, "security.txt found.");
                return Ok(SecurityTxt { is_present: true, found_at: Some(url.to_string()), is_pgp_signed, fields });
            }
            Ok(_) => debug!(path, "No security.txt at this location."),
            Err(e) => {
                debug!(path, error = %e, "security.txt request failed.");
                errors.push(e);
            }
        }
    }
    if errors.len() == SECURITY_TXT_PATHS.len() {
        if let Some(e) = errors.pop() {
            return Err(e);
        }
    }
    Ok(SecurityTxt::default())
}

fn looks_like_html(text: &str) -> bool {
    text.trim_start().starts_with('<')
}

/// Collects `Field: value` lines, keys lowercased, repeated fields kept in order.
/// Returns whether the file is a PGP clear-signed message.
pub fn parse_security_txt(text: &str) -> (BTreeMap<String, Vec<String>>, bool) {
    let is_pgp_signed = text.contains(PGP_SIGNED_HEADER);
    let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for line in text.lines().map(str::trim) {
        if line.starts_with(PGP_SIGNATURE_HEADER) {
            break;
        }
        if line.is_empty() || line.starts_with('#') || line.starts_with("-----") {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        // Armor header of a clear-signed message, not a field.
        if key.is_empty() || key.contains(char::is_whitespace) || (is_pgp_signed && key == "hash") {
            continue;
        }
        fields.entry(key).or_default().push(value.trim().to_string());
    }
    (fields, is_pgp_signed)
}

/// Reads `/sitemap.xml`, or the first sitemap that robots.txt advertises.
pub async fn fetch_sitemap(ctx: &ProbeContext) -> Result<Sitemap, ProbeError> {
    let (source, xml) = match ctx.fetch_text("/sitemap.xml").await? {
        Some((url, xml)) => (url.to_string(), xml),
        None => {
            let advertised = ctx
                .fetch_text("/robots.txt")
                .await?
                .and_then(|(_, text)| {
                    parse_robots_txt(&text)
                        .rules
                        .into_iter()
                        .find(|r| r.directive.eq_ignore_ascii_case("sitemap"))
                })
                .ok_or_else(|| ProbeError::NotFound("sitemap".to_string()))?;
            debug!(url = %advertised.value, "Using sitemap advertised by robots.txt.");
            let response = ctx.http.get(advertised.value.as_str()).send().await?.error_for_status()?;
            let (xml, _) = ctx.read_body(response).await?;
            (advertised.value, xml)
        }
    };

    let urls = parse_sitemap_locs(&xml)?;
    info!(source = %source, urls = urls.len(), "Sitemap parsed.");
    Ok(Sitemap { source, urls })
}

/// The `<loc>` entries of a sitemap or sitemap index, in document order.
pub fn parse_sitemap_locs(xml: &str) -> Result<Vec<String>, ProbeError> {
    let loc = Regex::new(SITEMAP_LOC).map_err(|e| ProbeError::Parse(e.to_string()))?;
    Ok(loc
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
        .filter(|u| !u.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r##"<!doctype html>
<html><head>
  <title> Example Domain </title>
  <meta name="description" content="An example page">
  <meta name="Description" content="ignored duplicate">
  <meta name="theme-color" content="#112233">
  <meta property="og:title" content="Example OG">
  <meta property="og:image" content="https://example.com/card.png">
  <meta name="twitter:card" content="summary_large_image">
  <link rel="icon" href="/favicon.ico">
  <link rel="Canonical" href="https://example.com/">
</head><body>
  <a href="/about">About</a>
  <a href="https://www.example.com/contact#form">Contact</a>
  <a href="/about">About again</a>
  <a href="https://github.com/example">GitHub</a>
  <a href="mailto:hi@example.com">Mail</a>
  <a href="#top">Top</a>
  <a href="javascript:void(0)">Nothing</a>
</body></html>"##;

    #[test]
    fn social_tags_are_read() {
        let tags = parse_social_tags(PAGE);
        assert_eq!(tags.title.as_deref(), Some("Example Domain"));
        assert_eq!(tags.description.as_deref(), Some("An example page"));
        assert_eq!(tags.theme_color.as_deref(), Some("#112233"));
        assert_eq!(tags.canonical_url.as_deref(), Some("https://example.com/"));
        assert_eq!(tags.open_graph.get("title").map(String::as_str), Some("Example OG"));
        assert_eq!(tags.open_graph.len(), 2);
        assert_eq!(tags.twitter.get("card").map(String::as_str), Some("summary_large_image"));
    }

    #[test]
    fn empty_markup_has_no_tags() {
        assert_eq!(parse_social_tags(""), SocialTags::default());
    }

    #[test]
    fn links_are_split_and_deduplicated() {
        let base = Url::parse("https://example.com/").unwrap();
        let links = parse_linked_pages(PAGE, &base);
        assert_eq!(links.internal, ["https://example.com/about", "https://www.example.com/contact"]);
        assert_eq!(links.external, ["https://github.com/example"]);
    }

    #[test]
    fn robots_directives_are_parsed() {
        let robots = parse_robots_txt(
            "# comment\nUser-agent: *\nDisallow: /admin # private\n\nAllow: /\nSitemap: https://example.com/sitemap.xml\nnot a rule\n",
        );
        let pairs: Vec<_> = robots.rules.iter().map(|r| (r.directive.as_str(), r.value.as_str())).collect();
        assert_eq!(
            pairs,
            [
                ("User-agent", "*"),
                ("Disallow", "/admin"),
                ("Allow", "/"),
                ("Sitemap", "https://example.com/sitemap.xml"),
            ]
        );
    }

    #[test]
    fn plain_security_txt_fields_are_collected() {
        let (fields, signed) = parse_security_txt(
            "# Our policy\nContact: mailto:security@example.com\nContact: https://example.com/report\nExpires: 2030-01-01T00:00:00.000Z\n",
        );
        assert!(!signed);
        assert_eq!(fields["contact"].len(), 2);
        assert_eq!(fields["expires"], ["2030-01-01T00:00:00.000Z"]);
    }

    #[test]
    fn signed_security_txt_is_detected() {
        let text = "-----BEGIN PGP SIGNED MESSAGE-----\nHash: SHA256\n\nContact: mailto:sec@example.com\n-----BEGIN PGP SIGNATURE-----\niQIzBAEBCAAdFiEE\n-----END PGP SIGNATURE-----\n";
        let (fields, signed) = parse_security_txt(text);
        assert!(signed);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["contact"], ["mailto:sec@example.com"]);
    }

    #[test]
    fn html_is_not_mistaken_for_security_txt() {
        assert!(looks_like_html("  <!DOCTYPE html><html>"));
        assert!(!looks_like_html("Contact: mailto:a@b.c"));
    }

    #[test]
    fn sitemap_locations_are_extracted() {
        let xml = r#"<?xml version="1.0"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.com/</loc></url>
  <url><loc>
    https://example.com/search?q=a&amp;page=2
  </loc></url>
</urlset>"#;
        let urls = parse_sitemap_locs(xml).unwrap();
        assert_eq!(urls, ["https://example.com/", "https://example.com/search?q=a&page=2"]);
        assert!(parse_sitemap_locs("<html></html>").unwrap().is_empty());
    }
}
