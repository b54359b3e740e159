// src/core/fingerprint/mod.rs

//! Multi-signal technology classifier.
//!
//! Six independent stages look at the page markup and the response headers.
//! Every stage runs on every call and their detections are pooled, then
//! collapsed to one entry per technology name, keeping the most confident.
//!
//! All regular expressions are compiled once in [`Classifier::new`]; the
//! classifier is immutable afterwards and can be shared behind an `Arc`.

pub mod rules;

use std::collections::HashMap;

use regex::Regex;
use tracing::{debug, error};

use crate::core::error::FingerprintError;
use crate::core::models::{Confidence, TechCategory, Technology};
use self::rules::{
    RevealingHeader, RuleTable, BUILTIN_TABLES, BUNDLER_MARKERS, CDN_SCRIPT_SHAPES, CSS_FRAMEWORKS,
    REVEALING_HEADERS,
};

/// A CSS framework is only reported above this many class matches.
pub const CSS_REPORT_THRESHOLD: usize = 3;
/// Above this many class matches a CSS framework is reported with high confidence.
pub const CSS_HIGH_THRESHOLD: usize = 10;

/// Markup beyond this many bytes is not scanned.
pub const MAX_MARKUP_LEN: usize = 2 * 1024 * 1024;

const EVIDENCE_MAX_CHARS: usize = 80;

const META_GENERATOR: &str = r#"(?is)<meta\s[^>]*?\bname\s*=\s*["']generator["'][^>]*?\bcontent\s*=\s*(?:"([^"]*)"|'([^']*)')|<meta\s[^>]*?\bcontent\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*?\bname\s*=\s*["']generator["']"#;
const VERSION_LIKE: &str = r"\d+\.\d+(?:\.\d+)?";
const CLASS_ATTRIBUTE: &str = r#"(?i)\bclass\s*=\s*(?:"([^"]*)"|'([^']*)')"#;
const SCRIPT_SRC: &str = r#"(?is)<script\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#;

struct CompiledRule {
    name: &'static str,
    category: TechCategory,
    patterns: Vec<Regex>,
    header_names: Vec<String>,
    version: Option<Regex>,
    confidence: Confidence,
}

/// Compiled form of the signature tables.
pub struct Classifier {
    rules: Vec<CompiledRule>,
    revealing_headers: &'static [RevealingHeader],
    meta_generator: Regex,
    version_like: Regex,
    bundlers: Vec<(Regex, &'static str)>,
    class_attribute: Regex,
    css_frameworks: Vec<(&'static str, Regex)>,
    script_src: Regex,
    cdn_shapes: Vec<(&'static str, Regex)>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier").field("rules", &self.rules.len()).finish_non_exhaustive()
    }
}

fn compile(owner: &str, pattern: &str) -> Result<Regex, FingerprintError> {
    Regex::new(pattern).map_err(|source| FingerprintError::InvalidPattern {
        rule: owner.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}

impl Classifier {
    /// Compiles the given category tables together with the fixed signal tables.
    pub fn new(tables: &[RuleTable]) -> Result<Self, FingerprintError> {
        let mut rules = Vec::new();
        for table in tables {
            for rule in table.rules {
                rules.push(CompiledRule {
                    name: rule.name,
                    category: table.category,
                    patterns: rule.match_patterns.iter().map(|p| compile(rule.name, p)).collect::<Result<_, _>>()?,
                    header_names: rule.header_names.iter().map(|h| h.to_ascii_lowercase()).collect(),
                    version: rule.version_pattern.map(|p| compile(rule.name, p)).transpose()?,
                    confidence: rule.base_confidence,
                });
            }
        }

        let classifier = Self {
            rules,
            revealing_headers: REVEALING_HEADERS,
            meta_generator: compile("meta-generator", META_GENERATOR)?,
            version_like: compile("meta-generator", VERSION_LIKE)?,
            bundlers: BUNDLER_MARKERS
                .iter()
                .map(|(pattern, name)| -> Result<_, FingerprintError> { Ok((compile(name, pattern)?, *name)) })
                .collect::<Result<_, _>>()?,
            class_attribute: compile("css-framework", CLASS_ATTRIBUTE)?,
            css_frameworks: CSS_FRAMEWORKS
                .iter()
                .map(|(name, pattern)| -> Result<_, FingerprintError> { Ok((*name, compile(name, pattern)?)) })
                .collect::<Result<_, _>>()?,
            script_src: compile("script-cdn", SCRIPT_SRC)?,
            cdn_shapes: CDN_SCRIPT_SHAPES
                .iter()
                .map(|(name, pattern)| -> Result<_, FingerprintError> { Ok((*name, compile(name, pattern)?)) })
                .collect::<Result<_, _>>()?,
        };
        debug!(rules = classifier.rules.len(), "Technology classifier compiled.");
        Ok(classifier)
    }

    /// The classifier with the shipped signature tables.
    pub fn builtin() -> Result<Self, FingerprintError> {
        Self::new(BUILTIN_TABLES)
    }

    /// Detects technologies from a page's markup and its response headers.
    ///
    /// Header names are matched case-insensitively. The result holds one entry
    /// per technology, in the order each was first detected.
    /// Only the first [`MAX_MARKUP_LEN`] bytes of `markup` are scanned.
    pub fn detect(&self, markup: &str, headers: &HashMap<String, String>) -> Vec<Technology> {
        let markup = clamp_markup(markup);
        let headers: HashMap<String, &str> =
            headers.iter().map(|(k, v)| (k.to_ascii_lowercase(), v.as_str())).collect();

        let mut found = Vec::new();
        self.infer_from_headers(&headers, &mut found);
        self.infer_from_meta_generator(markup, &mut found);
        self.infer_from_bundler_artifacts(markup, &mut found);
        self.infer_from_css_classes(markup, &mut found);
        self.infer_from_script_cdns(markup, &mut found);
        self.infer_from_rule_tables(markup, &headers, &mut found);

        let signals = found.len();
        let technologies = deduplicate(found);
        debug!(signals, technologies = technologies.len(), "Technology detection finished.");
        technologies
    }

    fn infer_from_headers(&self, headers: &HashMap<String, &str>, found: &mut Vec<Technology>) {
        for (header, category) in [("server", TechCategory::Server), ("x-powered-by", TechCategory::Backend)] {
            let Some(value) = headers.get(header) else { continue };
            for product in value.split(',') {
                if let Some(tech) = split_product(product) {
                    found.push(tech.with_category(category).with_evidence(format!("header:{header}")));
                }
            }
        }

        for revealing in self.revealing_headers {
            let Some(value) = headers.get(revealing.header) else { continue };
            let tech = match revealing.name {
                Some(name) => Technology::new(name, Confidence::Medium)
                    .with_version(revealing.value_is_version.then(|| value.trim().to_string())),
                None => match self.split_generator(value) {
                    Some((name, version)) => Technology::new(name, Confidence::Medium).with_version(version),
                    None => continue,
                },
            };
            found.push(tech.with_category(revealing.category).with_evidence(format!("header:{}", revealing.header)));
        }
    }

    fn infer_from_meta_generator(&self, markup: &str, found: &mut Vec<Technology>) {
        let Some(caps) = self.meta_generator.captures(markup) else { return };
        let Some(content) = (1..=4).find_map(|i| caps.get(i)).map(|m| m.as_str().trim()) else { return };
        let Some((name, version)) = self.split_generator(content) else { return };
        found.push(
            Technology::new(name, Confidence::High)
                .with_version(version)
                .with_evidence(clip(&format!("meta:generator={content}"))),
        );
    }

    /// `Drupal 10 (https://www.drupal.org)` style values: the first word is the
    /// name, the last version-like token after it is the version.
    fn split_generator<'a>(&self, value: &'a str) -> Option<(&'a str, Option<String>)> {
        let value = value.trim();
        let name = value.split_whitespace().next()?;
        let rest = &value[name.len()..];
        let version = self.version_like.find_iter(rest).last().map(|m| m.as_str().to_string());
        Some((name, version))
    }

    fn infer_from_bundler_artifacts(&self, markup: &str, found: &mut Vec<Technology>) {
        for (marker, name) in &self.bundlers {
            if let Some(m) = marker.find(markup) {
                found.push(
                    Technology::new(*name, Confidence::High)
                        .with_category(TechCategory::Bundler)
                        .with_evidence(clip(&format!("markup:{}", m.as_str()))),
                );
            }
        }
    }

    fn infer_from_css_classes(&self, markup: &str, found: &mut Vec<Technology>) {
        let class_values: Vec<&str> = self
            .class_attribute
            .captures_iter(markup)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .map(|m| m.as_str())
            .collect();
        if class_values.is_empty() {
            return;
        }

        for (name, pattern) in &self.css_frameworks {
            let count: usize = class_values.iter().map(|value| pattern.find_iter(value).count()).sum();
            if count <= CSS_REPORT_THRESHOLD {
                continue;
            }
            let confidence = if count > CSS_HIGH_THRESHOLD { Confidence::High } else { Confidence::Medium };
            found.push(
                Technology::new(*name, confidence)
                    .with_category(TechCategory::CssFramework)
                    .with_evidence(format!("css:{count} class matches")),
            );
        }
    }

    fn infer_from_script_cdns(&self, markup: &str, found: &mut Vec<Technology>) {
        for caps in self.script_src.captures_iter(markup) {
            let Some(src) = caps.get(1).map(|m| m.as_str()) else { continue };
            for (cdn, shape) in &self.cdn_shapes {
                let Some(hit) = shape.captures(src) else { continue };
                let (Some(package), Some(version)) = (hit.get(1), hit.get(2)) else { continue };
                found.push(
                    Technology::new(package.as_str(), Confidence::High)
                        .with_version(Some(version.as_str().to_string()))
                        .with_category(TechCategory::Library)
                        .with_evidence(clip(&format!("script:{cdn}:{src}"))),
                );
            }
        }
    }

    fn infer_from_rule_tables(&self, markup: &str, headers: &HashMap<String, &str>, found: &mut Vec<Technology>) {
        for rule in &self.rules {
            let evidence = if let Some(m) = rule.patterns.iter().find_map(|re| re.find(markup)) {
                format!("markup:{}", m.as_str())
            } else if let Some(header) = rule.header_names.iter().find(|h| headers.contains_key(h.as_str())) {
                format!("header:{header}")
            } else {
                continue;
            };

            let version = rule
                .version
                .as_ref()
                .and_then(|re| re.captures(markup))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string());

            found.push(
                Technology::new(rule.name, rule.confidence)
                    .with_version(version)
                    .with_category(rule.category)
                    .with_evidence(clip(&evidence)),
            );
        }
    }
}

/// Splits a `product/version comment` header value such as `nginx/1.25.3` or
/// `Apache/2.4.57 (Debian)`.
fn split_product(value: &str) -> Option<Technology> {
    let value = value.trim();
    let (name, version) = match value.split_once('/') {
        Some((name, rest)) => (name.trim(), rest.split_whitespace().next().map(str::to_string)),
        None => (value, None),
    };
    if name.is_empty() {
        return None;
    }
    Some(Technology::new(name, Confidence::Medium).with_version(version))
}

fn clamp_markup(markup: &str) -> &str {
    if markup.len() <= MAX_MARKUP_LEN {
        return markup;
    }
    let mut cut = MAX_MARKUP_LEN;
    while !markup.is_char_boundary(cut) {
        cut -= 1;
    }
    debug!(bytes = markup.len(), scanned = cut, "Markup clamped before classification.");
    &markup[..cut]
}

fn clip(evidence: &str) -> String {
    evidence.chars().take(EVIDENCE_MAX_CHARS).collect()
}

/// Collapses detections sharing a (case-insensitive) name into one entry.
///
/// The more confident entry wins; on a tie the first one seen wins. The
/// winner inherits a missing category from the loser, and a missing version
/// only from an equally confident loser. The evidence of both is kept. Entries stay at the position of their first
/// detection.
pub fn deduplicate(found: Vec<Technology>) -> Vec<Technology> {
    let mut unique: Vec<Technology> = Vec::with_capacity(found.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for tech in found {
        let key = tech.name.to_lowercase();
        match index.get(&key) {
            Some(&i) => {
                let kept = &mut unique[i];
                if tech.confidence > kept.confidence {
                    let loser = std::mem::replace(kept, tech);
                    backfill(kept, loser);
                } else {
                    backfill(kept, tech);
                }
            }
            None => {
                index.insert(key, unique.len());
                unique.push(tech);
            }
        }
    }
    unique
}

fn backfill(winner: &mut Technology, loser: Technology) {
    if winner.version.is_none() && loser.confidence == winner.confidence {
        winner.version = loser.version;
    }
    if winner.category.is_none() {
        winner.category = loser.category;
    }
    for evidence in loser.evidence {
        if !winner.evidence.contains(&evidence) {
            winner.evidence.push(evidence);
        }
    }
}

/// Runs the classifier with the shipped tables. Never panics; returns an
/// empty list when nothing is recognised.
///
/// Every call compiles the whole rule set again. Callers classifying more
/// than one page should build a [`Classifier`] once and share it.
pub fn detect_technologies(markup: &str, headers: &HashMap<String, String>) -> Vec<Technology> {
    match Classifier::builtin() {
        Ok(classifier) => classifier.detect(markup, headers),
        Err(e) => {
            error!(error = %e, "Builtin signature tables failed to compile.");
            Vec::new()
        }
    }
}
