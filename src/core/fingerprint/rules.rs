// src/core/fingerprint/rules.rs

//! Static signature data for the technology classifier.
//!
//! Nothing in here matches anything; these are plain tables that
//! [`Classifier::new`](super::Classifier::new) compiles once. Patterns are
//! regular expressions in `regex` crate syntax.

use crate::core::models::{Confidence, TechCategory};

/// One entry of a category table.
///
/// A rule matches when any of `match_patterns` is found in the markup, or
/// when any of `header_names` is present in the response headers
/// (case-insensitive). `version_pattern`'s first capture group, applied to
/// the markup, becomes the version.
#[derive(Debug, Clone, Copy)]
pub struct PatternRule {
    pub name: &'static str,
    pub match_patterns: &'static [&'static str],
    pub header_names: &'static [&'static str],
    pub version_pattern: Option<&'static str>,
    pub base_confidence: Confidence,
}

/// A named group of rules sharing a category.
#[derive(Debug, Clone, Copy)]
pub struct RuleTable {
    pub category: TechCategory,
    pub rules: &'static [PatternRule],
}

const fn rule(
    name: &'static str,
    match_patterns: &'static [&'static str],
    header_names: &'static [&'static str],
    version_pattern: Option<&'static str>,
    base_confidence: Confidence,
) -> PatternRule {
    PatternRule { name, match_patterns, header_names, version_pattern, base_confidence }
}

use Confidence::{High, Low, Medium};

// --- Category Tables ---

pub static FRAMEWORKS: &[PatternRule] = &[
    rule("React", &[r"data-reactroot", r"react-dom(?:\.production|\.development)?(?:\.min)?\.js", r"__REACT_DEVTOOLS_GLOBAL_HOOK__", r"_reactListening"], &[], Some(r"react(?:-dom)?@(\d+\.\d+\.\d+)"), Medium),
    rule("Next.js", &[r"/_next/static/", r#"id=["']__NEXT_DATA__["']"#], &["x-nextjs-cache", "x-nextjs-matched-path"], Some(r"next@(\d+\.\d+\.\d+)"), High),
    rule("Vue.js", &[r"data-v-app", r"__VUE__", r"data-v-[0-9a-f]{8}", r"vue(?:\.runtime)?(?:\.global)?(?:\.prod)?(?:\.min)?\.js"], &[], Some(r"vue@(\d+\.\d+\.\d+)"), Medium),
    rule("Nuxt.js", &[r"__NUXT__", r"/_nuxt/", r#"id=["']__nuxt["']"#], &[], None, High),
    rule("Angular", &[r#"ng-version=["'][\d.]+["']"#, r"\bng-app\b", r"_nghost-[a-z0-9-]+"], &[], Some(r#"ng-version=["']([\d.]+)["']"#), High),
    rule("AngularJS", &[r"angular(?:\.min)?\.js", r"\bng-controller\b"], &[], Some(r"angular(?:js)?/(\d+\.\d+\.\d+)/angular"), Medium),
    rule("Svelte", &[r#"class=["'][^"']*\bsvelte-[a-z0-9]+"#], &[], None, Medium),
    rule("SvelteKit", &[r"__sveltekit_", r"/_app/immutable/"], &[], None, High),
    rule("Gatsby", &[r#"id=["']___gatsby["']"#, r"/page-data/app-data\.json"], &[], None, High),
    rule("Astro", &[r"astro-island", r"/_astro/"], &[], Some(r"Astro v(\d+\.\d+(?:\.\d+)?)"), High),
    rule("Remix", &[r"__remixContext", r"__remixManifest"], &[], None, High),
    rule("Ember.js", &[r"ember-application", r"\bember-view\b"], &[], None, Medium),
    rule("Backbone.js", &[r"backbone(?:-min)?(?:\.min)?\.js"], &[], Some(r"backbone(?:\.js)?/(\d+\.\d+\.\d+)"), Medium),
    rule("Alpine.js", &[r"\bx-data=", r"alpinejs"], &[], Some(r"alpinejs@(\d+\.\d+\.\d+)"), Medium),
    rule("htmx", &[r"\bhx-(?:get|post|put|delete|swap|target)=", r"htmx(?:\.min)?\.js"], &[], Some(r"htmx\.org@(\d+\.\d+\.\d+)"), Medium),
    rule("SolidJS", &[r"\bdata-hk=", r"_\$HY"], &[], None, Low),
    rule("Preact", &[r"preact(?:\.min)?\.js", r"__PREACT_DEVTOOLS__"], &[], None, Medium),
    rule("jQuery", &[r"jquery(?:[.-]\d+\.\d+\.\d+)?(?:\.slim)?(?:\.min)?\.js", r"jQuery\.fn\.jquery"], &[], Some(r"jquery[.-](\d+\.\d+\.\d+)(?:\.slim)?(?:\.min)?\.js"), Medium),
    rule("Django", &[r"csrfmiddlewaretoken", r"__admin_media_prefix__"], &[], None, Medium),
    rule("Ruby on Rails", &[r#"name=["']csrf-param["'][^>]*content=["']authenticity_token["']"#, r"data-turbo-track"], &["x-runtime"], None, Medium),
    rule("ASP.NET", &[r"__VIEWSTATE", r"__EVENTVALIDATION", r"WebResource\.axd"], &["x-aspnet-version", "x-aspnetmvc-version"], None, High),
    rule("Laravel", &[r"laravel_session", r#"name=["']csrf-token["']"#], &[], None, Low),
    rule("Blazor", &[r"_framework/blazor\.(?:server|webassembly)\.js"], &[], None, High),
];

pub static CMS: &[PatternRule] = &[
    rule("WordPress", &[r"/wp-content/", r"/wp-includes/", r"wp-json", r"wp-emoji-release\.min\.js"], &["x-pingback"], Some(r"WordPress (\d+\.\d+(?:\.\d+)?)"), High),
    rule("Drupal", &[r"Drupal\.settings", r"/sites/default/files/", r"drupal(?:\.min)?\.js", r"data-drupal-selector"], &["x-drupal-cache", "x-drupal-dynamic-cache"], Some(r"Drupal (\d+(?:\.\d+)*)"), High),
    rule("Joomla", &[r"/media/jui/", r"/media/system/js/", r"Joomla!"], &[], Some(r"Joomla! (\d+\.\d+)"), High),
    rule("Shopify", &[r"cdn\.shopify\.com", r"Shopify\.theme", r"myshopify\.com"], &["x-shopify-stage", "x-shopid", "x-shardid"], None, High),
    rule("Wix", &[r"static\.wixstatic\.com", r"wix-code-sdk", r"X-Wix-Published-Version"], &["x-wix-request-id"], None, High),
    rule("Squarespace", &[r"static1\.squarespace\.com", r"Static\.SQUARESPACE_CONTEXT"], &[], None, High),
    rule("Ghost", &[r"ghost-(?:portal|search)", r"/ghost/api/"], &["x-ghost-cache-status"], Some(r#"content=["']Ghost (\d+\.\d+)"#), High),
    rule("Magento", &[r"Mage\.Cookies", r"/static/version\d+/", r"mage/cookies"], &["x-magento-cache-debug", "x-magento-tags"], None, High),
    rule("Webflow", &[r"data-wf-page", r"assets\.website-files\.com", r"webflow\.js"], &[], None, High),
    rule("TYPO3", &[r"/typo3temp/", r"/typo3conf/"], &[], None, High),
    rule("PrestaShop", &[r"prestashop", r"/modules/ps_"], &[], None, Medium),
    rule("Blogger", &[r"blogger\.com/static/", r"\.blogspot\.com"], &[], None, Medium),
    rule("HubSpot CMS", &[r"hs-sites\.com", r"/hs/hsstatic/"], &[], None, Medium),
    rule("Contentful", &[r"images\.ctfassets\.net"], &[], None, Low),
    rule("Sanity", &[r"cdn\.sanity\.io"], &[], None, Low),
];

pub static ANALYTICS: &[PatternRule] = &[
    rule("Google Analytics", &[r"google-analytics\.com/(?:ga|analytics)\.js", r"googletagmanager\.com/gtag/js", r"\bgtag\(\s*['\x22]config['\x22]"], &[], None, High),
    rule("Google Tag Manager", &[r"googletagmanager\.com/gtm\.js", r"GTM-[A-Z0-9]{4,}"], &[], None, High),
    rule("Facebook Pixel", &[r"connect\.facebook\.net/[^/]+/fbevents\.js", r"\bfbq\(\s*['\x22]init"], &[], None, High),
    rule("Hotjar", &[r"static\.hotjar\.com", r"\bhjSiteSettings\b"], &[], None, High),
    rule("Matomo", &[r"\bmatomo\.js\b", r"\bpiwik\.js\b", r"_paq\.push"], &[], None, High),
    rule("Plausible", &[r"plausible\.io/js/"], &[], None, High),
    rule("Mixpanel", &[r"cdn\.mxpnl\.com", r"mixpanel\.init\("], &[], None, High),
    rule("Segment", &[r"cdn\.segment\.com/analytics\.js"], &[], None, High),
    rule("Microsoft Clarity", &[r"clarity\.ms/tag/"], &[], None, High),
    rule("HubSpot", &[r"js\.hs-scripts\.com", r"js\.hs-analytics\.net"], &[], None, High),
    rule("Heap", &[r"cdn\.heapanalytics\.com", r"heap\.load\("], &[], None, High),
    rule("Fathom", &[r"cdn\.usefathom\.com"], &[], None, High),
    rule("Cloudflare Web Analytics", &[r"static\.cloudflareinsights\.com/beacon"], &[], None, High),
    rule("Yandex Metrica", &[r"mc\.yandex\.ru/metrika"], &[], None, High),
    rule("Adobe Analytics", &[r"\bs_code\.js\b", r"assets\.adobedtm\.com"], &[], None, Medium),
];

pub static CDN: &[PatternRule] = &[
    rule("Cloudflare", &[r"cdn-cgi/", r"__cf_bm"], &["cf-ray", "cf-cache-status"], None, High),
    rule("Amazon CloudFront", &[r"[a-z0-9]+\.cloudfront\.net"], &["x-amz-cf-id", "x-amz-cf-pop"], None, High),
    rule("Fastly", &[r"\.fastly\.net"], &["x-fastly-request-id", "fastly-debug-digest"], None, High),
    rule("Akamai", &[r"\.akamaihd\.net", r"\.akamaized\.net"], &["x-akamai-transformed", "akamai-grn"], None, High),
    rule("jsDelivr", &[r"cdn\.jsdelivr\.net"], &[], None, High),
    rule("unpkg", &[r"unpkg\.com/"], &[], None, High),
    rule("cdnjs", &[r"cdnjs\.cloudflare\.com"], &[], None, High),
    rule("Google Hosted Libraries", &[r"ajax\.googleapis\.com/ajax/libs"], &[], None, High),
    rule("Vercel", &[r"/_vercel/insights"], &["x-vercel-id", "x-vercel-cache"], None, High),
    rule("Netlify", &[r"netlify-identity-widget"], &["x-nf-request-id"], None, High),
    rule("BunnyCDN", &[r"\.b-cdn\.net"], &["cdn-pullzone", "cdn-uid"], None, High),
    rule("Azure CDN", &[r"\.azureedge\.net"], &["x-azure-ref"], None, Medium),
    rule("KeyCDN", &[r"\.kxcdn\.com"], &[], None, Medium),
];

pub static SECURITY: &[PatternRule] = &[
    rule("reCAPTCHA", &[r"google\.com/recaptcha/", r"\bg-recaptcha\b", r"recaptcha/api\.js"], &[], None, High),
    rule("hCaptcha", &[r"hcaptcha\.com/1/api\.js", r"\bh-captcha\b"], &[], None, High),
    rule("Cloudflare Turnstile", &[r"challenges\.cloudflare\.com/turnstile"], &[], None, High),
    rule("Sucuri", &[r"sucuri\.net"], &["x-sucuri-id", "x-sucuri-cache"], None, High),
    rule("Imperva", &[r"/_Incapsula_Resource"], &["x-iinfo"], None, High),
    rule("DataDome", &[r"js\.datadome\.co"], &["x-datadome", "x-datadome-cid"], None, High),
    rule("Wordfence", &[r"wordfence_", r"/wp-content/plugins/wordfence/"], &[], None, Medium),
    rule("PerimeterX", &[r"client\.perimeterx\.net", r"_pxAppId"], &[], None, High),
    rule("HSTS", &[], &["strict-transport-security"], None, Low),
];

/// Every category table, in the order they are evaluated.
pub static BUILTIN_TABLES: &[RuleTable] = &[
    RuleTable { category: TechCategory::Framework, rules: FRAMEWORKS },
    RuleTable { category: TechCategory::Cms, rules: CMS },
    RuleTable { category: TechCategory::Analytics, rules: ANALYTICS },
    RuleTable { category: TechCategory::Cdn, rules: CDN },
    RuleTable { category: TechCategory::Security, rules: SECURITY },
];

// --- Signal Tables ---

/// A response header that gives the origin away.
///
/// With a fixed `name` the header's value is taken as the version when
/// `value_is_version` is set. Without one, the value itself names the
/// technology and is split like a `server` header.
#[derive(Debug, Clone, Copy)]
pub struct RevealingHeader {
    pub header: &'static str,
    pub name: Option<&'static str>,
    pub value_is_version: bool,
    pub category: TechCategory,
}

const fn revealing(header: &'static str, name: Option<&'static str>, value_is_version: bool, category: TechCategory) -> RevealingHeader {
    RevealingHeader { header, name, value_is_version, category }
}

pub static REVEALING_HEADERS: &[RevealingHeader] = &[
    revealing("x-generator", None, false, TechCategory::Cms),
    revealing("x-powered-cms", None, false, TechCategory::Cms),
    revealing("x-aspnet-version", Some("ASP.NET"), true, TechCategory::Backend),
    revealing("x-aspnetmvc-version", Some("ASP.NET MVC"), true, TechCategory::Backend),
    revealing("x-drupal-cache", Some("Drupal"), false, TechCategory::Cms),
    revealing("x-shopify-stage", Some("Shopify"), false, TechCategory::Cms),
    revealing("x-wix-request-id", Some("Wix"), false, TechCategory::Cms),
    revealing("x-varnish", Some("Varnish"), false, TechCategory::Server),
    revealing("x-litespeed-cache", Some("LiteSpeed"), false, TechCategory::Server),
    revealing("x-vercel-id", Some("Vercel"), false, TechCategory::Cdn),
    revealing("x-amz-cf-id", Some("Amazon CloudFront"), false, TechCategory::Cdn),
    revealing("cf-ray", Some("Cloudflare"), false, TechCategory::Cdn),
    revealing("x-fastly-request-id", Some("Fastly"), false, TechCategory::Cdn),
    revealing("x-github-request-id", Some("GitHub Pages"), false, TechCategory::Server),
    revealing("x-nf-request-id", Some("Netlify"), false, TechCategory::Cdn),
];

/// Literal fingerprints left behind by JavaScript bundlers.
pub static BUNDLER_MARKERS: &[(&str, &str)] = &[
    (r"webpackJsonp|__webpack_require__|webpackChunk", "Webpack"),
    (r"/@vite/client|import\.meta\.hot|__vite__mapDeps", "Vite"),
    (r"parcelRequire", "Parcel"),
    (r"__turbopack_", "Turbopack"),
    (r"/_snowpack/", "Snowpack"),
];

/// Class-name vocabularies of CSS frameworks, counted inside `class` attributes.
pub static CSS_FRAMEWORKS: &[(&str, &str)] = &[
    (
        "Bootstrap",
        r"\b(?:col-(?:xs|sm|md|lg|xl|xxl)-\d{1,2}|btn-(?:primary|secondary|success|danger|warning|info|light|dark|outline-[a-z]+)|navbar-(?:expand(?:-[a-z]+)?|toggler|brand|nav)|container-fluid|form-control|card-(?:body|title|header|footer)|d-(?:none|flex|block)|justify-content-[a-z]+)\b",
    ),
    (
        "Tailwind CSS",
        r"(?:\b(?:sm|md|lg|xl|2xl|hover|focus|dark):[a-z]+-[\w./-]+|\b(?:px|py|pt|pb|pl|pr|mx|my|mt|mb|ml|mr|gap|space-[xy])-\d+(?:\.5)?\b|\btext-(?:xs|sm|base|lg|[2-9]?xl)\b|\b(?:bg|text|border)-(?:slate|gray|zinc|neutral|stone|red|orange|amber|yellow|lime|green|emerald|teal|cyan|sky|blue|indigo|violet|purple|fuchsia|pink|rose)-\d{2,3}\b)",
    ),
    (
        "Bulma",
        r"\b(?:is-(?:primary|link|info|success|warning|danger|fullwidth|centered|multiline|size-\d)|has-text-(?:centered|weight-[a-z]+|primary|grey)|hero-(?:body|head|foot)|navbar-burger)\b",
    ),
    (
        "Foundation",
        r"\b(?:(?:small|medium|large)-(?:\d{1,2}|offset-\d{1,2})|grid-x|grid-container|top-bar(?:-left|-right)?|off-canvas(?:-content)?|button-group)\b",
    ),
    ("Material UI", r"\bMui[A-Z][A-Za-z]+-[a-zA-Z]+\b"),
    ("Semantic UI", r"\bui (?:button|menu|grid|container|segment|form|dropdown|card)s?\b"),
];

/// Public CDN URL shapes, each capturing `(package, version)`.
pub static CDN_SCRIPT_SHAPES: &[(&str, &str)] = &[
    ("cdnjs", r"cdnjs\.cloudflare\.com/ajax/libs/([^/]+)/(\d[^/]*)/"),
    ("jsDelivr", r"cdn\.jsdelivr\.net/npm/((?:@[^/@]+/)?[^/@]+)@(\d[\w.\-]*)"),
    ("unpkg", r"unpkg\.com/((?:@[^/@]+/)?[^/@]+)@(\d[\w.\-]*)"),
    ("Google Hosted Libraries", r"ajax\.googleapis\.com/ajax/libs/([^/]+)/(\d[^/]*)/"),
    ("jQuery CDN", r"code\.jquery\.com/(jquery)-(\d+\.\d+\.\d+)"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use std::collections::HashSet;

    #[test]
    fn every_builtin_pattern_compiles() {
        for table in BUILTIN_TABLES {
            for rule in table.rules {
                for pattern in rule.match_patterns.iter().chain(rule.version_pattern.iter()) {
                    assert!(Regex::new(pattern).is_ok(), "{}: {}", rule.name, pattern);
                }
            }
        }
        for (pattern, _) in BUNDLER_MARKERS {
            assert!(Regex::new(pattern).is_ok(), "{pattern}");
        }
        for (name, pattern) in CSS_FRAMEWORKS.iter().chain(CDN_SCRIPT_SHAPES) {
            assert!(Regex::new(pattern).is_ok(), "{name}: {pattern}");
        }
    }

    #[test]
    fn every_rule_has_at_least_one_signal() {
        for table in BUILTIN_TABLES {
            for rule in table.rules {
                assert!(
                    !rule.match_patterns.is_empty() || !rule.header_names.is_empty(),
                    "{} can never match",
                    rule.name
                );
            }
        }
    }

    #[test]
    fn rule_names_are_unique_within_the_tables() {
        let mut seen = HashSet::new();
        for table in BUILTIN_TABLES {
            for rule in table.rules {
                assert!(seen.insert(rule.name.to_lowercase()), "duplicate rule {}", rule.name);
            }
        }
    }

    #[test]
    fn header_names_are_lowercase() {
        for table in BUILTIN_TABLES {
            for rule in table.rules {
                for header in rule.header_names {
                    assert_eq!(*header, header.to_lowercase());
                }
            }
        }
        for h in REVEALING_HEADERS {
            assert_eq!(h.header, h.header.to_lowercase());
        }
    }

    #[test]
    fn version_patterns_capture_a_group() {
        for table in BUILTIN_TABLES {
            for rule in table.rules {
                if let Some(pattern) = rule.version_pattern {
                    let re = Regex::new(pattern).unwrap();
                    assert!(re.captures_len() >= 2, "{} version pattern has no group", rule.name);
                }
            }
        }
    }
}
