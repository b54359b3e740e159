// src/main.rs

use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{bail, Result, WrapErr};
use url::Url;

use vanguard_recon::config::ScanConfig;
use vanguard_recon::core::run_reconnaissance;
use vanguard_recon::logging::initialize_logging;

/// Run every reconnaissance probe against a website and print a JSON report.
#[derive(Parser, Debug)]
#[command(name = "vanguard-recon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Passive reconnaissance of a single website", long_about = None)]
struct Cli {
    /// Target URL or bare host name (https:// is assumed)
    target: String,

    /// Per-probe timeout in milliseconds
    #[arg(long, env = "VANGUARD_RECON_TIMEOUT_MS")]
    timeout_ms: Option<u64>,

    /// Job to skip; may be repeated
    #[arg(long = "disable", value_name = "JOB")]
    disabled: Vec<String>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,

    /// Print only the run summary
    #[arg(long)]
    summary_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    match initialize_logging() {
        Ok(path) => tracing::debug!(log = %path.display(), "Logging initialized."),
        Err(e) => eprintln!("warning: file logging disabled: {e}"),
    }

    let url = parse_target(&cli.target)?;

    let mut config = ScanConfig::from_env();
    if let Some(ms) = cli.timeout_ms.filter(|ms| *ms > 0) {
        config.probe_timeout = Duration::from_millis(ms);
    }
    config.disable_jobs(cli.disabled.iter().map(String::as_str));

    let report = run_reconnaissance(&url, &config)
        .await
        .wrap_err_with(|| format!("could not start reconnaissance of {url}"))?;

    let output = match (cli.summary_only, cli.pretty) {
        (true, true) => serde_json::to_string_pretty(&report.summary)?,
        (true, false) => serde_json::to_string(&report.summary)?,
        (false, true) => serde_json::to_string_pretty(&report)?,
        (false, false) => serde_json::to_string(&report)?,
    };
    println!("{output}");
    Ok(())
}

/// Accepts `example.com` as well as a full http(s) URL.
fn parse_target(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&with_scheme).wrap_err_with(|| format!("invalid target `{raw}`"))?;
    if url.host_str().is_none_or(str::is_empty) {
        bail!("target `{raw}` has no host");
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_hosts_get_https() {
        assert_eq!(parse_target("example.com").unwrap().as_str(), "https://example.com/");
        assert_eq!(parse_target(" http://example.com/a ").unwrap().as_str(), "http://example.com/a");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_target("").is_err());
        assert!(parse_target("https://").is_err());
    }

    #[test]
    fn repeated_disable_flags_are_collected() {
        let cli = Cli::parse_from(["vanguard-recon", "example.com", "--disable", "ssl", "--disable", "quality", "--pretty"]);
        assert_eq!(cli.disabled, ["ssl", "quality"]);
        assert!(cli.pretty && !cli.summary_only);
    }
}
