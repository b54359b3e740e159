// src/core/scanner/ssl_scanner.rs

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use tokio::task::spawn_blocking;
use tracing::{debug, error, info};
use x509_parser::prelude::*;

use super::ProbeContext;
use crate::core::error::ProbeError;
use crate::core::models::{AnalysisFinding, Severity, SslCertificate};

/// Days before expiry from which a certificate is reported as expiring soon.
const EXPIRY_WARNING_DAYS: i64 = 30;

/// Reads the certificate the target presents on its TLS port.
///
/// The handshake and certificate parsing are blocking, so they run on the
/// blocking pool.
pub async fn run_ssl_scan(ctx: &ProbeContext) -> Result<SslCertificate, ProbeError> {
    info!(target = %ctx.host, "Starting SSL/TLS scan.");
    let host = ctx.host.clone();
    let port = ctx.url.port_or_known_default().unwrap_or(443);
    let timeout = ctx.config.probe_timeout;

    let mut certificate = spawn_blocking(move || perform_tls_scan(&host, port, timeout))
        .await
        .map_err(|e| {
            error!(panic = %e, "Blocking SSL scan task failed.");
            ProbeError::Join(e.to_string())
        })??;

    certificate.analysis = analyze_certificate(&certificate);
    info!(findings = %certificate.analysis.len(), "SSL/TLS scan finished.");
    Ok(certificate)
}

fn perform_tls_scan(host: &str, port: u16, timeout: Duration) -> Result<SslCertificate, ProbeError> {
    debug!(host, port, "Performing TLS connection and handshake.");

    // Expired or mismatched certificates are still read and reported through the analysis.
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| ProbeError::Tls(format!("TlsConnector Error: {e}")))?;

    let address = (host, port)
        .to_socket_addrs()
        .map_err(|e| ProbeError::Dns(e.to_string()))?
        .next()
        .ok_or_else(|| ProbeError::NotFound(format!("no address for {host}")))?;

    let stream = TcpStream::connect_timeout(&address, timeout)
        .map_err(|e| ProbeError::Tls(format!("TCP Connection Error: {e}")))?;
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|_| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| ProbeError::Tls(format!("TCP Connection Error: {e}")))?;

    let stream = connector
        .connect(host, stream)
        .map_err(|e| ProbeError::Tls(format!("TLS Handshake Error: {e}")))?;

    let cert = stream
        .peer_certificate()
        .map_err(|e| ProbeError::Tls(format!("Could not get peer certificate: {e}")))?
        .ok_or_else(|| ProbeError::NotFound("server presented no certificate".to_string()))?;

    let cert_der = cert
        .to_der()
        .map_err(|e| ProbeError::Tls(format!("Could not convert certificate to DER: {e}")))?;

    let (_, x509) =
        parse_x509_certificate(&cert_der).map_err(|e| ProbeError::Parse(format!("X.509 Parse Error: {e}")))?;

    info!(subject = %x509.subject(), issuer = %x509.issuer(), "Successfully parsed certificate.");

    let validity = x509.validity();
    let not_after = asn1_time_to_chrono_utc(&validity.not_after);
    let not_before = asn1_time_to_chrono_utc(&validity.not_before);
    let now = Utc::now();

    let subject_alt_names = match x509.subject_alternative_name() {
        Ok(Some(san)) => san
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(dns.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    Ok(SslCertificate {
        subject_name: x509.subject().to_string(),
        issuer_name: x509.issuer().to_string(),
        serial_number: x509.raw_serial_as_string(),
        signature_algorithm: x509.signature_algorithm.algorithm.to_id_string(),
        subject_alt_names,
        not_before,
        not_after,
        days_until_expiry: not_after.signed_duration_since(now).num_days(),
        is_valid: now > not_before && now < not_after,
        analysis: Vec::new(),
    })
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}

pub fn analyze_certificate(cert: &SslCertificate) -> Vec<AnalysisFinding> {
    let mut analyses = Vec::new();

    if !cert.is_valid {
        debug!(expiry_date = %cert.not_after, "Certificate is outside its validity window.");
        analyses.push(AnalysisFinding::new(Severity::Critical, "SSL_EXPIRED"));
    }

    if (0..=EXPIRY_WARNING_DAYS).contains(&cert.days_until_expiry) {
        debug!(days_left = cert.days_until_expiry, "Certificate is expiring soon.");
        analyses.push(AnalysisFinding::new(Severity::Warning, "SSL_EXPIRING_SOON"));
    }

    if cert.subject_name == cert.issuer_name {
        analyses.push(AnalysisFinding::new(Severity::Warning, "SSL_SELF_SIGNED"));
    }

    analyses
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn certificate(days_left: i64) -> SslCertificate {
        let now = Utc::now();
        let not_after = now + ChronoDuration::days(days_left) + ChronoDuration::hours(1);
        SslCertificate {
            subject_name: "CN=example.com".into(),
            issuer_name: "CN=Example CA".into(),
            serial_number: "01".into(),
            signature_algorithm: "1.2.840.113549.1.1.11".into(),
            subject_alt_names: vec!["example.com".into()],
            not_before: now - ChronoDuration::days(60),
            not_after,
            days_until_expiry: days_left,
            is_valid: days_left >= 0,
            analysis: Vec::new(),
        }
    }

    fn codes(cert: &SslCertificate) -> Vec<String> {
        analyze_certificate(cert).into_iter().map(|f| f.code).collect()
    }

    #[test]
    fn healthy_certificate_has_no_findings() {
        assert!(codes(&certificate(200)).is_empty());
    }

    #[test]
    fn expiring_certificate_is_flagged() {
        assert_eq!(codes(&certificate(12)), ["SSL_EXPIRING_SOON"]);
    }

    #[test]
    fn expired_and_self_signed_certificates_are_flagged() {
        let mut cert = certificate(-5);
        cert.issuer_name = cert.subject_name.clone();
        let found = codes(&cert);
        assert!(found.contains(&"SSL_EXPIRED".to_string()));
        assert!(found.contains(&"SSL_SELF_SIGNED".to_string()));
        assert!(!found.contains(&"SSL_EXPIRING_SOON".to_string()));
    }
}
