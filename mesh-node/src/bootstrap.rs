use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::sync::Arc;

use actix_web::{web, App, HttpResponse, HttpServer};
use mesh_crypto::{certs_dir_exists, Ca, CertificateBundle};
use mesh_transport::{Transport, TransportSettings};
use openssl::asn1::Asn1Time;
use openssl::sha::sha256;
use openssl::x509::X509;
use rand::Rng;
use serde_json::json;
use tracing::{info, warn};

/// Fixed HTTP (not HTTPS) port a worker listens on while proving it
/// controls its declared address (spec.md §4.3 step (a)); matches the
/// port `mesh-rpc`'s `/internal/cert/issue` handler probes back against.
const CHALLENGE_PORT: u16 = 9101;
const LEAF_LIFETIME_DAYS: u32 = 365;
const RENEW_WITHIN_DAYS: u32 = 30;

/// Coordinator's trust material, generated once on first boot and reused
/// on every subsequent start (spec.md §4.3 "Coordinator role").
pub struct CoordinatorIdentity {
    pub ca: Arc<Ca>,
    pub leaf: CertificateBundle,
}

pub fn bootstrap_coordinator(certs_dir: &Path, hostname: &str, advertise_address: &str) -> anyhow::Result<CoordinatorIdentity> {
    if certs_dir_exists(certs_dir) {
        let ca_bundle = CertificateBundle::load_ca(certs_dir)?;
        let ca = Arc::new(Ca::from_bundle(&ca_bundle)?);
        let leaf = match CertificateBundle::load_leaf(certs_dir) {
            Ok(leaf) if !leaf_needs_renewal(&leaf)? => leaf,
            _ => {
                info!("coordinator leaf missing or due for renewal, re-signing");
                let leaf = sign_own_leaf(&ca, hostname, advertise_address)?;
                leaf.save_leaf(certs_dir)?;
                leaf
            }
        };
        return Ok(CoordinatorIdentity { ca, leaf });
    }

    info!(certs_dir = %certs_dir.display(), "no cluster ca found, generating one");
    let ca = Ca::generate("meshrun-ca")?;
    ca.to_bundle()?.save_ca(certs_dir)?;
    let leaf = sign_own_leaf(&ca, hostname, advertise_address)?;
    leaf.save_leaf(certs_dir)?;
    Ok(CoordinatorIdentity { ca: Arc::new(ca), leaf })
}

fn sign_own_leaf(ca: &Ca, hostname: &str, advertise_address: &str) -> anyhow::Result<CertificateBundle> {
    let sans = vec!["localhost".to_string(), "127.0.0.1".to_string(), hostname.to_string(), advertise_address.to_string()];
    Ok(ca.sign_leaf("coordinator", &sans, LEAF_LIFETIME_DAYS)?)
}

fn leaf_needs_renewal(leaf: &CertificateBundle) -> anyhow::Result<bool> {
    let cert = X509::from_pem(leaf.cert_pem.as_bytes())?;
    let threshold = Asn1Time::days_from_now(RENEW_WITHIN_DAYS)?;
    Ok(cert.not_after() < threshold.as_ref())
}

fn fingerprint_of_pem(cert_pem: &str) -> anyhow::Result<String> {
    let cert = X509::from_pem(cert_pem.as_bytes())?;
    Ok(hex::encode(sha256(&cert.to_der()?)))
}

/// Runs the full bootstrap handshake (spec.md §4.3 "Worker bootstrap")
/// when `certs_dir` has no leaf, the leaf is near expiry, or the locally
/// cached CA fingerprint no longer matches the CA the worker was told to
/// trust. Returns once the worker's own leaf bundle is saved to disk.
pub async fn bootstrap_worker(
    certs_dir: &Path,
    node_id: &str,
    coordinator_addresses: &[String],
    trusted_ca_pem: Option<&str>,
    advertise_address: &str,
    hostname: &str,
) -> anyhow::Result<CertificateBundle> {
    if certs_dir_exists(certs_dir) {
        if let Ok(leaf) = CertificateBundle::load_leaf(certs_dir) {
            let still_trusted = match (trusted_ca_pem, CertificateBundle::load_ca_cert_only(certs_dir)) {
                (Some(trusted), Ok(cached)) => fingerprint_of_pem(trusted)? == fingerprint_of_pem(&cached)?,
                _ => true,
            };
            if still_trusted && !leaf_needs_renewal(&leaf)? {
                info!("worker leaf is current, skipping bootstrap handshake");
                return Ok(leaf);
            }
        }
    }

    info!("worker leaf missing, expiring, or ca rotated — starting bootstrap handshake");
    let challenge: String = {
        let mut rng = rand::thread_rng();
        (0..32).map(|_| format!("{:x}", rng.gen_range(0..16))).collect()
    };

    let listener_challenge = challenge.clone();
    let server = HttpServer::new(move || {
        let challenge = listener_challenge.clone();
        App::new().route(
            "/cert/challenge/{c}",
            web::get().to(move |path: web::Path<String>| {
                let challenge = challenge.clone();
                async move {
                    if path.into_inner() == challenge {
                        HttpResponse::Ok().json(json!({ "challenge": challenge }))
                    } else {
                        HttpResponse::NotFound().finish()
                    }
                }
            }),
        )
    })
    .bind((IpAddr::V4(Ipv4Addr::UNSPECIFIED), CHALLENGE_PORT))?
    .shutdown_timeout(1)
    .run();
    let server_handle = server.handle();
    actix_web::rt::spawn(server);

    let settings = TransportSettings {
        ca_cert_pem: trusted_ca_pem.map(|s| s.to_string()),
        verify_disabled: trusted_ca_pem.is_none(),
        ..TransportSettings::default()
    };
    if trusted_ca_pem.is_none() {
        warn!("no pinned cluster ca configured, trusting coordinator's tls cert on first contact");
    }
    let transport = Transport::new(settings);

    let old_fingerprint = CertificateBundle::load_ca_cert_only(certs_dir)
        .ok()
        .and_then(|ca_pem| fingerprint_of_pem(&ca_pem).ok());

    let body = json!({
        "node_id": node_id,
        "challenge": challenge,
        "ips": [advertise_address],
        "dnsnames": [hostname],
        "old_fingerprint": old_fingerprint,
    });

    let mut last_err = None;
    let mut issued = None;
    for address in coordinator_addresses {
        let url = format!("https://{address}");
        match transport.request(&url, "/internal/cert/issue", &body, &[]).await {
            Ok(response) => {
                issued = Some(response);
                break;
            }
            Err(err) => {
                warn!(coordinator = %address, error = %err, "cert issuance request failed, trying next address");
                last_err = Some(err);
            }
        }
    }

    server_handle.stop(true).await;

    let response = issued.ok_or_else(|| {
        anyhow::anyhow!("no coordinator address issued a certificate: {}", last_err.map(|e| e.to_string()).unwrap_or_default())
    })?;
    let cert_pem = response
        .get("cert_pem")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("cert issuance response missing cert_pem"))?
        .to_string();
    let key_pem = response
        .get("key_pem")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow::anyhow!("cert issuance response missing key_pem"))?
        .to_string();

    let leaf = CertificateBundle { cert_pem, key_pem };
    leaf.save_leaf(certs_dir)?;
    if let Some(ca_pem) = trusted_ca_pem {
        // Workers cache only the CA's public cert, never its key.
        std::fs::create_dir_all(certs_dir)?;
        std::fs::write(certs_dir.join("ca.pem"), ca_pem)?;
    }
    info!("worker bootstrap complete, leaf certificate installed");
    Ok(leaf)
}
