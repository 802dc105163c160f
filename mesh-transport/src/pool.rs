use std::collections::HashMap;
use std::time::Duration;

use awc::Client;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use parking_lot::RwLock;

/// Tunables mirroring `mesh-config`'s `TransportConfig`; kept independent
/// of that crate so `mesh-transport` has no dependency back on config
/// parsing.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub max_connections: usize,
    pub max_keepalive: usize,
    pub keepalive_expiry: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub total_timeout: Duration,
    /// PEM-encoded CA certificate trusted for peer TLS verification. When
    /// `None`, the platform's trust store is used.
    pub ca_cert_pem: Option<String>,
    /// Disables certificate verification entirely. Only ever set for the
    /// bootstrap challenge validation path (spec.md §4.3); never for
    /// ordinary RPC traffic.
    pub verify_disabled: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            max_connections: 64,
            max_keepalive: 32,
            keepalive_expiry: Duration::from_secs(90),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(10),
            total_timeout: Duration::from_secs(15),
            ca_cert_pem: None,
            verify_disabled: false,
        }
    }
}

/// A keyed pool of long-lived `awc::Client`s, one per `scheme://host:port`
/// origin, each wrapping its own keep-alive connection pool (spec.md
/// §4.1). Origins are created lazily and reused for the lifetime of the
/// process.
pub struct ClientPool {
    settings: TransportSettings,
    clients: RwLock<HashMap<String, Client>>,
}

impl ClientPool {
    pub fn new(settings: TransportSettings) -> Self {
        Self { settings, clients: RwLock::new(HashMap::new()) }
    }

    /// Returns the pooled client for `origin` (`scheme://host:port`),
    /// building one on first use.
    pub fn client_for(&self, origin: &str) -> Client {
        if let Some(client) = self.clients.read().get(origin) {
            return client.clone();
        }
        let mut clients = self.clients.write();
        clients
            .entry(origin.to_string())
            .or_insert_with(|| build_client(&self.settings))
            .clone()
    }
}

fn build_client(settings: &TransportSettings) -> Client {
    let mut ssl = SslConnector::builder(SslMethod::tls()).expect("openssl context init");
    if settings.verify_disabled {
        ssl.set_verify(SslVerifyMode::NONE);
    } else if let Some(ca_pem) = &settings.ca_cert_pem {
        if let Err(err) = ssl.cert_store_mut().add_cert(
            openssl::x509::X509::from_pem(ca_pem.as_bytes()).expect("parse ca cert"),
        ) {
            tracing::warn!(%err, "failed to install cluster ca into trust store");
        }
    }
    let ssl = ssl.build();

    let connector = awc::Connector::new()
        .openssl(ssl)
        .timeout(settings.connect_timeout)
        .limit(settings.max_connections);

    Client::builder()
        .connector(connector)
        .timeout(settings.total_timeout)
        .finish()
}
