//! Certificate authority and bearer-token machinery for the cluster's
//! internal trust domain (spec.md §4.3).
//!
//! The coordinator mints a self-signed CA on first boot and signs leaf
//! certificates for itself and for workers that complete the bootstrap
//! handshake. Bearer tokens layer an expiring, revocable capability on top
//! of that TLS identity for the RPC auth middleware.

mod ca;
mod cert_store;
mod error;
mod token;

pub use ca::Ca;
pub use cert_store::{certs_dir_exists, default_certs_dir, CertificateBundle};
pub use error::TrustError;
pub use token::{Claims, TokenService};
