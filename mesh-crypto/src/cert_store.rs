use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::TrustError;

const CA_CERT_FILE: &str = "ca.pem";
const CA_KEY_FILE: &str = "ca.key";
const LEAF_CERT_FILE: &str = "leaf.pem";
const LEAF_KEY_FILE: &str = "leaf.key";

/// A PEM certificate and private key pair. Used for both the CA bundle and
/// any leaf bundle; never logged or `Debug`-printed in full.
#[derive(Clone)]
pub struct CertificateBundle {
    pub cert_pem: String,
    pub key_pem: String,
}

impl std::fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateBundle").field("cert_pem", &"<redacted>").finish()
    }
}

impl CertificateBundle {
    fn write_pair(
        dir: &Path,
        cert_name: &str,
        key_name: &str,
        cert_pem: &str,
        key_pem: &str,
    ) -> Result<(), TrustError> {
        fs::create_dir_all(dir)?;
        write_restricted(&dir.join(cert_name), cert_pem.as_bytes())?;
        write_restricted(&dir.join(key_name), key_pem.as_bytes())?;
        Ok(())
    }

    pub fn save_leaf(&self, certs_dir: &Path) -> Result<(), TrustError> {
        Self::write_pair(certs_dir, LEAF_CERT_FILE, LEAF_KEY_FILE, &self.cert_pem, &self.key_pem)
    }

    pub fn save_ca(&self, certs_dir: &Path) -> Result<(), TrustError> {
        Self::write_pair(certs_dir, CA_CERT_FILE, CA_KEY_FILE, &self.cert_pem, &self.key_pem)
    }

    pub fn load_leaf(certs_dir: &Path) -> Result<Self, TrustError> {
        Self::load_pair(certs_dir, LEAF_CERT_FILE, LEAF_KEY_FILE)
    }

    pub fn load_ca(certs_dir: &Path) -> Result<Self, TrustError> {
        Self::load_pair(certs_dir, CA_CERT_FILE, CA_KEY_FILE)
    }

    /// Loads only the CA's public certificate, for workers that trust the
    /// CA but never hold its private key.
    pub fn load_ca_cert_only(certs_dir: &Path) -> Result<String, TrustError> {
        let path = certs_dir.join(CA_CERT_FILE);
        fs::read_to_string(&path)
            .map_err(|_| TrustError::MissingBundle(path.display().to_string()))
    }

    fn load_pair(certs_dir: &Path, cert_name: &str, key_name: &str) -> Result<Self, TrustError> {
        let cert_path = certs_dir.join(cert_name);
        let key_path = certs_dir.join(key_name);
        let cert_pem = fs::read_to_string(&cert_path)
            .map_err(|_| TrustError::MissingBundle(cert_path.display().to_string()))?;
        let key_pem = fs::read_to_string(&key_path)
            .map_err(|_| TrustError::MissingBundle(key_path.display().to_string()))?;
        Ok(Self { cert_pem, key_pem })
    }

    /// Materializes this bundle as a pair of 0600 temp files for the
    /// duration of `f`, for TLS libraries (openssl's `SslAcceptorBuilder`)
    /// that only accept filesystem paths. The files are unlinked as soon as
    /// `f` returns, so the key material never outlives the call that needs
    /// it on disk (spec.md §4.3, `CertificateBundle` invariant).
    pub fn with_tls_files<R>(
        &self,
        f: impl FnOnce(&Path, &Path) -> Result<R, TrustError>,
    ) -> Result<R, TrustError> {
        let mut cert_file = NamedTempFile::new()?;
        let mut key_file = NamedTempFile::new()?;
        restrict_permissions(cert_file.path())?;
        restrict_permissions(key_file.path())?;
        cert_file.write_all(self.cert_pem.as_bytes())?;
        key_file.write_all(self.key_pem.as_bytes())?;
        cert_file.flush()?;
        key_file.flush()?;
        debug!(cert = %cert_file.path().display(), "materialized ephemeral tls cert file");
        f(cert_file.path(), key_file.path())
    }
}

fn write_restricted(path: &Path, bytes: &[u8]) -> Result<(), TrustError> {
    fs::write(path, bytes)?;
    restrict_permissions(path)
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), TrustError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), TrustError> {
    Ok(())
}

pub fn certs_dir_exists(certs_dir: &Path) -> bool {
    certs_dir.join(CA_CERT_FILE).exists()
}

pub fn default_certs_dir(state_directory: &Path) -> PathBuf {
    state_directory.join("certs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ca::Ca;

    #[test]
    fn save_and_load_roundtrip() {
        let ca = Ca::generate("meshrun-ca").unwrap();
        let bundle = ca.to_bundle().unwrap();
        let dir = tempfile::tempdir().unwrap();
        bundle.save_ca(dir.path()).unwrap();
        let loaded = CertificateBundle::load_ca(dir.path()).unwrap();
        assert_eq!(loaded.cert_pem, bundle.cert_pem);
    }

    #[test]
    fn with_tls_files_cleans_up() {
        let ca = Ca::generate("meshrun-ca").unwrap();
        let bundle = ca.to_bundle().unwrap();
        let (cert_path, key_path) = bundle
            .with_tls_files(|cert, key| Ok((cert.to_path_buf(), key.to_path_buf())))
            .unwrap();
        assert!(!cert_path.exists());
        assert!(!key_path.exists());
    }
}
