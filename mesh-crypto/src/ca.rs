use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, KeyUsage, SubjectAlternativeName,
    SubjectKeyIdentifier,
};
use openssl::x509::{X509, X509Name, X509NameBuilder};
use sha2::{Digest, Sha256};

use crate::cert_store::CertificateBundle;
use crate::error::TrustError;

const LEAF_KEY_BITS: u32 = 2048;
const CA_KEY_BITS: u32 = 4096;

/// The coordinator's cluster-internal certificate authority: a self-signed
/// root plus the coordinator's own leaf, generated once on first boot and
/// persisted in secure storage (spec.md §4.3).
pub struct Ca {
    pub cert: X509,
    key: PKey<Private>,
}

impl Ca {
    /// Generates a fresh self-signed CA. Called only when no CA is found in
    /// secure storage at coordinator startup.
    pub fn generate(common_name: &str) -> Result<Self, TrustError> {
        let rsa = Rsa::generate(CA_KEY_BITS)?;
        let key = PKey::from_rsa(rsa)?;

        let name = build_name(common_name)?;
        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_pubkey(&key)?;

        let serial = random_serial()?;
        builder.set_serial_number(&serial)?;
        builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
        builder.set_not_after(Asn1Time::days_from_now(3650)?.as_ref())?;

        builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
        builder.append_extension(
            KeyUsage::new().critical().key_cert_sign().crl_sign().build()?,
        )?;
        let subject_key_id =
            SubjectKeyIdentifier::new().build(&builder.x509v3_context(None, None))?;
        builder.append_extension(subject_key_id)?;

        builder.sign(&key, MessageDigest::sha256())?;
        let cert = builder.build();

        Ok(Self { cert, key })
    }

    pub fn from_bundle(bundle: &CertificateBundle) -> Result<Self, TrustError> {
        let cert = X509::from_pem(bundle.cert_pem.as_bytes())?;
        let key = PKey::private_key_from_pem(bundle.key_pem.as_bytes())?;
        Ok(Self { cert, key })
    }

    pub fn to_bundle(&self) -> Result<CertificateBundle, TrustError> {
        Ok(CertificateBundle {
            cert_pem: String::from_utf8_lossy(&self.cert.to_pem()?).into_owned(),
            key_pem: String::from_utf8_lossy(&self.key.private_key_to_pem_pkcs8()?).into_owned(),
        })
    }

    /// SHA-256 fingerprint of the CA's DER-encoded certificate, used by
    /// workers to detect CA rotation (spec.md §3, `CertificateBundle`
    /// invariant).
    pub fn fingerprint(&self) -> Result<String, TrustError> {
        let der = self.cert.to_der()?;
        Ok(hex::encode(Sha256::digest(der)))
    }

    /// Signs a leaf certificate for `node_id` with the requested SANs,
    /// valid for `lifetime_days`. Used both for the coordinator's own leaf
    /// (on first boot) and for worker certs minted during bootstrap
    /// (spec.md §4.3 step (e)).
    pub fn sign_leaf(
        &self,
        node_id: &str,
        sans: &[String],
        lifetime_days: u32,
    ) -> Result<CertificateBundle, TrustError> {
        let rsa = Rsa::generate(LEAF_KEY_BITS)?;
        let leaf_key = PKey::from_rsa(rsa)?;

        let subject = build_name(node_id)?;
        let mut builder = X509::builder()?;
        builder.set_version(2)?;
        builder.set_subject_name(&subject)?;
        builder.set_issuer_name(self.cert.subject_name())?;
        builder.set_pubkey(&leaf_key)?;

        let serial = random_serial()?;
        builder.set_serial_number(&serial)?;
        builder.set_not_before(Asn1Time::days_from_now(0)?.as_ref())?;
        builder.set_not_after(Asn1Time::days_from_now(lifetime_days)?.as_ref())?;

        builder.append_extension(BasicConstraints::new().build()?)?;
        builder.append_extension(
            KeyUsage::new().critical().digital_signature().key_encipherment().build()?,
        )?;

        let mut san_builder = SubjectAlternativeName::new();
        for san in sans {
            if san.parse::<std::net::IpAddr>().is_ok() {
                san_builder.ip(san);
            } else {
                san_builder.dns(san);
            }
        }
        let ctx = builder.x509v3_context(Some(&self.cert), None);
        let san_ext = san_builder.build(&ctx)?;
        builder.append_extension(san_ext)?;

        let ctx = builder.x509v3_context(Some(&self.cert), None);
        let akid = AuthorityKeyIdentifier::new().keyid(true).build(&ctx)?;
        builder.append_extension(akid)?;

        builder.sign(&self.key, MessageDigest::sha256())?;
        let cert = builder.build();

        Ok(CertificateBundle {
            cert_pem: String::from_utf8_lossy(&cert.to_pem()?).into_owned(),
            key_pem: String::from_utf8_lossy(&leaf_key.private_key_to_pem_pkcs8()?).into_owned(),
        })
    }
}

fn build_name(common_name: &str) -> Result<X509Name, TrustError> {
    let mut builder = X509NameBuilder::new()?;
    builder.append_entry_by_text("CN", common_name)?;
    Ok(builder.build())
}

fn random_serial() -> Result<openssl::bn::BigNum, TrustError> {
    let mut bn = BigNum::new()?;
    bn.rand(159, MsbOption::MAYBE_ZERO, false)?;
    Ok(bn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_is_signed_by_ca_and_carries_sans() {
        let ca = Ca::generate("meshrun-ca").expect("ca generate");
        let bundle = ca
            .sign_leaf("worker-1", &["worker-1.local".into(), "127.0.0.1".into()], 30)
            .expect("sign leaf");
        let leaf = X509::from_pem(bundle.cert_pem.as_bytes()).expect("parse leaf");
        assert!(leaf.verify(&ca.cert.public_key().unwrap()).unwrap());
    }

    #[test]
    fn fingerprint_changes_with_rotation() {
        let ca1 = Ca::generate("meshrun-ca").unwrap();
        let ca2 = Ca::generate("meshrun-ca").unwrap();
        assert_ne!(ca1.fingerprint().unwrap(), ca2.fingerprint().unwrap());
    }
}
