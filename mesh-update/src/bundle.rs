use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::UpdateError;

/// One entry in the coordinator's update catalog (spec.md §4.7: "identified
/// by version string, target node role, sha-256 hash, size").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BundleInfo {
    pub version: String,
    pub node_role: String,
    pub sha256: String,
    pub size: u64,
}

/// A downloaded bundle: the tar.gz payload plus its detached Ed25519
/// signature, both hex-encoded over the wire.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub info: BundleInfo,
    pub archive: Vec<u8>,
    pub signature: [u8; 64],
}

/// Verifies the archive's SHA-256 against the catalog entry and the
/// detached signature against the coordinator's known public key. A
/// mismatch aborts before anything on disk is touched (spec.md §4.7 step 2).
pub fn verify_bundle(bundle: &Bundle, public_key: &VerifyingKey) -> Result<(), UpdateError> {
    let actual = hex::encode(Sha256::digest(&bundle.archive));
    if actual != bundle.info.sha256 {
        return Err(UpdateError::HashMismatch { expected: bundle.info.sha256.clone(), actual });
    }

    let signature = Signature::from_bytes(&bundle.signature);
    public_key
        .verify(&bundle.archive, &signature)
        .map_err(|_| UpdateError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{SigningKey, Signer};
    use rand::rngs::OsRng;

    fn signed_bundle(payload: &[u8]) -> (Bundle, VerifyingKey) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let signature = signing_key.sign(payload);
        let info = BundleInfo {
            version: "1.2.3".into(),
            node_role: "worker".into(),
            sha256: hex::encode(Sha256::digest(payload)),
            size: payload.len() as u64,
        };
        let bundle = Bundle { info, archive: payload.to_vec(), signature: signature.to_bytes() };
        (bundle, signing_key.verifying_key())
    }

    #[test]
    fn accepts_correctly_signed_bundle() {
        let (bundle, public_key) = signed_bundle(b"fake tar.gz bytes");
        assert!(verify_bundle(&bundle, &public_key).is_ok());
    }

    #[test]
    fn rejects_tampered_archive() {
        let (mut bundle, public_key) = signed_bundle(b"fake tar.gz bytes");
        bundle.archive.push(0xff);
        assert!(verify_bundle(&bundle, &public_key).is_err());
    }

    #[test]
    fn rejects_wrong_signature() {
        let (bundle, _) = signed_bundle(b"fake tar.gz bytes");
        let (_, other_public_key) = signed_bundle(b"other payload");
        assert!(verify_bundle(&bundle, &other_public_key).is_err());
    }
}
