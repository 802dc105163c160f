use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::types::HashAlgo;

/// WPA/WPA2-PSK pairwise master key derivation: PBKDF2-HMAC-SHA1 over the
/// passphrase with the SSID as salt, 4096 iterations, 256-bit output
/// (spec.md §4.8 "the hash function is the configured PBKDF2-variant").
const WPA_ROUNDS: u32 = 4096;
const WPA_KEY_LEN: usize = 32;

pub fn compute_hash(algo: HashAlgo, candidate: &str, ssid: Option<&str>) -> String {
    match algo {
        HashAlgo::Sha256 => hex::encode(Sha256::digest(candidate.as_bytes())),
        HashAlgo::Sha1 => hex::encode(Sha1::digest(candidate.as_bytes())),
        HashAlgo::WpaPbkdf2 => {
            let ssid = ssid.unwrap_or_default();
            let mut output = [0u8; WPA_KEY_LEN];
            pbkdf2::pbkdf2_hmac::<Sha1>(candidate.as_bytes(), ssid.as_bytes(), WPA_ROUNDS, &mut output);
            hex::encode(output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_matches_known_digest() {
        let digest = compute_hash(HashAlgo::Sha256, "bac", None);
        assert_eq!(digest.len(), 64);
    }

    #[test]
    fn wpa_pbkdf2_is_deterministic_for_same_ssid() {
        let a = compute_hash(HashAlgo::WpaPbkdf2, "passphrase123", Some("mynetwork"));
        let b = compute_hash(HashAlgo::WpaPbkdf2, "passphrase123", Some("mynetwork"));
        assert_eq!(a, b);
        assert_eq!(a.len(), WPA_KEY_LEN * 2);
    }

    #[test]
    fn wpa_pbkdf2_differs_across_ssids() {
        let a = compute_hash(HashAlgo::WpaPbkdf2, "passphrase123", Some("network-a"));
        let b = compute_hash(HashAlgo::WpaPbkdf2, "passphrase123", Some("network-b"));
        assert_ne!(a, b);
    }
}
