use std::collections::HashSet;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::TrustError;

/// Bearer token claims issued to a node after it completes the certificate
/// bootstrap handshake (spec.md §4.3, §4.4 auth middleware).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Node id of the token holder.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    /// True for cluster-internal callers (coordinator/worker RPC), false
    /// for externally facing API callers.
    pub internal: bool,
}

/// Issues, verifies, and revokes bearer tokens against a single shared
/// secret. Revocation is tracked in memory only: a node restart clears it,
/// which is acceptable since revoked tokens also expire on their own.
pub struct TokenService {
    secret: String,
    expiration_hours: u64,
    revoked: RwLock<HashSet<String>>,
}

fn validation() -> Validation {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation
}

impl TokenService {
    pub fn new(secret: impl Into<String>, expiration_hours: u64) -> Self {
        Self {
            secret: secret.into(),
            expiration_hours,
            revoked: RwLock::new(HashSet::new()),
        }
    }

    pub fn issue(&self, node_id: &str, internal: bool) -> Result<String, TrustError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: node_id.to_string(),
            iat: now,
            exp: now + (self.expiration_hours as i64) * 3600,
            internal,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TrustError> {
        if self.revoked.read().contains(token) {
            return Err(TrustError::Revoked);
        }
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation(),
        )
        .map_err(|err| match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => TrustError::Expired,
            _ => TrustError::Token(err),
        })?;
        Ok(data.claims)
    }

    pub fn revoke(&self, token: &str) {
        self.revoked.write().insert(token.to_string());
    }

    /// Drops revocation entries for tokens that would have expired anyway,
    /// keeping the in-memory set from growing without bound on long-lived
    /// coordinators.
    pub fn prune_revoked(&self) {
        let mut revoked = self.revoked.write();
        let now = Utc::now().timestamp();
        revoked.retain(|token| {
            decode::<Claims>(
                token,
                &DecodingKey::from_secret(self.secret.as_bytes()),
                &validation(),
            )
            .map(|data| data.claims.exp > now)
            .unwrap_or(false)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let svc = TokenService::new("0123456789abcdef", 24);
        let token = svc.issue("worker-1", true).unwrap();
        let claims = svc.verify(&token).unwrap();
        assert_eq!(claims.sub, "worker-1");
        assert!(claims.internal);
    }

    #[test]
    fn revoked_token_is_rejected() {
        let svc = TokenService::new("0123456789abcdef", 24);
        let token = svc.issue("worker-1", true).unwrap();
        svc.revoke(&token);
        assert!(matches!(svc.verify(&token), Err(TrustError::Revoked)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let svc = TokenService::new("0123456789abcdef", 0);
        let token = svc.issue("worker-1", false).unwrap();
        std::thread::sleep(std::time::Duration::from_secs(1));
        assert!(matches!(svc.verify(&token), Err(TrustError::Expired)));
    }
}
