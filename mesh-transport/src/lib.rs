//! Pooled, keep-alive HTTPS client used by every other component that
//! talks to a peer: gossip, RPC dispatch, orchestrator distribution, and
//! the update engine (spec.md §4.1).

mod error;
mod pool;

pub use error::TransportError;
pub use pool::{ClientPool, TransportSettings};

use std::time::Duration;

use serde_json::Value;
use tracing::{instrument, warn};

/// Contract: `request(peer_url, path, body_json, headers) -> json | error`.
/// Holds one `ClientPool` for the process; constructed once by `mesh-node`
/// and shared (by reference) into gossip, RPC, orchestrator and update.
pub struct Transport {
    pool: ClientPool,
    read_timeout: Duration,
}

impl Transport {
    pub fn new(settings: TransportSettings) -> Self {
        let read_timeout = settings.read_timeout;
        Self { pool: ClientPool::new(settings), read_timeout }
    }

    #[instrument(skip(self, body, headers), fields(path = %path))]
    pub async fn request(
        &self,
        peer_url: &str,
        path: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> Result<Value, TransportError> {
        let origin = origin_of(peer_url).ok_or_else(|| {
            TransportError::Connect(format!("malformed peer url: {peer_url}"))
        })?;
        let client = self.pool.client_for(&origin);
        let url = format!("{}{}", peer_url.trim_end_matches('/'), path);

        let mut req = client.post(&url).timeout(self.read_timeout);
        for (name, value) in headers {
            req = req.insert_header((*name, *value));
        }

        let mut resp = req.send_json(body).await.map_err(|err| {
            let message = err.to_string();
            if message.contains("timeout") {
                TransportError::Timeout(self.read_timeout)
            } else if message.to_lowercase().contains("ssl") || message.to_lowercase().contains("tls") {
                TransportError::Tls(message)
            } else {
                TransportError::Connect(message)
            }
        })?;

        let status = resp.status();
        let bytes = resp
            .body()
            .await
            .map_err(|err| TransportError::Decode(err.to_string()))?;

        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        serde_json::from_slice(&bytes).map_err(|err| TransportError::Decode(err.to_string()))
    }

    /// Retries a request once against the same peer, per spec.md §7's
    /// "transport errors on a single RPC are retried once" policy. Returns
    /// the second failure if both attempts fail; the caller (gossip/RPC)
    /// is responsible for marking the peer suspected after that.
    pub async fn request_with_retry(
        &self,
        peer_url: &str,
        path: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> Result<Value, TransportError> {
        match self.request(peer_url, path, body, headers).await {
            Ok(value) => Ok(value),
            Err(first_err) => {
                warn!(peer = %peer_url, error = %first_err, "retrying rpc after transport error");
                self.request(peer_url, path, body, headers).await.map_err(|_| first_err)
            }
        }
    }
}

fn origin_of(url: &str) -> Option<String> {
    let scheme_split = url.splitn(2, "://").collect::<Vec<_>>();
    if scheme_split.len() != 2 {
        return None;
    }
    let (scheme, rest) = (scheme_split[0], scheme_split[1]);
    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.is_empty() {
        return None;
    }
    Some(format!("{scheme}://{authority}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_strips_path_and_query() {
        assert_eq!(
            origin_of("https://10.0.0.2:9001/rpc?id=1"),
            Some("https://10.0.0.2:9001".to_string())
        );
    }

    #[test]
    fn origin_rejects_malformed_url() {
        assert_eq!(origin_of("10.0.0.2:9001"), None);
    }
}
