/// Transport-level failure, collapsed to a single discriminated kind so
/// callers decide retry policy without matching on connector internals
/// (spec.md §4.1).
#[derive(thiserror::Error, Debug, Clone)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("tls error: {0}")]
    Tls(String),

    #[error("http {status}: {body}")]
    Http { status: u16, body: String },

    #[error("response body was not valid json: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Connect(_) => "connect",
            TransportError::Timeout(_) => "timeout",
            TransportError::Tls(_) => "tls",
            TransportError::Http { .. } => "http",
            TransportError::Decode(_) => "decode",
        }
    }
}
