#[derive(thiserror::Error, Debug)]
pub enum TrustError {
    #[error("openssl error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("token expired")]
    Expired,

    #[error("token revoked")]
    Revoked,

    #[error("no certificate authority present")]
    NoCa,

    #[error("certificate bundle missing: {0}")]
    MissingBundle(String),
}
