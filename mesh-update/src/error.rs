#[derive(thiserror::Error, Debug)]
pub enum UpdateError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("signature verification failed")]
    BadSignature,

    #[error("malformed bundle: {0}")]
    Malformed(String),

    #[error("update already in progress")]
    InProgress,

    #[error("transport error: {0}")]
    Transport(#[from] mesh_transport::TransportError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<UpdateError> for mesh_primitives::MeshError {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::HashMismatch { .. } | UpdateError::BadSignature => {
                mesh_primitives::MeshError::Integrity(err.to_string())
            }
            UpdateError::InProgress => mesh_primitives::MeshError::Conflict(err.to_string()),
            UpdateError::Malformed(s) => mesh_primitives::MeshError::Validation(s),
            UpdateError::Transport(e) => mesh_primitives::MeshError::Transport(e.to_string()),
            other => mesh_primitives::MeshError::Integrity(other.to_string()),
        }
    }
}
