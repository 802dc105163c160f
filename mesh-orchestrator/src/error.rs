#[derive(thiserror::Error, Debug)]
pub enum OrchestratorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid package: {0}")]
    InvalidPackage(String),

    #[error("service already installed: {0}")]
    AlreadyInstalled(String),

    #[error("service not installed: {0}")]
    NotInstalled(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] mesh_transport::TransportError),
}

impl From<OrchestratorError> for mesh_primitives::MeshError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::AlreadyInstalled(s) => mesh_primitives::MeshError::Conflict(s),
            OrchestratorError::NotInstalled(s) => mesh_primitives::MeshError::NotFound(s),
            OrchestratorError::InvalidPackage(s) => mesh_primitives::MeshError::Validation(s),
            OrchestratorError::Transport(e) => mesh_primitives::MeshError::Transport(e.to_string()),
            other => mesh_primitives::MeshError::Integrity(other.to_string()),
        }
    }
}
