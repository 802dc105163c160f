#[derive(thiserror::Error, Debug)]
pub enum HashJobError {
    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("invalid job spec: {0}")]
    InvalidSpec(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("remote error: {0}")]
    Remote(#[from] mesh_primitives::MeshError),
}

impl From<HashJobError> for mesh_primitives::MeshError {
    fn from(err: HashJobError) -> Self {
        match err {
            HashJobError::UnknownJob(s) => mesh_primitives::MeshError::NotFound(s),
            HashJobError::InvalidSpec(s) => mesh_primitives::MeshError::Validation(s),
            HashJobError::Remote(e) => e,
            other => mesh_primitives::MeshError::Integrity(other.to_string()),
        }
    }
}
