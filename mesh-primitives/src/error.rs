/// Error kinds shared by every component, per the error-handling design.
///
/// Each owning crate raises its own `thiserror` enum and converts into this
/// one at the point where the error crosses a component boundary (the RPC
/// dispatcher turning a `DependencyError` from the lifecycle manager into a
/// JSON response, for instance).
#[derive(thiserror::Error, Debug, Clone)]
pub enum MeshError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("dependency error: {0}")]
    Dependency(String),

    #[error("remote error from {peer}: {message}")]
    Remote { peer: String, message: String },

    #[error("validation error: {0}")]
    Validation(String),
}

impl MeshError {
    /// Short discriminator used by HTTP status mapping and JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            MeshError::Transport(_) => "transport",
            MeshError::Auth(_) => "auth",
            MeshError::NotFound(_) => "not_found",
            MeshError::Conflict(_) => "conflict",
            MeshError::Integrity(_) => "integrity",
            MeshError::Dependency(_) => "dependency",
            MeshError::Remote { .. } => "remote",
            MeshError::Validation(_) => "validation",
        }
    }
}
