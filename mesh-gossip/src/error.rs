#[derive(thiserror::Error, Debug)]
pub enum GossipError {
    #[error("malformed gossip frame")]
    Framing,

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] mesh_transport::TransportError),

    #[error("no alive peers to gossip with")]
    NoTargets,
}
