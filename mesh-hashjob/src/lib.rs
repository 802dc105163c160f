mod combination;
mod compute;
mod coordinator;
mod error;
mod hashing;
mod pool;
mod types;
mod worker;

pub use combination::{dictionary_candidate, index_to_combination, mutation_count};
pub use compute::{compute_chunk, ChunkResult};
pub use coordinator::JobCoordinator;
pub use error::HashJobError;
pub use hashing::compute_hash;
pub use pool::{optimal_worker_count, split_subchunks};
pub use types::{
    Chunk, ChunkStatus, HashAlgo, HashBatch, HashJob, JobMode, JobSpec, JobStatus, Solution, WorkerStatus,
};
pub use worker::{ChunkWorker, ClaimedChunk};
