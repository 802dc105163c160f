use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgo {
    Sha256,
    Sha1,
    /// WPA/WPA2-PSK: PBKDF2-HMAC-SHA1 over `passphrase, SSID`, 4096 rounds,
    /// 256-bit output (spec.md §4.8 "the hash function is the configured
    /// PBKDF2-variant").
    WpaPbkdf2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    Brute,
    Dictionary,
}

/// Mode-specific parameters for `create_job` (spec.md §4.8 step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub mode: JobMode,
    pub hash_algo: HashAlgo,
    #[serde(default)]
    pub target_hash: Option<String>,
    #[serde(default)]
    pub target_hashes: Vec<String>,

    // Brute mode.
    #[serde(default)]
    pub charset: String,
    #[serde(default)]
    pub length: usize,

    // Dictionary mode.
    #[serde(default)]
    pub wordlist: Vec<String>,
    #[serde(default)]
    pub mutations: Vec<String>,

    // WPA-family.
    #[serde(default)]
    pub ssid: Option<String>,
}

impl JobSpec {
    pub fn targets(&self) -> Vec<String> {
        if let Some(hash) = &self.target_hash {
            let mut all = self.target_hashes.clone();
            all.push(hash.clone());
            all
        } else {
            self.target_hashes.clone()
        }
    }

    /// Total search space size (spec.md §4.8 step 1).
    pub fn total_space(&self) -> Result<u64, crate::error::HashJobError> {
        match self.mode {
            JobMode::Brute => {
                if self.charset.is_empty() || self.length == 0 {
                    return Err(crate::error::HashJobError::InvalidSpec(
                        "brute mode requires a non-empty charset and length".into(),
                    ));
                }
                (self.charset.chars().count() as u64)
                    .checked_pow(self.length as u32)
                    .ok_or_else(|| crate::error::HashJobError::InvalidSpec("search space overflow".into()))
            }
            JobMode::Dictionary => {
                let mutation_count = crate::combination::mutation_count(&self.mutations);
                Ok(self.wordlist.len() as u64 * mutation_count as u64)
            }
        }
    }

    pub fn validate(&self) -> Result<(), crate::error::HashJobError> {
        if self.mode == JobMode::Brute && self.hash_algo == HashAlgo::WpaPbkdf2 && self.ssid.is_none() {
            return Err(crate::error::HashJobError::InvalidSpec(
                "WPA-family algorithms require an ssid".into(),
            ));
        }
        if self.targets().is_empty() {
            return Err(crate::error::HashJobError::InvalidSpec(
                "job must specify target_hash or target_hashes".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashJob {
    pub id: String,
    pub spec: JobSpec,
    pub total_space: u64,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Assigned,
    Working,
    Solved,
    Recovery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub start: u64,
    pub end: u64,
    pub assigned_worker: String,
    pub status: ChunkStatus,
}

impl Chunk {
    pub fn size(&self) -> u64 {
        self.end - self.start
    }
}

/// One generation of chunk assignments for a job (spec.md glossary "Batch
/// version"). New versions supersede older ones for recovery/lookahead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashBatch {
    pub job_id: String,
    pub version: u64,
    pub chunks: Vec<Chunk>,
}

impl HashBatch {
    pub fn next_start(&self) -> u64 {
        self.chunks.iter().map(|c| c.end).max().unwrap_or(0)
    }

    pub fn unclaimed_count_for(&self, worker_id: &str) -> usize {
        self.chunks
            .iter()
            .filter(|c| {
                c.assigned_worker == worker_id
                    && matches!(c.status, ChunkStatus::Assigned | ChunkStatus::Recovery)
            })
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct Solution {
    pub combination: String,
    pub hash_hex: String,
    pub index: u64,
}

/// A worker's self-reported progress, published under the
/// `hash_worker_status` metadata key (spec.md §4.8 step 2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// `job_id -> chunk start index -> status`.
    pub chunks: BTreeMap<String, BTreeMap<u64, ChunkStatus>>,
    pub hashes_computed: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    pub total_space: u64,
    pub hashes_computed: u64,
    pub solutions: Vec<Solution>,
    pub completed: bool,
}
