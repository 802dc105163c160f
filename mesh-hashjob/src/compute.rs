use std::collections::HashSet;

use rayon::prelude::*;

use crate::combination::{dictionary_candidate, index_to_combination};
use crate::hashing::compute_hash;
use crate::pool::split_subchunks;
use crate::types::{Chunk, JobSpec, JobMode, Solution};

pub struct ChunkResult {
    pub hashes_computed: u64,
    pub solutions: Vec<Solution>,
}

/// Computes every candidate in `chunk`'s range, fanning the range out across
/// a process-local rayon pool sized `pool_size` (spec.md §4.8 "Parallelism
/// within a chunk"). Any candidate matching one of `spec`'s targets is
/// recorded; a match never stops the chunk, since other targets may still
/// be in range.
pub fn compute_chunk(
    spec: &JobSpec,
    chunk: &Chunk,
    pool_size: usize,
    progress_interval: u64,
) -> Result<ChunkResult, crate::error::HashJobError> {
    let targets: HashSet<String> = spec.targets().into_iter().collect();
    let charset: Vec<char> = spec.charset.chars().collect();
    let subranges = split_subchunks(chunk.size(), progress_interval, pool_size);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(pool_size.max(1))
        .build()
        .map_err(|e| crate::error::HashJobError::InvalidSpec(e.to_string()))?;

    let partials: Vec<(u64, Vec<Solution>)> = pool.install(|| {
        subranges
            .par_iter()
            .map(|(rel_start, rel_end)| {
                let mut solutions = Vec::new();
                let mut count = 0u64;
                for rel_index in *rel_start..*rel_end {
                    let index = chunk.start + rel_index;
                    let candidate = match spec.mode {
                        JobMode::Brute => Some(index_to_combination(index, &charset, spec.length)),
                        JobMode::Dictionary => {
                            dictionary_candidate(index, &spec.wordlist, &spec.mutations)
                        }
                    };
                    let Some(candidate) = candidate else { continue };
                    let digest = compute_hash(spec.hash_algo, &candidate, spec.ssid.as_deref());
                    count += 1;
                    if targets.contains(&digest) {
                        solutions.push(Solution { combination: candidate, hash_hex: digest, index });
                    }
                }
                (count, solutions)
            })
            .collect()
    });

    let mut hashes_computed = 0u64;
    let mut solutions = Vec::new();
    for (count, mut partial_solutions) in partials {
        hashes_computed += count;
        solutions.append(&mut partial_solutions);
    }

    Ok(ChunkResult { hashes_computed, solutions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HashAlgo;

    #[test]
    fn finds_brute_force_target_within_range() {
        let target = crate::hashing::compute_hash(HashAlgo::Sha256, "bac", None);
        let spec = JobSpec {
            mode: JobMode::Brute,
            hash_algo: HashAlgo::Sha256,
            target_hash: Some(target),
            target_hashes: vec![],
            charset: "abc".into(),
            length: 3,
            wordlist: vec![],
            mutations: vec![],
            ssid: None,
        };
        let chunk = Chunk {
            start: 0,
            end: 27,
            assigned_worker: "worker-1".into(),
            status: crate::types::ChunkStatus::Assigned,
        };
        let result = compute_chunk(&spec, &chunk, 2, 5).unwrap();
        assert_eq!(result.hashes_computed, 27);
        assert_eq!(result.solutions.len(), 1);
        assert_eq!(result.solutions[0].combination, "bac");
        assert_eq!(result.solutions[0].index, 10);
    }

    #[test]
    fn finds_dictionary_target_with_mutation() {
        let target = crate::hashing::compute_hash(HashAlgo::Sha256, "PASS", None);
        let spec = JobSpec {
            mode: JobMode::Dictionary,
            hash_algo: HashAlgo::Sha256,
            target_hash: Some(target),
            target_hashes: vec![],
            charset: String::new(),
            length: 0,
            wordlist: vec!["pass".into(), "word".into()],
            mutations: vec!["uppercase".into()],
            ssid: None,
        };
        let chunk = Chunk {
            start: 0,
            end: 4,
            assigned_worker: "worker-1".into(),
            status: crate::types::ChunkStatus::Assigned,
        };
        let result = compute_chunk(&spec, &chunk, 1, 2).unwrap();
        assert_eq!(result.solutions.len(), 1);
        assert_eq!(result.solutions[0].combination, "PASS");
        assert_eq!(result.solutions[0].index, 1);
    }
}
