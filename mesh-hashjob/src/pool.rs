use sysinfo::System;

/// `workers = ceiling * max(0.1, 1 - cpu_load) * 0.8`, clamped to
/// `[1, ceiling]` (spec.md §4.8 "Workers are sized adaptively from observed
/// CPU utilization and a configured ceiling").
const SAFETY_FACTOR: f64 = 0.8;
const MIN_AVAILABLE_CAPACITY: f64 = 0.1;

pub fn optimal_worker_count(ceiling: usize) -> usize {
    let mut system = System::new();
    system.refresh_cpu_usage();
    let cpu_load = (system.global_cpu_usage() as f64 / 100.0).clamp(0.0, 1.0);
    optimal_worker_count_for_load(ceiling, cpu_load)
}

fn optimal_worker_count_for_load(ceiling: usize, cpu_load: f64) -> usize {
    let available_capacity = (1.0 - cpu_load).max(MIN_AVAILABLE_CAPACITY);
    let optimal = (ceiling as f64 * available_capacity * SAFETY_FACTOR) as usize;
    optimal.clamp(1, ceiling.max(1))
}

/// Splits `[0, chunk_size)` into sub-chunks bounded by
/// `max(progress_interval, chunk_size / pool_size)` (spec.md §4.8
/// "Parallelism within a chunk").
pub fn split_subchunks(chunk_size: u64, progress_interval: u64, pool_size: usize) -> Vec<(u64, u64)> {
    if chunk_size == 0 {
        return Vec::new();
    }
    let pool_size = pool_size.max(1) as u64;
    let subchunk_size = progress_interval.max(chunk_size / pool_size).max(1);

    let mut ranges = Vec::new();
    let mut start = 0;
    while start < chunk_size {
        let end = (start + subchunk_size).min(chunk_size);
        ranges.push((start, end));
        start = end;
    }
    ranges
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_system_uses_most_of_the_ceiling() {
        assert_eq!(optimal_worker_count_for_load(8, 0.0), (8.0 * 0.8) as usize);
    }

    #[test]
    fn fully_loaded_system_still_gets_one_worker() {
        assert_eq!(optimal_worker_count_for_load(8, 1.0), 1);
    }

    #[test]
    fn subchunks_cover_the_whole_range_without_overlap() {
        let ranges = split_subchunks(1000, 100, 4);
        assert_eq!(ranges.first().unwrap().0, 0);
        assert_eq!(ranges.last().unwrap().1, 1000);
        for window in ranges.windows(2) {
            assert_eq!(window[0].1, window[1].0);
        }
    }
}
