use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

/// Cluster-wide rollout strategies (spec.md §4.7 "Cluster rollout"). The
/// coordinator owns one of these per in-flight rollout task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RolloutStrategy {
    Rolling { interval_seconds: u64, max_failures: usize },
    Canary { canary_duration_secs: u64 },
    AllAtOnce,
    /// Same execution shape as `AllAtOnce` in this core; the distinct name
    /// is kept so config files and API responses round-trip it.
    BlueGreen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeUpdateStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
    RolledBack,
}

#[derive(Debug, Clone, Serialize)]
pub struct RolloutReport {
    pub node_status: BTreeMap<String, NodeUpdateStatus>,
    pub halted: bool,
}

/// Drives `update_fn` over `targets` according to `strategy`. `update_fn`
/// performs one node's download+verify+install+version-write and resolves
/// `Ok(())` on success.
pub async fn run_rollout<F, Fut>(
    strategy: &RolloutStrategy,
    targets: &[(String, String)],
    mut update_fn: F,
) -> RolloutReport
where
    F: FnMut(String, String) -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let mut node_status = BTreeMap::new();
    for (node_id, _) in targets {
        node_status.insert(node_id.clone(), NodeUpdateStatus::Pending);
    }

    match strategy {
        RolloutStrategy::Rolling { interval_seconds, max_failures } => {
            run_rolling(targets, &mut update_fn, &mut node_status, *interval_seconds, *max_failures, 0)
                .await
        }
        RolloutStrategy::Canary { canary_duration_secs } => {
            if targets.is_empty() {
                return RolloutReport { node_status, halted: false };
            }
            let (canary_id, canary_url) = targets[0].clone();
            node_status.insert(canary_id.clone(), NodeUpdateStatus::Downloading);
            let outcome = update_fn(canary_id.clone(), canary_url).await;
            node_status.insert(
                canary_id,
                if outcome.is_ok() { NodeUpdateStatus::Completed } else { NodeUpdateStatus::Failed },
            );
            if outcome.is_err() {
                return RolloutReport { node_status, halted: true };
            }
            tokio::time::sleep(Duration::from_secs(*canary_duration_secs)).await;
            run_rolling(&targets[1..], &mut update_fn, &mut node_status, 0, usize::MAX, 0).await
        }
        RolloutStrategy::AllAtOnce | RolloutStrategy::BlueGreen => {
            let futures = targets.iter().map(|(node_id, base_url)| {
                let node_id = node_id.clone();
                let base_url = base_url.clone();
                async move {
                    let result = update_fn(node_id.clone(), base_url).await;
                    (node_id, result)
                }
            });
            for (node_id, result) in join_all(futures).await {
                node_status.insert(
                    node_id,
                    if result.is_ok() { NodeUpdateStatus::Completed } else { NodeUpdateStatus::Failed },
                );
            }
            RolloutReport { node_status, halted: false }
        }
    }
}

async fn run_rolling<F, Fut>(
    targets: &[(String, String)],
    update_fn: &mut F,
    node_status: &mut BTreeMap<String, NodeUpdateStatus>,
    interval_seconds: u64,
    max_failures: usize,
    mut failure_count: usize,
) -> RolloutReport
where
    F: FnMut(String, String) -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    for (index, (node_id, base_url)) in targets.iter().enumerate() {
        node_status.insert(node_id.clone(), NodeUpdateStatus::Downloading);
        let outcome = update_fn(node_id.clone(), base_url.clone()).await;
        match outcome {
            Ok(()) => {
                node_status.insert(node_id.clone(), NodeUpdateStatus::Completed);
            }
            Err(_) => {
                node_status.insert(node_id.clone(), NodeUpdateStatus::Failed);
                failure_count += 1;
                if failure_count >= max_failures {
                    return RolloutReport { node_status: node_status.clone(), halted: true };
                }
            }
        }
        if index + 1 < targets.len() && interval_seconds > 0 {
            tokio::time::sleep(Duration::from_secs(interval_seconds)).await;
        }
    }
    RolloutReport { node_status: node_status.clone(), halted: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn targets(n: usize) -> Vec<(String, String)> {
        (0..n).map(|i| (format!("node-{i}"), format!("https://node-{i}"))).collect()
    }

    #[tokio::test]
    async fn all_at_once_updates_every_target_concurrently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let report = run_rollout(&RolloutStrategy::AllAtOnce, &targets(3), move |_, _| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(report.node_status.values().all(|s| *s == NodeUpdateStatus::Completed));
        assert!(!report.halted);
    }

    #[tokio::test]
    async fn rolling_halts_after_max_failures() {
        let report = run_rollout(
            &RolloutStrategy::Rolling { interval_seconds: 0, max_failures: 1 },
            &targets(3),
            |node_id, _| async move {
                if node_id == "node-0" { Ok(()) } else { Err("boom".to_string()) }
            },
        )
        .await;
        assert!(report.halted);
        assert_eq!(report.node_status["node-0"], NodeUpdateStatus::Completed);
        assert_eq!(report.node_status["node-1"], NodeUpdateStatus::Failed);
        assert_eq!(report.node_status["node-2"], NodeUpdateStatus::Pending);
    }

    #[tokio::test]
    async fn blue_green_matches_all_at_once_shape() {
        let report = run_rollout(&RolloutStrategy::BlueGreen, &targets(2), |_, _| async { Ok(()) }).await;
        assert!(report.node_status.values().all(|s| *s == NodeUpdateStatus::Completed));
    }
}
