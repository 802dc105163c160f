use std::sync::Arc;
use std::time::Duration;

use mesh_crypto::TokenService;
use mesh_gossip::GossipService;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;

/// `GossipService` ticks nothing on its own (spec.md §4.2 leaves pacing to
/// the caller); this owns the three periodic loops a running node needs —
/// gossip rounds, failure sweeps, and interval adjustment — plus a fourth
/// for pruning expired token revocations, all stopped together on shutdown.
pub struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

const TOKEN_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

impl BackgroundTasks {
    pub fn spawn(
        gossip: Arc<GossipService>,
        tokens: Arc<TokenService>,
        cleanup_interval_secs: f64,
        adjust_interval_period_secs: f64,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let mut handles = Vec::new();

        handles.push(tokio::spawn(gossip_round_loop(gossip.clone(), shutdown.subscribe())));
        handles.push(tokio::spawn(failure_sweep_loop(
            gossip.clone(),
            Duration::from_secs_f64(cleanup_interval_secs),
            shutdown.subscribe(),
        )));
        handles.push(tokio::spawn(interval_adjust_loop(
            gossip,
            Duration::from_secs_f64(adjust_interval_period_secs),
            shutdown.subscribe(),
        )));
        handles.push(tokio::spawn(token_prune_loop(tokens, shutdown.subscribe())));

        Self { handles, shutdown }
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn sleep_or_stop(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.changed() => false,
    }
}

async fn gossip_round_loop(gossip: Arc<GossipService>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let interval = Duration::from_secs_f64(gossip.current_interval_secs());
        if !sleep_or_stop(interval, &mut shutdown).await {
            return;
        }
        if let Err(err) = gossip.run_round().await {
            warn!(error = %err, "gossip round failed");
        }
    }
}

async fn failure_sweep_loop(gossip: Arc<GossipService>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        if !sleep_or_stop(interval, &mut shutdown).await {
            return;
        }
        gossip.run_failure_sweep();
    }
}

async fn interval_adjust_loop(gossip: Arc<GossipService>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        if !sleep_or_stop(interval, &mut shutdown).await {
            return;
        }
        gossip.adjust_interval();
    }
}

async fn token_prune_loop(tokens: Arc<TokenService>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if !sleep_or_stop(TOKEN_PRUNE_INTERVAL, &mut shutdown).await {
            return;
        }
        tokens.prune_revoked();
    }
}
