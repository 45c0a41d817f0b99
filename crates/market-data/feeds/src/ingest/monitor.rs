//! Idle / failover monitor
//!
//! Periodically reads stream liveness and staleness and publishes a
//! two-state poll signal. The decision is a pure function of those two
//! reads; the monitor keeps no other state besides the last published mode.

use crate::ingest::connector::Liveness;
use common::Shutdown;
use common::constants::network::MONITOR_CHECK_INTERVAL_MS;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{info, warn};

/// Poll control signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollMode {
    Off,
    On,
}

impl fmt::Display for PollMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "off",
            Self::On => "on",
        })
    }
}

/// Polling is needed when the stream is not live or has gone quiet
#[must_use]
pub fn evaluate(live: bool, idle_for: Duration, idle_timeout: Duration) -> PollMode {
    if !live || idle_for > idle_timeout {
        PollMode::On
    } else {
        PollMode::Off
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub check_interval: Duration,
    pub idle_timeout: Duration,
}

impl MonitorConfig {
    #[must_use]
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            check_interval: Duration::from_millis(MONITOR_CHECK_INTERVAL_MS),
            idle_timeout,
        }
    }
}

/// Publishes [`PollMode`] from the stream's liveness
pub struct FailoverMonitor<L: Liveness + ?Sized> {
    liveness: Arc<L>,
    config: MonitorConfig,
    tx: watch::Sender<PollMode>,
}

impl<L: Liveness + ?Sized> FailoverMonitor<L> {
    /// Monitor with its initial mode computed from the current liveness
    pub fn new(liveness: Arc<L>, config: MonitorConfig) -> Self {
        let initial = evaluate(
            liveness.is_live(),
            Instant::now().saturating_duration_since(liveness.last_event_at()),
            config.idle_timeout,
        );
        let (tx, _) = watch::channel(initial);
        Self {
            liveness,
            config,
            tx,
        }
    }

    /// Receiver for the poll signal
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PollMode> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn mode(&self) -> PollMode {
        *self.tx.borrow()
    }

    /// Re-evaluate and publish; returns the current mode
    pub fn check(&self, now: Instant) -> PollMode {
        let live = self.liveness.is_live();
        let idle_for = now.saturating_duration_since(self.liveness.last_event_at());
        let mode = evaluate(live, idle_for, self.config.idle_timeout);

        let prev = self.tx.send_replace(mode);
        if prev != mode {
            match mode {
                PollMode::On => warn!(
                    "Polling fallback on (stream live={}, idle for {:?})",
                    live, idle_for
                ),
                PollMode::Off => info!("Polling fallback off; stream is live"),
            }
        }
        mode
    }

    /// Check on a fixed period until shutdown
    pub async fn run(self, mut shutdown: Shutdown) {
        let mut ticker = interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            "Failover monitor started (check every {:?}, idle timeout {:?})",
            self.config.check_interval, self.config.idle_timeout
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check(Instant::now());
                }
                () = shutdown.wait() => break,
            }
        }
        info!("Failover monitor stopped");
    }
}
