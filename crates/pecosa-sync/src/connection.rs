// File: pecosa-sync/src/connection.rs
// Purpose: Online/offline status with a sticky "was offline" flag

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Snapshot of the connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub is_online: bool,
    /// Set when the connection comes back after an outage, until acknowledged
    pub was_offline: bool,
}

/// Process-wide connection monitor.
///
/// Cloning shares the same state; every clone sees every transition.
#[derive(Clone)]
pub struct ConnectionMonitor {
    tx: Arc<watch::Sender<ConnectionStatus>>,
}

impl ConnectionMonitor {
    /// `initial` is the platform's view of the network; unknown counts as online
    pub fn new(initial: Option<bool>) -> Self {
        let (tx, _) = watch::channel(ConnectionStatus {
            is_online: initial.unwrap_or(true),
            was_offline: false,
        });
        Self { tx: Arc::new(tx) }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.tx.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online
    }

    pub fn was_offline(&self) -> bool {
        self.status().was_offline
    }

    /// Report the current network state. Only an offline→online edge marks `was_offline`.
    pub fn set_online(&self, online: bool) {
        self.tx.send_if_modified(|status| {
            if status.is_online == online {
                return false;
            }
            if online {
                tracing::info!("connection restored");
                status.was_offline = true;
            } else {
                tracing::warn!("connection lost");
            }
            status.is_online = online;
            true
        });
    }

    /// Acknowledge a past outage (e.g. the sync banner was dismissed)
    pub fn reset_was_offline(&self) {
        self.tx.send_if_modified(|status| {
            let changed = status.was_offline;
            status.was_offline = false;
            changed
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.tx.subscribe()
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Something that can tell whether the backend is reachable
#[async_trait]
pub trait ConnectivityProbe: Send + Sync {
    async fn is_reachable(&self) -> bool;
}

/// Poll `probe` every `interval` and feed the results into `monitor`.
/// Abort the returned handle to stop probing.
pub fn spawn_probe(
    monitor: ConnectionMonitor,
    probe: Arc<dyn ConnectivityProbe>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let reachable = probe.is_reachable().await;
            monitor.set_online(reachable);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_initial_state() {
        assert!(ConnectionMonitor::new(None).is_online());
        assert!(!ConnectionMonitor::new(Some(false)).is_online());
        assert!(!ConnectionMonitor::new(Some(false)).was_offline());
    }

    #[test]
    fn test_was_offline_set_once_per_episode() {
        let monitor = ConnectionMonitor::new(Some(true));
        monitor.set_online(false);
        assert!(!monitor.was_offline());

        monitor.set_online(true);
        assert!(monitor.was_offline());

        monitor.reset_was_offline();
        // Repeated "online" reports inside the same episode do not re-arm the flag
        monitor.set_online(true);
        assert!(!monitor.was_offline());
    }

    #[test]
    fn test_reset_while_offline() {
        let monitor = ConnectionMonitor::new(Some(true));
        monitor.set_online(false);
        monitor.set_online(true);
        monitor.set_online(false);

        monitor.reset_was_offline();
        assert!(!monitor.was_offline());
        assert!(!monitor.is_online());
    }

    #[test]
    fn test_clones_share_state() {
        let monitor = ConnectionMonitor::default();
        let banner = monitor.clone();
        monitor.set_online(false);
        assert!(!banner.is_online());
    }

    struct Flag(AtomicBool);

    #[async_trait]
    impl ConnectivityProbe for Flag {
        async fn is_reachable(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_reports_transitions() {
        let monitor = ConnectionMonitor::new(Some(true));
        let flag = Arc::new(Flag(AtomicBool::new(false)));
        let mut rx = monitor.subscribe();

        let handle = spawn_probe(monitor.clone(), flag.clone(), Duration::from_secs(5));
        rx.changed().await.unwrap();
        assert!(!monitor.is_online());

        flag.0.store(true, Ordering::SeqCst);
        rx.changed().await.unwrap();
        assert!(monitor.is_online());
        assert!(monitor.was_offline());

        handle.abort();
    }
}
