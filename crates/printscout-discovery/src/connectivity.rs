// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Network connectivity monitoring.
//
// Manually added printers have no discovery protocol announcing them, so we
// re-check them whenever the network comes back and drop them when it goes
// away.  The monitor publishes the current state on a `watch` channel.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Check whether a non-loopback route to the outside world exists.
///
/// Connecting a UDP socket only performs a route lookup; no packet is sent.
pub fn check_connectivity() -> bool {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| {
            s.connect("8.8.8.8:53")?;
            s.local_addr()
        })
        .map(|addr| !addr.ip().is_loopback())
        .unwrap_or(false)
}

/// Periodically polls connectivity and publishes changes.
pub struct ConnectivityMonitor {
    state: watch::Receiver<bool>,
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    /// Start polling every `interval`.  Must be called within a Tokio runtime.
    pub fn spawn(interval: Duration) -> Self {
        let (tx, state) = watch::channel(check_connectivity());
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let online = tokio::task::spawn_blocking(check_connectivity)
                    .await
                    .unwrap_or(false);
                publish(&tx, online);
                if tx.is_closed() {
                    break;
                }
            }
        });
        Self { state, task }
    }

    /// A receiver that observes every connectivity change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.state.borrow()
    }
}

impl Drop for ConnectivityMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Publish `online`, logging transitions.  Returns true if the state changed.
fn publish(tx: &watch::Sender<bool>, online: bool) -> bool {
    tx.send_if_modified(|current| {
        if *current == online {
            return false;
        }
        if online {
            info!("network connectivity restored");
        } else {
            warn!("network connectivity lost");
        }
        *current = online;
        true
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_reports_only_transitions() {
        let (tx, mut rx) = watch::channel(true);
        assert!(!publish(&tx, true));
        assert!(!rx.has_changed().unwrap());

        assert!(publish(&tx, false));
        assert!(rx.has_changed().unwrap());
        assert!(!*rx.borrow_and_update());

        assert!(publish(&tx, true));
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test]
    async fn monitor_publishes_initial_state() {
        let monitor = ConnectivityMonitor::spawn(Duration::from_secs(60));
        let rx = monitor.subscribe();
        assert_eq!(*rx.borrow(), monitor.is_connected());
    }
}
