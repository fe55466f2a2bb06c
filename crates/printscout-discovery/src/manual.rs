// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Manually added printers.
//
// Printers entered by hostname are resolved through the endpoint prober and
// saved to `manual.json`.  Nothing on the network announces them, so while
// the backend is started it follows a connectivity signal instead: when the
// network is up every saved printer is queried and those that answer are
// reported found; when it goes down they are all reported lost.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use printscout_core::error::{PrintscoutError, Result};
use printscout_core::{DiscoveredPrinter, DiscoveryConfig, PrinterId};

use crate::backend::{Discovery, DiscoveryHub, DiscoveryListener};
use crate::fetcher::CapabilityFetcher;
use crate::probe::{EndpointProber, ProbeOutcome};

/// File name of the saved printer list inside the cache directory.
pub const MANUAL_FILE: &str = "manual.json";

/// A printer the user added by hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPrinter {
    pub printer: DiscoveredPrinter,
    pub added_at: DateTime<Utc>,
}

/// Discovery backend for printers added by hand.
pub struct ManualDiscovery<F> {
    fetcher: Arc<F>,
    prober: EndpointProber<F>,
    hub: Arc<DiscoveryHub>,
    saved: Arc<Mutex<Vec<SavedPrinter>>>,
    path: PathBuf,
    connectivity: Option<watch::Receiver<bool>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl<F: CapabilityFetcher> ManualDiscovery<F> {
    /// Create the backend, loading saved printers from the configured cache
    /// directory.
    pub fn new(fetcher: Arc<F>, config: &DiscoveryConfig) -> Self {
        let path = config.resolved_cache_dir().join(MANUAL_FILE);
        let saved = load_saved(&path);
        Self {
            prober: EndpointProber::new(Arc::clone(&fetcher), config.endpoint_templates.clone()),
            fetcher,
            hub: Arc::new(DiscoveryHub::new()),
            saved: Arc::new(Mutex::new(saved)),
            path,
            connectivity: None,
            watcher: Mutex::new(None),
        }
    }

    /// Follow `connectivity` while started.  Without it the network is
    /// assumed to be up.
    pub fn with_connectivity(mut self, connectivity: watch::Receiver<bool>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Resolve `hostname` and, if it is a supported printer, save it and
    /// report it found.
    pub async fn add_manual_printer(&self, hostname: &str) -> Result<ProbeOutcome> {
        let outcome = self.prober.probe(hostname).await?;
        match &outcome {
            ProbeOutcome::Found {
                printer,
                supported: true,
            } => {
                self.save_printer(printer.clone());
                self.hub.printer_found(printer.clone());
            }
            ProbeOutcome::Found {
                printer,
                supported: false,
            } => {
                info!(printer = %printer, "printer does not accept any supported format; not saved");
            }
            ProbeOutcome::NotFound => {}
        }
        Ok(outcome)
    }

    /// Forget a saved printer.  Returns false if it was not saved.
    pub fn remove_saved_printer(&self, id: &PrinterId) -> bool {
        let removed = {
            let mut saved = self.lock_saved();
            let index = saved.iter().position(|s| &s.printer.id() == id);
            index.map(|i| saved.remove(i))
        };
        let Some(removed) = removed else {
            return false;
        };
        info!(printer = %removed.printer, "removed saved printer");
        self.persist();
        self.hub.printer_lost(&removed.printer.path);
        true
    }

    /// Saved printers, oldest first.
    pub fn saved_printers(&self) -> Vec<SavedPrinter> {
        self.lock_saved().clone()
    }

    fn save_printer(&self, printer: DiscoveredPrinter) {
        {
            let mut saved = self.lock_saved();
            let id = printer.id();
            saved.retain(|s| s.printer.id() != id && s.printer.path != printer.path);
            info!(printer = %printer, "saving manually added printer");
            saved.push(SavedPrinter {
                printer,
                added_at: Utc::now(),
            });
        }
        self.persist();
    }

    fn persist(&self) {
        let saved = self.saved_printers();
        let result = serde_json::to_string_pretty(&saved)
            .map_err(PrintscoutError::from)
            .and_then(|json| std::fs::write(&self.path, json).map_err(PrintscoutError::from));
        match result {
            Ok(()) => debug!(count = saved.len(), "saved manual printers"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to write manual printers"),
        }
    }

    fn lock_saved(&self) -> std::sync::MutexGuard<'_, Vec<SavedPrinter>> {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_watcher(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            PrintscoutError::Discovery(format!("manual discovery needs a Tokio runtime: {e}"))
        })?;
        let task = runtime.spawn(watch_connectivity(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.hub),
            Arc::clone(&self.saved),
            self.connectivity.clone(),
        ));
        let previous = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
        Ok(())
    }
}

impl<F: CapabilityFetcher> Discovery for ManualDiscovery<F> {
    fn start(&self, listener: Arc<dyn DiscoveryListener>) -> Result<()> {
        if self.hub.add_listener(listener) {
            debug!("manual discovery started");
            self.spawn_watcher()?;
        }
        Ok(())
    }

    fn stop(&self, listener: &Arc<dyn DiscoveryListener>) {
        if !self.hub.remove_listener(listener) {
            return;
        }
        if let Some(task) = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
        self.hub.printers_lost_to(listener);
        debug!("manual discovery stopped");
    }
}

/// Follow connectivity until the watcher is aborted or the signal's sender
/// goes away.
async fn watch_connectivity<F: CapabilityFetcher>(
    fetcher: Arc<F>,
    hub: Arc<DiscoveryHub>,
    saved: Arc<Mutex<Vec<SavedPrinter>>>,
    connectivity: Option<watch::Receiver<bool>>,
) {
    let Some(mut connectivity) = connectivity else {
        refresh_saved(&fetcher, &hub, &saved).await;
        return;
    };
    loop {
        let online = *connectivity.borrow_and_update();
        if online {
            refresh_saved(&fetcher, &hub, &saved).await;
        } else {
            debug!("offline; dropping manual printers");
            hub.all_printers_lost();
        }
        if connectivity.changed().await.is_err() {
            return;
        }
    }
}

/// Query every saved printer, bypassing the cache, and report those that
/// answer.
async fn refresh_saved<F: CapabilityFetcher>(
    fetcher: &Arc<F>,
    hub: &DiscoveryHub,
    saved: &Mutex<Vec<SavedPrinter>>,
) {
    let printers: Vec<DiscoveredPrinter> = saved
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|s| s.printer.clone())
        .collect();
    if printers.is_empty() {
        return;
    }
    debug!(count = printers.len(), "refreshing saved printers");

    let mut queries = JoinSet::new();
    for printer in printers {
        let fetcher = Arc::clone(fetcher);
        queries.spawn(async move {
            let answered = fetcher.fetch(&printer, true).await.is_some();
            (printer, answered)
        });
    }
    while let Some(joined) = queries.join_next().await {
        match joined {
            Ok((printer, true)) => hub.printer_found(printer),
            Ok((printer, false)) => debug!(printer = %printer, "saved printer did not answer"),
            Err(e) => warn!(error = %e, "saved printer query failed"),
        }
    }
}

fn load_saved(path: &Path) -> Vec<SavedPrinter> {
    if !path.exists() {
        return Vec::new();
    }
    let loaded = std::fs::read_to_string(path)
        .map_err(PrintscoutError::from)
        .and_then(|data| serde_json::from_str(&data).map_err(PrintscoutError::from));
    match loaded {
        Ok(saved) => saved,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read manual printers");
            Vec::new()
        }
    }
}
