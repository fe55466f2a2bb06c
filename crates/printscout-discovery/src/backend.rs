// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Discovery backend abstraction.
//
// A backend (mDNS, manually added printers, ...) reports printers appearing
// and disappearing to any number of listeners.  `DiscoveryHub` holds the
// plumbing every backend needs: the listener list, the set of printers
// currently visible, and replay of that set to late-joining listeners.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use printscout_core::DiscoveredPrinter;
use printscout_core::error::Result;

/// Receives found/lost events from a discovery backend.
///
/// Events may arrive on any thread, in any order, and may repeat.
pub trait DiscoveryListener: Send + Sync {
    fn on_found(&self, printer: DiscoveredPrinter);
    fn on_lost(&self, printer: DiscoveredPrinter);
}

/// A source of printer found/lost events.
pub trait Discovery: Send + Sync {
    /// Begin delivering events to `listener`.  Printers already visible are
    /// reported to it straight away.
    fn start(&self, listener: Arc<dyn DiscoveryListener>) -> Result<()>;

    /// Stop delivering events to `listener`.
    fn stop(&self, listener: &Arc<dyn DiscoveryListener>);
}

#[derive(Default)]
struct HubInner {
    listeners: Vec<Arc<dyn DiscoveryListener>>,
    /// Visible printers keyed by path.
    printers: HashMap<String, DiscoveredPrinter>,
}

/// Listener registry and visible-printer set shared by backends.
#[derive(Default)]
pub struct DiscoveryHub {
    inner: Mutex<HubInner>,
}

impl DiscoveryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and replay visible printers to it.
    ///
    /// Returns true when this is the first listener, i.e. the backend
    /// should begin discovering.
    pub fn add_listener(&self, listener: Arc<dyn DiscoveryListener>) -> bool {
        let (first, replay) = {
            let mut inner = self.lock();
            if inner.listeners.iter().any(|l| same_listener(l, &listener)) {
                return false;
            }
            let first = inner.listeners.is_empty();
            inner.listeners.push(Arc::clone(&listener));
            (first, inner.printers.values().cloned().collect::<Vec<_>>())
        };
        for printer in replay {
            listener.on_found(printer);
        }
        first
    }

    /// Unregister a listener.
    ///
    /// Returns true when no listeners remain, i.e. the backend should stop.
    pub fn remove_listener(&self, listener: &Arc<dyn DiscoveryListener>) -> bool {
        let mut inner = self.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|l| !same_listener(l, listener));
        before != inner.listeners.len() && inner.listeners.is_empty()
    }

    pub fn has_listeners(&self) -> bool {
        !self.lock().listeners.is_empty()
    }

    /// Record a printer as visible and tell every listener.
    ///
    /// Repeats of an unchanged printer are not forwarded.
    pub fn printer_found(&self, printer: DiscoveredPrinter) {
        let listeners = {
            let mut inner = self.lock();
            if inner.printers.get(&printer.path) == Some(&printer) {
                return;
            }
            inner.printers.insert(printer.path.clone(), printer.clone());
            inner.listeners.clone()
        };
        debug!(printer = %printer, listeners = listeners.len(), "printer found");
        for listener in listeners {
            listener.on_found(printer.clone());
        }
    }

    /// Forget the printer at `path` and tell every listener.
    pub fn printer_lost(&self, path: &str) {
        let (printer, listeners) = {
            let mut inner = self.lock();
            let Some(printer) = inner.printers.remove(path) else {
                return;
            };
            (printer, inner.listeners.clone())
        };
        debug!(printer = %printer, "printer lost");
        for listener in listeners {
            listener.on_lost(printer.clone());
        }
    }

    /// Report every visible printer as lost.
    pub fn all_printers_lost(&self) {
        let (printers, listeners) = {
            let mut inner = self.lock();
            let printers: Vec<_> = inner.printers.drain().map(|(_, p)| p).collect();
            (printers, inner.listeners.clone())
        };
        for printer in printers {
            for listener in &listeners {
                listener.on_lost(printer.clone());
            }
        }
    }

    /// Forget every visible printer, reporting each as lost to `listener`
    /// only.  Used when the last listener leaves, after it has been removed.
    pub fn printers_lost_to(&self, listener: &Arc<dyn DiscoveryListener>) {
        let printers: Vec<_> = self.lock().printers.drain().map(|(_, p)| p).collect();
        for printer in printers {
            listener.on_lost(printer);
        }
    }

    /// Snapshot of currently visible printers.
    pub fn printers(&self) -> Vec<DiscoveredPrinter> {
        self.lock().printers.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn same_listener(a: &Arc<dyn DiscoveryListener>, b: &Arc<dyn DiscoveryListener>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Listener that records events, for backend and session tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Event {
        Found(DiscoveredPrinter),
        Lost(DiscoveredPrinter),
    }

    #[derive(Default)]
    pub(crate) struct RecordingListener {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingListener {
        pub(crate) fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl DiscoveryListener for RecordingListener {
        fn on_found(&self, printer: DiscoveredPrinter) {
            self.events.lock().unwrap().push(Event::Found(printer));
        }

        fn on_lost(&self, printer: DiscoveredPrinter) {
            self.events.lock().unwrap().push(Event::Lost(printer));
        }
    }

    /// Backend driven by hand from tests.
    #[derive(Default)]
    pub(crate) struct ManualBackend {
        pub(crate) hub: DiscoveryHub,
        starts: Mutex<usize>,
        stops: Mutex<usize>,
    }

    impl ManualBackend {
        pub(crate) fn starts(&self) -> usize {
            *self.starts.lock().unwrap()
        }

        pub(crate) fn stops(&self) -> usize {
            *self.stops.lock().unwrap()
        }
    }

    impl Discovery for ManualBackend {
        fn start(&self, listener: Arc<dyn DiscoveryListener>) -> Result<()> {
            *self.starts.lock().unwrap() += 1;
            self.hub.add_listener(listener);
            Ok(())
        }

        fn stop(&self, listener: &Arc<dyn DiscoveryListener>) {
            *self.stops.lock().unwrap() += 1;
            self.hub.remove_listener(listener);
        }
    }
}
