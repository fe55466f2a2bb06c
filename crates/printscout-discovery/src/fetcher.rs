// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capability fetching and caching.
//
// Sessions and the endpoint prober never talk IPP directly; they go through a
// `CapabilityFetcher`.  Cancellation is cooperative: dropping a fetch future
// abandons the request, and a dropped request never reports back.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use printscout_core::DiscoveredPrinter;

use crate::capabilities::PrinterCapabilities;
use crate::ipp_client::IppClient;

/// Source of printer capability snapshots.
pub trait CapabilityFetcher: Send + Sync + 'static {
    /// Query the printer at `printer.path`.
    ///
    /// Resolves to `None` when the printer did not answer with usable
    /// capabilities, including when the request timed out.  With
    /// `bypass_cache` set, a cached answer is never returned.
    fn fetch(
        &self,
        printer: &DiscoveredPrinter,
        bypass_cache: bool,
    ) -> impl Future<Output = Option<PrinterCapabilities>> + Send;

    /// Cached capabilities for this printer, if any.
    fn cached(&self, printer: &DiscoveredPrinter) -> Option<PrinterCapabilities>;

    /// Forget any cached result for `uri`.
    fn remove(&self, uri: &str);
}

/// `CapabilityFetcher` backed by IPP Get-Printer-Attributes.
///
/// Successful answers are cached by printer path.  Each query is bounded by
/// `timeout`; a printer that does not answer in time counts as a failure.
pub struct IppCapabilityCache {
    cache: Mutex<HashMap<String, PrinterCapabilities>>,
    timeout: Duration,
}

impl IppCapabilityCache {
    pub fn new(timeout: Duration) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn lookup(&self, path: &str) -> Option<PrinterCapabilities> {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    fn store(&self, path: &str, capabilities: Option<&PrinterCapabilities>) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        match capabilities {
            Some(caps) => {
                cache.insert(path.to_owned(), caps.clone());
            }
            None => {
                cache.remove(path);
            }
        }
    }

    async fn query(&self, path: &str) -> Option<PrinterCapabilities> {
        let client = match IppClient::new(path) {
            Ok(client) => client,
            Err(e) => {
                warn!(uri = %path, error = %e, "cannot query printer");
                return None;
            }
        };

        match tokio::time::timeout(self.timeout, client.get_printer_attributes()).await {
            Ok(Ok(attrs)) => Some(PrinterCapabilities::from_attributes(&attrs)),
            Ok(Err(e)) => {
                debug!(uri = %path, error = %e, "capability request failed");
                None
            }
            Err(_) => {
                debug!(
                    uri = %path,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "capability request timed out"
                );
                None
            }
        }
    }
}

impl CapabilityFetcher for IppCapabilityCache {
    async fn fetch(
        &self,
        printer: &DiscoveredPrinter,
        bypass_cache: bool,
    ) -> Option<PrinterCapabilities> {
        let path = printer.path.clone();
        if !bypass_cache && let Some(caps) = self.lookup(&path) {
            debug!(uri = %path, "capabilities served from cache");
            return Some(caps);
        }

        let result = self.query(&path).await;
        self.store(&path, result.as_ref());
        result
    }

    fn cached(&self, printer: &DiscoveredPrinter) -> Option<PrinterCapabilities> {
        self.lookup(&printer.path)
    }

    fn remove(&self, uri: &str) {
        if self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uri)
            .is_some()
        {
            debug!(uri, "forgot cached capabilities");
        }
    }
}

/// Scripted fetcher used by the prober, backend, and session tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// How the fetcher answers a request for one path.
    #[derive(Debug, Clone)]
    pub(crate) enum Scripted {
        /// Answer right away.
        Immediate(Option<PrinterCapabilities>),
        /// Answer after a delay.
        After(Duration, Option<PrinterCapabilities>),
        /// Never answer; only cancellation ends the request.
        Never,
    }

    #[derive(Default)]
    pub(crate) struct ScriptedFetcher {
        scripts: Mutex<HashMap<String, Scripted>>,
        cache: Mutex<HashMap<String, PrinterCapabilities>>,
        requests: Mutex<Vec<(String, bool)>>,
        cancelled: Mutex<Vec<String>>,
        removed: Mutex<Vec<String>>,
    }

    /// Records a cancellation if the request future is dropped unanswered.
    struct CancelGuard<'a> {
        log: &'a Mutex<Vec<String>>,
        path: String,
        armed: bool,
    }

    impl Drop for CancelGuard<'_> {
        fn drop(&mut self) {
            if self.armed {
                self.log.lock().unwrap().push(self.path.clone());
            }
        }
    }

    impl ScriptedFetcher {
        pub(crate) fn script(&self, path: &str, answer: Scripted) {
            self.scripts.lock().unwrap().insert(path.to_owned(), answer);
        }

        pub(crate) fn seed_cache(&self, path: &str, caps: PrinterCapabilities) {
            self.cache.lock().unwrap().insert(path.to_owned(), caps);
        }

        pub(crate) fn requests(&self) -> Vec<(String, bool)> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn cancelled(&self) -> Vec<String> {
            self.cancelled.lock().unwrap().clone()
        }

        pub(crate) fn removed(&self) -> Vec<String> {
            self.removed.lock().unwrap().clone()
        }
    }

    impl CapabilityFetcher for ScriptedFetcher {
        async fn fetch(
            &self,
            printer: &DiscoveredPrinter,
            bypass_cache: bool,
        ) -> Option<PrinterCapabilities> {
            let path = printer.path.clone();
            self.requests
                .lock()
                .unwrap()
                .push((path.clone(), bypass_cache));
            let script = self
                .scripts
                .lock()
                .unwrap()
                .get(&path)
                .cloned()
                .unwrap_or(Scripted::Immediate(None));

            let mut guard = CancelGuard {
                log: &self.cancelled,
                path,
                armed: true,
            };
            let answer = match script {
                Scripted::Immediate(caps) => caps,
                Scripted::After(delay, caps) => {
                    tokio::time::sleep(delay).await;
                    caps
                }
                Scripted::Never => std::future::pending().await,
            };
            guard.armed = false;
            answer
        }

        fn cached(&self, printer: &DiscoveredPrinter) -> Option<PrinterCapabilities> {
            self.cache.lock().unwrap().get(&printer.path).cloned()
        }

        fn remove(&self, uri: &str) {
            self.removed.lock().unwrap().push(uri.to_owned());
            self.cache.lock().unwrap().remove(uri);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_forgets_cached_entry() {
        let cache = IppCapabilityCache::new(Duration::from_secs(1));
        let printer = DiscoveredPrinter::new(None, "p", "ipp://10.0.0.9:631/ipp/print", None);
        cache.store(&printer.path, Some(&PrinterCapabilities::default()));
        assert!(cache.cached(&printer).is_some());

        cache.remove(&printer.path);
        assert!(cache.cached(&printer).is_none());
    }

    #[test]
    fn failed_answer_evicts_previous_success() {
        let cache = IppCapabilityCache::new(Duration::from_secs(1));
        let path = "ipp://10.0.0.9:631/ipp/print";
        cache.store(path, Some(&PrinterCapabilities::default()));
        cache.store(path, None);
        assert!(cache.lookup(path).is_none());
    }

    #[tokio::test]
    async fn cached_answer_is_served_without_query() {
        let cache = IppCapabilityCache::new(Duration::from_millis(10));
        // Unroutable documentation address: a real query would fail.
        let printer = DiscoveredPrinter::new(None, "p", "ipp://192.0.2.1:631/ipp/print", None);
        let caps = PrinterCapabilities {
            name: "Cached".into(),
            is_supported: true,
            ..Default::default()
        };
        cache.store(&printer.path, Some(&caps));

        assert_eq!(cache.fetch(&printer, false).await, Some(caps));
    }

    #[tokio::test]
    async fn invalid_uri_fails_without_panicking() {
        let cache = IppCapabilityCache::new(Duration::from_millis(10));
        let printer = DiscoveredPrinter::new(None, "p", "not a uri", None);
        assert!(cache.fetch(&printer, true).await.is_none());
    }
}
