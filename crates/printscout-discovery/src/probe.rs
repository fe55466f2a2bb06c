// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Endpoint probing for printers entered by hostname.
//
// A bare hostname says nothing about where the IPP service lives.  We race a
// fixed, ordered list of candidate endpoints; the first one that answers with
// capabilities wins, every other request is cancelled, and the printer's
// identity is resolved from that answer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use printscout_core::error::{PrintscoutError, Result};
use printscout_core::{DiscoveredPrinter, EndpointTemplate, normalize_uuid};

use crate::capabilities::PrinterCapabilities;
use crate::fetcher::CapabilityFetcher;
use crate::ipp_client::uri_host;

/// Result of probing one hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Some endpoint answered.  `supported` is false when the device speaks
    /// IPP but cannot accept any format we produce.
    Found {
        printer: DiscoveredPrinter,
        supported: bool,
    },
    /// Every candidate endpoint failed.
    NotFound,
}

/// One outstanding request within a probing run.
struct ProbeRequest {
    uri: String,
    cancel: CancellationToken,
}

/// What a probe task reports when it terminates.
enum ProbeReport {
    Answered {
        index: usize,
        uri: String,
        capabilities: Option<PrinterCapabilities>,
    },
    Cancelled {
        index: usize,
    },
}

/// Races candidate endpoints for a hostname.
pub struct EndpointProber<F> {
    fetcher: Arc<F>,
    templates: Vec<EndpointTemplate>,
}

impl<F: CapabilityFetcher> EndpointProber<F> {
    pub fn new(fetcher: Arc<F>, templates: Vec<EndpointTemplate>) -> Self {
        Self { fetcher, templates }
    }

    /// Concrete URIs tried for `host`, in probe order.
    pub fn candidate_uris(&self, host: &str) -> Vec<String> {
        self.templates.iter().map(|t| t.uri_for(host)).collect()
    }

    /// Probe every candidate endpoint of `hostname` concurrently.
    ///
    /// Returns exactly one outcome, and only after every probe of the run
    /// has either answered or been cancelled.
    #[instrument(skip(self))]
    pub async fn probe(&self, hostname: &str) -> Result<ProbeOutcome> {
        let host = hostname.trim();
        if host.is_empty() {
            return Err(PrintscoutError::InvalidHostname(hostname.to_owned()));
        }

        let mut in_flight: HashMap<usize, ProbeRequest> = HashMap::new();
        let mut probes = JoinSet::new();

        for (index, uri) in self.candidate_uris(host).into_iter().enumerate() {
            let cancel = CancellationToken::new();
            in_flight.insert(
                index,
                ProbeRequest {
                    uri: uri.clone(),
                    cancel: cancel.clone(),
                },
            );

            let fetcher = Arc::clone(&self.fetcher);
            probes.spawn(async move {
                let candidate = DiscoveredPrinter::new(None, "", uri.clone(), None);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => ProbeReport::Cancelled { index },
                    capabilities = fetcher.fetch(&candidate, true) => ProbeReport::Answered {
                        index,
                        uri,
                        capabilities,
                    },
                }
            });
        }
        debug!(candidates = in_flight.len(), "probing candidate endpoints");

        let mut outcome = None;
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(ProbeReport::Answered {
                    index,
                    uri,
                    capabilities: Some(caps),
                }) if outcome.is_none() => {
                    in_flight.remove(&index);
                    for (_, request) in in_flight.drain() {
                        debug!(uri = %request.uri, "cancelling outstanding probe");
                        request.cancel.cancel();
                    }
                    let printer = resolve_printer(host, &uri, &caps);
                    info!(
                        uri = %uri,
                        name = %printer.name,
                        supported = caps.is_supported,
                        "printer endpoint found"
                    );
                    outcome = Some(ProbeOutcome::Found {
                        printer,
                        supported: caps.is_supported,
                    });
                }
                Ok(ProbeReport::Answered { index, uri, .. }) => {
                    in_flight.remove(&index);
                    debug!(uri = %uri, "no capabilities at endpoint");
                }
                Ok(ProbeReport::Cancelled { index }) => {
                    in_flight.remove(&index);
                }
                Err(e) => {
                    warn!(error = %e, "probe task failed");
                }
            }
        }

        Ok(outcome.unwrap_or_else(|| {
            info!(host, "no printer endpoint answered");
            ProbeOutcome::NotFound
        }))
    }
}

/// Build the canonical printer identity from a successful answer.
fn resolve_printer(host: &str, uri: &str, caps: &PrinterCapabilities) -> DiscoveredPrinter {
    let uuid = if caps.uuid.trim().is_empty() {
        None
    } else {
        Some(normalize_uuid(&caps.uuid).unwrap_or_else(|| caps.uuid.clone()))
    };
    let name = if caps.name.is_empty() {
        uri_host(uri).unwrap_or_else(|| host.to_owned())
    } else {
        caps.name.clone()
    };
    DiscoveredPrinter::new(uuid, name, uri, caps.location.clone())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use printscout_core::config::default_endpoint_templates;

    use super::*;
    use crate::fetcher::testing::{Scripted, ScriptedFetcher};

    fn prober(fetcher: &Arc<ScriptedFetcher>) -> EndpointProber<ScriptedFetcher> {
        EndpointProber::new(Arc::clone(fetcher), default_endpoint_templates())
    }

    fn office(uuid: &str, supported: bool) -> PrinterCapabilities {
        PrinterCapabilities {
            is_supported: supported,
            name: "Office".into(),
            uuid: uuid.into(),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_wins_and_cancels_the_rest() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let p = prober(&fetcher);
        for uri in p.candidate_uris("printer.local") {
            fetcher.script(&uri, Scripted::Never);
        }
        fetcher.script(
            "ipp://printer.local:631/ipp/printer",
            Scripted::After(Duration::from_millis(200), Some(office("", true))),
        );

        let outcome = p.probe("printer.local").await.expect("probe");

        assert_eq!(
            outcome,
            ProbeOutcome::Found {
                printer: DiscoveredPrinter::new(
                    None,
                    "Office",
                    "ipp://printer.local:631/ipp/printer",
                    None
                ),
                supported: true,
            }
        );
        let mut cancelled = fetcher.cancelled();
        cancelled.sort();
        assert_eq!(
            cancelled,
            vec![
                "ipp://printer.local:631/",
                "ipp://printer.local:631/ipp",
                "ipp://printer.local:631/ipp/print",
                "ipp://printer.local:80/ipp/print",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn every_request_bypasses_the_cache() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let outcome = prober(&fetcher).probe("printer.local").await.expect("probe");
        assert_eq!(outcome, ProbeOutcome::NotFound);

        let requests = fetcher.requests();
        assert_eq!(requests.len(), 5);
        assert!(requests.iter().all(|(_, bypass)| *bypass));
        assert!(fetcher.cancelled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_only_after_the_last_failure() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let p = prober(&fetcher);
        for (i, uri) in p.candidate_uris("printer.local").iter().enumerate() {
            let delay = Duration::from_millis(100 * (i as u64 + 1));
            fetcher.script(uri, Scripted::After(delay, None));
        }

        let run = tokio::spawn(async move { p.probe("printer.local").await });

        // Four of five candidates have failed by now.
        tokio::time::sleep(Duration::from_millis(450)).await;
        assert!(!run.is_finished());

        let outcome = run.await.expect("join").expect("probe");
        assert_eq!(outcome, ProbeOutcome::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_printer_is_still_found() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.script(
            "ipp://10.1.2.3:631/ipp/print",
            Scripted::Immediate(Some(office("", false))),
        );

        let outcome = prober(&fetcher).probe("10.1.2.3").await.expect("probe");
        match outcome {
            ProbeOutcome::Found { printer, supported } => {
                assert!(!supported);
                assert_eq!(printer.path, "ipp://10.1.2.3:631/ipp/print");
            }
            ProbeOutcome::NotFound => panic!("expected Found"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn identity_comes_from_capabilities() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let mut caps = office("urn:uuid:4509a320-00a0-008f-00b6-002507510eca", true);
        caps.name = String::new();
        caps.location = Some("Lobby".into());
        fetcher.script("ipp://printer.local:631/ipp", Scripted::Immediate(Some(caps)));

        let outcome = prober(&fetcher).probe(" printer.local ").await.expect("probe");
        let ProbeOutcome::Found { printer, .. } = outcome else {
            panic!("expected Found");
        };
        // Empty reported name falls back to the URI host.
        assert_eq!(printer.name, "printer.local");
        assert_eq!(
            printer.id().as_str(),
            "urn:uuid:4509a320-00a0-008f-00b6-002507510eca"
        );
        assert_eq!(printer.location.as_deref(), Some("Lobby"));
    }

    #[tokio::test]
    async fn empty_hostname_is_rejected() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let result = prober(&fetcher).probe("   ").await;
        assert!(matches!(result, Err(PrintscoutError::InvalidHostname(_))));
        assert!(fetcher.requests().is_empty());
    }
}
