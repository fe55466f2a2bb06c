// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-printer state within a discovery session.

use std::time::Duration;

use tokio::time::Instant;

use printscout_core::{DiscoveredPrinter, PrinterId};

use crate::capabilities::PrinterCapabilities;
use crate::ipp_client::uri_host;

/// Whether a printer is currently being reported by discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    NotFound,
    Found,
}

/// Availability shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrinterStatus {
    /// Found, with healthy capabilities.
    Idle,
    /// Listed from stale or known-good data, or reporting an error.
    Unavailable,
}

/// A printer as published to session subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct PrinterInfo {
    pub id: PrinterId,
    pub name: String,
    pub description: String,
    pub location: Option<String>,
    pub status: PrinterStatus,
    pub capabilities: Option<PrinterCapabilities>,
}

/// Session-local record of one printer.
#[derive(Debug)]
pub(crate) struct LocalPrinter {
    id: PrinterId,
    printer: DiscoveredPrinter,
    capabilities: Option<PrinterCapabilities>,
    last_seen: Instant,
    state: RecordState,
    refresh_in_flight: bool,
    /// Whether subscribers were last told to show this printer.
    published: bool,
}

impl LocalPrinter {
    pub(crate) fn new(printer: DiscoveredPrinter) -> Self {
        Self {
            id: printer.id(),
            printer,
            capabilities: None,
            last_seen: Instant::now(),
            state: RecordState::NotFound,
            refresh_in_flight: false,
            published: false,
        }
    }

    /// Mark the printer as currently visible.
    ///
    /// Returns true if it was not found before, i.e. this is a new sighting.
    pub(crate) fn found(&mut self, printer: DiscoveredPrinter) -> bool {
        let was_found = self.state == RecordState::Found;
        self.printer = printer;
        self.last_seen = Instant::now();
        self.state = RecordState::Found;
        !was_found
    }

    /// Mark the printer as no longer visible.  Capabilities are kept so the
    /// printer can still be shown until it expires.
    pub(crate) fn not_found(&mut self) {
        self.state = RecordState::NotFound;
    }

    pub(crate) fn is_found(&self) -> bool {
        self.state == RecordState::Found
    }

    pub(crate) fn is_expired(&self, now: Instant, window: Duration) -> bool {
        self.state == RecordState::NotFound && now.saturating_duration_since(self.last_seen) >= window
    }

    pub(crate) fn id(&self) -> &PrinterId {
        &self.id
    }

    pub(crate) fn printer(&self) -> &DiscoveredPrinter {
        &self.printer
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> RecordState {
        self.state
    }

    pub(crate) fn uuid(&self) -> Option<&str> {
        self.printer.uuid.as_deref()
    }

    pub(crate) fn capabilities(&self) -> Option<&PrinterCapabilities> {
        self.capabilities.as_ref()
    }

    pub(crate) fn set_capabilities(&mut self, capabilities: Option<PrinterCapabilities>) {
        self.capabilities = capabilities;
    }

    /// Claim the single capability refresh slot.  Returns false if a refresh
    /// is already outstanding.
    pub(crate) fn begin_refresh(&mut self) -> bool {
        !std::mem::replace(&mut self.refresh_in_flight, true)
    }

    pub(crate) fn end_refresh(&mut self) {
        self.refresh_in_flight = false;
    }

    pub(crate) fn is_published(&self) -> bool {
        self.published
    }

    pub(crate) fn set_published(&mut self, published: bool) {
        self.published = published;
    }

    /// Build the published form of this printer.
    ///
    /// Returns `None` when the printer reported that it cannot accept any
    /// format we produce.
    pub(crate) fn create_info(&self) -> Option<PrinterInfo> {
        if self.capabilities.as_ref().is_some_and(|c| !c.is_supported) {
            return None;
        }

        let idle = self.is_found() && self.capabilities.as_ref().is_some_and(|c| !c.is_error());
        let location = self
            .printer
            .location
            .clone()
            .or_else(|| self.capabilities.as_ref().and_then(|c| c.location.clone()));
        let description = self
            .capabilities
            .as_ref()
            .and_then(|c| c.make_and_model.clone())
            .or_else(|| uri_host(&self.printer.path))
            .unwrap_or_else(|| self.printer.path.clone());

        Some(PrinterInfo {
            id: self.id.clone(),
            name: self.printer.name.clone(),
            description,
            location,
            status: if idle {
                PrinterStatus::Idle
            } else {
                PrinterStatus::Unavailable
            },
            capabilities: self.capabilities.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::PrinterState;

    fn printer() -> DiscoveredPrinter {
        DiscoveredPrinter::new(None, "Office", "ipp://10.0.0.5:631/ipp/print", None)
    }

    fn caps(state: PrinterState) -> PrinterCapabilities {
        PrinterCapabilities {
            is_supported: true,
            state,
            make_and_model: Some("Acme LaserJet".into()),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expires_only_when_not_found_for_the_window() {
        let window = Duration::from_millis(3000);
        let mut record = LocalPrinter::new(printer());
        assert!(record.found(printer()));
        assert!(!record.found(printer()));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(!record.is_expired(Instant::now(), window));

        record.found(printer());
        record.not_found();
        tokio::time::advance(Duration::from_millis(2999)).await;
        assert!(!record.is_expired(Instant::now(), window));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(record.is_expired(Instant::now(), window));
    }

    #[test]
    fn not_found_keeps_capabilities() {
        let mut record = LocalPrinter::new(printer());
        record.found(printer());
        record.set_capabilities(Some(caps(PrinterState::Idle)));
        record.not_found();

        assert!(record.capabilities().is_some());
        let info = record.create_info().expect("presentable");
        assert_eq!(info.status, PrinterStatus::Unavailable);
    }

    #[test]
    fn status_follows_found_and_health() {
        let mut record = LocalPrinter::new(printer());
        record.found(printer());
        record.set_capabilities(Some(caps(PrinterState::Idle)));
        let info = record.create_info().expect("presentable");
        assert_eq!(info.status, PrinterStatus::Idle);
        assert_eq!(info.description, "Acme LaserJet");

        record.set_capabilities(Some(caps(PrinterState::Stopped)));
        assert_eq!(
            record.create_info().expect("presentable").status,
            PrinterStatus::Unavailable
        );
    }

    #[test]
    fn unsupported_printer_is_never_presented() {
        let mut record = LocalPrinter::new(printer());
        record.found(printer());
        record.set_capabilities(Some(PrinterCapabilities::default()));
        assert!(record.create_info().is_none());
    }

    #[test]
    fn refresh_slot_is_exclusive() {
        let mut record = LocalPrinter::new(printer());
        assert!(record.begin_refresh());
        assert!(!record.begin_refresh());
        record.end_refresh();
        assert!(record.begin_refresh());
    }
}
