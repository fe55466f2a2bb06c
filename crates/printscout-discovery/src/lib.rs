// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// printscout discovery: IPP capability queries, mDNS and manual discovery
// backends, hostname probing, and the discovery session that merges their
// events into one printer roster.

pub mod backend;
pub mod capabilities;
pub mod connectivity;
pub mod fetcher;
pub mod ipp_client;
pub mod known_good;
pub mod manual;
pub mod mdns;
mod printer;
pub mod probe;
pub mod session;

pub use backend::{Discovery, DiscoveryHub, DiscoveryListener};
pub use capabilities::{PrinterCapabilities, PrinterState};
pub use connectivity::ConnectivityMonitor;
pub use fetcher::{CapabilityFetcher, IppCapabilityCache};
pub use ipp_client::IppClient;
pub use known_good::KnownGoodStore;
pub use manual::{ManualDiscovery, SavedPrinter};
pub use mdns::MdnsDiscovery;
pub use printer::{PrinterInfo, PrinterStatus};
pub use probe::{EndpointProber, ProbeOutcome};
pub use session::{DiscoverySession, RosterEvent};
