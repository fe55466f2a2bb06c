// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// mDNS service discovery for IPP and IPPS printers on the local network.
//
// We browse for `_ipp._tcp.local.` (plain IPP) and `_ipps._tcp.local.`
// (TLS-secured IPP) using the `mdns-sd` crate.  Resolved services become
// found events and removed services become lost events, delivered to every
// listener through a `DiscoveryHub`.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, info, warn};

use printscout_core::error::{PrintscoutError, Result};
use printscout_core::{DiscoveredPrinter, normalize_uuid};

use crate::backend::{Discovery, DiscoveryHub, DiscoveryListener};

/// mDNS service type for plain IPP.
const IPP_SERVICE: &str = "_ipp._tcp.local.";

/// mDNS service type for TLS-secured IPP.
const IPPS_SERVICE: &str = "_ipps._tcp.local.";

/// Resource path used when a service omits the `rp` TXT key.
const DEFAULT_RESOURCE_PATH: &str = "ipp/print";

/// Printer discovery backend using mDNS-SD.
///
/// Wraps an `mdns-sd` `ServiceDaemon`.  Browsing runs only while at least one
/// listener is registered.
pub struct MdnsDiscovery {
    /// The underlying mDNS daemon handle.
    daemon: ServiceDaemon,
    hub: Arc<DiscoveryHub>,
    /// Whether we are currently browsing.
    browsing: Mutex<bool>,
}

impl MdnsDiscovery {
    /// Create a new discovery backend.
    ///
    /// This spawns the mDNS daemon thread but does **not** start browsing.
    pub fn new() -> Result<Self> {
        let daemon = ServiceDaemon::new()
            .map_err(|e| PrintscoutError::Discovery(format!("failed to start mDNS daemon: {e}")))?;
        Ok(Self {
            daemon,
            hub: Arc::new(DiscoveryHub::new()),
            browsing: Mutex::new(false),
        })
    }

    /// Shut down the mDNS daemon entirely.
    pub fn shutdown(self) -> Result<()> {
        let _status_rx = self
            .daemon
            .shutdown()
            .map_err(|e| PrintscoutError::Discovery(format!("daemon shutdown: {e}")))?;
        info!("mDNS daemon shut down");
        Ok(())
    }

    /// Snapshot of printers currently advertised on the network.
    pub fn printers(&self) -> Vec<DiscoveredPrinter> {
        self.hub.printers()
    }

    fn begin_browsing(&self) -> Result<()> {
        let mut browsing = self.browsing.lock().unwrap_or_else(PoisonError::into_inner);
        if *browsing {
            return Ok(());
        }

        for (service_type, tls) in [(IPP_SERVICE, false), (IPPS_SERVICE, true)] {
            let receiver = self
                .daemon
                .browse(service_type)
                .map_err(|e| PrintscoutError::Discovery(format!("browse {service_type}: {e}")))?;
            spawn_listener(service_type, tls, receiver, Arc::clone(&self.hub))?;
        }

        *browsing = true;
        info!("mDNS printer discovery started");
        Ok(())
    }

    /// Stop browsing once `listener`, the last one, has been removed.
    fn end_browsing(&self, listener: &Arc<dyn DiscoveryListener>) {
        let mut browsing = self.browsing.lock().unwrap_or_else(PoisonError::into_inner);
        if !*browsing {
            return;
        }
        for service_type in [IPP_SERVICE, IPPS_SERVICE] {
            if let Err(e) = self.daemon.stop_browse(service_type) {
                warn!(service_type, error = %e, "failed to stop mDNS browse");
            }
        }
        *browsing = false;
        self.hub.printers_lost_to(listener);
        info!("mDNS printer discovery stopped");
    }
}

impl Discovery for MdnsDiscovery {
    fn start(&self, listener: Arc<dyn DiscoveryListener>) -> Result<()> {
        if self.hub.add_listener(listener) {
            self.begin_browsing()?;
        }
        Ok(())
    }

    fn stop(&self, listener: &Arc<dyn DiscoveryListener>) {
        if self.hub.remove_listener(listener) {
            self.end_browsing(listener);
        }
    }
}

/// Spawn a thread that drains the receiver produced by
/// `ServiceDaemon::browse` and forwards printers to the hub.
fn spawn_listener(
    service_type: &'static str,
    tls: bool,
    receiver: mdns_sd::Receiver<ServiceEvent>,
    hub: Arc<DiscoveryHub>,
) -> Result<()> {
    std::thread::Builder::new()
        .name(format!("mdns-{service_type}"))
        .spawn(move || {
            // Full service name -> printer path, to resolve removals.
            let mut paths: HashMap<String, String> = HashMap::new();

            // Blocks until the channel is closed (daemon shut down or
            // browsing stopped).
            while let Ok(event) = receiver.recv() {
                match event {
                    ServiceEvent::SearchStarted(stype) => {
                        debug!(service_type = %stype, "mDNS search started");
                    }
                    ServiceEvent::ServiceFound(stype, fullname) => {
                        debug!(service_type = %stype, name = %fullname, "service found");
                    }
                    ServiceEvent::ServiceResolved(info) => {
                        let fullname = info.get_fullname().to_owned();
                        match service_info_to_printer(&info, service_type, tls) {
                            Ok(printer) => {
                                paths.insert(fullname, printer.path.clone());
                                hub.printer_found(printer);
                            }
                            Err(e) => {
                                warn!(
                                    fullname = %fullname,
                                    error = %e,
                                    "failed to convert resolved service to printer"
                                );
                            }
                        }
                    }
                    ServiceEvent::ServiceRemoved(stype, fullname) => {
                        debug!(service_type = %stype, name = %fullname, "service removed");
                        if let Some(path) = paths.remove(&fullname) {
                            hub.printer_lost(&path);
                        }
                    }
                    ServiceEvent::SearchStopped(stype) => {
                        debug!(service_type = %stype, "mDNS search stopped");
                        break;
                    }
                }
            }
        })
        .map(|_| ())
        .map_err(|e| PrintscoutError::Discovery(format!("spawn mDNS listener: {e}")))
}

/// Convert a resolved `ServiceInfo` into a `DiscoveredPrinter`.
///
/// TXT record keys (case-insensitive) used here:
///   - `rp`  : resource path (e.g. "ipp/print")
///   - `UUID`: printer uuid, bare form
///   - `ty`  : human-readable make/model, used when the instance name is empty
///   - `note`: physical location
fn service_info_to_printer(
    info: &ServiceInfo,
    service_type: &str,
    tls: bool,
) -> Result<DiscoveredPrinter> {
    let fullname = info.get_fullname();

    // Prefer IPv4 for wider printer compatibility.
    let ip: IpAddr = info
        .get_addresses()
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| info.get_addresses().iter().next())
        .copied()
        .ok_or_else(|| PrintscoutError::Discovery(format!("no address for service {fullname}")))?;

    let resource_path = info
        .get_property_val_str("rp")
        .unwrap_or(DEFAULT_RESOURCE_PATH);
    let path = printer_uri(tls, ip, info.get_port(), resource_path);

    let name = match instance_name(fullname, service_type) {
        name if !name.is_empty() => name.to_owned(),
        _ => info
            .get_property_val_str("ty")
            .map(String::from)
            .unwrap_or_else(|| ip.to_string()),
    };

    let uuid = info.get_property_val_str("UUID").and_then(normalize_uuid);
    let location = info.get_property_val_str("note").map(String::from);

    Ok(DiscoveredPrinter::new(uuid, name, path, location))
}

/// Build the IPP URI for a resolved service.
fn printer_uri(tls: bool, ip: IpAddr, port: u16, resource_path: &str) -> String {
    let scheme = if tls { "ipps" } else { "ipp" };
    let host = match ip {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    };
    format!(
        "{scheme}://{host}:{port}/{}",
        resource_path.trim_start_matches('/')
    )
}

/// The service instance label, e.g. "Office" from
/// "Office._ipp._tcp.local.".
fn instance_name<'a>(fullname: &'a str, service_type: &str) -> &'a str {
    fullname
        .strip_suffix(service_type)
        .map(|n| n.trim_end_matches('.'))
        .unwrap_or(fullname)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn instance_name_strips_service_type() {
        assert_eq!(
            instance_name("Office Laser._ipp._tcp.local.", IPP_SERVICE),
            "Office Laser"
        );
        assert_eq!(instance_name("odd-name", IPP_SERVICE), "odd-name");
    }

    #[test]
    fn printer_uri_per_scheme_and_family() {
        assert_eq!(
            printer_uri(false, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), 631, "ipp/print"),
            "ipp://10.0.0.5:631/ipp/print"
        );
        assert_eq!(
            printer_uri(true, IpAddr::V6(Ipv6Addr::LOCALHOST), 443, "/ipp/secure"),
            "ipps://[::1]:443/ipp/secure"
        );
        assert_eq!(
            printer_uri(false, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), 631, ""),
            "ipp://10.0.0.5:631/"
        );
    }
}
