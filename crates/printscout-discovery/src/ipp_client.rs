// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Async IPP client used to query printers during discovery.
//
// Only Get-Printer-Attributes (RFC 8011 §4.2.5) is needed here: it is how a
// candidate endpoint proves that it speaks IPP and how capabilities and the
// canonical printer identity are obtained.

use std::collections::HashMap;

use ipp::prelude::*;
use tracing::{debug, instrument, warn};

use printscout_core::error::{PrintscoutError, Result};

/// Attributes returned by a Get-Printer-Attributes response.
///
/// This is a flattened map of attribute-name to a human-readable string value.
pub type PrinterAttributes = HashMap<String, String>;

/// Async IPP client wrapping the `ipp` crate.
///
/// Each instance is bound to a single printer URI.  All methods are async and
/// require a Tokio runtime.
pub struct IppClient {
    /// The target printer URI (ipp:// or ipps://).
    uri: Uri,
}

impl IppClient {
    /// Create a new client targeting the given printer URI.
    pub fn new(uri: &str) -> Result<Self> {
        let parsed: Uri = uri
            .parse()
            .map_err(|e| PrintscoutError::InvalidUri(format!("'{uri}': {e}")))?;
        Ok(Self { uri: parsed })
    }

    /// Return the printer URI this client is targeting.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Query the printer for its capabilities and current state.
    ///
    /// Sends a Get-Printer-Attributes operation and returns the response as a
    /// flat map of attribute names to their string representations.
    #[instrument(skip(self), fields(uri = %self.uri))]
    pub async fn get_printer_attributes(&self) -> Result<PrinterAttributes> {
        let operation = IppOperationBuilder::get_printer_attributes(self.uri.clone()).build();
        let client = AsyncIppClient::new(self.uri.clone());

        debug!("sending Get-Printer-Attributes");
        let response = client
            .send(operation)
            .await
            .map_err(|e| PrintscoutError::IppRequest(format!("Get-Printer-Attributes: {e}")))?;

        if !response.header().status_code().is_success() {
            let code = response.header().status_code();
            warn!(status = ?code, "Get-Printer-Attributes failed");
            return Err(PrintscoutError::IppRequest(format!(
                "Get-Printer-Attributes returned status {code:?}"
            )));
        }

        let attrs = flatten_attributes(response.attributes());
        debug!(count = attrs.len(), "received printer attributes");
        Ok(attrs)
    }
}

/// Host component of a printer URI, without brackets or port.
pub fn uri_host(uri: &str) -> Option<String> {
    let parsed: Uri = uri.parse().ok()?;
    let host = parsed.host()?;
    Some(host.trim_start_matches('[').trim_end_matches(']').to_owned())
}

/// Flatten all attribute groups in an IPP response into a single map.
///
/// Multi-valued attributes are joined with `", "`.  Group-level context is
/// discarded in favour of a simpler lookup interface.
fn flatten_attributes(attrs: &IppAttributes) -> PrinterAttributes {
    let mut map = HashMap::new();
    for group in attrs.groups() {
        for (name, attr) in group.attributes() {
            map.insert(name.clone(), format!("{}", attr.value()));
        }
    }
    map
}
