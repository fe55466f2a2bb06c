// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Printer capability snapshots.
//
// Built from a Get-Printer-Attributes response.  A snapshot answers three
// questions for discovery: can we print to this device at all, who is it
// (name, uuid, location), and is it currently healthy.

use std::collections::HashSet;

use tracing::debug;

use crate::ipp_client::PrinterAttributes;

/// Document formats we are able to produce for a printer.
const PRINTABLE_FORMATS: &[&str] = &[
    "application/pdf",
    "image/pwg-raster",
    "image/urf",
    "image/jpeg",
];

/// IPP `printer-state` (RFC 8011 §5.4.11).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrinterState {
    Idle,
    Processing,
    Stopped,
    #[default]
    Unknown,
}

impl PrinterState {
    /// Parse either the enum value (`3`, `4`, `5`) or its keyword.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "3" | "idle" => Self::Idle,
            "4" | "processing" => Self::Processing,
            "5" | "stopped" => Self::Stopped,
            _ => Self::Unknown,
        }
    }
}

/// Capability snapshot obtained from one successful printer query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PrinterCapabilities {
    /// Whether we can print to this device.
    pub is_supported: bool,
    /// Printer-reported name; may be empty.
    pub name: String,
    /// Printer-reported `urn:uuid:` identifier; may be empty.
    pub uuid: String,
    pub location: Option<String>,
    pub make_and_model: Option<String>,
    pub state: PrinterState,
    /// `printer-state-reasons` keywords, excluding `none`.
    pub state_reasons: Vec<String>,
    pub document_formats_supported: HashSet<String>,
    pub color_supported: bool,
    pub duplex_supported: bool,
}

impl PrinterCapabilities {
    /// Parse capabilities from raw IPP printer attributes.
    pub fn from_attributes(attrs: &PrinterAttributes) -> Self {
        let document_formats_supported = parse_set(attrs.get("document-format-supported"));
        let sides_supported = parse_set(attrs.get("sides-supported"));

        // Unknown format support is treated as printable; a printer that
        // answered Get-Printer-Attributes at all very likely accepts PDF.
        let is_supported = document_formats_supported.is_empty()
            || PRINTABLE_FORMATS
                .iter()
                .any(|f| document_formats_supported.contains(*f));

        let name = non_empty(attrs.get("printer-name"))
            .or_else(|| non_empty(attrs.get("printer-info")))
            .unwrap_or_default();

        let state_reasons = attrs
            .get("printer-state-reasons")
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty() && s != "none")
                    .collect()
            })
            .unwrap_or_default();

        let caps = Self {
            is_supported,
            name,
            uuid: non_empty(attrs.get("printer-uuid")).unwrap_or_default(),
            location: non_empty(attrs.get("printer-location")),
            make_and_model: non_empty(attrs.get("printer-make-and-model")),
            state: attrs
                .get("printer-state")
                .map(|v| PrinterState::parse(v))
                .unwrap_or_default(),
            state_reasons,
            color_supported: attrs
                .get("color-supported")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            duplex_supported: sides_supported.iter().any(|s| s.starts_with("two-sided")),
            document_formats_supported,
        };
        debug!(
            name = %caps.name,
            supported = caps.is_supported,
            state = ?caps.state,
            "parsed printer capabilities"
        );
        caps
    }

    /// Whether the printer reports a condition that prevents printing.
    pub fn is_error(&self) -> bool {
        self.state == PrinterState::Stopped
            || self.state_reasons.iter().any(|r| r.ends_with("-error"))
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

/// Parse a comma-separated or multi-valued IPP attribute into a HashSet.
fn parse_set(value: Option<&String>) -> HashSet<String> {
    match value {
        Some(v) => v
            .split([',', ';'])
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => HashSet::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn office_attrs() -> PrinterAttributes {
        let mut attrs = HashMap::new();
        attrs.insert("printer-name".into(), "Office".into());
        attrs.insert(
            "printer-uuid".into(),
            "urn:uuid:4509a320-00a0-008f-00b6-002507510eca".into(),
        );
        attrs.insert("printer-location".into(), "2nd floor".into());
        attrs.insert("printer-state".into(), "3".into());
        attrs.insert("printer-state-reasons".into(), "none".into());
        attrs.insert(
            "document-format-supported".into(),
            "application/octet-stream, application/pdf, image/jpeg".into(),
        );
        attrs.insert(
            "sides-supported".into(),
            "one-sided, two-sided-long-edge".into(),
        );
        attrs.insert("color-supported".into(), "true".into());
        attrs
    }

    #[test]
    fn parses_identity_and_state() {
        let caps = PrinterCapabilities::from_attributes(&office_attrs());
        assert!(caps.is_supported);
        assert_eq!(caps.name, "Office");
        assert_eq!(caps.uuid, "urn:uuid:4509a320-00a0-008f-00b6-002507510eca");
        assert_eq!(caps.location.as_deref(), Some("2nd floor"));
        assert_eq!(caps.state, PrinterState::Idle);
        assert!(caps.state_reasons.is_empty());
        assert!(caps.color_supported);
        assert!(caps.duplex_supported);
        assert!(!caps.is_error());
    }

    #[test]
    fn postscript_only_printer_is_unsupported() {
        let mut attrs = HashMap::new();
        attrs.insert(
            "document-format-supported".into(),
            "application/postscript, application/vnd.hp-pcl".into(),
        );
        let caps = PrinterCapabilities::from_attributes(&attrs);
        assert!(!caps.is_supported);
    }

    #[test]
    fn missing_name_falls_back_to_info() {
        let mut attrs = HashMap::new();
        attrs.insert("printer-name".into(), "  ".into());
        attrs.insert("printer-info".into(), "Lobby".into());
        let caps = PrinterCapabilities::from_attributes(&attrs);
        assert_eq!(caps.name, "Lobby");
        assert!(caps.uuid.is_empty());
    }

    #[test]
    fn stopped_or_error_reason_is_error() {
        let mut attrs = HashMap::new();
        attrs.insert("printer-state".into(), "stopped".into());
        assert!(PrinterCapabilities::from_attributes(&attrs).is_error());

        let mut attrs = HashMap::new();
        attrs.insert("printer-state".into(), "4".into());
        attrs.insert(
            "printer-state-reasons".into(),
            "media-empty-error, toner-low-report".into(),
        );
        let caps = PrinterCapabilities::from_attributes(&attrs);
        assert_eq!(caps.state, PrinterState::Processing);
        assert!(caps.is_error());
    }
}
