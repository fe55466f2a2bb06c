// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types shared by discovery backends and sessions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix shared by `ipp://` and `ipps://` URIs.
const NETWORK_ID_PREFIX: &str = "ipp";

/// Stable key for one printer within a discovery session.
///
/// The local id is the printer's `urn:uuid:` URI when it advertises one, and
/// its network path otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrinterId(String);

impl PrinterId {
    pub fn new(local_id: impl Into<String>) -> Self {
        Self(local_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id is a network address rather than a globally unique
    /// uuid. Network ids may be reused by a different device later.
    pub fn is_network_address(&self) -> bool {
        self.0.starts_with(NETWORK_ID_PREFIX)
    }
}

impl std::fmt::Display for PrinterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A printer as reported by a discovery backend or resolved by probing.
///
/// Values are never mutated in place; a new one is built whenever identity
/// information changes (for example after a probe resolves the real name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredPrinter {
    /// Stable unique identifier, e.g. `urn:uuid:...`.
    pub uuid: Option<String>,
    /// Display name.
    pub name: String,
    /// Connection URI (scheme, host, port, and resource path).
    pub path: String,
    /// Physical location hint.
    pub location: Option<String>,
}

impl DiscoveredPrinter {
    pub fn new(
        uuid: Option<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        location: Option<String>,
    ) -> Self {
        Self {
            uuid: uuid.filter(|u| !u.is_empty()),
            name: name.into(),
            path: path.into(),
            location: location.filter(|l| !l.is_empty()),
        }
    }

    /// The most stable URI known for this printer: its uuid if present,
    /// otherwise its network path.
    pub fn uri(&self) -> &str {
        self.uuid.as_deref().unwrap_or(&self.path)
    }

    /// Session key for this printer.
    pub fn id(&self) -> PrinterId {
        PrinterId::new(self.uri())
    }
}

impl std::fmt::Display for DiscoveredPrinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <{}>", self.name, self.path)?;
        if let Some(uuid) = &self.uuid {
            write!(f, " {uuid}")?;
        }
        Ok(())
    }
}

/// Normalise a uuid as reported by a printer (bare, braced, or `urn:uuid:`
/// prefixed) into canonical `urn:uuid:` form.
///
/// Returns `None` for empty or malformed values.
pub fn normalize_uuid(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let bare = trimmed
        .strip_prefix("urn:uuid:")
        .or_else(|| trimmed.strip_prefix("URN:UUID:"))
        .unwrap_or(trimmed);
    let parsed = Uuid::parse_str(bare).ok()?;
    Some(parsed.urn().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_prefers_uuid() {
        let printer = DiscoveredPrinter::new(
            Some("urn:uuid:4509a320-00a0-008f-00b6-002507510eca".into()),
            "Office",
            "ipp://10.0.0.5:631/ipp/print",
            None,
        );
        assert_eq!(
            printer.id().as_str(),
            "urn:uuid:4509a320-00a0-008f-00b6-002507510eca"
        );
        assert!(!printer.id().is_network_address());
    }

    #[test]
    fn id_falls_back_to_path() {
        let printer = DiscoveredPrinter::new(None, "Office", "ipps://10.0.0.5:443/ipp/print", None);
        assert_eq!(printer.id().as_str(), "ipps://10.0.0.5:443/ipp/print");
        assert!(printer.id().is_network_address());
    }

    #[test]
    fn empty_optional_fields_become_none() {
        let printer = DiscoveredPrinter::new(Some(String::new()), "x", "ipp://h:631/", Some(String::new()));
        assert!(printer.uuid.is_none());
        assert!(printer.location.is_none());
    }

    #[test]
    fn normalize_uuid_variants() {
        let expected = "urn:uuid:4509a320-00a0-008f-00b6-002507510eca";
        assert_eq!(
            normalize_uuid("4509a320-00a0-008f-00b6-002507510eca").as_deref(),
            Some(expected)
        );
        assert_eq!(
            normalize_uuid("urn:uuid:4509A320-00A0-008F-00B6-002507510ECA").as_deref(),
            Some(expected)
        );
        assert!(normalize_uuid("").is_none());
        assert!(normalize_uuid("not-a-uuid").is_none());
    }
}
