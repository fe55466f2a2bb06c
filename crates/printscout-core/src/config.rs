// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Discovery configuration and cache directory resolution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Name of the per-user cache subdirectory.
const CACHE_SUBDIR: &str = "printscout";

/// One candidate location at which an IPP service may be listening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointTemplate {
    pub scheme: String,
    pub port: u16,
    pub path: String,
}

impl EndpointTemplate {
    pub fn new(scheme: impl Into<String>, port: u16, path: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            port,
            path: path.into(),
        }
    }

    /// Build a concrete URI for `host` from this template.
    ///
    /// IPv6 literals are bracketed so that the port separator stays
    /// unambiguous.
    pub fn uri_for(&self, host: &str) -> String {
        let host = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_owned()
        };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{}://{}:{}{}", self.scheme, host, self.port, path)
    }
}

/// Paths at which a print service is most likely to be found, in the order
/// they are probed.
pub fn default_endpoint_templates() -> Vec<EndpointTemplate> {
    vec![
        EndpointTemplate::new("ipp", 631, "/ipp/print"),
        EndpointTemplate::new("ipp", 80, "/ipp/print"),
        EndpointTemplate::new("ipp", 631, "/ipp/printer"),
        EndpointTemplate::new("ipp", 631, "/ipp"),
        EndpointTemplate::new("ipp", 631, "/"),
    ]
}

/// Settings for discovery sessions and manual probing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Printers not seen for this long are removed from the roster.
    pub expiration_millis: u64,
    /// Maximum number of known-good printer ids kept across sessions.
    pub known_good_capacity: usize,
    /// Upper bound on a single capability request.
    pub probe_timeout_secs: u64,
    /// How often the connectivity monitor re-checks the network.
    pub connectivity_poll_secs: u64,
    /// Candidate endpoints tried when a printer is added by hostname.
    pub endpoint_templates: Vec<EndpointTemplate>,
    /// Where the known-good list and saved printers live. `None` resolves to
    /// the per-user cache directory.
    pub cache_dir: Option<PathBuf>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            expiration_millis: 3000,
            known_good_capacity: 50,
            probe_timeout_secs: 15,
            connectivity_poll_secs: 10,
            endpoint_templates: default_endpoint_templates(),
            cache_dir: None,
        }
    }
}

impl DiscoveryConfig {
    /// Load settings from a JSON file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        debug!(path = %path.as_ref().display(), "loaded discovery config");
        Ok(config)
    }

    /// Write settings as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    pub fn expiration(&self) -> Duration {
        Duration::from_millis(self.expiration_millis)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn connectivity_poll(&self) -> Duration {
        Duration::from_secs(self.connectivity_poll_secs.max(1))
    }

    /// The configured cache directory, or the per-user default.
    ///
    /// The directory is created if needed; failure to create it is left for
    /// the eventual reader or writer to report.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        let dir = self
            .cache_dir
            .clone()
            .unwrap_or_else(|| cache_base().join(CACHE_SUBDIR));
        std::fs::create_dir_all(&dir).ok();
        dir
    }
}

fn cache_base() -> PathBuf {
    // Try XDG cache dir, then fallback to home
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".cache");
    }
    // Last resort
    PathBuf::from("/tmp")
}
