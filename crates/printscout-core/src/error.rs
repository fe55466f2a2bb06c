// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for printscout.

use thiserror::Error;

/// Top-level error type for all printscout operations.
#[derive(Debug, Error)]
pub enum PrintscoutError {
    // -- Discovery errors --
    #[error("printer discovery failed: {0}")]
    Discovery(String),

    #[error("IPP request failed: {0}")]
    IppRequest(String),

    #[error("invalid hostname: {0:?}")]
    InvalidHostname(String),

    #[error("invalid printer URI: {0}")]
    InvalidUri(String),

    #[error("discovery session is closed")]
    SessionClosed,

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PrintscoutError>;
