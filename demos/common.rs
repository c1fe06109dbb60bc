//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    /// TV address (first positional argument).
    pub address: Option<String>,
    /// Message for demos that display text.
    pub message: Option<String>,
    /// Enable debug logging (`--debug`).
    pub debug: bool,
    /// Keep pairing keys in a temporary directory (`--ephemeral`).
    pub ephemeral: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        let mut positional = args.iter().filter(|a| !a.starts_with("--")).cloned();

        Self {
            address: positional.next(),
            message: positional.next(),
            debug: args.iter().any(|a| a == "--debug"),
            ephemeral: args.iter().any(|a| a == "--ephemeral"),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "webos_client=debug"
    } else {
        "webos_client=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();
}
