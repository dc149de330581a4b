// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging.
//!
//! Message types follow a struct-based pattern with `Display` implementations so
//! log text lives in one place instead of being scattered as format strings.
//!
//! * `messages::runtime` - guest module compilation, instantiation and calls
//! * `messages::client` - engine handle lifecycle and recognition events
//!
//! # Usage
//!
//! ```rust
//! use tessbridge::observability::messages::client::ImageSet;
//!
//! let msg = ImageSet {
//!     source: "bytes",
//!     size_bytes: 2048,
//! };
//!
//! tracing::info!("{}", msg);
//! ```

pub mod messages;

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
