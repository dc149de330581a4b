// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for engine handle lifecycle and recognition events.

use std::fmt::{Display, Formatter};

/// Engine handle created inside a fresh guest instance.
///
/// # Log Level
/// `debug!` - Once per client
pub struct ClientCreated {
    pub engine_handle: u64,
}

impl Display for ClientCreated {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Created OCR client with engine handle {}", self.engine_handle)
    }
}

/// Engine handle (re-)initialized.
///
/// # Log Level
/// `info!` - Full initialization is expensive and worth seeing
///
/// # Example
/// ```
/// use tessbridge::observability::messages::client::EngineInitialized;
///
/// let msg = EngineInitialized {
///     languages: "eng+deu",
///     tessdata_prefix: "/tessdata/",
///     variable_count: 2,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct EngineInitialized<'a> {
    pub languages: &'a str,
    pub tessdata_prefix: &'a str,
    pub variable_count: usize,
}

impl Display for EngineInitialized<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Initialized OCR engine: languages={}, tessdata_prefix={}, variables={}",
            self.languages, self.tessdata_prefix, self.variable_count
        )
    }
}

/// A configuration change invalidated the current initialization.
///
/// # Log Level
/// `debug!`
pub struct ReinitScheduled<'a> {
    pub reason: &'a str,
}

impl Display for ReinitScheduled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "OCR engine will re-initialize: {} changed", self.reason)
    }
}

/// New image resource loaded into guest memory.
///
/// # Log Level
/// `debug!`
pub struct ImageSet<'a> {
    pub source: &'a str,
    pub size_bytes: usize,
}

impl Display for ImageSet<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Loaded image from {} ({} bytes marshaled)",
            self.source, self.size_bytes
        )
    }
}

/// Recognition call finished.
///
/// # Log Level
/// `debug!`
pub struct RecognitionCompleted<'a> {
    pub operation: &'a str,
    pub output_size: usize,
}

impl Display for RecognitionCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Recognition '{}' completed: output_size={}",
            self.operation, self.output_size
        )
    }
}

/// Client entered the terminal faulted state.
///
/// # Log Level
/// `error!`
pub struct ClientFaulted<'a> {
    pub operation: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ClientFaulted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "OCR client faulted during '{}' and will refuse further calls: {}",
            self.operation, self.error
        )
    }
}

/// Client released its guest resources.
///
/// # Log Level
/// `debug!`
pub struct ClientClosed {
    pub faulted: bool,
}

impl Display for ClientClosed {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if self.faulted {
            write!(f, "Closed faulted OCR client without guest cleanup")
        } else {
            write!(f, "Closed OCR client")
        }
    }
}
