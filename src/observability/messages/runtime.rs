// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for guest runtime bootstrap and call-bridge events.
//!
//! This module contains message types for logging events related to:
//! * Guest binary loading and compilation
//! * Per-client module instantiation
//! * Guest call faults and buffer release failures

use std::fmt::{Display, Formatter};

/// Guest binary read from disk.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use tessbridge::observability::messages::runtime::ModuleLoaded;
///
/// let msg = ModuleLoaded {
///     module_path: "tesseract-core.wasm",
///     size_bytes: 4096,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ModuleLoaded<'a> {
    pub module_path: &'a str,
    pub size_bytes: usize,
}

impl Display for ModuleLoaded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Loaded guest module: {} ({} bytes)",
            self.module_path, self.size_bytes
        )
    }
}

/// Guest binary could not be loaded.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct ModuleLoadFailed<'a> {
    pub module_path: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for ModuleLoadFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to load guest module '{}': {}",
            self.module_path, self.error
        )
    }
}

/// Guest module compiled and cached for the life of the process.
///
/// # Log Level
/// `info!` - Happens once per process
///
/// # Example
/// ```
/// use tessbridge::observability::messages::runtime::ModuleCompiled;
///
/// let msg = ModuleCompiled {
///     module_path: "tesseract-core.wasm",
///     elapsed_ms: 850,
///     import_count: 42,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ModuleCompiled<'a> {
    pub module_path: &'a str,
    pub elapsed_ms: u128,
    pub import_count: usize,
}

impl Display for ModuleCompiled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Compiled guest module '{}' in {}ms ({} imports linked)",
            self.module_path, self.elapsed_ms, self.import_count
        )
    }
}

/// Fresh isolated guest instance created for a client.
///
/// # Log Level
/// `debug!` - Once per client
pub struct InstanceCreated {
    pub mount_count: usize,
}

impl Display for InstanceCreated {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Instantiated guest module with {} mounted file systems",
            self.mount_count
        )
    }
}

/// A guest function trapped or was called with the wrong arity.
///
/// # Log Level
/// `error!` - The instance is no longer usable
pub struct GuestCallFailed<'a> {
    pub function: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for GuestCallFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Guest call '{}' failed: {}", self.function, self.error)
    }
}

/// A call-scoped guest buffer could not be returned to the guest allocator.
///
/// # Log Level
/// `error!` - Raised from a drop guard, so it cannot be propagated
pub struct BufferReleaseFailed<'a> {
    pub ptr: u32,
    pub error: &'a dyn std::error::Error,
}

impl Display for BufferReleaseFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Failed to release guest buffer at 0x{:08x}: {}",
            self.ptr, self.error
        )
    }
}
