// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Error types for the host-guest OCR bridge.
//!
//! Errors fall into four groups:
//! - **Caller input**: bad paths, empty buffers, empty language lists. State is unchanged.
//! - **Preconditions**: recognition requested before an image was set.
//! - **Engine rejection**: the guest engine refused `Init` or `SetVariable`.
//! - **Guest faults**: traps, arity mismatches, corrupted guest memory. These are
//!   fatal for the module instance; see [`BridgeError::is_fatal`].
//! - **Missing exports**: the guest build lacks a function. No guest code ran, so
//!   the instance stays usable.

use std::path::PathBuf;
use thiserror::Error;

/// Error message for component-model binaries handed to the bootstrap.
pub const GUEST_UNSUPPORTED_ENCODING: &str =
    "Unsupported guest binary: Component Model detected. The OCR guest must be a classic core WASM module.";

#[derive(Error, Debug)]
pub enum BridgeError {
    /// Caller supplied an empty or otherwise unusable value.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Caller supplied a path that could not be inspected.
    #[error("Cannot detect the stat of '{}': {source}", path.display())]
    InvalidPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An operation was attempted before the client was ready for it.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Guest `Init` returned a non-zero status.
    #[error("Failed to initialize the OCR engine (status {code})")]
    InitFailed { code: u64 },

    /// Guest `SetVariable` refused a key/value pair.
    #[error("Failed to set variable '{key}' to '{value}'")]
    VariableRejected { key: String, value: String },

    /// A guest function trapped. The instance is no longer trustworthy.
    #[error("Guest function '{function}' faulted: {message}")]
    GuestFault { function: String, message: String },

    /// Host passed a different number of arguments than the guest declares.
    #[error("Guest function '{function}' expects {expected} arguments, got {actual}")]
    ArityMismatch {
        function: String,
        expected: usize,
        actual: usize,
    },

    /// The guest module does not export a function the bridge needs.
    #[error("Guest module does not export '{0}'")]
    MissingExport(String),

    /// Out-of-bounds access or unterminated string in guest memory.
    #[error("Guest memory fault: {0}")]
    MemoryFault(String),

    /// The client already faulted and refuses further guest calls.
    #[error("Client is unusable after an earlier guest fault")]
    Faulted,

    /// Module compilation or instantiation error.
    #[error("Guest module error: {0}")]
    ModuleError(String),

    /// Invalid or malformed WASM binary.
    #[error("Invalid WASM binary: {0}")]
    InvalidWasmBinary(String),

    /// Guest binary uses an encoding the bridge cannot host.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// WASM binary parsing error from wasmparser.
    #[error("WASM parser error: {0}")]
    ParserError(#[from] wasmparser::BinaryReaderError),

    /// File I/O error outside caller path validation.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed YAML configuration.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] serde_yaml::Error),
}

impl BridgeError {
    /// Whether the error leaves the guest instance in an undefined state.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::GuestFault { .. }
                | BridgeError::ArityMismatch { .. }
                | BridgeError::MemoryFault(_)
                | BridgeError::Faulted
        )
    }
}

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
