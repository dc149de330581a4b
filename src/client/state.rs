// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::BridgeError;

/// Lifecycle of the engine handle owned by one client.
///
/// ```text
///  Uninitialized ──Init ok──▶ Initialized
///        ▲                        │
///        └──language / config / tessdata prefix changed
///
///  any ──guest fault──▶ Faulted      any ──close──▶ Closed
/// ```
///
/// `Faulted` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// `Init` must run before the next recognition call.
    Uninitialized,
    /// Engine is ready; only the image needs rebinding per call.
    Initialized,
    /// A guest call trapped or corrupted memory; the instance is abandoned.
    Faulted,
    Closed,
}

impl EngineState {
    pub fn needs_init(self) -> bool {
        matches!(self, EngineState::Uninitialized)
    }

    pub fn is_initialized(self) -> bool {
        matches!(self, EngineState::Initialized)
    }

    /// Error for operations attempted in a terminal state.
    pub fn check_usable(self) -> Result<(), BridgeError> {
        match self {
            EngineState::Faulted => Err(BridgeError::Faulted),
            EngineState::Closed => Err(BridgeError::Precondition(
                "client is closed".to_string(),
            )),
            EngineState::Uninitialized | EngineState::Initialized => Ok(()),
        }
    }

    /// State after an init-time setting changed.
    pub fn invalidated(self) -> EngineState {
        match self {
            EngineState::Initialized => EngineState::Uninitialized,
            other => other,
        }
    }
}
