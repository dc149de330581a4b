// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod client;     // OCR client + engine lifecycle
pub mod config;     // runtime config + mount table
pub mod errors;     // error handling
pub mod guest;      // wasm runtime, call bridge, memory marshaling
pub mod observability;

pub use client::{
    available_languages, version, BoundingBox, Client, EngineState, PageIteratorLevel,
    PageSegMode, Rect, Variable,
};
pub use config::RuntimeConfig;
pub use errors::{BridgeError, BridgeResult};
pub use guest::{Guest, GuestRuntime, WasmGuest};
