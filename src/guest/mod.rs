// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Host side of the guest OCR module boundary.
//!
//! The guest only exchanges plain integers, so everything crossing the boundary
//! goes through three layers:
//!
//! - **Bootstrap** (`runtime`): compiles the guest binary once per process and
//!   hands out fresh, isolated instances with their own linear memory and mounts.
//! - **Call bridge** (`bridge`): binds each exported function once and invokes it
//!   with `u64` arguments, escalating traps as fatal errors.
//! - **Memory marshaler** (`memory`): allocates and releases guest heap buffers,
//!   writes host bytes in and reads strings and fixed-layout records out.
//!
//! The [`Guest`] trait is the seam between those layers and the client: the
//! wasmtime-backed [`WasmGuest`] is the production implementation.
//!
//! ```text
//! GuestRuntime (process-wide) → WasmGuest (per client) → CallScope (per call)
//! ```

mod bridge;
mod detector;
mod emscripten;
mod instance;
pub mod memory;
mod runtime;

#[cfg(test)]
pub(crate) mod fake;

pub use detector::{detect_encoding, GuestEncoding};
pub use instance::WasmGuest;
pub use memory::CallScope;
pub use runtime::GuestRuntime;

#[cfg(test)]
pub(crate) use runtime::tests::{test_config, TEST_MODULE};

use crate::config::Mount;
use crate::errors::BridgeResult;

/// Value the guest uses as a null pointer besides zero.
pub const NULL_SENTINEL: u32 = 0xffff_ffff;

/// Functions exported by the guest OCR module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Export {
    Create,
    /// Destroys an engine handle (`Free`), not a heap buffer.
    FreeHandle,
    Malloc,
    /// Releases a heap buffer (`free`).
    FreeBuffer,
    Clear,
    ClearPersistentCache,
    Init,
    SetVariable,
    SetPixImage,
    SetPageSegMode,
    GetPageSegMode,
    Utf8Text,
    HocrText,
    Version,
    GetDataPath,
    CreatePixImageByFilePath,
    CreatePixImageFromBytes,
    DestroyPixImage,
    FileExists,
    GetBoundingBoxes,
    GetBoundingBoxesVerbose,
}

impl Export {
    pub const ALL: [Export; 21] = [
        Export::Create,
        Export::FreeHandle,
        Export::Malloc,
        Export::FreeBuffer,
        Export::Clear,
        Export::ClearPersistentCache,
        Export::Init,
        Export::SetVariable,
        Export::SetPixImage,
        Export::SetPageSegMode,
        Export::GetPageSegMode,
        Export::Utf8Text,
        Export::HocrText,
        Export::Version,
        Export::GetDataPath,
        Export::CreatePixImageByFilePath,
        Export::CreatePixImageFromBytes,
        Export::DestroyPixImage,
        Export::FileExists,
        Export::GetBoundingBoxes,
        Export::GetBoundingBoxesVerbose,
    ];

    /// Symbol name in the guest export section.
    pub fn symbol(self) -> &'static str {
        match self {
            Export::Create => "Create",
            Export::FreeHandle => "Free",
            Export::Malloc => "malloc",
            Export::FreeBuffer => "free",
            Export::Clear => "Clear",
            Export::ClearPersistentCache => "ClearPersistentCache",
            Export::Init => "Init",
            Export::SetVariable => "SetVariable",
            Export::SetPixImage => "SetPixImage",
            Export::SetPageSegMode => "SetPageSegMode",
            Export::GetPageSegMode => "GetPageSegMode",
            Export::Utf8Text => "UTF8Text",
            Export::HocrText => "HOCRText",
            Export::Version => "Version",
            Export::GetDataPath => "GetDataPath",
            Export::CreatePixImageByFilePath => "CreatePixImageByFilePath",
            Export::CreatePixImageFromBytes => "CreatePixImageFromBytes",
            Export::DestroyPixImage => "DestroyPixImage",
            Export::FileExists => "FileExists",
            Export::GetBoundingBoxes => "GetBoundingBoxes",
            Export::GetBoundingBoxesVerbose => "GetBoundingBoxesVerbose",
        }
    }

    /// Exports without which no instance is usable at all.
    pub fn is_required(self) -> bool {
        matches!(self, Export::Malloc | Export::FreeBuffer | Export::FileExists)
    }
}

/// Opaque reference to one recognition engine inside a guest instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineHandle(u64);

impl EngineHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Opaque reference to a decoded image living in guest memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHandle(u64);

impl ImageHandle {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// 32-bit offset into guest linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GuestPtr(u32);

impl GuestPtr {
    pub const NULL: GuestPtr = GuestPtr(0);

    /// Guest results arrive zero-extended to `u64`; wasm32 pointers occupy the low half.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw as u32)
    }

    pub fn offset(self) -> u32 {
        self.0
    }

    pub fn raw(self) -> u64 {
        u64::from(self.0)
    }

    /// Zero or the guest's all-ones sentinel.
    pub fn is_null(self) -> bool {
        self.0 == 0 || self.0 == NULL_SENTINEL
    }

    pub fn add(self, bytes: u32) -> Self {
        Self(self.0.wrapping_add(bytes))
    }
}

/// One isolated guest instance: call bridge plus linear memory.
///
/// Implementations must not be shared between clients; every method takes the
/// instance through `&mut self` or `&self` and assumes exclusive ownership.
pub trait Guest {
    /// Invoke an exported function. Traps surface as fatal [`crate::errors::BridgeError`]s.
    fn call(&mut self, export: Export, params: &[u64]) -> BridgeResult<Vec<u64>>;

    /// Current linear memory contents.
    fn memory(&self) -> &[u8];

    /// Mutable view of linear memory.
    fn memory_mut(&mut self) -> &mut [u8];

    /// File systems visible inside this instance.
    fn mounts(&self) -> &[Mount];

    /// Invoke an export and return its first result, or zero for void functions.
    fn call_one(&mut self, export: Export, params: &[u64]) -> BridgeResult<u64> {
        Ok(self.call(export, params)?.first().copied().unwrap_or(0))
    }
}
