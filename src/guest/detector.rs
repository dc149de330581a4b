// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Guest binary encoding detection
//!
//! The OCR guest is an emscripten-built core module. This module inspects the
//! binary header with wasmparser before compilation so a component or a legacy
//! component-section module is rejected with a clear message rather than an
//! opaque compile error.

use crate::errors::{BridgeError, GUEST_UNSUPPORTED_ENCODING};

use wasmparser::{Encoding, Parser, Payload};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GuestEncoding {
    /// Classic core WASM module (version 1)
    CoreModule,
    /// Component Model binary (version 2+) or legacy component section
    Component,
}

impl GuestEncoding {
    #[inline]
    pub fn is_core_module(self) -> bool {
        matches!(self, Self::CoreModule)
    }
}

/// Detect the encoding of a WebAssembly binary by inspecting its version header
/// and custom sections.
///
/// # Errors
/// Returns an error if the input is empty, truncated, or otherwise invalid.
pub fn detect_encoding(bytes: &[u8]) -> Result<GuestEncoding, BridgeError> {
    let parser = Parser::new(0);
    let mut encoding = None;
    let mut has_component_section = false;

    for payload in parser.parse_all(bytes) {
        let payload = payload?;
        match payload {
            Payload::Version { encoding: enc, .. } => {
                encoding = Some(enc);
            }
            Payload::CustomSection(reader) if reader.name() == "component" => {
                has_component_section = true;
            }
            _ => {}
        }
    }

    let encoding =
        encoding.ok_or_else(|| BridgeError::InvalidWasmBinary("Invalid WASM binary".to_string()))?;

    match encoding {
        Encoding::Component => Ok(GuestEncoding::Component),
        Encoding::Module if has_component_section => Ok(GuestEncoding::Component),
        Encoding::Module => Ok(GuestEncoding::CoreModule),
    }
}

/// Fail unless `bytes` is a core module the bootstrap can link.
pub(crate) fn ensure_core_module(bytes: &[u8]) -> Result<(), BridgeError> {
    if detect_encoding(bytes)?.is_core_module() {
        Ok(())
    } else {
        Err(BridgeError::UnsupportedEncoding(
            GUEST_UNSUPPORTED_ENCODING.to_string(),
        ))
    }
}
