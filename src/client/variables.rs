// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Enumerated engine settings accepted by the client.

use crate::errors::BridgeError;
use std::fmt;
use std::str::FromStr;

/// Engine tuning keys that may be set through [`super::Client::set_variable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variable {
    /// Where the engine writes its debug output
    DebugFile,
    /// Only these characters may appear in results
    CharWhitelist,
    /// These characters never appear in results
    CharBlacklist,
    PreserveInterwordSpaces,
    UserDefinedDpi,
    DoInvert,
}

impl Variable {
    pub const ALL: [Variable; 6] = [
        Variable::DebugFile,
        Variable::CharWhitelist,
        Variable::CharBlacklist,
        Variable::PreserveInterwordSpaces,
        Variable::UserDefinedDpi,
        Variable::DoInvert,
    ];

    /// Key name as the engine knows it.
    pub fn as_str(self) -> &'static str {
        match self {
            Variable::DebugFile => "debug_file",
            Variable::CharWhitelist => "tessedit_char_whitelist",
            Variable::CharBlacklist => "tessedit_char_blacklist",
            Variable::PreserveInterwordSpaces => "preserve_interword_spaces",
            Variable::UserDefinedDpi => "user_defined_dpi",
            Variable::DoInvert => "tessedit_do_invert",
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variable {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variable::ALL
            .into_iter()
            .find(|variable| variable.as_str() == s)
            .ok_or_else(|| BridgeError::InvalidInput(format!("unknown engine variable '{}'", s)))
    }
}

/// Page segmentation mode: how the engine analyzes the layout of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PageSegMode {
    /// Orientation and script detection only
    OsdOnly = 0,
    AutoOsd = 1,
    /// Automatic segmentation without OSD or OCR
    AutoOnly = 2,
    /// Fully automatic segmentation without OSD (engine default)
    Auto = 3,
    SingleColumn = 4,
    SingleBlockVertText = 5,
    SingleBlock = 6,
    SingleLine = 7,
    SingleWord = 8,
    CircleWord = 9,
    SingleChar = 10,
    SparseText = 11,
    SparseTextOsd = 12,
    /// Treat the image as a single text line, bypassing engine-specific hacks
    RawLine = 13,
}

impl PageSegMode {
    pub fn raw(self) -> u64 {
        self as u64
    }
}

impl TryFrom<u64> for PageSegMode {
    type Error = BridgeError;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        let mode = match raw {
            0 => PageSegMode::OsdOnly,
            1 => PageSegMode::AutoOsd,
            2 => PageSegMode::AutoOnly,
            3 => PageSegMode::Auto,
            4 => PageSegMode::SingleColumn,
            5 => PageSegMode::SingleBlockVertText,
            6 => PageSegMode::SingleBlock,
            7 => PageSegMode::SingleLine,
            8 => PageSegMode::SingleWord,
            9 => PageSegMode::CircleWord,
            10 => PageSegMode::SingleChar,
            11 => PageSegMode::SparseText,
            12 => PageSegMode::SparseTextOsd,
            13 => PageSegMode::RawLine,
            other => {
                return Err(BridgeError::ModuleError(format!(
                    "guest reported unknown page segmentation mode {}",
                    other
                )))
            }
        };
        Ok(mode)
    }
}

/// Granularity of bounding-box results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PageIteratorLevel {
    Block = 0,
    Para = 1,
    TextLine = 2,
    Word = 3,
    Symbol = 4,
}

impl PageIteratorLevel {
    pub fn raw(self) -> u64 {
        self as u64
    }
}
