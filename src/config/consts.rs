// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Guest path where the default language data directory is mounted
pub const TESSDATA_MOUNT: &str = "/tessdata/";
/// Guest path where a caller-supplied directory is mounted
pub const CUSTOM_MOUNT: &str = "/custom/";
/// File extension of trained language data
pub const TRAINEDDATA_EXTENSION: &str = "traineddata";
/// Language used when none is configured
pub const DEFAULT_LANGUAGE: &str = "eng";
/// Separator the guest `Init` expects between languages
pub const LANGUAGE_SEPARATOR: &str = "+";

/// Default guest binary location, relative to the working directory
pub const DEFAULT_MODULE_PATH: &str = "tesseract-core.wasm";
/// Default host directory backing [`TESSDATA_MOUNT`]
pub const DEFAULT_TESSDATA_DIR: &str = "tessdata";
/// Maximum accepted guest binary size (64 MiB)
pub const DEFAULT_MAX_MODULE_SIZE: usize = 64 * 1024 * 1024;

/// Names the YAML configuration file
pub const ENV_CONFIG: &str = "TESSBRIDGE_CONFIG";
/// Overrides `module_path`
pub const ENV_MODULE: &str = "TESSBRIDGE_MODULE";
/// Overrides `tessdata_dir`
pub const ENV_TESSDATA: &str = "TESSBRIDGE_TESSDATA";
