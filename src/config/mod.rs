// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
pub mod consts;

pub use loader::{Mount, RuntimeConfig};
pub(crate) use loader::{host_path_for, is_virtual_path};
