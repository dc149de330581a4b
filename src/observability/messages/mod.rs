// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! # Usage Pattern
//!
//! ```rust
//! use tessbridge::observability::messages::runtime::InstanceCreated;
//!
//! let msg = InstanceCreated {
//!     mount_count: 3,
//! };
//!
//! tracing::debug!("{}", msg);
//! ```

pub mod client;
pub mod runtime;
