// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Process-wide guest runtime bootstrap.
//!
//! The guest binary is compiled once per process. Compilation produces an
//! `InstancePre` with every import (WASI preview 1, emscripten `env`, traps for
//! the rest) already resolved, so acquiring a client only needs a new store and
//! an instantiation. The compiled runtime is never torn down; it is read-only
//! after construction and shared by every client through an `Arc`.
//!
//! ## Responsibilities
//! - Load and size-check the guest binary, reject non-core encodings
//! - Create the wasmtime engine and link imports once
//! - Instantiate isolated guests with their own memory and mounted file systems

use super::detector::ensure_core_module;
use super::emscripten;
use super::instance::{GuestState, WasmGuest};
use crate::config::consts::CUSTOM_MOUNT;
use crate::config::RuntimeConfig;
use crate::errors::{BridgeError, BridgeResult};
use crate::observability::messages::runtime::{
    InstanceCreated, ModuleCompiled, ModuleLoadFailed, ModuleLoaded,
};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;
use wasmtime::{Config, Engine, InstancePre, Linker, Module, Store};
use wasmtime_wasi::{DirPerms, FilePerms, WasiCtxBuilder};

static RUNTIME: OnceLock<Arc<GuestRuntime>> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Compiled guest module plus everything needed to stamp out instances.
pub struct GuestRuntime {
    engine: Engine,
    pre: InstancePre<GuestState>,
    config: RuntimeConfig,
    module_path: String,
}

impl GuestRuntime {
    /// The process-wide runtime, compiled on first use from [`RuntimeConfig::from_env`].
    pub fn global() -> BridgeResult<Arc<GuestRuntime>> {
        if let Some(runtime) = RUNTIME.get() {
            return Ok(Arc::clone(runtime));
        }
        Self::initialize_global(None)
    }

    /// Compile the process-wide runtime with an explicit configuration.
    ///
    /// Has no effect once a runtime exists; the existing one is returned.
    pub fn install(config: RuntimeConfig) -> BridgeResult<Arc<GuestRuntime>> {
        if let Some(runtime) = RUNTIME.get() {
            if runtime.config != config {
                tracing::warn!(
                    "Guest runtime already compiled from '{}'; ignoring new configuration",
                    runtime.module_path
                );
            }
            return Ok(Arc::clone(runtime));
        }
        Self::initialize_global(Some(config))
    }

    fn initialize_global(config: Option<RuntimeConfig>) -> BridgeResult<Arc<GuestRuntime>> {
        let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        // Another thread may have finished compiling while we waited for the lock
        if let Some(runtime) = RUNTIME.get() {
            return Ok(Arc::clone(runtime));
        }
        let config = match config {
            Some(config) => config,
            None => RuntimeConfig::from_env()?,
        };
        let runtime = Arc::new(Self::new(config)?);
        let _ = RUNTIME.set(Arc::clone(&runtime));
        Ok(runtime)
    }

    /// Load the guest binary named by `config.module_path` and compile it.
    pub fn new(config: RuntimeConfig) -> BridgeResult<Self> {
        let bytes = load_module_bytes(&config.module_path, config.max_module_size)?;
        let module_path = config.module_path.display().to_string();
        Self::compile(&bytes, config, module_path)
    }

    /// Compile an in-memory guest binary.
    pub fn from_bytes(bytes: &[u8], config: RuntimeConfig) -> BridgeResult<Self> {
        Self::compile(bytes, config, "<memory>".to_string())
    }

    fn compile(bytes: &[u8], config: RuntimeConfig, module_path: String) -> BridgeResult<Self> {
        ensure_core_module(bytes)?;
        let engine = create_engine(&config)?;

        let started = Instant::now();
        let module = Module::new(&engine, bytes).map_err(|e| BridgeError::ModuleError(e.to_string()))?;

        let mut linker: Linker<GuestState> = Linker::new(&engine);
        wasmtime_wasi::p1::add_to_linker_sync(&mut linker, |state| &mut state.wasi)
            .map_err(|e| BridgeError::ModuleError(format!("Failed to add WASI to linker: {}", e)))?;
        emscripten::link_imports(&mut linker, &module)
            .map_err(|e| BridgeError::ModuleError(format!("Failed to link emscripten imports: {}", e)))?;
        linker
            .define_unknown_imports_as_traps(&module)
            .map_err(|e| BridgeError::ModuleError(e.to_string()))?;
        let pre = linker
            .instantiate_pre(&module)
            .map_err(|e| BridgeError::ModuleError(e.to_string()))?;

        tracing::info!(
            "{}",
            ModuleCompiled {
                module_path: &module_path,
                elapsed_ms: started.elapsed().as_millis(),
                import_count: module.imports().len(),
            }
        );

        Ok(Self {
            engine,
            pre,
            config,
            module_path,
        })
    }

    /// Create a fresh isolated guest instance.
    ///
    /// `custom` is mounted at `/custom/` and must be an existing directory. A
    /// missing default language-data directory is skipped with a warning.
    pub fn instantiate(&self, custom: Option<&Path>) -> BridgeResult<WasmGuest> {
        if let Some(dir) = custom {
            let metadata = std::fs::metadata(dir).map_err(|source| BridgeError::InvalidPath {
                path: dir.to_path_buf(),
                source,
            })?;
            if !metadata.is_dir() {
                return Err(BridgeError::InvalidInput(format!(
                    "custom data path '{}' is not a directory",
                    dir.display()
                )));
            }
        }

        let mut builder = WasiCtxBuilder::new();
        builder.inherit_stdout().inherit_stderr();

        let mut mounted = Vec::new();
        for mount in self.config.mounts(custom) {
            if !mount.host.is_dir() && mount.guest != CUSTOM_MOUNT {
                tracing::warn!(
                    "Skipping mount {}: host directory '{}' does not exist",
                    mount.guest,
                    mount.host.display()
                );
                continue;
            }
            builder
                .preopened_dir(&mount.host, &mount.guest, DirPerms::all(), FilePerms::all())
                .map_err(|e| {
                    BridgeError::ModuleError(format!(
                        "Failed to mount '{}' at {}: {}",
                        mount.host.display(),
                        mount.guest,
                        e
                    ))
                })?;
            mounted.push(mount);
        }

        let mut store = Store::new(
            &self.engine,
            GuestState {
                wasi: builder.build_p1(),
            },
        );
        if let Some(fuel) = self.config.fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::ModuleError(e.to_string()))?;
        }
        let instance = self
            .pre
            .instantiate(&mut store)
            .map_err(|e| BridgeError::ModuleError(format!("Failed to instantiate guest: {}", e)))?;

        tracing::debug!(
            "{}",
            InstanceCreated {
                mount_count: mounted.len(),
            }
        );

        WasmGuest::new(store, instance, mounted, self.config.fuel)
    }
}

/// Creates the engine shared by every guest instance.
///
/// - Disabled features: threads, multi-memory, memory64
/// - Fuel metering only when a budget is configured
fn create_engine(config: &RuntimeConfig) -> BridgeResult<Engine> {
    let mut wasm_config = Config::new();

    wasm_config.wasm_threads(false);
    wasm_config.wasm_multi_memory(false);
    wasm_config.wasm_memory64(false);
    wasm_config.consume_fuel(config.fuel.is_some());
    wasm_config.epoch_interruption(false);

    Engine::new(&wasm_config).map_err(|e| BridgeError::ModuleError(e.to_string()))
}

fn load_module_bytes(path: &Path, max_size: usize) -> BridgeResult<Vec<u8>> {
    let path_display = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| {
        let error = BridgeError::IoError(e);
        tracing::error!(
            "{}",
            ModuleLoadFailed {
                module_path: &path_display,
                error: &error,
            }
        );
        error
    })?;

    if bytes.len() > max_size {
        let error = BridgeError::InvalidWasmBinary(format!(
            "guest module too large: {} bytes (max: {} bytes)",
            bytes.len(),
            max_size
        ));
        tracing::error!(
            "{}",
            ModuleLoadFailed {
                module_path: &path_display,
                error: &error,
            }
        );
        return Err(error);
    }

    tracing::info!(
        "{}",
        ModuleLoaded {
            module_path: &path_display,
            size_bytes: bytes.len(),
        }
    );
    Ok(bytes)
}
