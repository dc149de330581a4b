// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::bridge::GuestFunction;
use super::{Export, Guest};
use crate::config::Mount;
use crate::errors::{BridgeError, BridgeResult};
use std::collections::HashMap;
use wasmtime::{Instance, Memory, Store};
use wasmtime_wasi::p1::WasiP1Ctx;

const STARTUP_FUNCTION: &str = "_initialize";

/// Store data for one guest instance.
pub(crate) struct GuestState {
    pub wasi: WasiP1Ctx,
}

/// One isolated, wasmtime-backed guest instance.
///
/// Created by [`super::GuestRuntime::instantiate`]. Owns its store, so its linear
/// memory and WASI file descriptors are never visible to any other client.
pub struct WasmGuest {
    store: Store<GuestState>,
    memory: Memory,
    functions: HashMap<Export, GuestFunction>,
    mounts: Vec<Mount>,
    fuel: Option<u64>,
}

impl WasmGuest {
    /// Run the startup routine, bind every export once and smoke-test the instance.
    pub(crate) fn new(
        mut store: Store<GuestState>,
        instance: Instance,
        mounts: Vec<Mount>,
        fuel: Option<u64>,
    ) -> BridgeResult<Self> {
        if let Some(fuel) = fuel {
            store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::ModuleError(e.to_string()))?;
        }
        if let Some(start) = instance.get_func(&mut store, STARTUP_FUNCTION) {
            start
                .call(&mut store, &[], &mut [])
                .map_err(|e| BridgeError::GuestFault {
                    function: STARTUP_FUNCTION.to_string(),
                    message: format!("{:#}", e),
                })?;
        }

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| BridgeError::MissingExport("memory".to_string()))?;

        let mut functions = HashMap::new();
        for export in Export::ALL {
            match GuestFunction::bind(&mut store, &instance, export) {
                Some(function) => {
                    functions.insert(export, function);
                }
                None if export.is_required() => {
                    return Err(BridgeError::MissingExport(export.symbol().to_string()));
                }
                None => {
                    tracing::debug!("Guest module does not export '{}'", export.symbol());
                }
            }
        }

        let mut guest = Self {
            store,
            memory,
            functions,
            mounts,
            fuel,
        };

        // FileExists(NULL) must answer without touching the file system
        guest.call(Export::FileExists, &[0])?;
        Ok(guest)
    }

    /// Bytes of linear memory currently committed.
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }
}

impl Guest for WasmGuest {
    fn call(&mut self, export: Export, params: &[u64]) -> BridgeResult<Vec<u64>> {
        let function = self
            .functions
            .get(&export)
            .ok_or_else(|| BridgeError::MissingExport(export.symbol().to_string()))?;
        if let Some(fuel) = self.fuel {
            self.store
                .set_fuel(fuel)
                .map_err(|e| BridgeError::ModuleError(e.to_string()))?;
        }
        function.call(&mut self.store, params)
    }

    fn memory(&self) -> &[u8] {
        self.memory.data(&self.store)
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.data_mut(&mut self.store)
    }

    fn mounts(&self) -> &[Mount] {
        &self.mounts
    }
}
