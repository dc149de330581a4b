// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Host functions emscripten-built guests import from `env`.
//!
//! Only the imports actually declared by the module are defined, using the
//! module's own signatures:
//! - `invoke_*`: call the function at `params[0]` in `__indirect_function_table`
//!   with the remaining arguments
//! - `emscripten_notify_memory_growth`: no-op
//!
//! Anything else left unresolved is defined as a trap by the bootstrap.

use wasmtime::{Caller, ExternType, Linker, Module, Val};

const ENV_MODULE: &str = "env";
const INDIRECT_FUNCTION_TABLE: &str = "__indirect_function_table";
const INVOKE_PREFIX: &str = "invoke_";
const NOTIFY_MEMORY_GROWTH: &str = "emscripten_notify_memory_growth";

/// Define the emscripten `env` imports `module` needs. Returns how many were linked.
pub(crate) fn link_imports<T: 'static>(
    linker: &mut Linker<T>,
    module: &Module,
) -> wasmtime::Result<usize> {
    let mut linked = 0;
    for import in module.imports() {
        if import.module() != ENV_MODULE {
            continue;
        }
        let ExternType::Func(ty) = import.ty() else {
            continue;
        };
        let name = import.name();
        if name.starts_with(INVOKE_PREFIX) {
            linker.func_new(ENV_MODULE, name, ty, invoke::<T>)?;
        } else if name == NOTIFY_MEMORY_GROWTH {
            linker.func_new(ENV_MODULE, name, ty, |_caller, _params, _results| Ok(()))?;
        } else {
            continue;
        }
        linked += 1;
    }
    Ok(linked)
}

fn invoke<T>(mut caller: Caller<'_, T>, params: &[Val], results: &mut [Val]) -> wasmtime::Result<()> {
    let index = params
        .first()
        .and_then(Val::i32)
        .ok_or_else(|| wasmtime::Error::msg("invoke_* called without a table index"))?;
    let table = caller
        .get_export(INDIRECT_FUNCTION_TABLE)
        .and_then(|export| export.into_table())
        .ok_or_else(|| {
            wasmtime::Error::msg(format!("guest does not export '{}'", INDIRECT_FUNCTION_TABLE))
        })?;
    let func = table
        .get(&mut caller, u64::from(index as u32))
        .and_then(|entry| entry.as_func().flatten().copied())
        .ok_or_else(|| wasmtime::Error::msg(format!("no function at table index {}", index)))?;
    func.call(&mut caller, &params[1..], results)
}
