// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Typed wrapper around one exported guest function.
//!
//! Arguments and results cross the bridge as `u64` and are converted to and
//! from the function's declared wasm value types. There is no per-call retry: a
//! trap leaves the instance in an undefined state, so it is escalated as a
//! fatal [`BridgeError::GuestFault`].

use super::Export;
use crate::errors::{BridgeError, BridgeResult};
use crate::observability::messages::runtime::GuestCallFailed;
use wasmtime::{AsContextMut, Func, Instance, Val, ValType};

pub(crate) struct GuestFunction {
    export: Export,
    func: Func,
    params: Vec<ValType>,
    results: Vec<ValType>,
}

impl GuestFunction {
    /// Bind `export` on `instance`, or `None` when the module does not export it.
    pub fn bind(
        mut store: impl AsContextMut,
        instance: &Instance,
        export: Export,
    ) -> Option<Self> {
        let func = instance.get_func(&mut store, export.symbol())?;
        let ty = func.ty(&store);
        Some(Self {
            export,
            func,
            params: ty.params().collect(),
            results: ty.results().collect(),
        })
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    pub fn call(&self, mut store: impl AsContextMut, args: &[u64]) -> BridgeResult<Vec<u64>> {
        let name = self.export.symbol();
        if args.len() != self.arity() {
            let error = BridgeError::ArityMismatch {
                function: name.to_string(),
                expected: self.arity(),
                actual: args.len(),
            };
            tracing::error!("{}", GuestCallFailed { function: name, error: &error });
            return Err(error);
        }

        let params = self
            .params
            .iter()
            .zip(args)
            .map(|(ty, raw)| to_val(name, ty, *raw))
            .collect::<BridgeResult<Vec<_>>>()?;
        let mut results = self
            .results
            .iter()
            .map(|ty| zero_val(name, ty))
            .collect::<BridgeResult<Vec<_>>>()?;

        self.func
            .call(&mut store, &params, &mut results)
            .map_err(|e| {
                let error = BridgeError::GuestFault {
                    function: name.to_string(),
                    message: format!("{:#}", e),
                };
                tracing::error!("{}", GuestCallFailed { function: name, error: &error });
                error
            })?;

        results.iter().map(|val| from_val(name, val)).collect()
    }
}

fn unsupported(function: &str, ty: &ValType) -> BridgeError {
    BridgeError::ModuleError(format!(
        "guest function '{}' uses unsupported value type {}",
        function, ty
    ))
}

fn to_val(function: &str, ty: &ValType, raw: u64) -> BridgeResult<Val> {
    match ty {
        ValType::I32 => Ok(Val::I32(raw as u32 as i32)),
        ValType::I64 => Ok(Val::I64(raw as i64)),
        ValType::F32 => Ok(Val::F32(raw as u32)),
        ValType::F64 => Ok(Val::F64(raw)),
        other => Err(unsupported(function, other)),
    }
}

fn zero_val(function: &str, ty: &ValType) -> BridgeResult<Val> {
    to_val(function, ty, 0)
}

fn from_val(function: &str, val: &Val) -> BridgeResult<u64> {
    match val {
        Val::I32(v) => Ok(*v as u32 as u64),
        Val::I64(v) => Ok(*v as u64),
        Val::F32(bits) => Ok(u64::from(*bits)),
        Val::F64(bits) => Ok(*bits),
        _ => Err(BridgeError::ModuleError(format!(
            "guest function '{}' returned a non-numeric value",
            function
        ))),
    }
}
