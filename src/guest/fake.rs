// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-process stand-in for the guest OCR module (test-only).
//!
//! `FakeGuest` implements [`Guest`] over a plain byte vector with a tracking
//! bump allocator, so tests can observe exactly which exports were called, with
//! what arguments, and whether every heap buffer came back.
//!
//! Guest-owned data (plain text results, word strings, version and data path)
//! lives in a reserved static region below the heap and is never handed to the
//! allocator, mirroring the ownership contract of the real module.

use super::memory::read_string;
use super::{Export, Guest, GuestPtr};
use crate::config::Mount;
use crate::errors::{BridgeError, BridgeResult};
use std::collections::{BTreeMap, HashSet};

const MEMORY_SIZE: usize = 1024 * 1024;
const STATIC_BASE: u32 = 64;
const HEAP_BASE: u32 = 64 * 1024;

/// Word record returned by the fake `GetBoundingBoxes*` exports.
#[derive(Debug, Clone)]
pub struct FakeBox {
    pub rect: [i32; 4],
    pub word: String,
    pub confidence: f64,
    pub indices: [i32; 4],
}

/// Arguments captured from one guest `Init` call.
#[derive(Debug, Clone, PartialEq)]
pub struct InitCall {
    pub tessdata_prefix: String,
    pub languages: String,
    pub config_file: String,
}

pub struct FakeGuest {
    memory: Vec<u8>,
    static_next: u32,
    heap_next: u32,
    live: BTreeMap<u32, usize>,
    total_allocations: usize,
    invalid_frees: usize,
    mounts: Vec<Mount>,

    pub calls: Vec<(Export, Vec<u64>)>,
    pub init_calls: Vec<InitCall>,
    pub pushed_variables: Vec<(String, String)>,
    pub bound_images: Vec<u64>,
    pub live_images: HashSet<u64>,
    pub image_paths: Vec<String>,
    pub image_bytes: Vec<Vec<u8>>,
    pub page_seg_mode: u64,
    next_handle: u64,

    pub init_status: u64,
    pub rejected_variable: Option<String>,
    pub trap_on: Option<Export>,
    pub text: String,
    pub hocr: String,
    pub boxes: Vec<FakeBox>,
    pub data_path: String,
    pub version: String,
    pub existing_files: HashSet<String>,
}

impl FakeGuest {
    pub fn new() -> Self {
        Self {
            memory: vec![0; MEMORY_SIZE],
            static_next: STATIC_BASE,
            heap_next: HEAP_BASE,
            live: BTreeMap::new(),
            total_allocations: 0,
            invalid_frees: 0,
            mounts: Vec::new(),
            calls: Vec::new(),
            init_calls: Vec::new(),
            pushed_variables: Vec::new(),
            bound_images: Vec::new(),
            live_images: HashSet::new(),
            image_paths: Vec::new(),
            image_bytes: Vec::new(),
            page_seg_mode: 3,
            next_handle: 100,
            init_status: 0,
            rejected_variable: None,
            trap_on: None,
            text: "\nhello world\n\n".to_string(),
            hocr: "<div class='ocr_page'>hello world</div>".to_string(),
            boxes: Vec::new(),
            data_path: "/tessdata/".to_string(),
            version: "5.3.4".to_string(),
            existing_files: HashSet::new(),
        }
    }

    pub fn with_mounts(mut self, mounts: Vec<Mount>) -> Self {
        self.mounts = mounts;
        self
    }

    pub fn live_allocations(&self) -> usize {
        self.live.len()
    }

    pub fn total_allocations(&self) -> usize {
        self.total_allocations
    }

    pub fn invalid_frees(&self) -> usize {
        self.invalid_frees
    }

    pub fn calls_to(&self, export: Export) -> usize {
        self.calls.iter().filter(|(e, _)| *e == export).count()
    }

    /// Position of each call to `export` in the overall call log.
    pub fn positions_of(&self, export: Export) -> Vec<usize> {
        self.calls
            .iter()
            .enumerate()
            .filter(|(_, (e, _))| *e == export)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn clear_log(&mut self) {
        self.calls.clear();
    }

    fn malloc(&mut self, len: usize) -> u32 {
        let len = len.max(1);
        let ptr = self.heap_next;
        let next = (ptr as usize + len + 7) & !7;
        if next > self.memory.len() {
            return 0;
        }
        self.heap_next = next as u32;
        self.live.insert(ptr, len);
        self.total_allocations += 1;
        ptr
    }

    fn free(&mut self, ptr: u32) {
        if self.live.remove(&ptr).is_none() {
            self.invalid_frees += 1;
        }
    }

    fn write(&mut self, ptr: u32, bytes: &[u8]) {
        let start = ptr as usize;
        self.memory[start..start + bytes.len()].copy_from_slice(bytes);
    }

    fn static_str(&mut self, value: &str) -> u32 {
        let ptr = self.static_next;
        self.write(ptr, value.as_bytes());
        self.write(ptr + value.len() as u32, &[0]);
        self.static_next = (ptr + value.len() as u32 + 8) & !7;
        ptr
    }

    fn heap_str(&mut self, value: &str) -> u32 {
        let ptr = self.malloc(value.len() + 1);
        self.write(ptr, value.as_bytes());
        self.write(ptr + value.len() as u32, &[0]);
        ptr
    }

    fn string_arg(&self, raw: u64) -> String {
        read_string(&self.memory, GuestPtr::from_raw(raw)).unwrap_or_default()
    }

    fn bounding_boxes(&mut self) -> u32 {
        let boxes = self.boxes.clone();
        let array = self.malloc(48 * boxes.len());
        for (i, b) in boxes.iter().enumerate() {
            let record = array + 48 * i as u32;
            for (k, value) in b.rect.iter().enumerate() {
                self.write(record + 4 * k as u32, &value.to_le_bytes());
            }
            let word = self.static_str(&b.word);
            self.write(record + 16, &word.to_le_bytes());
            self.write(record + 24, &b.confidence.to_le_bytes());
            for (k, value) in b.indices.iter().enumerate() {
                self.write(record + 32 + 4 * k as u32, &value.to_le_bytes());
            }
        }
        let header = self.malloc(12);
        self.write(header, &(boxes.len() as u32).to_le_bytes());
        self.write(header + 4, &u64::from(array).to_le_bytes());
        header
    }
}

impl Guest for FakeGuest {
    fn call(&mut self, export: Export, params: &[u64]) -> BridgeResult<Vec<u64>> {
        self.calls.push((export, params.to_vec()));
        if self.trap_on == Some(export) {
            return Err(BridgeError::GuestFault {
                function: export.symbol().to_string(),
                message: "wasm trap: unreachable".to_string(),
            });
        }
        let arg = |i: usize| params.get(i).copied().unwrap_or(0);

        let result: u64 = match export {
            Export::Malloc => u64::from(self.malloc(arg(0) as usize)),
            Export::FreeBuffer => {
                self.free(arg(0) as u32);
                0
            }
            Export::Create => {
                self.next_handle += 1;
                self.next_handle
            }
            Export::FreeHandle | Export::Clear | Export::ClearPersistentCache => 0,
            Export::Init => {
                let call = InitCall {
                    tessdata_prefix: self.string_arg(arg(1)),
                    languages: self.string_arg(arg(2)),
                    config_file: self.string_arg(arg(3)),
                };
                self.init_calls.push(call);
                self.init_status
            }
            Export::SetVariable => {
                let key = self.string_arg(arg(1));
                let value = self.string_arg(arg(2));
                if self.rejected_variable.as_deref() == Some(key.as_str()) {
                    0
                } else {
                    self.pushed_variables.push((key, value));
                    1
                }
            }
            Export::SetPixImage => {
                self.bound_images.push(arg(1));
                0
            }
            Export::SetPageSegMode => {
                self.page_seg_mode = arg(1);
                0
            }
            Export::GetPageSegMode => self.page_seg_mode,
            Export::Utf8Text => {
                let text = self.text.clone();
                u64::from(self.static_str(&text))
            }
            Export::HocrText => {
                let hocr = self.hocr.clone();
                u64::from(self.heap_str(&hocr))
            }
            Export::Version => {
                let version = self.version.clone();
                u64::from(self.static_str(&version))
            }
            Export::GetDataPath => {
                let data_path = self.data_path.clone();
                u64::from(self.static_str(&data_path))
            }
            Export::CreatePixImageByFilePath => {
                let path = self.string_arg(arg(0));
                self.image_paths.push(path);
                self.next_handle += 1;
                self.live_images.insert(self.next_handle);
                self.next_handle
            }
            Export::CreatePixImageFromBytes => {
                let start = arg(0) as usize;
                let bytes = self.memory[start..start + arg(1) as usize].to_vec();
                self.image_bytes.push(bytes);
                self.next_handle += 1;
                self.live_images.insert(self.next_handle);
                self.next_handle
            }
            Export::DestroyPixImage => {
                self.live_images.remove(&arg(0));
                0
            }
            Export::FileExists => {
                if arg(0) == 0 {
                    0
                } else {
                    let path = self.string_arg(arg(0));
                    u64::from(self.existing_files.contains(&path))
                }
            }
            Export::GetBoundingBoxes | Export::GetBoundingBoxesVerbose => {
                u64::from(self.bounding_boxes())
            }
        };
        Ok(vec![result])
    }

    fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    fn mounts(&self) -> &[Mount] {
        &self.mounts
    }
}
