// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! OCR client: one engine handle inside one isolated guest instance.
//!
//! A [`Client`] owns its guest instance, its engine handle, at most one image
//! handle and the settings the engine consumes at `Init` time. Changing the
//! languages, config file or tessdata prefix invalidates the engine; changing
//! only the image does not, so an initialized engine is simply rebound to the
//! new image before the next recognition call.
//!
//! # Example
//! ```no_run
//! use tessbridge::{Client, PageIteratorLevel};
//!
//! let mut client = Client::new()?;
//! client.set_language(["eng"])?;
//! client.set_image("receipt.png")?;
//! let text = client.text()?;
//! let words = client.bounding_boxes(PageIteratorLevel::Word)?;
//! client.close()?;
//! # Ok::<(), tessbridge::BridgeError>(())
//! ```

mod bounding_box;
mod state;
mod variables;

pub use bounding_box::{BoundingBox, Rect};
pub use state::EngineState;
pub use variables::{PageIteratorLevel, PageSegMode, Variable};

use crate::config::consts::{
    DEFAULT_LANGUAGE, LANGUAGE_SEPARATOR, TESSDATA_MOUNT, TRAINEDDATA_EXTENSION,
};
use crate::config::{host_path_for, is_virtual_path};
use crate::errors::{BridgeError, BridgeResult};
use crate::guest::memory::{guest_len, read_string};
use crate::guest::{
    CallScope, EngineHandle, Export, Guest, GuestPtr, GuestRuntime, ImageHandle, WasmGuest,
};
use crate::observability::messages::client::{
    ClientClosed, ClientCreated, ClientFaulted, EngineInitialized, ImageSet,
    RecognitionCompleted, ReinitScheduled,
};
use bounding_box::{decode_records, BoxHeader, Detail};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const NULL_DEVICE: &str = "/dev/null";

/// Engine version reported by a throwaway client.
pub fn version() -> BridgeResult<String> {
    let mut client = Client::new()?;
    let version = client.version();
    client.close()?;
    version
}

/// Trained languages installed in the engine's default data path.
pub fn available_languages() -> BridgeResult<Vec<String>> {
    let mut client = Client::new()?;
    let languages = client.available_languages();
    client.close()?;
    languages
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathKind {
    File,
    Directory,
}

/// Handle to one OCR engine running in its own guest instance.
///
/// Not `Sync`: every operation takes `&mut self` because the guest must never
/// see concurrent calls. Independent clients may run on separate threads.
///
/// Dropping a client releases its guest resources; [`Client::close`] does the
/// same but reports failures.
pub struct Client<G: Guest = WasmGuest> {
    guest: G,
    engine: EngineHandle,
    image: Option<ImageHandle>,
    state: EngineState,
    languages: Vec<String>,
    config_file: Option<String>,
    tessdata_prefix: Option<String>,
    variables: BTreeMap<Variable, String>,
    trim: bool,
}

impl Client<WasmGuest> {
    /// Client backed by a fresh instance of the process-wide guest runtime.
    pub fn new() -> BridgeResult<Self> {
        let guest = GuestRuntime::global()?.instantiate(None)?;
        Self::from_guest(guest)
    }

    /// Like [`Client::new`], with `dir` mounted at `/custom/` for extra language data.
    pub fn with_custom_data(dir: impl AsRef<Path>) -> BridgeResult<Self> {
        let guest = GuestRuntime::global()?.instantiate(Some(dir.as_ref()))?;
        Self::from_guest(guest)
    }
}

impl<G: Guest> Client<G> {
    /// Create an engine handle inside `guest` and wrap it.
    pub fn from_guest(mut guest: G) -> BridgeResult<Self> {
        let raw = guest.call_one(Export::Create, &[])?;
        if raw == 0 {
            return Err(BridgeError::Precondition(
                "guest could not construct an engine handle".to_string(),
            ));
        }
        tracing::debug!("{}", ClientCreated { engine_handle: raw });

        Ok(Self {
            guest,
            engine: EngineHandle::from_raw(raw),
            image: None,
            state: EngineState::Uninitialized,
            languages: vec![DEFAULT_LANGUAGE.to_string()],
            config_file: None,
            tessdata_prefix: None,
            variables: BTreeMap::new(),
            trim: true,
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_initialized()
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    pub fn variables(&self) -> &BTreeMap<Variable, String> {
        &self.variables
    }

    pub fn trim(&self) -> bool {
        self.trim
    }

    /// Whether [`Client::text`] strips leading and trailing newlines (default `true`).
    pub fn set_trim(&mut self, trim: bool) {
        self.trim = trim;
    }

    /// Load an image file. Paths under `/tessdata/` or `/custom/` are resolved in
    /// the guest; anything else must exist on the host.
    pub fn set_image(&mut self, path: impl AsRef<Path>) -> BridgeResult<()> {
        let path = path.as_ref();
        self.guarded("set_image", |client| client.load_image_file(path))
    }

    /// Load an encoded image (PNG, JPEG, TIFF, ...) from memory.
    pub fn set_image_from_bytes(&mut self, data: &[u8]) -> BridgeResult<()> {
        self.guarded("set_image_from_bytes", |client| client.load_image_bytes(data))
    }

    /// Replace the recognition languages, e.g. `["eng", "deu"]`.
    pub fn set_language<I, S>(&mut self, languages: I) -> BridgeResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state.check_usable()?;
        let languages: Vec<String> = languages.into_iter().map(Into::into).collect();
        if languages.is_empty() {
            return Err(BridgeError::InvalidInput("languages cannot be empty".to_string()));
        }
        if let Some(bad) = languages
            .iter()
            .find(|lang| lang.trim().is_empty() || lang.contains(LANGUAGE_SEPARATOR))
        {
            return Err(BridgeError::InvalidInput(format!("invalid language name '{}'", bad)));
        }
        self.languages = languages;
        self.invalidate("languages");
        Ok(())
    }

    /// Point the engine at a config file consumed during `Init`.
    pub fn set_config_file(&mut self, path: impl AsRef<Path>) -> BridgeResult<()> {
        let path = path.as_ref();
        self.guarded("set_config_file", |client| {
            let resolved = client.resolve_path(path, PathKind::File)?;
            client.config_file = Some(resolved);
            client.invalidate("config file");
            Ok(())
        })
    }

    /// Directory holding `*.traineddata`; defaults to `/tessdata/`.
    pub fn set_tessdata_prefix(&mut self, path: impl AsRef<Path>) -> BridgeResult<()> {
        let path = path.as_ref();
        self.guarded("set_tessdata_prefix", |client| {
            let resolved = client.resolve_path(path, PathKind::Directory)?;
            client.tessdata_prefix = Some(resolved);
            client.invalidate("tessdata prefix");
            Ok(())
        })
    }

    /// Record an engine variable. Pushed immediately when the engine is
    /// initialized, otherwise at the next `Init`.
    pub fn set_variable(&mut self, key: Variable, value: impl Into<String>) -> BridgeResult<()> {
        let value = value.into();
        self.guarded("set_variable", |client| client.apply_variable(key, value))
    }

    /// Send the engine's debug output to the null device.
    pub fn disable_output(&mut self) -> BridgeResult<()> {
        self.set_variable(Variable::DebugFile, NULL_DEVICE)
    }

    pub fn set_whitelist(&mut self, chars: impl Into<String>) -> BridgeResult<()> {
        self.set_variable(Variable::CharWhitelist, chars)
    }

    pub fn set_blacklist(&mut self, chars: impl Into<String>) -> BridgeResult<()> {
        self.set_variable(Variable::CharBlacklist, chars)
    }

    /// Applied to the engine immediately; no re-initialization needed.
    pub fn set_page_seg_mode(&mut self, mode: PageSegMode) -> BridgeResult<()> {
        self.guarded("set_page_seg_mode", |client| {
            client
                .guest
                .call(Export::SetPageSegMode, &[client.engine.raw(), mode.raw()])?;
            Ok(())
        })
    }

    pub fn page_seg_mode(&mut self) -> BridgeResult<PageSegMode> {
        let raw = self.guarded("page_seg_mode", |client| {
            client.guest.call_one(Export::GetPageSegMode, &[client.engine.raw()])
        })?;
        PageSegMode::try_from(raw)
    }

    /// Engine version string.
    pub fn version(&mut self) -> BridgeResult<String> {
        self.guarded("version", |client| {
            let ptr = client.guest.call_one(Export::Version, &[client.engine.raw()])?;
            read_string(client.guest.memory(), GuestPtr::from_raw(ptr))
        })
    }

    /// Drop library-level caches (mostly language dictionaries) shared across engines.
    pub fn clear_persistent_cache(&mut self) -> BridgeResult<()> {
        self.guarded("clear_persistent_cache", |client| {
            client
                .guest
                .call(Export::ClearPersistentCache, &[client.engine.raw()])?;
            Ok(())
        })
    }

    /// Base names of the `*.traineddata` files in the engine's default data path.
    pub fn available_languages(&mut self) -> BridgeResult<Vec<String>> {
        let data_path = self.guarded("available_languages", |client| {
            let ptr = client.guest.call_one(Export::GetDataPath, &[])?;
            read_string(client.guest.memory(), GuestPtr::from_raw(ptr))
        })?;
        let dir = host_path_for(self.guest.mounts(), &data_path)
            .unwrap_or_else(|| PathBuf::from(&data_path));
        scan_languages(&dir)
    }

    /// Recognize the current image as plain text.
    pub fn text(&mut self) -> BridgeResult<String> {
        self.guarded("text", Self::recognize_text)
    }

    /// Recognize the current image as hOCR markup.
    pub fn hocr_text(&mut self) -> BridgeResult<String> {
        self.guarded("hocr_text", Self::recognize_hocr)
    }

    /// Regions recognized at `level`, with text and confidence.
    pub fn bounding_boxes(&mut self, level: PageIteratorLevel) -> BridgeResult<Vec<BoundingBox>> {
        self.guarded("bounding_boxes", |client| {
            client.recognize_boxes(Export::GetBoundingBoxes, Some(level), Detail::Basic)
        })
    }

    /// Word-level boxes including block, paragraph, line and word indices.
    pub fn bounding_boxes_verbose(&mut self) -> BridgeResult<Vec<BoundingBox>> {
        self.guarded("bounding_boxes_verbose", |client| {
            client.recognize_boxes(Export::GetBoundingBoxesVerbose, None, Detail::Verbose)
        })
    }

    /// Release the engine, the image and the guest instance.
    pub fn close(mut self) -> BridgeResult<()> {
        self.release()
    }

    /// Run `operation`, moving the client to `Faulted` if it fails fatally.
    fn guarded<T>(
        &mut self,
        operation: &str,
        f: impl FnOnce(&mut Self) -> BridgeResult<T>,
    ) -> BridgeResult<T> {
        self.state.check_usable()?;
        let result = f(self);
        if let Err(error) = &result {
            if error.is_fatal() {
                tracing::error!("{}", ClientFaulted { operation, error });
                self.state = EngineState::Faulted;
            }
        }
        result
    }

    fn invalidate(&mut self, reason: &str) {
        if self.state.is_initialized() {
            tracing::debug!("{}", ReinitScheduled { reason });
        }
        self.state = self.state.invalidated();
    }

    /// Check that `path` names an existing file or directory and return the
    /// form the guest should see.
    fn resolve_path(&mut self, path: &Path, kind: PathKind) -> BridgeResult<String> {
        let text = path
            .to_str()
            .ok_or_else(|| BridgeError::InvalidInput(format!("path '{}' is not UTF-8", path.display())))?;
        if text.is_empty() {
            return Err(BridgeError::InvalidInput("path cannot be empty".to_string()));
        }

        if is_virtual_path(text) {
            let exists = match kind {
                PathKind::File => {
                    let mut scope = CallScope::new(&mut self.guest);
                    let ptr = scope.alloc_str(text)?;
                    scope.call_one(Export::FileExists, &[ptr.raw()])? != 0
                }
                PathKind::Directory => host_path_for(self.guest.mounts(), text)
                    .is_some_and(|host| host.is_dir()),
            };
            if !exists {
                return Err(BridgeError::InvalidPath {
                    path: path.to_path_buf(),
                    source: io::Error::new(io::ErrorKind::NotFound, "not found in guest file system"),
                });
            }
            return Ok(text.to_string());
        }

        let invalid = |source: io::Error| BridgeError::InvalidPath {
            path: path.to_path_buf(),
            source,
        };
        let metadata = fs::metadata(path).map_err(invalid)?;
        match kind {
            PathKind::File if metadata.is_dir() => {
                return Err(BridgeError::InvalidInput(format!(
                    "'{}' is a directory, expected a file",
                    path.display()
                )))
            }
            PathKind::Directory if !metadata.is_dir() => {
                return Err(BridgeError::InvalidInput(format!(
                    "'{}' is not a directory",
                    path.display()
                )))
            }
            _ => {}
        }
        let absolute = std::path::absolute(path).map_err(invalid)?;
        absolute
            .to_str()
            .map(str::to_string)
            .ok_or_else(|| BridgeError::InvalidInput(format!("path '{}' is not UTF-8", absolute.display())))
    }

    fn load_image_file(&mut self, path: &Path) -> BridgeResult<()> {
        let resolved = self.resolve_path(path, PathKind::File)?;
        self.release_image()?;

        let raw = {
            let mut scope = CallScope::new(&mut self.guest);
            let ptr = scope.alloc_str(&resolved)?;
            scope.call_one(Export::CreatePixImageByFilePath, &[ptr.raw()])?
        };
        self.store_image(raw, &resolved, resolved.len() + 1)
    }

    fn load_image_bytes(&mut self, data: &[u8]) -> BridgeResult<()> {
        if data.is_empty() {
            return Err(BridgeError::InvalidInput("image data cannot be empty".to_string()));
        }
        let len = guest_len(data.len())?;
        self.release_image()?;

        // The guest decodes a copy, so the input buffer is released with the scope
        let raw = {
            let mut scope = CallScope::new(&mut self.guest);
            let ptr = scope.alloc_bytes(data)?;
            scope.call_one(Export::CreatePixImageFromBytes, &[ptr.raw(), u64::from(len)])?
        };
        self.store_image(raw, "bytes", data.len())
    }

    fn store_image(&mut self, raw: u64, source: &str, size_bytes: usize) -> BridgeResult<()> {
        let image = ImageHandle::from_raw(raw);
        if image.is_null() {
            return Err(BridgeError::InvalidInput(format!(
                "guest could not decode image from {}",
                source
            )));
        }
        tracing::debug!("{}", ImageSet { source, size_bytes });
        self.image = Some(image);
        Ok(())
    }

    fn release_image(&mut self) -> BridgeResult<()> {
        if let Some(image) = self.image.take() {
            self.guest.call(Export::DestroyPixImage, &[image.raw()])?;
        }
        Ok(())
    }

    fn apply_variable(&mut self, key: Variable, value: String) -> BridgeResult<()> {
        if self.state.is_initialized() {
            push_variable(&mut self.guest, self.engine, key, &value)?;
        }
        self.variables.insert(key, value);
        Ok(())
    }

    /// Bring the engine to `Initialized` and bind the current image.
    fn prepare(&mut self) -> BridgeResult<()> {
        let image = self.image.ok_or_else(|| {
            BridgeError::Precondition(
                "image is not set, use set_image or set_image_from_bytes before recognition"
                    .to_string(),
            )
        })?;
        if self.state.needs_init() {
            self.initialize()?;
        }
        self.guest
            .call(Export::SetPixImage, &[self.engine.raw(), image.raw()])?;
        Ok(())
    }

    fn initialize(&mut self) -> BridgeResult<()> {
        let languages = self.languages.join(LANGUAGE_SEPARATOR);
        let prefix = self.tessdata_prefix.as_deref().unwrap_or(TESSDATA_MOUNT);

        let status = {
            let mut scope = CallScope::new(&mut self.guest);
            let prefix_ptr = scope.alloc_str(prefix)?;
            let languages_ptr = scope.alloc_str(&languages)?;
            let config_ptr = match &self.config_file {
                Some(path) => scope.alloc_str(path)?,
                None => GuestPtr::NULL,
            };
            scope.call_one(
                Export::Init,
                &[
                    self.engine.raw(),
                    prefix_ptr.raw(),
                    languages_ptr.raw(),
                    config_ptr.raw(),
                    0,
                ],
            )?
        };
        if status != 0 {
            return Err(BridgeError::InitFailed { code: status });
        }

        for (key, value) in &self.variables {
            push_variable(&mut self.guest, self.engine, *key, value)?;
        }

        tracing::info!(
            "{}",
            EngineInitialized {
                languages: &languages,
                tessdata_prefix: prefix,
                variable_count: self.variables.len(),
            }
        );
        self.state = EngineState::Initialized;
        Ok(())
    }

    fn recognize_text(&mut self) -> BridgeResult<String> {
        self.prepare()?;
        // UTF8Text results stay owned by the guest
        let ptr = self.guest.call_one(Export::Utf8Text, &[self.engine.raw()])?;
        let text = read_string(self.guest.memory(), GuestPtr::from_raw(ptr))?;
        let text = if self.trim {
            text.trim_matches('\n').to_string()
        } else {
            text
        };
        tracing::debug!(
            "{}",
            RecognitionCompleted {
                operation: "text",
                output_size: text.len(),
            }
        );
        Ok(text)
    }

    fn recognize_hocr(&mut self) -> BridgeResult<String> {
        self.prepare()?;
        let mut scope = CallScope::new(&mut self.guest);
        let ptr = GuestPtr::from_raw(scope.call_one(Export::HocrText, &[self.engine.raw()])?);
        scope.adopt(ptr);
        let hocr = scope.read_string(ptr)?;
        tracing::debug!(
            "{}",
            RecognitionCompleted {
                operation: "hocr_text",
                output_size: hocr.len(),
            }
        );
        Ok(hocr)
    }

    fn recognize_boxes(
        &mut self,
        export: Export,
        level: Option<PageIteratorLevel>,
        detail: Detail,
    ) -> BridgeResult<Vec<BoundingBox>> {
        self.prepare()?;
        let mut params = vec![self.engine.raw()];
        params.extend(level.map(PageIteratorLevel::raw));

        let mut scope = CallScope::new(&mut self.guest);
        let header = GuestPtr::from_raw(scope.call_one(export, &params)?);
        if header.is_null() {
            return Ok(Vec::new());
        }
        scope.adopt(header);
        let layout = BoxHeader::read(scope.memory(), header)?;
        scope.adopt(layout.records);
        let boxes = decode_records(scope.memory(), &layout, detail)?;

        tracing::debug!(
            "{}",
            RecognitionCompleted {
                operation: export.symbol(),
                output_size: boxes.len(),
            }
        );
        Ok(boxes)
    }

    /// Clear the engine, free its handle and destroy the image, in that order.
    fn release(&mut self) -> BridgeResult<()> {
        let previous = self.state;
        if previous == EngineState::Closed {
            return Ok(());
        }
        self.state = EngineState::Closed;
        if previous == EngineState::Faulted {
            tracing::debug!("{}", ClientClosed { faulted: true });
            return Ok(());
        }

        let engine = self.engine.raw();
        let result = self
            .guest
            .call(Export::Clear, &[engine])
            .and_then(|_| self.guest.call(Export::FreeHandle, &[engine]))
            .and_then(|_| self.release_image());

        tracing::debug!("{}", ClientClosed { faulted: false });
        result
    }
}

impl<G: Guest> Drop for Client<G> {
    fn drop(&mut self) {
        if let Err(error) = self.release() {
            tracing::error!(
                "{}",
                ClientFaulted {
                    operation: "drop",
                    error: &error,
                }
            );
        }
    }
}

fn push_variable<G: Guest + ?Sized>(
    guest: &mut G,
    engine: EngineHandle,
    key: Variable,
    value: &str,
) -> BridgeResult<()> {
    let accepted = {
        let mut scope = CallScope::new(guest);
        let key_ptr = scope.alloc_str(key.as_str())?;
        let value_ptr = scope.alloc_str(value)?;
        scope.call_one(
            Export::SetVariable,
            &[engine.raw(), key_ptr.raw(), value_ptr.raw()],
        )? != 0
    };
    if accepted {
        Ok(())
    } else {
        Err(BridgeError::VariableRejected {
            key: key.as_str().to_string(),
            value: value.to_string(),
        })
    }
}

fn scan_languages(dir: &Path) -> BridgeResult<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|source| BridgeError::InvalidPath {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut languages = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(TRAINEDDATA_EXTENSION) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            if let Some(base) = name.split('.').next().filter(|base| !base.is_empty()) {
                languages.push(base.to_string());
            }
        }
    }
    languages.sort();
    languages.dedup();
    Ok(languages)
}
