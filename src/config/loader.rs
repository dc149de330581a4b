// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    CUSTOM_MOUNT, DEFAULT_MAX_MODULE_SIZE, DEFAULT_MODULE_PATH, DEFAULT_TESSDATA_DIR, ENV_CONFIG,
    ENV_MODULE, ENV_TESSDATA, TESSDATA_MOUNT,
};
use crate::errors::BridgeResult;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Process-wide configuration for the guest runtime bootstrap.
///
/// Every field is optional in YAML and falls back to a built-in default.
///
/// # Fields
/// * `module_path` - Guest `.wasm` binary to compile
/// * `tessdata_dir` - Host directory mounted at `/tessdata/`
/// * `mount_root` - Whether host `/` is passed through at guest `/`
/// * `fuel` - Optional instruction budget per guest call (unlimited when absent)
/// * `max_module_size` - Upper bound on the guest binary size in bytes
///
/// # Example
/// ```yaml
/// module_path: /opt/ocr/tesseract-core.wasm
/// tessdata_dir: /opt/ocr/tessdata
/// mount_root: true
/// fuel: 50000000000
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub module_path: PathBuf,
    pub tessdata_dir: PathBuf,
    pub mount_root: bool,
    pub fuel: Option<u64>,
    pub max_module_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            module_path: PathBuf::from(DEFAULT_MODULE_PATH),
            tessdata_dir: PathBuf::from(DEFAULT_TESSDATA_DIR),
            mount_root: true,
            fuel: None,
            max_module_size: DEFAULT_MAX_MODULE_SIZE,
        }
    }
}

/// A host directory exposed to the guest at a virtual path.
#[derive(Debug, Clone, PartialEq)]
pub struct Mount {
    pub host: PathBuf,
    pub guest: String,
}

impl RuntimeConfig {
    /// Load a config from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> BridgeResult<Self> {
        let content = fs::read_to_string(path)?;
        let cfg: RuntimeConfig = serde_yaml::from_str(&content)?;
        Ok(cfg)
    }

    /// Build the config from `TESSBRIDGE_CONFIG`, then apply the
    /// `TESSBRIDGE_MODULE` and `TESSBRIDGE_TESSDATA` overrides.
    pub fn from_env() -> BridgeResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> BridgeResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup(ENV_CONFIG) {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(module) = lookup(ENV_MODULE) {
            cfg.module_path = PathBuf::from(module);
        }
        if let Some(tessdata) = lookup(ENV_TESSDATA) {
            cfg.tessdata_dir = PathBuf::from(tessdata);
        }
        Ok(cfg)
    }

    /// Mount table for one guest instance, optionally with a caller directory at `/custom/`.
    pub fn mounts(&self, custom: Option<&Path>) -> Vec<Mount> {
        let mut mounts = Vec::with_capacity(3);
        if self.mount_root {
            mounts.push(Mount {
                host: PathBuf::from("/"),
                guest: "/".to_string(),
            });
        }
        mounts.push(Mount {
            host: self.tessdata_dir.clone(),
            guest: TESSDATA_MOUNT.to_string(),
        });
        if let Some(dir) = custom {
            mounts.push(Mount {
                host: dir.to_path_buf(),
                guest: CUSTOM_MOUNT.to_string(),
            });
        }
        mounts
    }
}

/// Translate a guest path to the host path backing it, preferring the most specific mount.
pub(crate) fn host_path_for(mounts: &[Mount], guest_path: &str) -> Option<PathBuf> {
    mounts
        .iter()
        .filter_map(|mount| {
            let prefix = mount.guest.trim_end_matches('/');
            let rest = if prefix.is_empty() {
                guest_path.strip_prefix('/')
            } else if guest_path == prefix {
                Some("")
            } else {
                guest_path.strip_prefix(&format!("{}/", prefix))
            }?;
            Some((prefix.len(), mount.host.join(rest)))
        })
        .max_by_key(|(specificity, _)| *specificity)
        .map(|(_, host)| host)
}

/// Whether a path lives under one of the virtual (non pass-through) mounts.
pub(crate) fn is_virtual_path(path: &str) -> bool {
    [TESSDATA_MOUNT, CUSTOM_MOUNT].iter().any(|&mount| {
        path.starts_with(mount) || path == mount.trim_end_matches('/')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_partial_config() {
        let yaml = r#"
module_path: /opt/ocr/tesseract-core.wasm
fuel: 1000
"#;
        let cfg: RuntimeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.module_path, PathBuf::from("/opt/ocr/tesseract-core.wasm"));
        assert_eq!(cfg.fuel, Some(1000));
        assert_eq!(cfg.tessdata_dir, PathBuf::from(DEFAULT_TESSDATA_DIR));
        assert!(cfg.mount_root);
        assert_eq!(cfg.max_module_size, DEFAULT_MAX_MODULE_SIZE);
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "tessdata_dir: /srv/tessdata\nmount_root: false").unwrap();

        let cfg = RuntimeConfig::load(temp_file.path()).unwrap();
        assert_eq!(cfg.tessdata_dir, PathBuf::from("/srv/tessdata"));
        assert!(!cfg.mount_root);
    }

    #[test]
    fn test_load_rejects_malformed_yaml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "fuel: [not, a, number]").unwrap();

        let result = RuntimeConfig::load(temp_file.path());
        assert!(matches!(result, Err(crate::errors::BridgeError::ConfigError(_))));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "module_path: /from/file.wasm\ntessdata_dir: /from/file").unwrap();

        let mut env = HashMap::new();
        env.insert(ENV_CONFIG, temp_file.path().display().to_string());
        env.insert(ENV_MODULE, "/from/env.wasm".to_string());

        let cfg = RuntimeConfig::from_lookup(|key| env.get(key).cloned()).unwrap();
        assert_eq!(cfg.module_path, PathBuf::from("/from/env.wasm"));
        assert_eq!(cfg.tessdata_dir, PathBuf::from("/from/file"));
    }

    #[test]
    fn test_mount_table() {
        let cfg = RuntimeConfig::default();
        let mounts = cfg.mounts(Some(Path::new("/home/me/langs")));
        assert_eq!(mounts.len(), 3);
        assert_eq!(mounts[1].guest, TESSDATA_MOUNT);
        assert_eq!(mounts[2].guest, CUSTOM_MOUNT);

        let no_root = RuntimeConfig {
            mount_root: false,
            ..RuntimeConfig::default()
        };
        assert_eq!(no_root.mounts(None).len(), 1);
    }

    #[test]
    fn test_host_path_prefers_specific_mount() {
        let cfg = RuntimeConfig {
            tessdata_dir: PathBuf::from("/srv/tessdata"),
            ..RuntimeConfig::default()
        };
        let mounts = cfg.mounts(None);

        assert_eq!(
            host_path_for(&mounts, "/tessdata/eng.traineddata"),
            Some(PathBuf::from("/srv/tessdata/eng.traineddata"))
        );
        assert_eq!(
            host_path_for(&mounts, "/tmp/image.png"),
            Some(PathBuf::from("/tmp/image.png"))
        );
        assert_eq!(host_path_for(&mounts, "/custom/x"), Some(PathBuf::from("/custom/x")));
    }

    #[test]
    fn test_virtual_paths() {
        assert!(is_virtual_path("/tessdata/"));
        assert!(is_virtual_path("/custom/eng.traineddata"));
        assert!(is_virtual_path("/custom"));
        assert!(!is_virtual_path("/tmp/tessdata/"));
    }
}
