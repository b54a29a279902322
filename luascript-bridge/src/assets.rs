//! Fetched binary assets exposed to scripts as revocable `file://` references.

use crate::error::{BridgeError, BridgeResult};
use reqwest::Url;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

enum AssetDir {
    Temporary(TempDir),
    Fixed(PathBuf),
}

impl AssetDir {
    fn path(&self) -> &Path {
        match self {
            Self::Temporary(dir) => dir.path(),
            Self::Fixed(path) => path,
        }
    }
}

/// Owns the files backing live asset references.
pub struct AssetStore {
    dir: AssetDir,
    entries: RefCell<HashMap<String, PathBuf>>,
}

impl AssetStore {
    /// Stores assets in a private temporary directory removed on drop.
    pub fn temporary() -> BridgeResult<Self> {
        Ok(Self {
            dir: AssetDir::Temporary(tempfile::tempdir()?),
            entries: RefCell::new(HashMap::new()),
        })
    }

    /// Stores assets under `dir`, creating it if needed.
    pub fn in_dir(dir: impl Into<PathBuf>) -> BridgeResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: AssetDir::Fixed(dir),
            entries: RefCell::new(HashMap::new()),
        })
    }

    /// Writes `bytes` to a fresh file and returns its reference.
    pub fn store(&self, bytes: &[u8], content_type: &str) -> BridgeResult<String> {
        let name = format!("{}.{}", uuid::Uuid::new_v4(), extension_for(content_type));
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes)?;
        let reference = Url::from_file_path(&path)
            .map_err(|_| BridgeError::InvalidUrl {
                url: path.display().to_string(),
                reason: "asset path is not absolute".to_string(),
            })?
            .to_string();
        debug!(reference = %reference, size = bytes.len(), "stored asset");
        self.entries
            .borrow_mut()
            .insert(reference.clone(), path);
        Ok(reference)
    }

    /// Deletes the asset behind `reference`. Unknown references are ignored.
    pub fn revoke(&self, reference: &str) -> bool {
        let Some(path) = self.entries.borrow_mut().remove(reference) else {
            return false;
        };
        if let Err(e) = std::fs::remove_file(&path) {
            debug!(path = %path.display(), error = %e, "asset file already gone");
        }
        true
    }

    pub fn path(&self, reference: &str) -> Option<PathBuf> {
        self.entries.borrow().get(reference).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

fn extension_for(content_type: &str) -> &'static str {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/svg+xml" => "svg",
        "application/json" => "json",
        "application/pdf" => "pdf",
        "text/plain" => "txt",
        "text/html" => "html",
        _ => "bin",
    }
}
