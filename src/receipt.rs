//! Install receipt: the persisted record the uninstaller runs from
//!
//! Written next to the stamped uninstaller at the end of a successful
//! install. Everything removal needs is in here; nothing else on the
//! machine records the install.

use crate::error::{SetupError, SetupResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// File name of the receipt inside the install dir
pub const RECEIPT_NAME: &str = "uninstall.json";

/// One installed file as recorded in the receipt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiptFile {
    /// Install-relative path (forward slashes)
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// BLAKE3 short hash of the contents (16 hex chars)
    pub hash: String,
}

/// The record written at install time and consumed at uninstall time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstallReceipt {
    /// Stable application identifier
    pub app_id: String,
    /// Display name
    pub name: String,
    /// Installed version
    pub version: String,
    /// Publisher, when declared
    #[serde(default)]
    pub publisher: Option<String>,
    /// Absolute install directory
    pub install_dir: PathBuf,
    /// Files placed during install, install-relative
    #[serde(default)]
    pub files: Vec<ReceiptFile>,
    /// Absolute shortcut paths created during install
    #[serde(default)]
    pub shortcuts: Vec<PathBuf>,
    /// Task ids that were selected
    #[serde(default)]
    pub tasks: Vec<String>,
    /// Install timestamp (unix seconds)
    #[serde(default)]
    pub installed_unix: u64,
}

impl InstallReceipt {
    /// Receipt path inside an install dir
    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(RECEIPT_NAME)
    }

    /// Read the receipt from an install dir
    ///
    /// Returns `Ok(None)` when no receipt exists; a present but unreadable
    /// receipt is an error so uninstall never guesses at what to remove.
    pub fn read_from(dir: &Path) -> SetupResult<Option<Self>> {
        let path = Self::path_in(dir);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| {
            SetupError::Receipt(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let receipt = serde_json::from_str(&content).map_err(|e| {
            SetupError::Receipt(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Some(receipt))
    }

    /// Write the receipt into an install dir, pretty-printed
    pub fn write_to(&self, dir: &Path) -> SetupResult<PathBuf> {
        let path = Self::path_in(dir);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|e| {
            SetupError::Receipt(format!("Failed to write {}: {}", path.display(), e))
        })?;
        Ok(path)
    }
}

/// Short BLAKE3 hash for receipt entries (16 hex chars)
pub fn short_hash(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    format!(
        "{:016x}",
        u64::from_le_bytes(hash.as_bytes()[..8].try_into().unwrap_or([0u8; 8]))
    )
}
