//! setforge - Declarative Installer Packaging
//!
//! This crate builds self-contained setup executables from a TOML
//! manifest **without requiring any build tools** on either machine.
//!
//! # Design Philosophy
//!
//! Unlike installer generators that compile a script into a driver
//! program, setforge uses a **self-replicating approach**:
//!
//! 1. The `setforge` CLI is itself a fully functional installer engine
//! 2. During `build`, it copies itself and appends the manifest + an
//!    archive of the application files as payload data
//! 3. On startup, the executable detects the payload and runs as a
//!    setup program instead of the packaging workbench
//! 4. During install it stamps another copy of itself into the install
//!    dir, which runs as the uninstaller
//!
//! This means packaging a release needs only the `setforge` binary,
//! and installing needs nothing at all.
//!
//! # Quick Start
//!
//! ## Command Line Usage
//!
//! ```bash
//! # Write a starter manifest
//! setforge init myapp
//!
//! # Build dist/myapp-1.0.0-setup from setforge.toml
//! setforge build
//!
//! # See what a setup executable would install
//! setforge inspect dist/myapp-1.0.0-setup
//! ```
//!
//! ## Manifest File (setforge.toml)
//!
//! ```toml
//! [package]
//! name = "myapp"
//! version = "1.0.0"
//! publisher = "Example Corp"
//! icon = "assets/app.png"
//!
//! [install]
//! default_dir = "{pf}/{name}"
//! privileges = "user"
//!
//! [[files]]
//! source = "build/release/*"
//! dest = ""
//!
//! [[shortcuts]]
//! name = "My App"
//! target = "myapp"
//!
//! [run]
//! target = "myapp"
//! ```
//!
//! # Technical Details
//!
//! ## Payload Format
//!
//! The setup executable contains:
//! ```text
//! [Original setforge binary]
//! [Payload Data]
//!   - Magic: "SFPK" (4 bytes)
//!   - Version: u32 (4 bytes)
//!   - Meta Length: u64 (8 bytes)
//!   - Archive Length: u64 (8 bytes)
//!   - Meta JSON (zstd, manifest + content hash)
//!   - File Archive (tar, compressed per manifest)
//! [Footer]
//!   - Payload Offset: u64 (8 bytes)
//!   - Magic: "SFPK" (4 bytes)
//! ```

pub mod builder;
pub mod cli;
mod collector;
pub mod error;
pub mod icon;
pub mod installer;
mod manifest;
pub mod payload;
pub mod progress;
mod receipt;
pub mod shortcuts;
pub mod uninstaller;

// Re-export public API
pub use builder::{BuildOutput, InstallerBuilder};
pub use collector::{FileCollector, StagedFile, StagedTree};
pub use error::{SetupError, SetupResult};
pub use icon::{convert_icon_data, load_icon, IconData, IconFormat};
pub use installer::{InstallOptions, InstallReport, Installer, LaunchDecision};

// Re-export manifest types (TOML parsing)
pub use manifest::{
    expand_install_dir, BuildConfig, CompressionKind, FileEntry, InstallConfig, Manifest,
    PackageConfig, Privileges, RunConfig, ShortcutEntry, ShortcutPlacement, TaskEntry,
};

pub use payload::{
    Payload, PayloadMeta, PayloadReader, PayloadWriter, PAYLOAD_MAGIC, PAYLOAD_VERSION,
};
pub use progress::{progress_bar, spinner, ProgressExt, ProgressStyles, SetupProgress};
pub use receipt::{InstallReceipt, ReceiptFile, RECEIPT_NAME};
pub use shortcuts::ShortcutDirs;
pub use uninstaller::{UninstallOptions, UninstallReport, Uninstaller};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if the current executable carries a payload (is a setup program)
pub fn is_packed() -> bool {
    let exe_path = match std::env::current_exe() {
        Ok(p) => p,
        Err(_) => return false,
    };
    PayloadReader::is_packed(&exe_path).unwrap_or(false)
}

/// Read the payload from the current executable
pub fn read_payload() -> SetupResult<Option<Payload>> {
    let exe_path = std::env::current_exe()?;
    PayloadReader::read(&exe_path)
}
