//! Uninstall personality: receipt-driven removal
//!
//! The receipt written at install time is the single source of truth.
//! Removal never walks the install dir blindly: only recorded files,
//! shortcuts and the directories left empty by their removal go away,
//! so user data dropped next to the application survives.
//!
//! On Windows a running executable cannot delete itself. The last step
//! copies the uninstaller into the temp dir and respawns it with
//! `--finalize-uninstall <dir>`; the copy waits for the parent to exit,
//! then removes the stamped executable and the install dir.

use crate::error::{SetupError, SetupResult};
use crate::manifest::{expand_install_dir, Manifest};
use crate::receipt::InstallReceipt;
use crate::shortcuts;
use console::Term;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// Options parsed from the uninstaller command line
#[derive(Debug, Clone, Default)]
pub struct UninstallOptions {
    /// Skip the confirmation prompt
    pub silent: bool,
}

/// Summary of a completed (or cancelled) uninstall
#[derive(Debug, Clone, Default)]
pub struct UninstallReport {
    /// User declined the confirmation prompt
    pub cancelled: bool,
    /// Recorded files removed
    pub files_removed: usize,
    /// Recorded files already gone
    pub files_missing: usize,
    /// Shortcut files removed
    pub shortcuts_removed: usize,
    /// Directories pruned after file removal
    pub dirs_removed: usize,
    /// Install dir is gone (always false when a finalizer was handed off)
    pub install_dir_removed: bool,
    /// Temp executable spawned to finish the job (Windows)
    pub finalizer: Option<PathBuf>,
}

/// True when the executable name asks for the uninstall personality
///
/// The stamped uninstaller is named `uninstall` (plus the platform
/// suffix), but renamed copies like `uninstall-myapp` still count.
pub fn wants_uninstall(exe: &Path) -> bool {
    exe.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase().starts_with("uninstall"))
        .unwrap_or(false)
}

/// Find the receipt for an installed application
///
/// Looks next to the running executable first (the stamped uninstaller
/// lives in the install dir), then falls back to the manifest's default
/// install dir for `--uninstall` runs of the original setup executable.
/// Only a receipt carrying our own app id counts: a receipt some other
/// application wrote must never drive our removal.
pub fn locate(manifest: &Manifest) -> SetupResult<Option<(PathBuf, InstallReceipt)>> {
    let app_id = manifest.effective_app_id();

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(receipt) = matching_receipt(dir, &app_id)? {
                return Ok(Some((dir.to_path_buf(), receipt)));
            }
        }
    }

    let default = expand_install_dir(
        &manifest.install.default_dir,
        &manifest.package.name,
        manifest.install.privileges,
    );
    if let Some(receipt) = matching_receipt(&default, &app_id)? {
        return Ok(Some((default, receipt)));
    }

    Ok(None)
}

/// Read the receipt in `dir`, keeping it only when it belongs to us
fn matching_receipt(dir: &Path, app_id: &str) -> SetupResult<Option<InstallReceipt>> {
    match InstallReceipt::read_from(dir)? {
        Some(receipt) if receipt.app_id == app_id => Ok(Some(receipt)),
        Some(receipt) => {
            tracing::warn!(
                "Receipt in {} belongs to '{}', not '{}'; skipping",
                dir.display(),
                receipt.app_id,
                app_id
            );
            Ok(None)
        }
        None => Ok(None),
    }
}

/// Removal driver over an install receipt
pub struct Uninstaller {
    install_dir: PathBuf,
    receipt: InstallReceipt,
    options: UninstallOptions,
}

impl Uninstaller {
    /// Create an uninstaller for a located receipt
    pub fn new(install_dir: PathBuf, receipt: InstallReceipt, options: UninstallOptions) -> Self {
        Self {
            install_dir,
            receipt,
            options,
        }
    }

    /// The receipt driving this uninstall
    pub fn receipt(&self) -> &InstallReceipt {
        &self.receipt
    }

    /// Run the uninstall end to end
    pub fn run(&self) -> SetupResult<UninstallReport> {
        let mut report = UninstallReport::default();

        if !self.options.silent && !self.confirm()? {
            report.cancelled = true;
            return Ok(report);
        }

        tracing::info!(
            "Uninstalling {} {} from {}",
            self.receipt.name,
            self.receipt.version,
            self.install_dir.display()
        );

        let failed = self.remove_files(&mut report);
        self.remove_shortcuts(&mut report);
        self.prune_dirs(&mut report);
        self.remove_receipt();
        self.remove_self(&mut report)?;

        if failed > 0 {
            return Err(SetupError::Uninstall(format!(
                "{} file(s) could not be removed",
                failed
            )));
        }

        tracing::info!(
            "Removed {} file(s), {} shortcut(s)",
            report.files_removed,
            report.shortcuts_removed
        );
        Ok(report)
    }

    fn confirm(&self) -> SetupResult<bool> {
        let term = Term::stderr();
        term.write_str(&format!(
            "Remove {} {} and all of its files? [y/N]: ",
            self.receipt.name, self.receipt.version
        ))?;
        let line = term.read_line()?;
        Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
    }

    /// Remove recorded files. Returns how many could not be removed.
    fn remove_files(&self, report: &mut UninstallReport) -> usize {
        let mut failed = 0;
        for file in &self.receipt.files {
            let abs = self.install_dir.join(&file.path);
            match fs::remove_file(&abs) {
                Ok(()) => report.files_removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    tracing::debug!("Already gone: {}", file.path);
                    report.files_missing += 1;
                }
                Err(e) => {
                    tracing::warn!("Failed to remove {}: {}", abs.display(), e);
                    failed += 1;
                }
            }
        }
        failed
    }

    fn remove_shortcuts(&self, report: &mut UninstallReport) {
        let mut parents = BTreeSet::new();
        for path in &self.receipt.shortcuts {
            match shortcuts::remove_shortcut(path) {
                Ok(true) => report.shortcuts_removed += 1,
                Ok(false) => tracing::debug!("Shortcut already gone: {}", path.display()),
                Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
            }
            if let Some(parent) = path.parent() {
                parents.insert(parent.to_path_buf());
            }
        }
        // Drops the start-menu group folder once its last shortcut is gone
        for parent in parents {
            let _ = fs::remove_dir(&parent);
        }
    }

    /// Remove directories the recorded files lived in, deepest first.
    /// Directories that still hold user data stay.
    fn prune_dirs(&self, report: &mut UninstallReport) {
        let mut dirs = BTreeSet::new();
        for file in &self.receipt.files {
            let mut cur = Path::new(&file.path).parent();
            while let Some(parent) = cur {
                if parent.as_os_str().is_empty() {
                    break;
                }
                dirs.insert(self.install_dir.join(parent));
                cur = parent.parent();
            }
        }

        let mut dirs: Vec<_> = dirs.into_iter().collect();
        dirs.sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        for dir in dirs {
            if fs::remove_dir(&dir).is_ok() {
                report.dirs_removed += 1;
            }
        }
    }

    fn remove_receipt(&self) {
        let path = InstallReceipt::path_in(&self.install_dir);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
    }

    /// Remove the stamped uninstaller and the install dir itself
    fn remove_self(&self, report: &mut UninstallReport) -> SetupResult<()> {
        let stamped = self
            .install_dir
            .join(format!("uninstall{}", std::env::consts::EXE_SUFFIX));
        let exe = std::env::current_exe()?;

        if cfg!(windows) && same_file(&exe, &stamped) {
            report.finalizer = Some(spawn_finalizer(&self.install_dir)?);
            return Ok(());
        }

        // Unix unlinks a running executable without complaint, and a
        // setup exe run with --uninstall is outside the dir anyway
        if let Err(e) = fs::remove_file(&stamped) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", stamped.display(), e);
            }
        }
        let _ = fs::remove_dir(&self.install_dir);
        report.install_dir_removed = !self.install_dir.exists();
        Ok(())
    }
}

/// Best-effort identity check that tolerates one side being gone
fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

/// Copy the running executable to temp and respawn it to finish the job
fn spawn_finalizer(install_dir: &Path) -> SetupResult<PathBuf> {
    let current = std::env::current_exe()?;
    let temp = std::env::temp_dir().join(format!(
        "setforge-cleanup-{}{}",
        std::process::id(),
        std::env::consts::EXE_SUFFIX
    ));
    fs::copy(&current, &temp)?;
    Command::new(&temp)
        .arg("--finalize-uninstall")
        .arg(install_dir)
        .spawn()
        .map_err(|e| SetupError::Uninstall(format!("Failed to spawn finalizer: {}", e)))?;
    tracing::debug!("Finalizer handed off to {}", temp.display());
    Ok(temp)
}

/// Second stage of a Windows self-delete: remove the stamped executable
/// once the parent process has released it, then the install dir.
/// The temp copy itself is left for the OS temp cleanup.
pub fn finalize_uninstall(install_dir: &Path) -> SetupResult<()> {
    let stamped = install_dir.join(format!("uninstall{}", std::env::consts::EXE_SUFFIX));

    for _ in 0..50 {
        match fs::remove_file(&stamped) {
            Ok(()) => break,
            Err(e) if e.kind() == ErrorKind::NotFound => break,
            Err(_) => std::thread::sleep(Duration::from_millis(100)),
        }
    }

    let _ = fs::remove_file(InstallReceipt::path_in(install_dir));
    let _ = fs::remove_dir(install_dir);
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
