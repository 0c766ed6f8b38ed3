//! Install personality: runs when the executable carries a payload
//!
//! The flow mirrors a classic setup wizard, reduced to the terminal:
//! architecture gate, directory and task resolution (prompted unless
//! silent), extraction, shortcuts, uninstaller stamping, receipt. Every
//! write lands in a rollback log so a failed install removes what it
//! created instead of leaving a half-populated directory.

use crate::error::{SetupError, SetupResult};
use crate::icon::{self, IconFormat};
use crate::manifest::{expand_install_dir, Manifest, RunConfig, ShortcutPlacement};
use crate::payload::{hash_files, unix_now, Payload};
use crate::progress::{progress_bar, ProgressExt};
use crate::receipt::{short_hash, InstallReceipt, ReceiptFile};
use crate::shortcuts::{self, ShortcutDirs};
use console::{style, Term};
use indicatif::ProgressBar;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Options parsed from the installer command line
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Unattended: no prompts, defaults everywhere, no post-install launch
    /// (unless the manifest opts out of the skip)
    pub silent: bool,
    /// Install directory override
    pub dir: Option<PathBuf>,
    /// Task selection override (replaces the defaults entirely)
    pub tasks: Option<Vec<String>>,
    /// Never run the post-install action
    pub no_launch: bool,
    /// Shortcut base dir override, used by tests and sandboxed installs
    pub shortcut_dirs: Option<ShortcutDirs>,
}

/// Outcome of the post-install action decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchDecision {
    /// Run the configured command
    Run { target: String, args: Vec<String> },
    /// Suppressed: silent install and the action skips when silent
    SkippedSilent,
    /// Suppressed by --no-launch
    SkippedNoLaunch,
    /// The manifest has no [run] section
    NotConfigured,
}

/// Summary of a completed install
#[derive(Debug, Clone)]
pub struct InstallReport {
    /// Where the application landed
    pub install_dir: PathBuf,
    /// Files written by this run
    pub files_installed: usize,
    /// Files left in place (keep-existing rules)
    pub files_kept: usize,
    /// Shortcut files created
    pub shortcuts: Vec<PathBuf>,
    /// Task ids that were selected
    pub tasks: Vec<String>,
    /// Receipt location
    pub receipt_path: PathBuf,
    /// Stamped uninstaller location
    pub uninstaller_path: PathBuf,
    /// What happens with the post-install action
    pub launch: LaunchDecision,
}

/// Decide whether the post-install action runs
pub fn launch_decision(run: Option<&RunConfig>, silent: bool, no_launch: bool) -> LaunchDecision {
    let Some(run) = run else {
        return LaunchDecision::NotConfigured;
    };
    if no_launch {
        return LaunchDecision::SkippedNoLaunch;
    }
    if silent && run.skip_if_silent {
        return LaunchDecision::SkippedSilent;
    }
    LaunchDecision::Run {
        target: run.target.clone(),
        args: run.args.clone(),
    }
}

/// Validate a task override list against the manifest
pub fn resolve_tasks(manifest: &Manifest, selection: Option<&[String]>) -> SetupResult<Vec<String>> {
    match selection {
        Some(ids) => {
            for id in ids {
                if manifest.task(id).is_none() {
                    return Err(SetupError::Install(format!("Unknown task: {}", id)));
                }
            }
            Ok(ids.to_vec())
        }
        None => Ok(manifest.default_task_ids()),
    }
}

/// Log of writes performed by this run, undone on failure
///
/// Files the run overwrites (a reinstall over an existing tree) are
/// copied aside first; `undo` puts them back, so a failed upgrade
/// leaves the previous install usable.
#[derive(Debug, Default)]
struct Rollback {
    files: Vec<PathBuf>,
    dirs: Vec<PathBuf>,
    backups: Vec<(PathBuf, PathBuf)>,
    backup_dir: Option<PathBuf>,
}

impl Rollback {
    /// Record a path about to be written: copy it aside when a file is
    /// already there, otherwise mark it for removal on undo.
    fn will_write(&mut self, path: &Path) -> SetupResult<()> {
        if path.is_file() {
            self.backup(path)
        } else {
            self.files.push(path.to_path_buf());
            Ok(())
        }
    }

    fn backup(&mut self, original: &Path) -> SetupResult<()> {
        let dir = match self.backup_dir {
            Some(ref dir) => dir.clone(),
            None => {
                let dir =
                    std::env::temp_dir().join(format!("setforge-backup-{}", std::process::id()));
                fs::create_dir_all(&dir)?;
                self.backup_dir = Some(dir.clone());
                dir
            }
        };
        let slot = dir.join(self.backups.len().to_string());
        fs::copy(original, &slot)?;
        self.backups.push((original.to_path_buf(), slot));
        Ok(())
    }

    /// Remove everything this run created and put back what it
    /// overwrote. Created files first, then restores, then directories
    /// deepest-first; non-empty directories are left alone.
    fn undo(&mut self) {
        for file in self.files.drain(..).rev() {
            if let Err(e) = fs::remove_file(&file) {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!("Rollback: failed to remove {}: {}", file.display(), e);
                }
            }
        }
        for (original, slot) in self.backups.drain(..).rev() {
            if let Err(e) = fs::copy(&slot, &original) {
                tracing::warn!("Rollback: failed to restore {}: {}", original.display(), e);
            }
        }
        self.dirs
            .sort_by_key(|d| std::cmp::Reverse(d.components().count()));
        for dir in self.dirs.drain(..) {
            let _ = fs::remove_dir(&dir);
        }
        self.discard();
    }

    /// Drop the copied-aside files once they are no longer needed
    fn discard(&mut self) {
        self.backups.clear();
        if let Some(dir) = self.backup_dir.take() {
            let _ = fs::remove_dir_all(&dir);
        }
    }
}

/// Translate a permission failure under `dir` into install guidance
fn permission_hint(e: SetupError, dir: &Path) -> SetupError {
    match e {
        SetupError::Io(io) if io.kind() == ErrorKind::PermissionDenied => {
            SetupError::Install(format!(
                "Cannot write to {}: run elevated or choose a user directory",
                dir.display()
            ))
        }
        other => other,
    }
}

/// Create a directory chain, recording the components that did not exist
fn create_dirs_tracked(path: &Path, rollback: &mut Rollback) -> SetupResult<()> {
    let mut missing = Vec::new();
    let mut cur = path;
    while !cur.exists() {
        missing.push(cur.to_path_buf());
        match cur.parent() {
            Some(parent) => cur = parent,
            None => break,
        }
    }
    fs::create_dir_all(path)?;
    rollback.dirs.extend(missing);
    Ok(())
}

/// Install driver over a payload read from the running executable
pub struct Installer {
    payload: Payload,
    options: InstallOptions,
}

impl Installer {
    /// Create an installer for a payload
    pub fn new(payload: Payload, options: InstallOptions) -> Self {
        Self { payload, options }
    }

    /// The embedded manifest
    pub fn manifest(&self) -> &Manifest {
        &self.payload.manifest
    }

    /// Run the install end to end (everything except the launch spawn)
    pub fn run(&self) -> SetupResult<InstallReport> {
        let manifest = &self.payload.manifest;

        self.check_arch()?;
        self.verify_payload()?;

        if !self.options.silent {
            self.print_welcome()?;
        }

        let install_dir = self.resolve_install_dir()?;
        let tasks = self.resolve_task_selection()?;

        tracing::info!(
            "Installing {} {} to {} (tasks: [{}])",
            manifest.package.name,
            manifest.package.version,
            install_dir.display(),
            tasks.join(", ")
        );

        let mut rollback = Rollback::default();
        match self.install_to(&install_dir, &tasks, &mut rollback) {
            Ok(report) => {
                rollback.discard();
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(
                    "Install failed, rolling back {} write(s): {}",
                    rollback.files.len() + rollback.backups.len(),
                    e
                );
                rollback.undo();
                Err(e)
            }
        }
    }

    /// Spawn the post-install action when the report says to.
    /// Returns whether a process was started.
    pub fn launch(&self, report: &InstallReport) -> SetupResult<bool> {
        let LaunchDecision::Run { target, args } = &report.launch else {
            return Ok(false);
        };
        let abs = report.install_dir.join(target);
        tracing::info!("Launching {}", abs.display());
        Command::new(&abs)
            .args(args)
            .current_dir(&report.install_dir)
            .spawn()
            .map_err(|e| {
                SetupError::Install(format!("Failed to launch {}: {}", abs.display(), e))
            })?;
        Ok(true)
    }

    fn check_arch(&self) -> SetupResult<()> {
        let manifest = &self.payload.manifest;
        let actual = std::env::consts::ARCH;
        if manifest.supports_arch(actual) {
            return Ok(());
        }
        Err(SetupError::UnsupportedArch {
            supported: manifest.install.architectures.join(", "),
            actual: actual.to_string(),
        })
    }

    /// Recompute the content hash over the extracted files and compare
    /// with the one stamped at build time.
    fn verify_payload(&self) -> SetupResult<()> {
        let actual = hash_files(&self.payload.files);
        if actual != self.payload.content_hash {
            return Err(SetupError::InvalidPayload(format!(
                "Content hash mismatch: expected {}, got {}",
                self.payload.content_hash, actual
            )));
        }
        Ok(())
    }

    fn print_welcome(&self) -> SetupResult<()> {
        let manifest = &self.payload.manifest;
        let term = Term::stderr();
        term.write_line(&format!(
            "{} {} {}",
            style("Setup:").bold(),
            style(&manifest.package.name).cyan().bold(),
            manifest.package.version
        ))?;
        if let Some(ref publisher) = manifest.package.publisher {
            term.write_line(&format!("Publisher: {}", publisher))?;
        }
        term.write_line("")?;
        Ok(())
    }

    fn resolve_install_dir(&self) -> SetupResult<PathBuf> {
        if let Some(ref dir) = self.options.dir {
            return Ok(dir.clone());
        }
        let manifest = &self.payload.manifest;
        let default = expand_install_dir(
            &manifest.install.default_dir,
            &manifest.package.name,
            manifest.install.privileges,
        );
        if self.options.silent {
            return Ok(default);
        }
        prompt_install_dir(&default)
    }

    fn resolve_task_selection(&self) -> SetupResult<Vec<String>> {
        let manifest = &self.payload.manifest;
        if let Some(ref selection) = self.options.tasks {
            return resolve_tasks(manifest, Some(selection));
        }
        if self.options.silent || manifest.tasks.is_empty() {
            return resolve_tasks(manifest, None);
        }
        prompt_tasks(manifest)
    }

    fn install_to(
        &self,
        install_dir: &Path,
        tasks: &[String],
        rollback: &mut Rollback,
    ) -> SetupResult<InstallReport> {
        let manifest = &self.payload.manifest;

        // Creating the target root doubles as the first writability
        // check, but a pre-existing unwritable root only surfaces
        // during extraction
        create_dirs_tracked(install_dir, rollback)
            .map_err(|e| permission_hint(e, install_dir))?;

        let (files_installed, files_kept, mut receipt_files) = self
            .extract_files(install_dir, rollback)
            .map_err(|e| permission_hint(e, install_dir))?;

        let icon_path = self.materialize_icon(install_dir, rollback, &mut receipt_files)?;
        let shortcut_paths =
            self.create_shortcuts(install_dir, tasks, icon_path.as_deref(), rollback)?;
        let uninstaller_path = self.stamp_uninstaller(install_dir, rollback)?;

        let receipt = InstallReceipt {
            app_id: manifest.effective_app_id(),
            name: manifest.package.name.clone(),
            version: manifest.package.version.clone(),
            publisher: manifest.package.publisher.clone(),
            install_dir: install_dir.to_path_buf(),
            files: receipt_files,
            shortcuts: shortcut_paths.clone(),
            tasks: tasks.to_vec(),
            installed_unix: unix_now(),
        };
        rollback.will_write(&InstallReceipt::path_in(install_dir))?;
        let receipt_path = receipt.write_to(install_dir)?;

        let launch = launch_decision(
            manifest.run.as_ref(),
            self.options.silent,
            self.options.no_launch,
        );

        tracing::info!(
            "Installed {} file(s), {} shortcut(s) to {}",
            files_installed,
            shortcut_paths.len(),
            install_dir.display()
        );

        Ok(InstallReport {
            install_dir: install_dir.to_path_buf(),
            files_installed,
            files_kept,
            shortcuts: shortcut_paths,
            tasks: tasks.to_vec(),
            receipt_path,
            uninstaller_path,
            launch,
        })
    }

    /// Write the payload files under the install dir
    fn extract_files(
        &self,
        install_dir: &Path,
        rollback: &mut Rollback,
    ) -> SetupResult<(usize, usize, Vec<ReceiptFile>)> {
        let pb = if self.options.silent {
            ProgressBar::hidden()
        } else {
            progress_bar(self.payload.files.len() as u64, "Installing files")
        };

        let mut installed = 0;
        let mut kept = 0;
        let mut receipt_files = Vec::new();

        for file in &self.payload.files {
            let abs = install_dir.join(&file.dest);

            if file.keep_existing && abs.exists() {
                tracing::debug!("Keeping existing file: {}", file.dest);
                kept += 1;
                pb.inc(1);
                continue;
            }

            if let Some(parent) = abs.parent() {
                create_dirs_tracked(parent, rollback)?;
            }

            rollback.will_write(&abs)?;
            fs::write(&abs, &file.contents)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if file.mode != 0 {
                    fs::set_permissions(&abs, fs::Permissions::from_mode(file.mode))?;
                }
            }

            receipt_files.push(ReceiptFile {
                path: file.dest.clone(),
                size: file.contents.len() as u64,
                hash: short_hash(&file.contents),
            });
            installed += 1;
            pb.inc(1);
        }

        pb.finish_success(&format!("{} file(s) installed", installed));
        Ok((installed, kept, receipt_files))
    }

    /// Write the embedded icon next to the receipt for shortcuts to use
    fn materialize_icon(
        &self,
        install_dir: &Path,
        rollback: &mut Rollback,
        receipt_files: &mut Vec<ReceiptFile>,
    ) -> SetupResult<Option<PathBuf>> {
        let Some(ref ico) = self.payload.icon else {
            return Ok(None);
        };
        let app_id = self.payload.manifest.effective_app_id();

        let (name, data) = if cfg!(windows) {
            (format!("{}.ico", app_id), ico.clone())
        } else {
            // .desktop entries want PNG
            let converted = icon::convert_icon_data(ico, IconFormat::Ico)?;
            (format!("{}.png", app_id), converted.png_data)
        };

        let path = install_dir.join(&name);
        rollback.will_write(&path)?;
        fs::write(&path, &data)?;
        receipt_files.push(ReceiptFile {
            path: name,
            size: data.len() as u64,
            hash: short_hash(&data),
        });
        Ok(Some(path))
    }

    /// Create the configured shortcuts, honoring task gates
    fn create_shortcuts(
        &self,
        install_dir: &Path,
        tasks: &[String],
        fallback_icon: Option<&Path>,
        rollback: &mut Rollback,
    ) -> SetupResult<Vec<PathBuf>> {
        let manifest = &self.payload.manifest;
        if manifest.shortcuts.is_empty() {
            return Ok(Vec::new());
        }

        let dirs = match self.options.shortcut_dirs {
            Some(ref dirs) => dirs.clone(),
            None => ShortcutDirs::resolve()?,
        };
        // Start-menu folders only exist on Windows; XDG menus are flat
        let group_dir = if cfg!(windows) {
            dirs.start_menu.join(manifest.effective_group())
        } else {
            dirs.start_menu.clone()
        };

        let mut created = Vec::new();
        for entry in &manifest.shortcuts {
            if let Some(ref task) = entry.task {
                if !tasks.iter().any(|t| t == task) {
                    tracing::debug!("Skipping shortcut '{}' (task {} off)", entry.name, task);
                    continue;
                }
            }

            let base = match entry.placement {
                ShortcutPlacement::StartMenu => &group_dir,
                ShortcutPlacement::Desktop => &dirs.desktop,
            };
            create_dirs_tracked(base, rollback)?;

            let path = shortcuts::shortcut_path(base, &entry.name)?;
            let target = install_dir.join(&entry.target);
            let icon = entry
                .icon
                .as_ref()
                .map(|i| install_dir.join(i))
                .or_else(|| fallback_icon.map(Path::to_path_buf));

            rollback.will_write(&path)?;
            shortcuts::create_shortcut(&path, &entry.name, &target, icon.as_deref())?;
            created.push(path);
        }

        Ok(created)
    }

    /// Copy the running executable (payload included) as the uninstaller
    fn stamp_uninstaller(
        &self,
        install_dir: &Path,
        rollback: &mut Rollback,
    ) -> SetupResult<PathBuf> {
        let current = std::env::current_exe()?;
        let dest = install_dir.join(format!("uninstall{}", std::env::consts::EXE_SUFFIX));
        if current != dest {
            rollback.will_write(&dest)?;
            fs::copy(&current, &dest)?;
        }
        Ok(dest)
    }
}

fn prompt_install_dir(default: &Path) -> SetupResult<PathBuf> {
    let term = Term::stderr();
    term.write_str(&format!(
        "Install directory [{}]: ",
        style(default.display()).cyan()
    ))?;
    let line = term.read_line()?;
    let trimmed = line.trim();
    if trimmed.is_empty() {
        Ok(default.to_path_buf())
    } else {
        Ok(PathBuf::from(trimmed))
    }
}

fn prompt_tasks(manifest: &Manifest) -> SetupResult<Vec<String>> {
    let term = Term::stderr();
    let mut selected = Vec::new();
    for task in &manifest.tasks {
        let hint = if task.default { "Y/n" } else { "y/N" };
        term.write_str(&format!("{} [{}]: ", task.description, hint))?;
        let line = term.read_line()?;
        let enabled = match line.trim().to_lowercase().as_str() {
            "" => task.default,
            "y" | "yes" => true,
            _ => false,
        };
        if enabled {
            selected.push(task.id.clone());
        }
    }
    Ok(selected)
}
