//! Shortcut creation and removal
//!
//! Windows shortcuts are `.lnk` files written through the WScript.Shell
//! COM object via PowerShell. Everywhere else they are freedesktop
//! `.desktop` entries. Base directories are resolved per user and can be
//! overridden, which is what the tests do.

use crate::error::{SetupError, SetupResult};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Base directories shortcuts are placed under
#[derive(Debug, Clone)]
pub struct ShortcutDirs {
    /// Start-menu programs dir (XDG applications dir on non-Windows)
    pub start_menu: PathBuf,
    /// Desktop dir
    pub desktop: PathBuf,
}

impl ShortcutDirs {
    /// Resolve the current user's shortcut directories
    ///
    /// `SETFORGE_START_MENU_DIR` and `SETFORGE_DESKTOP_DIR` override the
    /// platform defaults, which sandboxed installs rely on.
    pub fn resolve() -> SetupResult<Self> {
        let start_menu = match std::env::var_os("SETFORGE_START_MENU_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_start_menu_dir()?,
        };
        let desktop = match std::env::var_os("SETFORGE_DESKTOP_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_desktop_dir()?,
        };
        Ok(Self { start_menu, desktop })
    }

    /// Fixed directories, for tests and sandboxed installs
    pub fn rooted(start_menu: impl Into<PathBuf>, desktop: impl Into<PathBuf>) -> Self {
        Self {
            start_menu: start_menu.into(),
            desktop: desktop.into(),
        }
    }
}

fn default_start_menu_dir() -> SetupResult<PathBuf> {
    if cfg!(windows) {
        let appdata = std::env::var("APPDATA")
            .map_err(|_| SetupError::Shortcut("APPDATA not set".to_string()))?;
        Ok(PathBuf::from(appdata)
            .join("Microsoft")
            .join("Windows")
            .join("Start Menu")
            .join("Programs"))
    } else {
        let data = dirs::data_dir()
            .ok_or_else(|| SetupError::Shortcut("No data directory for this user".to_string()))?;
        Ok(data.join("applications"))
    }
}

fn default_desktop_dir() -> SetupResult<PathBuf> {
    dirs::desktop_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Desktop")))
        .ok_or_else(|| SetupError::Shortcut("No desktop directory for this user".to_string()))
}

/// Compute the file path a shortcut lands at under a base dir
pub fn shortcut_path(base_dir: &Path, name: &str) -> SetupResult<PathBuf> {
    if name.is_empty() {
        return Err(SetupError::Shortcut("shortcut name is empty".to_string()));
    }
    let ext = if cfg!(windows) { "lnk" } else { "desktop" };
    Ok(base_dir.join(format!("{}.{}", name, ext)))
}

/// Create a shortcut file pointing at a target executable
///
/// Parent directories are created as needed. `icon` is an absolute path to
/// an icon file when one was installed.
pub fn create_shortcut(
    path: &Path,
    name: &str,
    target: &Path,
    icon: Option<&Path>,
) -> SetupResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if cfg!(windows) {
        create_lnk(path, target, icon)
    } else {
        create_desktop_entry(path, name, target, icon)
    }
}

/// Remove a shortcut file. Returns `false` when it was already gone.
pub fn remove_shortcut(path: &Path) -> SetupResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SetupError::Shortcut(format!(
            "Failed to remove {}: {}",
            path.display(),
            e
        ))),
    }
}

fn create_lnk(path: &Path, target: &Path, icon: Option<&Path>) -> SetupResult<()> {
    let lnk = ps_quote(&path.display().to_string());
    let tgt = ps_quote(&target.display().to_string());
    let dir = target
        .parent()
        .map(|p| ps_quote(&p.display().to_string()));
    let icon = icon.map(|p| ps_quote(&p.display().to_string()));

    let mut script = format!(
        "$WshShell = New-Object -ComObject WScript.Shell; \
         $Shortcut = $WshShell.CreateShortcut({lnk}); \
         $Shortcut.TargetPath = {tgt}; "
    );
    if let Some(working_dir) = dir {
        script.push_str(&format!("$Shortcut.WorkingDirectory = {working_dir}; "));
    }
    if let Some(icon_path) = icon {
        script.push_str(&format!("$Shortcut.IconLocation = {icon_path}; "));
    }
    script.push_str("$Shortcut.Save();");

    let status = Command::new("powershell")
        .arg("-NoProfile")
        .arg("-Command")
        .arg(script)
        .status()
        .map_err(|e| SetupError::Shortcut(format!("Failed to run powershell: {}", e)))?;

    if !status.success() {
        return Err(SetupError::Shortcut(format!(
            "Failed to create shortcut (exit {:?})",
            status.code()
        )));
    }

    tracing::debug!("Created shortcut: {}", path.display());
    Ok(())
}

fn create_desktop_entry(
    path: &Path,
    name: &str,
    target: &Path,
    icon: Option<&Path>,
) -> SetupResult<()> {
    let mut entry = String::from("[Desktop Entry]\nType=Application\n");
    entry.push_str(&format!("Name={}\n", name));
    entry.push_str(&format!("Exec=\"{}\"\n", target.display()));
    if let Some(icon_path) = icon {
        entry.push_str(&format!("Icon={}\n", icon_path.display()));
    }
    entry.push_str("Terminal=false\n");

    fs::write(path, entry)
        .map_err(|e| SetupError::Shortcut(format!("Failed to write {}: {}", path.display(), e)))?;

    // Some desktop environments only honor executable entries
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }

    tracing::debug!("Created shortcut: {}", path.display());
    Ok(())
}

fn ps_quote(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    format!("'{}'", escaped)
}
