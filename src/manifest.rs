//! Manifest file parser for setforge
//!
//! This module provides support for `setforge.toml` manifest files, the
//! declarative description of what to package and how to install it.
//!
//! ## Configuration Hierarchy
//!
//! ```toml
//! [package]                    # Package metadata & identity
//! name = "my-app"
//! version = "1.2.0"
//! publisher = "Example Corp"
//! copyright = "Copyright 2026 Example Corp"
//! homepage = "https://example.com"
//! app_id = "com.example.my-app"
//! icon = "assets/app.png"      # PNG, JPG, or ICO; converted as needed
//!
//! [install]                    # Install-time options
//! default_dir = "{pf}/{name}"  # {pf} {localappdata} {home} {name}
//! privileges = "user"          # "user" | "admin"
//! architectures = ["x86_64"]   # empty = any
//! start_menu_group = "My App"
//!
//! [[files]]                    # File-copy rules (at least one required)
//! source = "build/*"           # glob, relative to the source root
//! dest = ""                    # relative to the install dir
//! recursive = true             # walk matched directories
//! overwrite = true             # false = keep existing destination files
//!
//! [[files]]
//! source = "docs/**/*.md"
//! dest = "docs"
//!
//! [[shortcuts]]
//! name = "My App"
//! target = "my-app.exe"        # relative to the install dir
//! placement = "start-menu"     # "start-menu" | "desktop"
//!
//! [[shortcuts]]
//! name = "My App"
//! target = "my-app.exe"
//! placement = "desktop"
//! task = "desktopicon"         # only created when the task is selected
//!
//! [[tasks]]                    # User-toggleable install options
//! id = "desktopicon"
//! description = "Create a desktop icon"
//! default = false
//!
//! [run]                        # Optional post-install action
//! target = "my-app.exe"
//! args = []
//! skip_if_silent = true
//!
//! [build]                      # Artifact output settings
//! output_dir = "dist"
//! output_name = "{name}-{version}-setup"
//! compression = "zstd"         # "zstd" | "gzip" | "none"
//! level = 19
//! checksum = true              # write a .sha256 sidecar
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

use crate::error::{SetupError, SetupResult};

/// Normalize a path by removing `.` and resolving `..` components
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {} // Skip `.`
            Component::ParentDir => {
                // Pop the last component if it's a normal component
                if let Some(Component::Normal(_)) = components.last() {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            _ => components.push(component),
        }
    }
    components.iter().collect()
}

/// Normalize an install-relative path to forward slashes.
///
/// Returns `None` when the path is absolute, contains a drive prefix, or
/// escapes upward through `..`. The empty string is valid and means the
/// install dir itself.
pub fn normalize_rel(path: &str) -> Option<String> {
    let unified = path.replace('\\', "/");
    if unified.starts_with('/') {
        return None;
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in unified.split('/') {
        match part {
            "" | "." => {}
            ".." => return None,
            p if p.contains(':') => return None,
            p => parts.push(p),
        }
    }
    Some(parts.join("/"))
}

// ============================================================================
// Root Manifest Structure
// ============================================================================

/// Root manifest structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Package metadata
    pub package: PackageConfig,

    /// Install-time options
    #[serde(default)]
    pub install: InstallConfig,

    /// File-copy rules ([[files]])
    #[serde(default)]
    pub files: Vec<FileEntry>,

    /// Shortcut entries ([[shortcuts]])
    #[serde(default)]
    pub shortcuts: Vec<ShortcutEntry>,

    /// User-toggleable tasks ([[tasks]])
    #[serde(default)]
    pub tasks: Vec<TaskEntry>,

    /// Post-install action ([run])
    #[serde(default)]
    pub run: Option<RunConfig>,

    /// Artifact output settings ([build])
    #[serde(default)]
    pub build: BuildConfig,
}

// ============================================================================
// Package Configuration
// ============================================================================

/// Package metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Package name (used for the install dir and artifact name)
    pub name: String,

    /// Package version
    #[serde(default = "default_version")]
    pub version: String,

    /// Publisher / vendor name
    #[serde(default)]
    pub publisher: Option<String>,

    /// Copyright string
    #[serde(default)]
    pub copyright: Option<String>,

    /// Homepage URL
    #[serde(default)]
    pub homepage: Option<String>,

    /// Stable application identifier (e.g., "com.example.myapp").
    /// Defaults to the lowercased package name.
    #[serde(default)]
    pub app_id: Option<String>,

    /// Application icon path (PNG, JPG, or ICO), relative to the manifest
    #[serde(default)]
    pub icon: Option<PathBuf>,

    /// Short description shown by `inspect`
    #[serde(default)]
    pub description: Option<String>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

// ============================================================================
// Install Configuration
// ============================================================================

/// Privilege level the installer runs at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Privileges {
    /// Per-user install, no elevation
    #[default]
    User,
    /// Machine-wide install, requires an elevated process
    Admin,
}

/// Install-time options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Default install directory template. Placeholders: `{pf}`,
    /// `{localappdata}`, `{home}`, `{name}`.
    #[serde(default = "default_install_dir")]
    pub default_dir: String,

    /// Privilege level: "user" or "admin"
    #[serde(default)]
    pub privileges: Privileges,

    /// Supported machine architectures (e.g., "x86_64", "aarch64").
    /// Empty means any.
    #[serde(default)]
    pub architectures: Vec<String>,

    /// Start-menu folder name (defaults to the package name)
    #[serde(default)]
    pub start_menu_group: Option<String>,
}

fn default_install_dir() -> String {
    "{pf}/{name}".to_string()
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            default_dir: default_install_dir(),
            privileges: Privileges::default(),
            architectures: Vec::new(),
            start_menu_group: None,
        }
    }
}

// ============================================================================
// File Entries
// ============================================================================

/// A file-copy rule: glob source, install-relative destination
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Source glob pattern, relative to the source root (may be absolute)
    pub source: String,

    /// Destination directory relative to the install dir ("" = root)
    #[serde(default)]
    pub dest: String,

    /// Walk directories matched by the glob
    #[serde(default = "default_true")]
    pub recursive: bool,

    /// Replace existing destination files at install time
    #[serde(default = "default_true")]
    pub overwrite: bool,

    /// Extra exclusion patterns applied while walking
    #[serde(default)]
    pub exclude: Vec<String>,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Shortcut Entries
// ============================================================================

/// Where a shortcut is created
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ShortcutPlacement {
    /// Under the start-menu group folder
    #[default]
    StartMenu,
    /// On the user's desktop
    Desktop,
}

/// A launchable reference created at install time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortcutEntry {
    /// Display name (becomes the shortcut file name)
    pub name: String,

    /// Target executable, relative to the install dir
    pub target: String,

    /// Icon path relative to the install dir. When unset, the package
    /// icon applies if one is embedded; otherwise the platform derives
    /// an icon from the target.
    #[serde(default)]
    pub icon: Option<String>,

    /// Placement: start menu group or desktop
    #[serde(default)]
    pub placement: ShortcutPlacement,

    /// Task id gating creation of this shortcut
    #[serde(default)]
    pub task: Option<String>,
}

// ============================================================================
// Tasks
// ============================================================================

/// A named, user-toggleable installation option
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEntry {
    /// Unique task id referenced by shortcuts (e.g., "desktopicon")
    pub id: String,

    /// Description shown in the interactive prompt
    #[serde(default)]
    pub description: String,

    /// Whether the task is selected by default
    #[serde(default)]
    pub default: bool,
}

// ============================================================================
// Post-Install Action
// ============================================================================

/// Optional command run once at the end of install
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command target, relative to the install dir
    pub target: String,

    /// Arguments passed to the command
    #[serde(default)]
    pub args: Vec<String>,

    /// Suppress the action during silent installs
    #[serde(default = "default_true")]
    pub skip_if_silent: bool,
}

// ============================================================================
// Build Configuration
// ============================================================================

/// Payload compression scheme
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    /// Zstandard (default)
    #[default]
    Zstd,
    /// Gzip via flate2
    Gzip,
    /// Store the archive uncompressed
    None,
}

impl CompressionKind {
    /// Default compression level for this scheme
    pub fn default_level(&self) -> i32 {
        match self {
            CompressionKind::Zstd => default_compression_level(),
            CompressionKind::Gzip => 6,
            CompressionKind::None => 0,
        }
    }
}

/// Artifact output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Output directory, relative to the manifest
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Artifact base name template; `{name}` and `{version}` are expanded.
    /// The platform executable extension is appended.
    #[serde(default)]
    pub output_name: Option<String>,

    /// Payload compression scheme
    #[serde(default)]
    pub compression: CompressionKind,

    /// Compression level (1-22 for zstd, 0-9 for gzip)
    /// Higher levels = better compression but slower packing
    #[serde(default)]
    pub level: Option<i32>,

    /// Write a `<artifact>.sha256` sidecar
    #[serde(default = "default_true")]
    pub checksum: bool,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_compression_level() -> i32 {
    19
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            output_name: None,
            compression: CompressionKind::default(),
            level: None,
            checksum: default_true(),
        }
    }
}

// ============================================================================
// Install Directory Expansion
// ============================================================================

/// Root directory for installed programs at the given privilege level
fn programs_root(privileges: Privileges) -> PathBuf {
    match privileges {
        Privileges::Admin => {
            if cfg!(windows) {
                std::env::var_os("ProgramFiles")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(r"C:\Program Files"))
            } else {
                PathBuf::from("/opt")
            }
        }
        Privileges::User => {
            let local = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
            if cfg!(windows) {
                local.join("Programs")
            } else {
                local
            }
        }
    }
}

const DIR_PLACEHOLDERS: [&str; 4] = ["pf", "localappdata", "home", "name"];

/// First unknown `{token}` in an install-dir template, if any
fn unknown_placeholder(template: &str) -> Option<String> {
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let end = after.find('}')?;
        let token = &after[..end];
        if !DIR_PLACEHOLDERS.contains(&token) {
            return Some(format!("{{{}}}", token));
        }
        rest = &after[end + 1..];
    }
    None
}

/// Expand an install-dir template into a concrete path for this machine
pub fn expand_install_dir(template: &str, name: &str, privileges: Privileges) -> PathBuf {
    let pf = programs_root(privileges);
    let local = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    let expanded = template
        .replace("{pf}", &pf.to_string_lossy())
        .replace("{localappdata}", &local.to_string_lossy())
        .replace("{home}", &home.to_string_lossy())
        .replace("{name}", name);
    normalize_path(Path::new(&expanded))
}

// ============================================================================
// Manifest Implementation
// ============================================================================

impl Manifest {
    /// Load manifest from a file
    pub fn from_file(path: impl AsRef<Path>) -> SetupResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SetupError::InvalidManifest(format!(
                "Failed to read manifest file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    /// Parse manifest from TOML string
    pub fn parse(content: &str) -> SetupResult<Self> {
        toml::from_str(content)
            .map_err(|e| SetupError::InvalidManifest(format!("Failed to parse manifest: {}", e)))
    }

    /// Find manifest file in directory
    pub fn find_in_dir(dir: impl AsRef<Path>) -> Option<PathBuf> {
        let dir = dir.as_ref();
        let candidates = ["setforge.toml", "setup.toml", ".setforge/setforge.toml"];

        for name in candidates {
            let path = dir.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    /// Validate the manifest configuration
    pub fn validate(&self) -> SetupResult<()> {
        let name = self.package.name.trim();
        if name.is_empty() {
            return Err(SetupError::InvalidManifest(
                "package.name must not be empty".to_string(),
            ));
        }
        if name.contains('/') || name.contains('\\') {
            return Err(SetupError::InvalidManifest(format!(
                "package.name must not contain path separators: {}",
                name
            )));
        }
        if self.package.version.trim().is_empty() {
            return Err(SetupError::InvalidManifest(
                "package.version must not be empty".to_string(),
            ));
        }
        if let Some(ref id) = self.package.app_id {
            let ok = !id.is_empty()
                && id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
            if !ok {
                return Err(SetupError::InvalidManifest(format!(
                    "package.app_id may only contain alphanumerics, '.', '-', '_': {}",
                    id
                )));
            }
        }

        if let Some(unknown) = unknown_placeholder(&self.install.default_dir) {
            return Err(SetupError::InvalidManifest(format!(
                "install.default_dir uses unknown placeholder {}",
                unknown
            )));
        }
        for arch in &self.install.architectures {
            if arch.trim().is_empty() {
                return Err(SetupError::InvalidManifest(
                    "install.architectures entries must not be empty".to_string(),
                ));
            }
        }

        if self.files.is_empty() {
            return Err(SetupError::InvalidManifest(
                "at least one [[files]] entry is required".to_string(),
            ));
        }
        for entry in &self.files {
            if entry.source.trim().is_empty() {
                return Err(SetupError::InvalidManifest(
                    "[[files]] source must not be empty".to_string(),
                ));
            }
            if normalize_rel(&entry.dest).is_none() {
                return Err(SetupError::InvalidManifest(format!(
                    "[[files]] dest must stay inside the install dir: {}",
                    entry.dest
                )));
            }
        }

        let mut task_ids = Vec::new();
        for task in &self.tasks {
            let ok = !task.id.is_empty()
                && task
                    .id
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
            if !ok {
                return Err(SetupError::InvalidManifest(format!(
                    "task id may only contain alphanumerics, '-', '_': {:?}",
                    task.id
                )));
            }
            if task_ids.contains(&task.id) {
                return Err(SetupError::InvalidManifest(format!(
                    "duplicate task id: {}",
                    task.id
                )));
            }
            task_ids.push(task.id.clone());
        }

        for shortcut in &self.shortcuts {
            let name = shortcut.name.trim();
            if name.is_empty() || name.contains('/') || name.contains('\\') {
                return Err(SetupError::InvalidManifest(format!(
                    "shortcut name must be non-empty and free of path separators: {:?}",
                    shortcut.name
                )));
            }
            match normalize_rel(&shortcut.target) {
                Some(ref t) if !t.is_empty() => {}
                _ => {
                    return Err(SetupError::InvalidManifest(format!(
                        "shortcut '{}' target must be a relative path inside the install dir: {}",
                        shortcut.name, shortcut.target
                    )));
                }
            }
            if let Some(ref icon) = shortcut.icon {
                if normalize_rel(icon).is_none() {
                    return Err(SetupError::InvalidManifest(format!(
                        "shortcut '{}' icon must stay inside the install dir: {}",
                        shortcut.name, icon
                    )));
                }
            }
            if let Some(ref task) = shortcut.task {
                if !task_ids.contains(task) {
                    return Err(SetupError::InvalidManifest(format!(
                        "shortcut '{}' references unknown task: {}",
                        shortcut.name, task
                    )));
                }
            }
        }

        if let Some(ref run) = self.run {
            match normalize_rel(&run.target) {
                Some(ref t) if !t.is_empty() => {}
                _ => {
                    return Err(SetupError::InvalidManifest(format!(
                        "run.target must be a relative path inside the install dir: {}",
                        run.target
                    )));
                }
            }
        }

        if let Some(level) = self.build.level {
            match self.build.compression {
                CompressionKind::Zstd if !(1..=22).contains(&level) => {
                    return Err(SetupError::InvalidManifest(format!(
                        "zstd compression level must be 1-22, got {}",
                        level
                    )));
                }
                CompressionKind::Gzip if !(0..=9).contains(&level) => {
                    return Err(SetupError::InvalidManifest(format!(
                        "gzip compression level must be 0-9, got {}",
                        level
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Stable application identifier, derived from the name when unset
    pub fn effective_app_id(&self) -> String {
        self.package.app_id.clone().unwrap_or_else(|| {
            self.package
                .name
                .to_lowercase()
                .replace(char::is_whitespace, "-")
        })
    }

    /// Artifact base name with `{name}`/`{version}` expanded (no extension)
    pub fn effective_output_name(&self) -> String {
        let template = self
            .build
            .output_name
            .clone()
            .unwrap_or_else(|| "{name}-{version}-setup".to_string());
        template
            .replace("{name}", &self.package.name)
            .replace("{version}", &self.package.version)
    }

    /// Start-menu folder name
    pub fn effective_group(&self) -> String {
        self.install
            .start_menu_group
            .clone()
            .unwrap_or_else(|| self.package.name.clone())
    }

    /// Effective compression level for the configured scheme
    pub fn compression_level(&self) -> i32 {
        self.build
            .level
            .unwrap_or_else(|| self.build.compression.default_level())
    }

    /// Look up a task by id
    pub fn task(&self, id: &str) -> Option<&TaskEntry> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Ids of tasks selected by default
    pub fn default_task_ids(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.default)
            .map(|t| t.id.clone())
            .collect()
    }

    /// Check whether the running machine's architecture is supported
    pub fn supports_arch(&self, arch: &str) -> bool {
        self.install.architectures.is_empty()
            || self.install.architectures.iter().any(|a| a == arch)
    }

    /// Commented scaffold written by `setforge init`
    pub fn example(name: &str) -> String {
        format!(
            r#"# setforge manifest
# Run `setforge build` in this directory to produce an installer.

[package]
name = "{name}"
version = "0.1.0"
# publisher = "Example Corp"
# copyright = "Copyright 2026 Example Corp"
# homepage = "https://example.com"
# icon = "assets/app.png"

[install]
default_dir = "{{pf}}/{{name}}"
privileges = "user"
# architectures = ["x86_64"]

[[files]]
source = "build/*"
dest = ""

[[shortcuts]]
name = "{name}"
target = "{name}{exe}"

[[shortcuts]]
name = "{name}"
target = "{name}{exe}"
placement = "desktop"
task = "desktopicon"

[[tasks]]
id = "desktopicon"
description = "Create a desktop icon"
default = false

# [run]
# target = "{name}{exe}"
# skip_if_silent = true

[build]
output_dir = "dist"
compression = "zstd"
"#,
            name = name,
            exe = std::env::consts::EXE_SUFFIX,
        )
    }
}
