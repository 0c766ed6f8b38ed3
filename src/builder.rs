//! Build personality: turn a manifest and a source tree into a setup
//! executable
//!
//! The builder copies the running executable into the output dir and
//! appends the payload to it. The copy inherits both personalities:
//! run it and it installs, stamp it into an install dir and it
//! uninstalls.

use crate::collector::{FileCollector, StagedTree};
use crate::error::{SetupError, SetupResult};
use crate::icon;
use crate::manifest::Manifest;
use crate::payload::{Payload, PayloadWriter};
use crate::progress::{spinner, ProgressExt};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Result of a build
#[derive(Debug)]
pub struct BuildOutput {
    /// Path to the generated setup executable
    pub executable: PathBuf,
    /// Size of the executable in bytes
    pub size: u64,
    /// Number of files staged into the payload
    pub file_count: usize,
    /// Total uncompressed payload size
    pub uncompressed_size: u64,
    /// Content hash stamped into the payload
    pub content_hash: String,
    /// Checksum sidecar, when enabled
    pub checksum: Option<PathBuf>,
}

/// Builds a setup executable from a manifest
pub struct InstallerBuilder {
    manifest: Manifest,
    base_dir: PathBuf,
    source_dir: Option<PathBuf>,
    stub: Option<PathBuf>,
}

impl InstallerBuilder {
    /// Create a builder. Globs and relative paths in the manifest
    /// resolve against `base_dir`.
    pub fn new(manifest: Manifest, base_dir: impl AsRef<Path>) -> Self {
        Self {
            manifest,
            base_dir: base_dir.as_ref().to_path_buf(),
            source_dir: None,
            stub: None,
        }
    }

    /// Create a builder from a manifest file, anchored at its directory
    pub fn from_manifest_file(path: impl AsRef<Path>) -> SetupResult<Self> {
        let path = path.as_ref();
        let manifest = Manifest::from_file(path)?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        Ok(Self::new(manifest, base_dir))
    }

    /// Use a specific stub executable instead of the running one
    pub fn stub(mut self, path: impl Into<PathBuf>) -> Self {
        self.stub = Some(path.into());
        self
    }

    /// Resolve `[[files]]` globs against this directory instead of the
    /// manifest's. Output and icon paths stay anchored at the manifest.
    pub fn source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.source_dir = Some(dir.into());
        self
    }

    /// Override the manifest's output directory
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.manifest.build.output_dir = dir.into();
        self
    }

    /// The manifest driving this build
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Build the setup executable
    pub fn build(&self) -> SetupResult<BuildOutput> {
        self.manifest.validate()?;

        let output_dir = self.base_dir.join(&self.manifest.build.output_dir);
        fs::create_dir_all(&output_dir)?;

        let source_root = self.source_dir.as_deref().unwrap_or(&self.base_dir);
        let pb = spinner("Collecting files");
        let tree = match FileCollector::new(source_root).collect(&self.manifest.files) {
            Ok(tree) => tree,
            Err(e) => {
                pb.finish_error("File collection failed");
                return Err(e);
            }
        };
        pb.finish_success(&format!("{} file(s) staged", tree.len()));

        self.check_targets(&tree)?;
        let icon = self.load_icon()?;

        let exe_name = format!(
            "{}{}",
            self.manifest.effective_output_name(),
            std::env::consts::EXE_SUFFIX
        );
        let output_path = output_dir.join(&exe_name);

        tracing::info!("Building installer: {}", output_path.display());

        let stub = match self.stub {
            Some(ref path) => path.clone(),
            None => std::env::current_exe()?,
        };
        fs::copy(&stub, &output_path)?;

        let uncompressed_size = tree.total_size();
        let file_count = tree.len();

        let mut payload = Payload::new(self.manifest.clone())
            .with_files(tree.into_files())
            .with_icon(icon);
        let content_hash = payload.compute_content_hash();

        PayloadWriter::write(&output_path, &payload)?;

        let size = fs::metadata(&output_path)?.len();
        let checksum = if self.manifest.build.checksum {
            Some(write_checksum(&output_path)?)
        } else {
            None
        };

        tracing::info!(
            "Build complete: {} ({:.2} MB, {} file(s), hash {})",
            output_path.display(),
            size as f64 / (1024.0 * 1024.0),
            file_count,
            content_hash
        );

        Ok(BuildOutput {
            executable: output_path,
            size,
            file_count,
            uncompressed_size,
            content_hash,
            checksum,
        })
    }

    /// Shortcut and run targets must be produced by the file rules,
    /// otherwise the installed links would dangle
    fn check_targets(&self, tree: &StagedTree) -> SetupResult<()> {
        for entry in &self.manifest.shortcuts {
            if !tree.contains(&entry.target) {
                return Err(SetupError::Build(format!(
                    "Shortcut '{}' points at '{}', which no [[files]] rule stages",
                    entry.name, entry.target
                )));
            }
            if let Some(ref icon) = entry.icon {
                if !tree.contains(icon) {
                    return Err(SetupError::Build(format!(
                        "Shortcut '{}' uses icon '{}', which no [[files]] rule stages",
                        entry.name, icon
                    )));
                }
            }
        }
        if let Some(ref run) = self.manifest.run {
            if !tree.contains(&run.target) {
                return Err(SetupError::Build(format!(
                    "[run] target '{}' is not staged by any [[files]] rule",
                    run.target
                )));
            }
        }
        Ok(())
    }

    /// Load the package icon and normalize it to multi-resolution ICO
    fn load_icon(&self) -> SetupResult<Option<Vec<u8>>> {
        let Some(ref rel) = self.manifest.package.icon else {
            return Ok(None);
        };
        let path = self.base_dir.join(rel);
        let data = icon::load_icon(&path)?;
        tracing::debug!("Embedded icon from {}", path.display());
        Ok(Some(data.ico_data))
    }
}

/// Write a `sha256sum`-compatible sidecar next to the executable
fn write_checksum(exe_path: &Path) -> SetupResult<PathBuf> {
    let data = fs::read(exe_path)?;
    let mut hasher = Sha256::new();
    hasher.update(&data);
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();

    let name = exe_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("installer");
    let path = exe_path.with_file_name(format!("{}.sha256", name));
    fs::write(&path, format!("{}  {}\n", hex, name))?;
    Ok(path)
}

// ============================================================================
// Tests
// ============================================================================
