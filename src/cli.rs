//! Command-line argument structures for both personalities
//!
//! An unpacked executable is the packaging workbench and parses
//! [`CliArgs`] (subcommands). A packed one is a setup program and
//! parses the flat [`InstallerArgs`] flag set, the way end users
//! expect from an installer binary.

use crate::builder::InstallerBuilder;
use crate::error::{SetupError, SetupResult};
use crate::manifest::Manifest;
use crate::payload::PayloadReader;
use crate::progress::SetupProgress;
use clap::{ArgAction, Args, Parser, Subcommand};
use console::style;
use std::fs;
use std::path::PathBuf;

/// Arguments for the packaging personality
#[derive(Parser, Debug)]
#[command(author, version, about = "Declarative installer builder", long_about = None)]
#[command(name = "setforge", bin_name = "setforge")]
#[command(propagate_version = true)]
pub struct CliArgs {
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a setup executable from a manifest
    Build(BuildArgs),
    /// Show what a setup executable contains
    Inspect(InspectArgs),
    /// Write a starter manifest into the current directory
    Init(InitArgs),
}

impl Command {
    pub fn run(&self) -> SetupResult<()> {
        match self {
            Self::Build(command) => command.run(),
            Self::Inspect(command) => command.run(),
            Self::Init(command) => command.run(),
        }
    }
}

/// Arguments for the installer personality (packed executable)
#[derive(Parser, Debug)]
#[command(version, about = "Application setup", long_about = None)]
pub struct InstallerArgs {
    /// Install unattended with defaults
    #[arg(long)]
    pub silent: bool,

    /// Install into this directory instead of the default
    #[arg(long, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Enable exactly these task ids (comma separated)
    #[arg(long, value_name = "IDS", value_delimiter = ',')]
    pub tasks: Option<Vec<String>>,

    /// Skip the post-install action
    #[arg(long)]
    pub no_launch: bool,

    /// Remove the installed application
    #[arg(long)]
    pub uninstall: bool,

    /// Second stage of a self-deleting uninstall (internal)
    #[arg(long, value_name = "DIR", hide = true)]
    pub finalize_uninstall: Option<PathBuf>,

    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Manifest file (searched in the current directory when omitted)
    #[arg(short, long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Resolve [[files]] globs against this directory instead of the
    /// manifest's
    #[arg(short, long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Output directory override
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<String>,
}

impl BuildArgs {
    pub fn run(&self) -> SetupResult<()> {
        let manifest_path = match self.manifest {
            Some(ref path) => path.clone(),
            None => Manifest::find_in_dir(".").ok_or_else(|| {
                SetupError::InvalidManifest(
                    "No setforge.toml in this directory (try `setforge init`)".to_string(),
                )
            })?,
        };
        tracing::info!("Using manifest: {}", manifest_path.display());

        let mut builder = InstallerBuilder::from_manifest_file(&manifest_path)?;
        if let Some(ref source) = self.source {
            builder = builder.source_dir(source.clone());
        }
        if let Some(ref output) = self.output {
            builder = builder.output_dir(output.clone());
        }
        let output = builder.build()?;

        let progress = SetupProgress::new();
        progress.success(&format!(
            "Installer: {} ({:.2} MB, {} file(s))",
            output.executable.display(),
            output.size as f64 / (1024.0 * 1024.0),
            output.file_count
        ));
        if let Some(ref checksum) = output.checksum {
            progress.info(&format!("Checksum: {}", checksum.display()));
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Setup executable to examine
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Print the embedded manifest as TOML
    #[arg(long)]
    pub manifest: bool,

    /// List the files the payload would install
    #[arg(long)]
    pub files: bool,
}

impl InspectArgs {
    pub fn run(&self) -> SetupResult<()> {
        let meta = PayloadReader::read_meta(&self.file)?.ok_or_else(|| {
            SetupError::InvalidPayload(format!("{} carries no payload", self.file.display()))
        })?;

        if self.manifest {
            let toml = toml::to_string_pretty(&meta.manifest).map_err(|e| {
                SetupError::InvalidManifest(format!("Failed to render manifest: {}", e))
            })?;
            print!("{}", toml);
            return Ok(());
        }

        let manifest = &meta.manifest;
        println!(
            "{} {} {}",
            style("Package:").bold(),
            manifest.package.name,
            manifest.package.version
        );
        if let Some(ref publisher) = manifest.package.publisher {
            println!("{} {}", style("Publisher:").bold(), publisher);
        }
        println!("{} {}", style("App id:").bold(), manifest.effective_app_id());
        println!(
            "{} {:?} (level {})",
            style("Compression:").bold(),
            meta.compression,
            manifest.compression_level()
        );
        println!("{} {}", style("Content hash:").bold(), meta.content_hash);
        println!(
            "{} {} shortcut(s), {} task(s)",
            style("Configured:").bold(),
            manifest.shortcuts.len(),
            manifest.tasks.len()
        );
        if let Some(ref icon) = meta.icon {
            println!("{} embedded ({} bytes)", style("Icon:").bold(), icon.len());
        }
        if !meta.keep_existing.is_empty() {
            println!(
                "{} {} file(s) preserved on reinstall",
                style("Keep rules:").bold(),
                meta.keep_existing.len()
            );
        }
        if let Some(stub) = PayloadReader::original_size(&self.file)? {
            let total = fs::metadata(&self.file)?.len();
            println!(
                "{} {} bytes stub + {} bytes payload",
                style("Layout:").bold(),
                stub,
                total - stub
            );
        }

        if self.files {
            let payload = PayloadReader::read(&self.file)?.ok_or_else(|| {
                SetupError::InvalidPayload(format!("{} carries no payload", self.file.display()))
            })?;
            let mut files = payload.files;
            files.sort_by(|a, b| a.dest.cmp(&b.dest));
            println!("{}", style("Files:").bold());
            for file in &files {
                println!("  {} ({} bytes)", file.dest, file.contents.len());
            }
        }

        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Package name (defaults to the directory name)
    #[arg(value_name = "NAME")]
    pub name: Option<String>,

    /// Overwrite an existing manifest
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(&self) -> SetupResult<()> {
        let dir = std::env::current_dir()?;
        let name = match self.name {
            Some(ref name) => name.clone(),
            None => dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("app")
                .to_string(),
        };

        let path = dir.join("setforge.toml");
        if path.exists() && !self.force {
            return Err(SetupError::InvalidManifest(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }

        fs::write(&path, Manifest::example(&name))?;

        let progress = SetupProgress::new();
        progress.success(&format!("Wrote {}", path.display()));
        progress.info("Edit the [[files]] rules, then run `setforge build`");
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_args_parse() {
        let args =
            CliArgs::try_parse_from(["setforge", "-v", "build", "--manifest", "app.toml"]).unwrap();
        assert_eq!(args.verbose, 1);
        let Command::Build(build) = args.command else {
            panic!("expected build");
        };
        assert_eq!(build.manifest, Some(PathBuf::from("app.toml")));
        assert!(build.source.is_none());
        assert!(build.output.is_none());
    }

    #[test]
    fn test_build_args_source_override() {
        let args =
            CliArgs::try_parse_from(["setforge", "build", "--source", "target/release"]).unwrap();
        let Command::Build(build) = args.command else {
            panic!("expected build");
        };
        assert_eq!(build.source, Some(PathBuf::from("target/release")));
    }

    #[test]
    fn test_installer_args_parse() {
        let args = InstallerArgs::try_parse_from([
            "setup",
            "--silent",
            "--dir",
            "/opt/demo",
            "--tasks",
            "desktop,autostart",
            "--no-launch",
        ])
        .unwrap();
        assert!(args.silent);
        assert!(args.no_launch);
        assert!(!args.uninstall);
        assert_eq!(args.dir, Some(PathBuf::from("/opt/demo")));
        assert_eq!(
            args.tasks,
            Some(vec!["desktop".to_string(), "autostart".to_string()])
        );
    }

    #[test]
    fn test_installer_args_default_to_interactive() {
        let args = InstallerArgs::try_parse_from(["setup"]).unwrap();
        assert!(!args.silent);
        assert!(args.dir.is_none());
        assert!(args.tasks.is_none());
        assert!(args.finalize_uninstall.is_none());
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(CliArgs::try_parse_from(["setforge"]).is_err());
    }
}
