use clap::Parser;
use console::style;
use setforge::cli::{CliArgs, InstallerArgs};
use setforge::error::{SetupError, SetupResult};
use setforge::installer::{InstallOptions, Installer, LaunchDecision};
use setforge::payload::PayloadReader;
use setforge::progress::SetupProgress;
use setforge::uninstaller::{self, UninstallOptions, Uninstaller};
use setforge::Manifest;
use std::path::Path;
use std::process;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

fn main() {
    if let Err(e) = run() {
        tracing::error!("{}", e);
        eprintln!("{} {}", style("error:").red().bold(), e);
        process::exit(1);
    }
}

/// Pick the personality: a payload makes this binary a setup program,
/// otherwise it is the packaging workbench.
fn run() -> SetupResult<()> {
    let exe = std::env::current_exe()?;
    if PayloadReader::is_packed(&exe).unwrap_or(false) {
        run_setup(&exe)
    } else {
        run_workbench()
    }
}

fn run_workbench() -> SetupResult<()> {
    let args = CliArgs::parse();
    init_tracing(args.verbose);
    args.command.run()
}

fn run_setup(exe: &Path) -> SetupResult<()> {
    let args = InstallerArgs::parse();
    init_tracing(args.verbose);

    if let Some(ref dir) = args.finalize_uninstall {
        return uninstaller::finalize_uninstall(dir);
    }

    let payload = PayloadReader::read(exe)?
        .ok_or_else(|| SetupError::InvalidPayload("Payload is unreadable".to_string()))?;

    if args.uninstall || uninstaller::wants_uninstall(exe) {
        return run_uninstall(&payload.manifest, args.silent);
    }

    let options = InstallOptions {
        silent: args.silent,
        dir: args.dir.clone(),
        tasks: args.tasks.clone(),
        no_launch: args.no_launch,
        shortcut_dirs: None,
    };
    let installer = Installer::new(payload, options);
    let report = installer.run()?;

    let progress = SetupProgress::new();
    progress.success(&format!(
        "Installed {} to {}",
        installer.manifest().package.name,
        report.install_dir.display()
    ));

    match report.launch {
        LaunchDecision::Run { .. } => {
            installer.launch(&report)?;
        }
        LaunchDecision::SkippedSilent => {
            tracing::debug!("Post-install launch skipped (silent install)");
        }
        LaunchDecision::SkippedNoLaunch => {
            tracing::debug!("Post-install launch skipped (--no-launch)");
        }
        LaunchDecision::NotConfigured => {}
    }
    Ok(())
}

fn run_uninstall(manifest: &Manifest, silent: bool) -> SetupResult<()> {
    let Some((install_dir, receipt)) = uninstaller::locate(manifest)? else {
        return Err(SetupError::Uninstall(format!(
            "{} does not appear to be installed (no receipt found)",
            manifest.package.name
        )));
    };

    let uninstaller = Uninstaller::new(install_dir, receipt, UninstallOptions { silent });
    let report = uninstaller.run()?;

    let progress = SetupProgress::new();
    if report.cancelled {
        progress.info("Uninstall cancelled");
        return Ok(());
    }
    if report.files_missing > 0 {
        progress.warn(&format!(
            "{} recorded file(s) were already missing",
            report.files_missing
        ));
    }
    progress.success(&format!(
        "Removed {} file(s) and {} shortcut(s)",
        report.files_removed, report.shortcuts_removed
    ));
    Ok(())
}

fn init_tracing(verbose: u8) {
    let level_filter = match verbose {
        0 => LevelFilter::INFO,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level_filter.into())
        .with_env_var("SETFORGE_LOG")
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .without_time()
        .try_init();
}
