//! Tests for setforge manifest module

use setforge::{expand_install_dir, CompressionKind, Manifest, Privileges, ShortcutPlacement};
use std::path::PathBuf;
use tempfile::TempDir;

// ============================================================================
// Basic Parsing Tests
// ============================================================================

#[test]
fn test_parse_minimal_manifest() {
    let toml = r#"
[package]
name = "demo"

[[files]]
source = "bin/*"
"#;
    let manifest = Manifest::parse(toml).unwrap();
    assert_eq!(manifest.package.name, "demo");
    assert_eq!(manifest.package.version, "0.1.0");
    assert!(manifest.package.publisher.is_none());
    assert_eq!(manifest.install.default_dir, "{pf}/{name}");
    assert_eq!(manifest.install.privileges, Privileges::User);
    assert_eq!(manifest.files.len(), 1);
    assert!(manifest.files[0].recursive);
    assert!(manifest.files[0].overwrite);
    assert_eq!(manifest.files[0].dest, "");
    assert!(manifest.shortcuts.is_empty());
    assert!(manifest.tasks.is_empty());
    assert!(manifest.run.is_none());
    assert_eq!(manifest.build.compression, CompressionKind::Zstd);
    assert_eq!(manifest.build.output_dir, PathBuf::from("dist"));
    assert!(manifest.build.checksum);
    manifest.validate().unwrap();
}

#[test]
fn test_parse_full_manifest() {
    let toml = r#"
[package]
name = "demo"
version = "2.1.0"
publisher = "Demo Corp"
copyright = "Copyright 2026 Demo Corp"
homepage = "https://demo.example.com"
app_id = "com.example.demo"
description = "A demonstration"

[install]
default_dir = "{localappdata}/Demo"
privileges = "admin"
architectures = ["x86_64", "aarch64"]
start_menu_group = "Demo Suite"

[[files]]
source = "build/*"
dest = "bin"
overwrite = false
exclude = ["*.pdb"]

[[files]]
source = "docs"
dest = "share"
recursive = false

[[shortcuts]]
name = "Demo"
target = "bin/demo"
icon = "bin/demo.ico"

[[shortcuts]]
name = "Demo"
target = "bin/demo"
placement = "desktop"
task = "desktopicon"

[[tasks]]
id = "desktopicon"
description = "Create a desktop icon"
default = true

[run]
target = "bin/demo"
args = ["--first-run"]
skip_if_silent = false

[build]
output_dir = "release"
output_name = "{name}-{version}-install"
compression = "gzip"
level = 6
checksum = false
"#;
    let manifest = Manifest::parse(toml).unwrap();
    manifest.validate().unwrap();

    assert_eq!(manifest.package.version, "2.1.0");
    assert_eq!(manifest.package.publisher.as_deref(), Some("Demo Corp"));
    assert_eq!(manifest.package.app_id.as_deref(), Some("com.example.demo"));
    assert_eq!(manifest.install.privileges, Privileges::Admin);
    assert_eq!(manifest.install.architectures, vec!["x86_64", "aarch64"]);
    assert_eq!(manifest.files.len(), 2);
    assert!(!manifest.files[0].overwrite);
    assert_eq!(manifest.files[0].exclude, vec!["*.pdb"]);
    assert!(!manifest.files[1].recursive);
    assert_eq!(manifest.shortcuts[0].placement, ShortcutPlacement::StartMenu);
    assert_eq!(manifest.shortcuts[1].placement, ShortcutPlacement::Desktop);
    assert_eq!(manifest.shortcuts[1].task.as_deref(), Some("desktopicon"));
    assert!(manifest.tasks[0].default);
    let run = manifest.run.as_ref().unwrap();
    assert_eq!(run.args, vec!["--first-run"]);
    assert!(!run.skip_if_silent);
    assert_eq!(manifest.build.compression, CompressionKind::Gzip);
    assert_eq!(manifest.build.level, Some(6));
    assert!(!manifest.build.checksum);
}

#[test]
fn test_parse_rejects_invalid_toml() {
    assert!(Manifest::parse("this is not toml [").is_err());
    assert!(Manifest::parse("[package]\n").is_err()); // name missing
}

// ============================================================================
// Validation Tests
// ============================================================================

fn parse_err(toml: &str) -> String {
    let manifest = Manifest::parse(toml).unwrap();
    manifest.validate().unwrap_err().to_string()
}

#[test]
fn test_validate_requires_files() {
    let toml = r#"
[package]
name = "demo"
"#;
    let err = parse_err(toml);
    assert!(err.contains("at least one [[files]] entry"), "{}", err);
}

#[test]
fn test_validate_rejects_empty_name() {
    let toml = r#"
[package]
name = "  "

[[files]]
source = "bin/*"
"#;
    let err = parse_err(toml);
    assert!(err.contains("package.name"), "{}", err);
}

#[test]
fn test_validate_rejects_name_with_separators() {
    let toml = r#"
[package]
name = "demo/app"

[[files]]
source = "bin/*"
"#;
    let err = parse_err(toml);
    assert!(err.contains("path separators"), "{}", err);
}

#[test]
fn test_validate_rejects_unknown_placeholder() {
    let toml = r#"
[package]
name = "demo"

[install]
default_dir = "{progfiles}/demo"

[[files]]
source = "bin/*"
"#;
    let err = parse_err(toml);
    assert!(err.contains("unknown placeholder {progfiles}"), "{}", err);
}

#[test]
fn test_validate_rejects_escaping_dest() {
    let toml = r#"
[package]
name = "demo"

[[files]]
source = "bin/*"
dest = "../outside"
"#;
    let err = parse_err(toml);
    assert!(err.contains("inside the install dir"), "{}", err);
}

#[test]
fn test_validate_rejects_unknown_task_reference() {
    let toml = r#"
[package]
name = "demo"

[[files]]
source = "bin/*"

[[shortcuts]]
name = "Demo"
target = "demo"
task = "nope"
"#;
    let err = parse_err(toml);
    assert!(err.contains("unknown task: nope"), "{}", err);
}

#[test]
fn test_validate_rejects_duplicate_task_ids() {
    let toml = r#"
[package]
name = "demo"

[[files]]
source = "bin/*"

[[tasks]]
id = "desktopicon"

[[tasks]]
id = "desktopicon"
"#;
    let err = parse_err(toml);
    assert!(err.contains("duplicate task id"), "{}", err);
}

#[test]
fn test_validate_rejects_absolute_shortcut_target() {
    let toml = r#"
[package]
name = "demo"

[[files]]
source = "bin/*"

[[shortcuts]]
name = "Demo"
target = "/usr/bin/demo"
"#;
    let err = parse_err(toml);
    assert!(err.contains("relative path"), "{}", err);
}

#[test]
fn test_validate_compression_levels() {
    let zstd_out_of_range = r#"
[package]
name = "demo"

[[files]]
source = "bin/*"

[build]
compression = "zstd"
level = 25
"#;
    let err = parse_err(zstd_out_of_range);
    assert!(err.contains("zstd compression level must be 1-22"), "{}", err);

    let gzip_out_of_range = r#"
[package]
name = "demo"

[[files]]
source = "bin/*"

[build]
compression = "gzip"
level = 12
"#;
    let err = parse_err(gzip_out_of_range);
    assert!(err.contains("gzip compression level must be 0-9"), "{}", err);

    let gzip_ok = r#"
[package]
name = "demo"

[[files]]
source = "bin/*"

[build]
compression = "gzip"
level = 9
"#;
    Manifest::parse(gzip_ok).unwrap().validate().unwrap();
}

#[test]
fn test_validate_rejects_bad_app_id() {
    let toml = r#"
[package]
name = "demo"
app_id = "com example demo"

[[files]]
source = "bin/*"
"#;
    let err = parse_err(toml);
    assert!(err.contains("app_id"), "{}", err);
}

// ============================================================================
// Derived Value Tests
// ============================================================================

#[test]
fn test_effective_app_id_defaults_to_name() {
    let toml = r#"
[package]
name = "My Demo App"

[[files]]
source = "bin/*"
"#;
    let manifest = Manifest::parse(toml).unwrap();
    assert_eq!(manifest.effective_app_id(), "my-demo-app");
}

#[test]
fn test_effective_app_id_prefers_explicit() {
    let toml = r#"
[package]
name = "demo"
app_id = "com.example.demo"

[[files]]
source = "bin/*"
"#;
    let manifest = Manifest::parse(toml).unwrap();
    assert_eq!(manifest.effective_app_id(), "com.example.demo");
}

#[test]
fn test_effective_output_name() {
    let toml = r#"
[package]
name = "demo"
version = "1.2.3"

[[files]]
source = "bin/*"
"#;
    let manifest = Manifest::parse(toml).unwrap();
    assert_eq!(manifest.effective_output_name(), "demo-1.2.3-setup");

    let custom = r#"
[package]
name = "demo"
version = "1.2.3"

[[files]]
source = "bin/*"

[build]
output_name = "{name}_{version}_installer"
"#;
    let manifest = Manifest::parse(custom).unwrap();
    assert_eq!(manifest.effective_output_name(), "demo_1.2.3_installer");
}

#[test]
fn test_effective_group() {
    let toml = r#"
[package]
name = "demo"

[[files]]
source = "bin/*"
"#;
    let manifest = Manifest::parse(toml).unwrap();
    assert_eq!(manifest.effective_group(), "demo");

    let grouped = r#"
[package]
name = "demo"

[install]
start_menu_group = "Demo Suite"

[[files]]
source = "bin/*"
"#;
    let manifest = Manifest::parse(grouped).unwrap();
    assert_eq!(manifest.effective_group(), "Demo Suite");
}

#[test]
fn test_compression_level_defaults() {
    let toml = r#"
[package]
name = "demo"

[[files]]
source = "bin/*"
"#;
    let mut manifest = Manifest::parse(toml).unwrap();
    assert_eq!(manifest.compression_level(), 19);

    manifest.build.compression = CompressionKind::Gzip;
    assert_eq!(manifest.compression_level(), 6);

    manifest.build.level = Some(3);
    assert_eq!(manifest.compression_level(), 3);
}

#[test]
fn test_default_task_ids() {
    let toml = r#"
[package]
name = "demo"

[[files]]
source = "bin/*"

[[tasks]]
id = "desktopicon"
default = false

[[tasks]]
id = "quicklaunch"
default = true
"#;
    let manifest = Manifest::parse(toml).unwrap();
    assert_eq!(manifest.default_task_ids(), vec!["quicklaunch"]);
    assert!(manifest.task("desktopicon").is_some());
    assert!(manifest.task("nope").is_none());
}

#[test]
fn test_supports_arch() {
    let toml = r#"
[package]
name = "demo"

[[files]]
source = "bin/*"
"#;
    let mut manifest = Manifest::parse(toml).unwrap();
    assert!(manifest.supports_arch("x86_64"));
    assert!(manifest.supports_arch("anything"));

    manifest.install.architectures = vec!["x86_64".to_string()];
    assert!(manifest.supports_arch("x86_64"));
    assert!(!manifest.supports_arch("aarch64"));
}

// ============================================================================
// Install Directory Expansion Tests
// ============================================================================

#[test]
fn test_expand_install_dir_placeholders() {
    let home = dirs::home_dir().unwrap();
    let expanded = expand_install_dir("{home}/apps/{name}", "demo", Privileges::User);
    assert_eq!(expanded, home.join("apps").join("demo"));
}

#[test]
fn test_expand_install_dir_literal_path() {
    let expanded = expand_install_dir("/opt/demo", "demo", Privileges::Admin);
    assert_eq!(expanded, PathBuf::from("/opt/demo"));
}

#[cfg(unix)]
#[test]
fn test_expand_install_dir_pf_by_privilege() {
    let admin = expand_install_dir("{pf}/{name}", "demo", Privileges::Admin);
    assert_eq!(admin, PathBuf::from("/opt/demo"));

    let user = expand_install_dir("{pf}/{name}", "demo", Privileges::User);
    assert!(user.ends_with("demo"));
    assert_ne!(user, admin);
}

// ============================================================================
// Scaffold and Discovery Tests
// ============================================================================

#[test]
fn test_example_scaffold_is_valid() {
    let scaffold = Manifest::example("demo");
    let manifest = Manifest::parse(&scaffold).unwrap();
    manifest.validate().unwrap();

    assert_eq!(manifest.package.name, "demo");
    assert_eq!(manifest.files[0].source, "build/*");
    assert_eq!(manifest.shortcuts.len(), 2);
    assert_eq!(manifest.tasks[0].id, "desktopicon");
    assert!(!manifest.tasks[0].default);
}

#[test]
fn test_find_in_dir() {
    let tmp = TempDir::new().unwrap();
    assert!(Manifest::find_in_dir(tmp.path()).is_none());

    std::fs::write(tmp.path().join("setup.toml"), "").unwrap();
    assert_eq!(
        Manifest::find_in_dir(tmp.path()),
        Some(tmp.path().join("setup.toml"))
    );

    // setforge.toml takes precedence
    std::fs::write(tmp.path().join("setforge.toml"), "").unwrap();
    assert_eq!(
        Manifest::find_in_dir(tmp.path()),
        Some(tmp.path().join("setforge.toml"))
    );
}

#[test]
fn test_from_file_reports_missing_manifest() {
    let tmp = TempDir::new().unwrap();
    let err = Manifest::from_file(tmp.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read manifest"));
}
