//! Build script for arkmig-dm
//!
//! Exports the build identity the runner logs at startup, so every migration
//! log names the revision that produced it.

use std::process::Command;

fn main() {
    let commit = git(&["rev-parse", "--short=8", "HEAD"]).unwrap_or_else(|| "unknown".into());
    let dirty = git(&["status", "--porcelain", "--untracked-files=no"])
        .is_some_and(|changes| !changes.is_empty());
    let revision = if dirty {
        format!("{}-dirty", commit)
    } else {
        commit
    };

    export("GIT_HASH", &revision);
    export(
        "BUILD_TIMESTAMP",
        &chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
    );
    export(
        "BUILD_PROFILE",
        &std::env::var("PROFILE").unwrap_or_else(|_| "unknown".into()),
    );
}

/// Trimmed stdout of a successful git command
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|text| text.trim().to_string())
}

fn export(name: &str, value: &str) {
    println!("cargo:rustc-env={}={}", name, value);
}
