//! Embeds the source revision and build timestamp reported by `/version`

use std::env;
use std::process::Command;

use chrono::Utc;

fn short_revision() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let revision = String::from_utf8(output.stdout).ok()?;
    let revision = revision.trim();
    (!revision.is_empty()).then(|| revision.to_string())
}

fn main() {
    // Packaged builds have no .git; let the packager pass the revision in
    let git_hash = env::var("RUNWAY_GIT_HASH")
        .ok()
        .filter(|hash| !hash.is_empty())
        .or_else(short_revision)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={git_hash}");
    println!(
        "cargo:rustc-env=BUILD_TIME={}",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("cargo:rerun-if-env-changed=RUNWAY_GIT_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");
}
