//! Build script for the realtime client
//!
//! Embeds git revision, build timestamp, target triple and compiler
//! version into the binary as `REALTIME_*` compile-time variables.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");

    let git_hash = run("git", &["rev-parse", "--short=8", "HEAD"]);
    let git_dirty = match run("git", &["status", "--porcelain"]).as_str() {
        "unknown" => "unknown",
        "" => "false",
        _ => "true",
    };
    let rustc_version = run("rustc", &["--version"]);

    let build_timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    for (key, value) in [
        ("REALTIME_GIT_HASH", git_hash.as_str()),
        ("REALTIME_GIT_DIRTY", git_dirty),
        ("REALTIME_BUILD_TIMESTAMP", build_timestamp.as_str()),
        ("REALTIME_TARGET", target.as_str()),
        ("REALTIME_PROFILE", profile.as_str()),
        ("REALTIME_RUSTC_VERSION", rustc_version.as_str()),
    ] {
        println!("cargo:rustc-env={}={}", key, value);
    }
}

/// Trimmed stdout of a successful command, or "unknown"
fn run(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
