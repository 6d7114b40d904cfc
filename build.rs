//! Embeds the source revision as `GIT_HASH` for the startup log line

use std::process::Command;

fn main() {
    // Container builds have no .git; CI passes the revision in instead
    println!("cargo:rerun-if-env-changed=GIT_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");

    let revision = std::env::var("GIT_HASH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(|| {
            Command::new("git")
                .args(["describe", "--always", "--dirty", "--abbrev=8"])
                .output()
                .ok()
                .filter(|out| out.status.success())
                .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={revision}");
}
