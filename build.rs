use std::env;
use std::process::Command;

/// Set by container builds, where the source tree has no `.git`.
const HASH_OVERRIDE_VAR: &str = "MOODIFY_BUILD_HASH";

fn git_short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

fn main() {
    let build_hash = env::var(HASH_OVERRIDE_VAR)
        .ok()
        .or_else(git_short_hash)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());

    // Reported by the `/` stats route
    println!("cargo:rustc-env=GIT_HASH={}", build_hash);

    println!("cargo:rerun-if-env-changed={}", HASH_OVERRIDE_VAR);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");
}
