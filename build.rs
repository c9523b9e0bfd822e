use std::process::Command;

fn main() {
    // Get Cargo.toml version
    let cargo_version = env!("CARGO_PKG_VERSION");

    // Get git commit hash
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok();

    let git_hash = output
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let version = if git_hash == "unknown" {
        cargo_version.to_string()
    } else {
        format!("{} ({})", cargo_version, git_hash)
    };

    println!("cargo:rustc-env=QUILL_VERSION={}", version);
    println!("cargo:rerun-if-changed=.git/HEAD");
}
