use std::env;
use std::process::Command;

/// Exact tag on HEAD, if any.
fn head_tag() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--exact-match"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout).ok().map(|s| s.trim().to_string())
}

fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_PKG_VERSION");
    let version = env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());

    // Release builds trust the manifest version; anything else is "-dev"
    // unless HEAD carries the matching tag.
    let display = if env::var("PROFILE").as_deref() == Ok("release") {
        version
    } else {
        println!("cargo:rerun-if-changed=.git/HEAD");
        println!("cargo:rerun-if-changed=.git/refs/tags");
        match head_tag() {
            Some(tag) if tag == format!("v{version}") => version,
            _ => format!("{version}-dev"),
        }
    };
    println!("cargo:rustc-env=APP_VERSION_DISPLAY={display}");
}
