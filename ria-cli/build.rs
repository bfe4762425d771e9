use std::process::Command;

fn git(args: &[&str], root: &str) -> Option<String> {
    let out = Command::new("git").arg("-C").arg(root).args(args).output().ok()?;
    if !out.status.success() {
        return None;
    }
    let s = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!s.is_empty()).then_some(s)
}

fn main() {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let root = format!("{manifest_dir}/..");

    let sha = git(&["describe", "--always", "--dirty"], &root).unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rerun-if-changed={root}/.git/HEAD");
    println!("cargo:rustc-env=RIA_BUILD_SHA={sha}");
}
