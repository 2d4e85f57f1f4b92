use std::path::{Path, PathBuf};
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");
    println!("cargo:rerun-if-changed=.git/packed-refs");
    println!("cargo:rerun-if-changed=src");

    let sha = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=WORKOUT_SYNC_GIT_SHA={}", sha);

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set");
    let src = PathBuf::from(&manifest_dir).join("src");
    let mut files = Vec::new();
    walk_rust_files(&src, &mut files);

    let mut violations = Vec::new();
    for file in &files {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let rel_path = file.strip_prefix(&manifest_dir).unwrap_or(file);
        check_file(rel_path, &content, &mut violations);
    }

    if !violations.is_empty() {
        eprintln!("\n========================================");
        eprintln!("SOURCE CHECKS FAILED");
        eprintln!("========================================");
        for violation in &violations {
            eprintln!("  {}", violation);
        }
        eprintln!("========================================\n");
        panic!("Build failed: {} source check violation(s)", violations.len());
    }
}

fn walk_rust_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_rust_files(&path, files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
            files.push(path);
        }
    }
}

/// Dead code must be deleted, tests must not be skipped, library code must
/// not build its own runtime, and tests that touch the environment must be
/// `#[serial]`.
fn check_file(path: &Path, content: &str, violations: &mut Vec<String>) {
    let lines: Vec<&str> = content.lines().collect();
    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        let location = format!("{}:{}", path.display(), index + 1);

        if (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
            && trimmed.contains("dead_code")
        {
            violations.push(format!("{} #[allow(dead_code)]: delete the code instead", location));
        }
        if trimmed.starts_with("#[ignore") {
            violations.push(format!("{} #[ignore]: fix or delete the test", location));
        }
        if trimmed.contains("Runtime::new(") || trimmed.contains("Handle::current().block_on(") {
            violations.push(format!("{} nested tokio runtime", location));
        }
        if trimmed.contains("env::set_var(") || trimmed.contains("env::remove_var(") {
            let preceding = &lines[..index];
            let test_start = preceding
                .iter()
                .rposition(|l| l.trim_start().starts_with("async fn test_") || l.trim_start().starts_with("fn test_"));
            let serial = test_start.is_some_and(|start| {
                preceding[..start]
                    .iter()
                    .rev()
                    .take(4)
                    .any(|l| l.trim() == "#[serial]")
            });
            if !serial {
                violations.push(format!("{} environment mutation outside a #[serial] test", location));
            }
        }
    }
}
