use std::path::{Path, PathBuf};

use glob::{MatchOptions, glob_with};
use tracing::warn;

const LOG_TARGET: &str = "shared::path";

/// Expands input roots into the files a worker scans.
///
/// With a selector, each root is joined with it first; the result may be a
/// glob pattern. Directories are walked recursively. Paths that cannot be
/// resolved are kept so that opening them reports a path error and they are
/// still accounted for.
pub fn enumerate_inputs(roots: &[PathBuf], selector: Option<&str>) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for root in roots {
        let base = match selector {
            Some(selector) => root.join(selector),
            None => root.clone(),
        };
        if is_pattern(&base) {
            expand_pattern(&base, &mut files);
        } else if base.is_dir() {
            walk_dir(&base, &mut files);
        } else {
            files.push(base);
        }
    }
    files.sort();
    files.dedup();
    files
}

fn is_pattern(path: &Path) -> bool {
    path.to_string_lossy()
        .chars()
        .any(|c| matches!(c, '*' | '?' | '['))
}

fn options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    }
}

fn expand_pattern(pattern: &Path, files: &mut Vec<PathBuf>) {
    let text = pattern.to_string_lossy();
    let entries = match glob_with(&text, options()) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(target: LOG_TARGET, pattern = %text, error = %e, "Invalid path pattern");
            files.push(pattern.to_path_buf());
            return;
        }
    };
    for entry in entries {
        match entry {
            Ok(path) if path.is_dir() => walk_dir(&path, files),
            Ok(path) => files.push(path),
            Err(e) => files.push(e.path().to_path_buf()),
        }
    }
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) {
    let pattern = dir.join("**").join("*");
    let text = pattern.to_string_lossy();
    let Ok(entries) = glob_with(&text, options()) else {
        files.push(dir.to_path_buf());
        return;
    };
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => files.push(e.path().to_path_buf()),
        }
    }
}
