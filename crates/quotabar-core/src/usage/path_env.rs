//! Executable lookup with an augmented search path.
//!
//! Processes launched from a desktop session often inherit a minimal `PATH`
//! that lacks the directories where `claude` is usually installed.

use std::env;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Install locations relative to the home directory
const HOME_DIRS: &[&str] = &[
    ".local/bin",
    ".claude/local",
    ".npm-global/bin",
    ".bun/bin",
    ".volta/bin",
];

/// System-wide install locations
const SYSTEM_DIRS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin", "/bin"];

/// The current `PATH` plus common install locations
pub fn augmented_path() -> OsString {
    augment_path(env::var_os("PATH"), dirs::home_dir())
}

/// Append install locations to `current`; existing entries keep priority.
pub fn augment_path(current: Option<OsString>, home: Option<PathBuf>) -> OsString {
    let mut entries: Vec<PathBuf> = current
        .as_deref()
        .map(|p| env::split_paths(p).collect())
        .unwrap_or_default();

    let extra = home
        .iter()
        .flat_map(|h| HOME_DIRS.iter().map(move |d| h.join(d)))
        .chain(SYSTEM_DIRS.iter().map(PathBuf::from));

    for dir in extra {
        if !entries.contains(&dir) {
            entries.push(dir);
        }
    }

    match env::join_paths(&entries) {
        Ok(joined) => joined,
        Err(e) => {
            tracing::debug!("Could not join search path: {}", e);
            current.unwrap_or_default()
        }
    }
}

/// Resolve `name` to an executable file.
///
/// Names with a directory component (or a leading `~/`) are checked directly;
/// bare names are looked up in `search_path`.
pub fn resolve_executable(name: &str, search_path: &OsStr) -> Option<PathBuf> {
    if name.is_empty() {
        return None;
    }

    if let Some(rest) = name.strip_prefix("~/") {
        let path = dirs::home_dir()?.join(rest);
        return is_executable_file(&path).then_some(path);
    }

    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return is_executable_file(candidate).then(|| candidate.to_path_buf());
    }

    env::split_paths(search_path).find_map(|dir| {
        let path = dir.join(name);
        if is_executable_file(&path) {
            return Some(path);
        }
        let exe = dir.join(format!("{name}.exe"));
        (cfg!(windows) && is_executable_file(&exe)).then_some(exe)
    })
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file())
}
