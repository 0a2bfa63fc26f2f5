//! Locating the interpreter and driver files.

use std::path::{Path, PathBuf};

/// Directory the host executable lives in.
#[must_use]
pub fn host_base_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Resolve a file path that may be relative to `base_dir`.
///
/// The search order is:
/// 1. The path as given, if it names an existing file.
/// 2. The path joined onto `base_dir`.
/// 3. The path joined onto the host executable's directory.
#[must_use]
pub fn resolve_relative(path: &Path, base_dir: Option<&Path>) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    if path.is_absolute() {
        return None;
    }
    base_dir
        .map(Path::to_path_buf)
        .into_iter()
        .chain(host_base_dir())
        .map(|dir| dir.join(path))
        .find(|candidate| candidate.is_file())
}

/// Resolve an executable by name.
///
/// Explicit or base-relative paths win; otherwise the name is looked up on
/// `PATH` via `which` on a blocking thread.
pub async fn resolve_executable_path(executable: &str, base_dir: Option<&Path>) -> Option<PathBuf> {
    if executable.trim().is_empty() {
        return None;
    }

    let path = Path::new(executable);
    let has_separator = path.components().count() > 1;
    if path.is_absolute() || has_separator {
        return resolve_relative(path, base_dir);
    }
    if let Some(found) = base_dir.map(|dir| dir.join(path)).filter(|p| p.is_file()) {
        return Some(found);
    }

    which_async(executable).await
}

async fn which_async(executable: &str) -> Option<PathBuf> {
    let executable = executable.to_string();
    tokio::task::spawn_blocking(move || which::which(executable))
        .await
        .ok()
        .and_then(Result::ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_uses_base_dir() {
        let dir = std::env::temp_dir().join(format!("pybridge-resolve-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("drv.py"), "").unwrap();

        let found = resolve_relative(Path::new("drv.py"), Some(&dir)).unwrap();
        assert_eq!(found, dir.join("drv.py"));
        assert!(resolve_relative(Path::new("nope.py"), Some(&dir)).is_none());
    }

    #[tokio::test]
    async fn test_empty_name_is_unresolved() {
        assert!(resolve_executable_path("  ", None).await.is_none());
    }

    #[tokio::test]
    async fn test_missing_executable_is_unresolved() {
        assert!(
            resolve_executable_path("pybridge-no-such-binary-xyz", None)
                .await
                .is_none()
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_path_lookup_finds_shell() {
        let found = resolve_executable_path("sh", None).await.unwrap();
        assert!(found.is_absolute());
    }
}
