use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

fn user_home() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    let var = "APPDATA";
    #[cfg(not(target_os = "windows"))]
    let var = "HOME";

    std::env::var_os(var)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn expand_tilde(raw: &str) -> Result<PathBuf> {
    match raw.strip_prefix('~') {
        Some(rest) => {
            let home = user_home().ok_or_else(|| anyhow!("cannot expand '~': no home directory"))?;
            Ok(home.join(rest.trim_start_matches(['/', '\\'])))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

/// Resolve the application home directory to an absolute path.
///
/// `None` selects `<user home>/<default_subdir>`. A leading `~` is expanded
/// and relative paths are anchored at the current directory. With `create`,
/// the directory is created if missing.
pub fn resolve_home_dir(
    configured: Option<String>,
    default_subdir: &str,
    create: bool,
) -> Result<PathBuf> {
    let path = match configured {
        Some(raw) => expand_tilde(raw.trim())?,
        None => user_home()
            .ok_or_else(|| anyhow!("no home directory available"))?
            .join(default_subdir),
    };

    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .context("cannot read current directory")?
            .join(path)
    };

    if create {
        ensure_dir(&path)?;
    }
    Ok(path)
}

fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn absolute_path_is_kept_and_created() {
        let tmp = tempdir().unwrap();
        let target = tmp.path().join("a/b");
        let resolved =
            resolve_home_dir(Some(target.to_string_lossy().into()), ".unused", true).unwrap();
        assert_eq!(resolved, target);
        assert!(target.is_dir());
    }

    #[test]
    fn relative_path_is_anchored() {
        let resolved = resolve_home_dir(Some("some/dir".into()), ".unused", false).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("some/dir"));
    }
}
