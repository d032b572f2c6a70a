//! Small filesystem helpers shared by the cache file and the store.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Sibling temp path for atomic rewrites: `name.ext` becomes `name.ext.tmp`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Fsyncs the directory containing `path` so renames and deletions of
/// entries inside it survive a crash.
#[cfg(unix)]
pub(crate) fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        let dir = File::open(parent)?;
        dir.sync_all()?;
    }
    Ok(())
}

/// Windows NTFS journals metadata; an explicit directory fsync is not
/// available, so this is a no-op there.
#[cfg(not(unix))]
pub(crate) fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_path_appends_suffix() {
        let path = Path::new("/caches/ds-7.gvc");
        assert_eq!(temp_path(path), Path::new("/caches/ds-7.gvc.tmp"));
    }
}
