//! Process-wide cache of launch file contents

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::{
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};

struct CachedFile {
    content: String,
    modified: SystemTime,
}

/// Keyed by the path as given; an entry is reused only while the file's
/// modification time is unchanged.
static LAUNCH_FILES: Lazy<DashMap<PathBuf, CachedFile>> = Lazy::new(DashMap::new);

/// Read a launch file, reusing the cached text when the file is unchanged.
pub(crate) fn read_launch_file(path: &Path) -> io::Result<String> {
    let modified = std::fs::metadata(path)?.modified()?;

    if let Some(entry) = LAUNCH_FILES.get(path) {
        if entry.modified == modified {
            log::trace!("Launch file cache hit: {}", path.display());
            return Ok(entry.content.clone());
        }
    }

    log::debug!("Reading launch file {}", path.display());
    let content = std::fs::read_to_string(path)?;
    LAUNCH_FILES.insert(
        path.to_path_buf(),
        CachedFile {
            content: content.clone(),
            modified,
        },
    );
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_reads_and_refreshes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("display.launch.xml");
        std::fs::write(&path, "<launch/>").unwrap();

        assert_eq!(read_launch_file(&path).unwrap(), "<launch/>");
        assert_eq!(read_launch_file(&path).unwrap(), "<launch/>");

        // push the mtime forward so the change is visible on coarse clocks
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"\n").unwrap();
        file.set_modified(SystemTime::now() + std::time::Duration::from_secs(5))
            .unwrap();
        drop(file);

        assert_eq!(read_launch_file(&path).unwrap(), "<launch/>\n");
    }

    #[test]
    fn test_missing_file() {
        let err = read_launch_file(Path::new("/nonexistent/launch.xml")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
