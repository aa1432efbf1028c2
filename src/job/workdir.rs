// Per-job output directory, removed from disk when its owner drops it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

/// Engine leftovers that are never handed to the client.
const SIDECAR_SUFFIXES: &[&str] = &[
    ".info.json",
    ".part",
    ".ytdl",
    ".tmp",
    ".temp",
    ".vtt",
    ".srt",
    ".jpg",
    ".webp",
    ".png",
    ".description",
];

#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
}

impl WorkDir {
    /// Create a fresh directory under `root` named after the job.
    pub fn create(root: &Path, job_id: &str) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", job_id))
            .tempdir_in(root)?;
        debug!("work dir for {} at {:?}", job_id, dir.path());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove now and report failures instead of leaving it to `Drop`.
    pub fn remove(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => {
                debug!("removed work dir {:?}", path);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("failed to remove work dir {:?}: {}", path, e);
                Err(e)
            }
        }
    }

    /// See [`find_artifact_in`].
    pub fn find_artifact(&self, preferred: Option<&Path>) -> io::Result<Option<PathBuf>> {
        find_artifact_in(self.path(), preferred)
    }
}

/// The produced media file in `dir`. `preferred` (what the engine said it
/// wrote) wins when it is a qualifying file inside `dir`; otherwise the
/// directory is scanned and the first qualifying name is taken.
pub fn find_artifact_in(dir: &Path, preferred: Option<&Path>) -> io::Result<Option<PathBuf>> {
    let root = fs::canonicalize(dir)?;

    if let Some(candidate) = preferred {
        if let Some(path) = qualifying_file(&root, candidate) {
            return Ok(Some(path));
        }
    }

    let mut names: Vec<PathBuf> = fs::read_dir(&root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    names.sort();
    Ok(names.iter().find_map(|p| qualifying_file(&root, p)))
}

pub fn is_sidecar(path: &Path) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n.to_ascii_lowercase(),
        None => return true,
    };
    SIDECAR_SUFFIXES.iter().any(|s| name.ends_with(s))
}

fn qualifying_file(root: &Path, candidate: &Path) -> Option<PathBuf> {
    let canonical = fs::canonicalize(candidate).ok()?;
    if !canonical.starts_with(root) || is_sidecar(&canonical) {
        return None;
    }
    fs::metadata(&canonical)
        .ok()
        .filter(|m| m.is_file())
        .map(|_| canonical)
}
