//! Request-scoped scratch storage for uploaded images.
//!
//! Each request gets its own server-named temporary directory; the client id
//! never reaches the filesystem. The directory and everything in it is
//! removed when the [`RequestScratch`] is dropped, on every exit path.

use facesim_core::ImageRole;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct RequestScratch {
    dir: TempDir,
}

impl RequestScratch {
    /// Create a fresh directory under `root` on the blocking pool.
    pub async fn create(root: &Path) -> io::Result<Self> {
        let root = root.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || tempfile::Builder::new().prefix("facesim-").tempdir_in(root))
            .await
            .map_err(io::Error::other)??;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Store the bytes of one input image, returning the file path.
    pub async fn store(&self, role: ImageRole, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.dir.path().join(file_name(role));
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

fn file_name(role: ImageRole) -> &'static str {
    match role {
        ImageRole::First => "real.png",
        ImageRole::Second => "target.png",
    }
}
