//! Outcome-based routing: move processed documents to their final folder.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ProcessError;

/// Capability trait for relocating a processed document.
pub trait DocumentRouter: Send + Sync {
    /// Move `document` into `dest`, preserving its filename. Creates the
    /// destination directory if it does not exist. Returns the new path.
    fn route(&self, document: &Path, dest: &Path) -> Result<PathBuf, ProcessError>;
}

/// Filesystem router.
#[derive(Debug, Default)]
pub struct FsRouter;

impl DocumentRouter for FsRouter {
    fn route(&self, document: &Path, dest: &Path) -> Result<PathBuf, ProcessError> {
        let route_err = |source: std::io::Error| ProcessError::Route {
            path: document.to_path_buf(),
            dest: dest.to_path_buf(),
            source,
        };

        std::fs::create_dir_all(dest).map_err(route_err)?;

        let filename = document.file_name().ok_or_else(|| {
            route_err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "document path has no filename",
            ))
        })?;

        let target = dest.join(filename);
        std::fs::rename(document, &target).map_err(route_err)?;

        debug!(from = %document.display(), to = %target.display(), "Document routed");
        Ok(target)
    }
}
