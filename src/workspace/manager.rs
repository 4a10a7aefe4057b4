use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{AppError, Result};

const WORKSPACE_PREFIX: &str = "ci-mender-pr-";

/// An ephemeral, uniquely named directory owned by one patch attempt.
///
/// The directory is removed recursively when the workspace is released or
/// dropped, including on early returns and panics.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn allocate(base_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(base_dir)
            .map_err(|e| AppError::Workspace(format!("Failed to create workspace base dir: {e}")))?;

        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(base_dir)
            .map_err(|e| AppError::Workspace(format!("Failed to allocate workspace: {e}")))?;

        tracing::info!(path = %dir.path().display(), "Allocated workspace");
        Ok(Self { dir })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Clone target inside the workspace.
    pub fn repo_dir(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    /// Remove the workspace now, logging instead of failing if removal does
    /// not succeed.
    pub fn release(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::info!(path = %path.display(), "Removed workspace"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove workspace")
            }
        }
    }
}

/// A file that is deleted when the guard goes out of scope.
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub async fn write(path: PathBuf, contents: &str) -> Result<Self> {
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| AppError::Workspace(format!("Failed to write {}: {e}", path.display())))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspaces_are_unique_and_removed() {
        let base = tempfile::tempdir().unwrap();

        let first = Workspace::allocate(base.path()).unwrap();
        let second = Workspace::allocate(base.path()).unwrap();
        assert_ne!(first.root(), second.root());
        assert!(first
            .root()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(WORKSPACE_PREFIX));

        let first_path = first.root().to_path_buf();
        std::fs::create_dir_all(first.repo_dir().join("src")).unwrap();
        std::fs::write(first.repo_dir().join("src/lib.rs"), "fn main() {}").unwrap();
        first.release();
        assert!(!first_path.exists());

        let second_path = second.root().to_path_buf();
        drop(second);
        assert!(!second_path.exists());
    }

    #[test]
    fn test_workspace_removed_on_panic() {
        let base = tempfile::tempdir().unwrap();
        let base_path = base.path().to_path_buf();

        let result = std::panic::catch_unwind(move || {
            let workspace = Workspace::allocate(&base_path).unwrap();
            std::fs::write(workspace.root().join("marker"), "x").unwrap();
            panic!("step failed");
        });
        assert!(result.is_err());

        let leftovers = std::fs::read_dir(base.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_scratch_file_removed_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("fix.patch");
        {
            let scratch = ScratchFile::write(path.clone(), "diff").await.unwrap();
            assert!(scratch.path().exists());
        }
        assert!(!path.exists());
    }
}
