//! Per-program working copy of the target project.
//!
//! Every [`Program`](crate::Program) owns one sandbox: a uniquely named
//! temporary directory holding a full copy of the project. Patches are
//! materialized into it and the test command runs inside it. The directory
//! is removed when the sandbox is dropped.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("sandbox I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to walk project tree: {0}")]
    Walk(#[from] walkdir::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> SandboxError + '_ {
    move |source| SandboxError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug)]
pub struct Sandbox {
    dir: TempDir,
    project: PathBuf,
}

impl Sandbox {
    /// Create a fresh sandbox holding a copy of `project`.
    pub fn create(project: &Path) -> Result<Self, SandboxError> {
        let dir = tempfile::Builder::new()
            .prefix("graft-")
            .tempdir()
            .map_err(io_error(project))?;
        let sandbox = Self {
            dir,
            project: project.to_path_buf(),
        };
        copy_tree(&sandbox.project, sandbox.path())?;
        debug!(sandbox = %sandbox.path().display(), "sandbox created");
        Ok(sandbox)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Throw away every change and copy the pristine project in again.
    pub fn reset(&self) -> Result<(), SandboxError> {
        for entry in fs::read_dir(self.path()).map_err(io_error(self.path()))? {
            let entry = entry.map_err(io_error(self.path()))?;
            let path = entry.path();
            let file_type = entry.file_type().map_err(io_error(&path))?;
            if file_type.is_dir() {
                fs::remove_dir_all(&path).map_err(io_error(&path))?;
            } else {
                fs::remove_file(&path).map_err(io_error(&path))?;
            }
        }
        copy_tree(&self.project, self.path())
    }

    /// Overwrite `relative` inside the sandbox.
    ///
    /// The write is atomic and bumps the modification time, so build-driven
    /// test commands always see the new content as changed.
    pub fn write(&self, relative: &str, content: &str) -> Result<(), SandboxError> {
        let path = self.path().join(relative);
        atomic_write(&path, content.as_bytes())?;
        let now = filetime::FileTime::now();
        filetime::set_file_mtime(&path, now).map_err(io_error(&path))?;
        Ok(())
    }

    pub fn read(&self, relative: &str) -> Result<String, SandboxError> {
        let path = self.path().join(relative);
        fs::read_to_string(&path).map_err(io_error(&path))
    }
}

fn copy_tree(from: &Path, to: &Path) -> Result<(), SandboxError> {
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let dest = to.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&dest).map_err(io_error(&dest))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest).map_err(io_error(&dest))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(link: &Path, dest: &Path) -> Result<(), SandboxError> {
    let target = fs::read_link(link).map_err(io_error(link))?;
    std::os::unix::fs::symlink(target, dest).map_err(io_error(dest))
}

#[cfg(not(unix))]
fn copy_symlink(link: &Path, dest: &Path) -> Result<(), SandboxError> {
    fs::copy(link, dest).map_err(io_error(dest))?;
    Ok(())
}

fn atomic_write(path: &Path, content: &[u8]) -> Result<(), SandboxError> {
    // Same directory keeps the rename on one filesystem.
    let parent = path.parent().ok_or_else(|| SandboxError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "Path has no parent directory",
        ),
    })?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_error(parent))?;
    temp.write_all(content).map_err(io_error(path))?;
    temp.as_file().sync_all().map_err(io_error(path))?;
    temp.persist(path).map_err(|e| SandboxError::Io {
        path: path.to_path_buf(),
        source: e.error,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::write(dir.path().join("main.py"), "print(1)\n").unwrap();
        fs::write(dir.path().join("src/nested/lib.py"), "x = 1\n").unwrap();
        dir
    }

    #[test]
    fn copies_whole_project() {
        let project = project();
        let sandbox = Sandbox::create(project.path()).unwrap();
        assert_ne!(sandbox.path(), project.path());
        assert_eq!(sandbox.read("main.py").unwrap(), "print(1)\n");
        assert_eq!(sandbox.read("src/nested/lib.py").unwrap(), "x = 1\n");
    }

    #[test]
    fn sandboxes_are_unique() {
        let project = project();
        let a = Sandbox::create(project.path()).unwrap();
        let b = Sandbox::create(project.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[test]
    fn write_leaves_project_untouched() {
        let project = project();
        let sandbox = Sandbox::create(project.path()).unwrap();
        sandbox.write("main.py", "print(2)\n").unwrap();
        assert_eq!(sandbox.read("main.py").unwrap(), "print(2)\n");
        assert_eq!(
            fs::read_to_string(project.path().join("main.py")).unwrap(),
            "print(1)\n"
        );
    }

    #[test]
    fn reset_restores_pristine_copy() {
        let project = project();
        let sandbox = Sandbox::create(project.path()).unwrap();
        sandbox.write("main.py", "print(2)\n").unwrap();
        fs::write(sandbox.path().join("stray.txt"), "junk").unwrap();
        sandbox.reset().unwrap();
        assert_eq!(sandbox.read("main.py").unwrap(), "print(1)\n");
        assert!(!sandbox.path().join("stray.txt").exists());
        assert_eq!(sandbox.read("src/nested/lib.py").unwrap(), "x = 1\n");
    }

    #[test]
    fn dropped_sandbox_is_removed() {
        let project = project();
        let sandbox = Sandbox::create(project.path()).unwrap();
        let path = sandbox.path().to_path_buf();
        drop(sandbox);
        assert!(!path.exists());
    }
}
