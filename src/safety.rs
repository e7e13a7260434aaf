use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Keeps target files inside the project being improved.
///
/// Target paths come from user configuration and are later joined onto the
/// sandbox root, so a path that escapes the project (absolute, `..`, or a
/// symlink pointing elsewhere) would let a patch overwrite arbitrary files.
#[derive(Debug, Clone)]
pub struct ProjectGuard {
    /// Canonical project root
    project_root: PathBuf,
    /// Canonical paths that may never be targeted
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Target path must be relative to the project: {path}")]
    Absolute { path: PathBuf },

    #[error("Target path may not contain '..': {path}")]
    ParentTraversal { path: PathBuf },

    #[error("Path is outside project: {path} (project: {project})")]
    OutsideProject { path: PathBuf, project: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Failed to resolve {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn canonicalize(path: &Path) -> Result<PathBuf, SafetyError> {
    path.canonicalize().map_err(|source| SafetyError::Canonicalize {
        path: path.to_path_buf(),
        source,
    })
}

impl ProjectGuard {
    /// Create a guard for `project_root`. Version-control metadata is
    /// forbidden by default.
    pub fn new(project_root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let project_root = canonicalize(project_root.as_ref())?;

        let mut forbidden_paths = Vec::new();
        for name in [".git", ".hg", ".svn"] {
            if let Ok(dir) = project_root.join(name).canonicalize() {
                forbidden_paths.push(dir);
            }
        }

        Ok(Self {
            project_root,
            forbidden_paths,
        })
    }

    /// Check a configured target path.
    ///
    /// Returns the canonical absolute path of the file if it is safe.
    pub fn validate_target(&self, relative: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            return Err(SafetyError::Absolute {
                path: relative.to_path_buf(),
            });
        }
        if relative
            .components()
            .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(SafetyError::ParentTraversal {
                path: relative.to_path_buf(),
            });
        }

        let canonical = canonicalize(&self.project_root.join(relative))?;
        self.check_canonical(&canonical)?;
        Ok(canonical)
    }

    fn check_canonical(&self, canonical: &Path) -> Result<(), SafetyError> {
        if !canonical.starts_with(&self.project_root) {
            return Err(SafetyError::OutsideProject {
                path: canonical.to_path_buf(),
                project: self.project_root.clone(),
            });
        }

        for forbidden in &self.forbidden_paths {
            if canonical.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: canonical.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}
