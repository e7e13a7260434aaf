//! The program under improvement.
//!
//! A [`Program`] is built once per search run. It parses every target file
//! with the engine chosen for its extension, records the pristine content
//! and modification point table of each, and owns the sandbox that
//! candidate patches are materialized into. Nothing in it changes while the
//! search runs except the sandbox and, when asked, the selection weights.

use crate::config::{self, check_weights, ConfigError, ProgramConfig};
use crate::edit::Point;
use crate::engine::{Content, Engine, EngineError, EngineMap};
use crate::patch::Patch;
use crate::position::Position;
use crate::safety::{ProjectGuard, SafetyError};
use crate::sandbox::{Sandbox, SandboxError};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ProgramError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error("failed to load {path}: {source}")]
    Engine { path: String, source: EngineError },

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error("invalid weights for {path}: {message}")]
    InvalidWeights { path: String, message: String },

    #[error("unknown target file: {0}")]
    UnknownFile(String),
}

/// How a modification point is drawn from a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    /// Uniformly.
    #[default]
    Random,
    /// Proportionally to the file's weights.
    Weighted,
}

impl FromStr for Selection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(Selection::Random),
            "weighted" => Ok(Selection::Weighted),
            other => Err(format!("unknown selection '{other}' (expected random or weighted)")),
        }
    }
}

/// One parsed target file.
#[derive(Debug)]
pub struct TargetFile {
    path: String,
    engine: Arc<dyn Engine>,
    content: Content,
    points: Vec<Position>,
    weights: Vec<f64>,
}

impl TargetFile {
    /// Path relative to the project root.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn points(&self) -> &[Position] {
        &self.points
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

/// One row of [`Program::describe_points`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointDescription {
    pub index: usize,
    pub position: Position,
    pub text: String,
}

impl fmt::Display for PointDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first_line = self.text.lines().next().unwrap_or("");
        write!(f, "{:>4}  {}  {}", self.index, self.position, first_line.trim())
    }
}

#[derive(Debug)]
pub struct Program {
    root: PathBuf,
    config: ProgramConfig,
    files: Vec<TargetFile>,
    sandbox: Sandbox,
}

impl Program {
    /// Build from the project's dotfile, with tree engines where available.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ProgramError> {
        ProgramBuilder::new(root).build()
    }

    pub fn builder(root: impl Into<PathBuf>) -> ProgramBuilder {
        ProgramBuilder::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ProgramConfig {
        &self.config
    }

    pub fn test_command(&self) -> &str {
        &self.config.test_command
    }

    pub fn validate_syntax(&self) -> bool {
        self.config.validate_syntax
    }

    pub fn files(&self) -> &[TargetFile] {
        &self.files
    }

    pub fn file(&self, index: usize) -> Option<&TargetFile> {
        self.files.get(index)
    }

    pub fn file_index(&self, path: &str) -> Option<usize> {
        self.files.iter().position(|file| file.path == path)
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// An empty patch on this program.
    pub fn patch(&self) -> Patch<'_> {
        Patch::new(self)
    }

    /// Restore the sandbox to the pristine project.
    pub fn reset_sandbox(&self) -> Result<(), ProgramError> {
        self.sandbox.reset()?;
        Ok(())
    }

    /// Replace the selection weights of `path`, one per modification point.
    pub fn set_weights(&mut self, path: &str, weights: Vec<f64>) -> Result<(), ProgramError> {
        let index = self
            .file_index(path)
            .ok_or_else(|| ProgramError::UnknownFile(path.to_string()))?;
        let file = &mut self.files[index];
        if weights.len() != file.points.len() {
            return Err(ProgramError::InvalidWeights {
                path: path.to_string(),
                message: format!(
                    "expected {} weights, got {}",
                    file.points.len(),
                    weights.len()
                ),
            });
        }
        check_weights(&weights).map_err(|message| ProgramError::InvalidWeights {
            path: path.to_string(),
            message,
        })?;
        file.weights = weights;
        Ok(())
    }

    /// Draw a modification point, from `file` or from a uniformly chosen
    /// file that has any.
    pub fn random_target<R: Rng + ?Sized>(
        &self,
        file: Option<usize>,
        selection: Selection,
        rng: &mut R,
    ) -> Option<Point> {
        let file = match file {
            Some(file) => file,
            None => {
                let candidates: Vec<usize> = self
                    .files
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| !f.points.is_empty())
                    .map(|(i, _)| i)
                    .collect();
                *candidates.choose(rng)?
            }
        };
        let target = self.files.get(file)?;
        if target.points.is_empty() {
            return None;
        }
        let index = match selection {
            Selection::Random => rng.gen_range(0..target.points.len()),
            Selection::Weighted => match WeightedIndex::new(&target.weights) {
                Ok(distribution) => distribution.sample(rng),
                Err(_) => rng.gen_range(0..target.points.len()),
            },
        };
        Some(Point::new(file, index))
    }

    /// Draw an ingredient for `target`: a uniformly chosen point of a file
    /// governed by the same engine.
    pub fn random_ingredient<R: Rng + ?Sized>(&self, target: Point, rng: &mut R) -> Option<Point> {
        let engine = self.files.get(target.file)?.engine.id();
        let candidates: Vec<usize> = self
            .files
            .iter()
            .enumerate()
            .filter(|(_, f)| f.engine.id() == engine && !f.points.is_empty())
            .map(|(i, _)| i)
            .collect();
        let file = *candidates.choose(rng)?;
        let index = rng.gen_range(0..self.files[file].points.len());
        Some(Point::new(file, index))
    }

    /// Every modification point of `file` with its source text.
    pub fn describe_points(&self, file: usize) -> Vec<PointDescription> {
        let Some(target) = self.files.get(file) else {
            return Vec::new();
        };
        target
            .points
            .iter()
            .enumerate()
            .map(|(index, position)| PointDescription {
                index,
                position: position.clone(),
                text: target
                    .engine
                    .node_text(&target.content, position)
                    .unwrap_or_default(),
            })
            .collect()
    }
}

/// Builds a [`Program`] from a project root, a config and an engine map.
#[derive(Debug)]
pub struct ProgramBuilder {
    root: PathBuf,
    config: Option<ProgramConfig>,
    engines: EngineMap,
}

impl ProgramBuilder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            config: None,
            engines: EngineMap::trees(),
        }
    }

    /// Use `config` instead of the project's dotfile.
    pub fn config(mut self, config: ProgramConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn engines(mut self, engines: EngineMap) -> Self {
        self.engines = engines;
        self
    }

    pub fn build(self) -> Result<Program, ProgramError> {
        let config = match self.config {
            Some(config) => {
                config
                    .validate()
                    .map_err(|source| ConfigError::Validation { path: None, source })?;
                config
            }
            None => config::load_from_project(&self.root)?,
        };

        let guard = ProjectGuard::new(&self.root)?;
        let mut files = Vec::with_capacity(config.target_files.len());
        for path in &config.target_files {
            let absolute = guard.validate_target(path)?;
            let engine = self
                .engines
                .resolve(Path::new(path))
                .map_err(|source| ProgramError::Engine {
                    path: path.clone(),
                    source,
                })?;
            let content = engine
                .parse_file(&absolute)
                .map_err(|source| ProgramError::Engine {
                    path: path.clone(),
                    source,
                })?;
            let points = engine.modification_points(&content);
            debug!(file = %path, engine = engine.id(), points = points.len(), "target file loaded");
            files.push(TargetFile {
                path: path.clone(),
                weights: vec![1.0; points.len()],
                engine,
                content,
                points,
            });
        }

        let sandbox = Sandbox::create(guard.project_root())?;
        let weights = config.weights.clone();
        let mut program = Program {
            root: guard.project_root().to_path_buf(),
            config,
            files,
            sandbox,
        };
        for (path, weights) in weights {
            program.set_weights(&path, weights)?;
        }

        info!(
            project = %program.root.display(),
            files = program.files.len(),
            sandbox = %program.sandbox.path().display(),
            "program ready"
        );
        Ok(program)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;
    use tempfile::TempDir;

    fn project() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.py"), "x = 1\ny = 2\nz = 3\n").unwrap();
        fs::write(dir.path().join("b.py"), "def f():\n    return 1\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "one\ntwo\n").unwrap();
        dir
    }

    fn program(dir: &TempDir, files: &[&str]) -> Program {
        Program::builder(dir.path())
            .config(ProgramConfig::new("true", files.iter().copied()))
            .build()
            .unwrap()
    }

    #[test]
    fn loads_files_with_their_engines() {
        let dir = project();
        let program = program(&dir, &["a.py", "notes.txt"]);
        assert_eq!(program.files().len(), 2);
        assert_eq!(program.files()[0].engine().id(), "tree:python");
        assert_eq!(program.files()[0].points().len(), 3);
        assert_eq!(program.files()[1].engine().id(), "line");
        assert_eq!(program.files()[1].points().len(), 2);
        assert_eq!(program.file_index("notes.txt"), Some(1));
        assert!(program.sandbox().path().join("a.py").exists());
    }

    #[test]
    fn same_source_same_points() {
        let dir = project();
        let first = program(&dir, &["a.py", "b.py"]);
        let second = program(&dir, &["a.py", "b.py"]);
        for (a, b) in first.files().iter().zip(second.files()) {
            assert_eq!(a.points(), b.points());
        }
        assert_ne!(first.sandbox().path(), second.sandbox().path());
    }

    #[test]
    fn escaping_target_is_rejected() {
        let dir = project();
        let error = Program::builder(dir.path())
            .config(ProgramConfig::new("true", ["../a.py"]))
            .build()
            .unwrap_err();
        assert!(matches!(error, ProgramError::Config(_)));
    }

    #[test]
    fn missing_engine_is_reported() {
        let dir = project();
        let error = Program::builder(dir.path())
            .config(ProgramConfig::new("true", ["notes.txt"]))
            .engines(EngineMap::new())
            .build()
            .unwrap_err();
        assert!(matches!(error, ProgramError::Engine { .. }));
    }

    #[test]
    fn weights_are_validated() {
        let dir = project();
        let mut program = program(&dir, &["a.py"]);
        assert!(program.set_weights("a.py", vec![0.0, 1.0, 0.0]).is_ok());
        assert!(matches!(
            program.set_weights("a.py", vec![1.0]),
            Err(ProgramError::InvalidWeights { .. })
        ));
        assert!(matches!(
            program.set_weights("a.py", vec![0.0, 0.0, 0.0]),
            Err(ProgramError::InvalidWeights { .. })
        ));
        assert!(matches!(
            program.set_weights("zzz.py", vec![]),
            Err(ProgramError::UnknownFile(_))
        ));
    }

    #[test]
    fn weighted_selection_follows_weights() {
        let dir = project();
        let mut program = program(&dir, &["a.py"]);
        program.set_weights("a.py", vec![0.0, 1.0, 0.0]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let point = program
                .random_target(None, Selection::Weighted, &mut rng)
                .unwrap();
            assert_eq!(point, Point::new(0, 1));
        }
    }

    #[test]
    fn ingredients_share_the_target_engine() {
        let dir = project();
        let program = program(&dir, &["a.py", "notes.txt", "b.py"]);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let ingredient = program
                .random_ingredient(Point::new(0, 0), &mut rng)
                .unwrap();
            assert_ne!(ingredient.file, 1);
            let line = program
                .random_ingredient(Point::new(1, 0), &mut rng)
                .unwrap();
            assert_eq!(line.file, 1);
        }
    }

    #[test]
    fn describes_points() {
        let dir = project();
        let program = program(&dir, &["b.py"]);
        let rows = program.describe_points(0);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].text, "return 1");
        assert_eq!(rows[1].to_string(), "   1  /body[0]/body[0]  return 1");
        assert!(program.describe_points(9).is_empty());
    }

    #[test]
    fn loads_dotfile_when_no_config_given() {
        let dir = project();
        fs::write(
            dir.path().join(".graft.toml"),
            "test_command = \"true\"\ntarget_files = [\"a.py\"]\n\n[weights]\n\"a.py\" = [1.0, 2.0, 3.0]\n",
        )
        .unwrap();
        let program = Program::open(dir.path()).unwrap();
        assert_eq!(program.files()[0].weights(), &[1.0, 2.0, 3.0]);
    }
}
