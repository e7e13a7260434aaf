//! Content engines: parse, address, mutate and serialize one kind of file.
//!
//! Every target file of a [`Program`](crate::Program) is governed by exactly
//! one [`Engine`]. Engines never touch the program's pristine content: the
//! mutation primitives receive a [`WorkingFile`] (a private copy of the
//! content plus the modification point table being rewritten as edits land)
//! and read ingredients from the untouched original.
//!
//! Primitives report structural failure with `false`. A position whose
//! container label could not have been produced by the engine is a broken
//! invariant and panics instead.

pub mod errors;
pub mod lang;
pub mod line;
pub mod tree;

pub use errors::EngineError;
pub use lang::Language;
pub use line::LineEngine;
pub use tree::{SyntaxTree, TreeEngine};

use crate::position::Position;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Side of the target an insertion lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Before,
    After,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Before => write!(f, "before"),
            Direction::After => write!(f, "after"),
        }
    }
}

/// Parsed, mutable representation of one target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Lines(Vec<String>),
    Tree(SyntaxTree),
}

impl Content {
    pub(crate) fn expect_lines(&self) -> &Vec<String> {
        match self {
            Content::Lines(lines) => lines,
            Content::Tree(_) => panic!("line engine handed tree content"),
        }
    }

    pub(crate) fn expect_lines_mut(&mut self) -> &mut Vec<String> {
        match self {
            Content::Lines(lines) => lines,
            Content::Tree(_) => panic!("line engine handed tree content"),
        }
    }

    pub(crate) fn expect_tree(&self) -> &SyntaxTree {
        match self {
            Content::Tree(tree) => tree,
            Content::Lines(_) => panic!("tree engine handed line content"),
        }
    }

    pub(crate) fn expect_tree_mut(&mut self) -> &mut SyntaxTree {
        match self {
            Content::Tree(tree) => tree,
            Content::Lines(_) => panic!("tree engine handed line content"),
        }
    }
}

/// A candidate's private copy of one file, mid-way through patch application.
///
/// `points` starts as a copy of the program's modification point table and is
/// rewritten by each primitive so that later edits, which still use the
/// original numbering, land where the original node now lives.
pub struct WorkingFile<'a> {
    pub content: &'a mut Content,
    pub points: &'a mut Vec<Position>,
}

/// A node of the pristine content used as the source of a copy.
#[derive(Clone, Copy)]
pub struct Ingredient<'a> {
    pub content: &'a Content,
    pub position: &'a Position,
}

/// Capability set for one category of content.
pub trait Engine: fmt::Debug + Send + Sync {
    /// Engines with equal ids share a structural shape, so ingredients can be
    /// moved between the files they govern.
    fn id(&self) -> &str;

    fn parse(&self, source: &str) -> Result<Content, EngineError>;

    fn parse_file(&self, path: &Path) -> Result<Content, EngineError> {
        let source = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse(&source)
    }

    /// Deterministic pre-order enumeration of the modification points.
    fn modification_points(&self, content: &Content) -> Vec<Position>;

    /// Source text of the node at `position`, or `None` if it does not resolve.
    fn node_text(&self, content: &Content, position: &Position) -> Option<String>;

    fn dump(&self, content: &Content) -> String;

    /// Overwrite the target with a copy of the ingredient, or with the
    /// engine's placeholder when there is none.
    fn replace(
        &self,
        working: WorkingFile<'_>,
        target: usize,
        ingredient: Option<Ingredient<'_>>,
    ) -> bool;

    /// Insert a copy of the ingredient next to the target and re-index the
    /// siblings that follow it.
    fn insert(
        &self,
        working: WorkingFile<'_>,
        target: usize,
        ingredient: Ingredient<'_>,
        direction: Direction,
    ) -> bool;

    fn delete(&self, working: WorkingFile<'_>, target: usize) -> bool {
        self.replace(working, target, None)
    }

    /// Whether `mutated` is syntactically worse than `original`.
    fn introduces_syntax_errors(&self, _original: &Content, _mutated: &Content) -> bool {
        false
    }
}

/// Caller-supplied mapping from file extension to engine.
#[derive(Clone, Default)]
pub struct EngineMap {
    by_extension: HashMap<String, Arc<dyn Engine>>,
    fallback: Option<Arc<dyn Engine>>,
}

impl EngineMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every file handled at line granularity.
    pub fn lines() -> Self {
        Self::new().with_fallback(Arc::new(LineEngine))
    }

    /// Tree engines for every supported language, lines for anything else.
    pub fn trees() -> Self {
        let mut map = Self::lines();
        for language in Language::ALL {
            let engine: Arc<dyn Engine> = Arc::new(TreeEngine::new(language));
            for ext in language.extensions() {
                map.by_extension.insert((*ext).to_string(), engine.clone());
            }
        }
        map
    }

    pub fn with(mut self, extension: impl Into<String>, engine: Arc<dyn Engine>) -> Self {
        let extension = extension.into();
        let extension = extension.trim_start_matches('.').to_string();
        self.by_extension.insert(extension, engine);
        self
    }

    pub fn with_fallback(mut self, engine: Arc<dyn Engine>) -> Self {
        self.fallback = Some(engine);
        self
    }

    pub fn resolve(&self, path: &Path) -> Result<Arc<dyn Engine>, EngineError> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.by_extension.get(ext))
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| EngineError::NoEngine {
                path: path.to_path_buf(),
            })
    }
}

impl fmt::Debug for EngineMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut extensions: Vec<_> = self.by_extension.keys().collect();
        extensions.sort();
        f.debug_struct("EngineMap")
            .field("extensions", &extensions)
            .field("fallback", &self.fallback.as_ref().map(|e| e.id().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_by_extension_then_fallback() {
        let map = EngineMap::trees();
        assert_eq!(map.resolve(Path::new("a/b.py")).unwrap().id(), "tree:python");
        assert_eq!(map.resolve(Path::new("Main.java")).unwrap().id(), "tree:java");
        assert_eq!(map.resolve(Path::new("notes.txt")).unwrap().id(), "line");
    }

    #[test]
    fn resolve_without_fallback_fails() {
        let map = EngineMap::new().with(".py", Arc::new(TreeEngine::new(Language::Python)));
        assert!(map.resolve(Path::new("x.py")).is_ok());
        assert!(matches!(
            map.resolve(Path::new("x.rs")),
            Err(EngineError::NoEngine { .. })
        ));
    }
}
