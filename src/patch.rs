//! Ordered edit sequences and their application.
//!
//! A [`Patch`] never touches the [`Program`]'s pristine contents. Applying
//! it clones every file's content and point table once, then runs the edits
//! in order against those copies. Targets resolve through the working table,
//! so an edit sees the shifts caused by earlier insertions; ingredients
//! always come from the pristine content and table.

use crate::edit::{Edit, Point};
use crate::engine::{Content, Ingredient, WorkingFile};
use crate::position::Position;
use crate::program::Program;
use crate::sandbox::SandboxError;
use similar::TextDiff;
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("{edit}: no target file #{file}")]
    UnknownFile { edit: Edit, file: usize },

    #[error("{edit}: point {index} out of range for {path} ({len} points)")]
    PointOutOfRange {
        edit: Edit,
        path: String,
        index: usize,
        len: usize,
    },

    #[error("{edit}: {target_engine} target cannot take a {ingredient_engine} ingredient")]
    CrossEngine {
        edit: Edit,
        target_engine: String,
        ingredient_engine: String,
    },

    #[error("failed to materialize patch: {0}")]
    Sandbox(#[from] SandboxError),
}

/// Result of applying a patch: one mutated content per target file, plus
/// the positions (in the edit list) of edits that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub contents: Vec<Content>,
    pub failed: Vec<usize>,
}

impl Applied {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Clone)]
pub struct Patch<'p> {
    program: &'p Program,
    edits: Vec<Edit>,
}

impl<'p> Patch<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            edits: Vec::new(),
        }
    }

    pub fn with_edits(
        program: &'p Program,
        edits: impl IntoIterator<Item = Edit>,
    ) -> Result<Self, PatchError> {
        let mut patch = Self::new(program);
        for edit in edits {
            patch.add(edit)?;
        }
        Ok(patch)
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Append `edit` after checking that its points exist and that target
    /// and ingredient are governed by the same engine.
    pub fn add(&mut self, edit: Edit) -> Result<(), PatchError> {
        let target = self.check_point(&edit, edit.target())?;
        if let Some(ingredient) = edit.ingredient() {
            let ingredient = self.check_point(&edit, ingredient)?;
            if target != ingredient {
                return Err(PatchError::CrossEngine {
                    edit,
                    target_engine: target.to_string(),
                    ingredient_engine: ingredient.to_string(),
                });
            }
        }
        self.edits.push(edit);
        Ok(())
    }

    /// Engine id of the file `point` lives in.
    fn check_point(&self, edit: &Edit, point: Point) -> Result<&'p str, PatchError> {
        let file = self
            .program
            .file(point.file)
            .ok_or(PatchError::UnknownFile {
                edit: *edit,
                file: point.file,
            })?;
        if point.index >= file.points().len() {
            return Err(PatchError::PointOutOfRange {
                edit: *edit,
                path: file.path().to_string(),
                index: point.index,
                len: file.points().len(),
            });
        }
        Ok(file.engine().id())
    }

    pub fn remove(&mut self, index: usize) -> Edit {
        self.edits.remove(index)
    }

    /// Mutated contents of every target file.
    pub fn apply(&self) -> Applied {
        let files = self.program.files();
        let mut contents: Vec<Content> = files.iter().map(|f| f.content().clone()).collect();
        let mut tables: Vec<Vec<Position>> = files.iter().map(|f| f.points().to_vec()).collect();

        let mut failed = Vec::new();
        for (i, edit) in self.edits.iter().enumerate() {
            if !self.apply_edit(edit, &mut contents, &mut tables) {
                debug!(%edit, "edit could not be applied");
                failed.push(i);
            }
        }
        Applied { contents, failed }
    }

    fn apply_edit(
        &self,
        edit: &Edit,
        contents: &mut [Content],
        tables: &mut [Vec<Position>],
    ) -> bool {
        let files = self.program.files();

        match *edit {
            Edit::Replacement { target, ingredient } => {
                files[target.file].engine().replace(
                    working(contents, tables, target.file),
                    target.index,
                    ingredient.map(|point| self.ingredient(point)),
                )
            }
            Edit::Deletion { target } => {
                files[target.file]
                    .engine()
                    .delete(working(contents, tables, target.file), target.index)
            }
            Edit::Insertion {
                target,
                ingredient,
                direction,
            } => {
                files[target.file].engine().insert(
                    working(contents, tables, target.file),
                    target.index,
                    self.ingredient(ingredient),
                    direction,
                )
            }
            Edit::Moving {
                target,
                ingredient,
                direction,
            } => {
                let inserted = files[target.file].engine().insert(
                    working(contents, tables, target.file),
                    target.index,
                    self.ingredient(ingredient),
                    direction,
                );
                inserted
                    && files[ingredient.file]
                        .engine()
                        .delete(working(contents, tables, ingredient.file), ingredient.index)
            }
        }
    }

    fn ingredient(&self, point: Point) -> Ingredient<'p> {
        let file = &self.program.files()[point.file];
        Ingredient {
            content: file.content(),
            position: &file.points()[point.index],
        }
    }

    /// Apply the patch and write every target file into the sandbox.
    pub fn materialize(&self) -> Result<Applied, PatchError> {
        let applied = self.apply();
        self.write(&applied)?;
        Ok(applied)
    }

    /// Write already applied contents into the sandbox.
    pub fn write(&self, applied: &Applied) -> Result<(), PatchError> {
        for (file, content) in self.program.files().iter().zip(&applied.contents) {
            self.program
                .sandbox()
                .write(file.path(), &file.engine().dump(content))?;
        }
        Ok(())
    }

    /// Indices of the files this patch can change.
    pub fn touched_files(&self) -> Vec<usize> {
        let mut files: Vec<usize> = self
            .edits
            .iter()
            .flat_map(|edit| match edit {
                Edit::Moving { ingredient, .. } => vec![edit.target().file, ingredient.file],
                _ => vec![edit.target().file],
            })
            .collect();
        files.sort_unstable();
        files.dedup();
        files
    }

    /// Unified diff of every file the patch changes.
    pub fn diff(&self) -> String {
        let applied = self.apply();
        let mut out = String::new();
        for (file, content) in self.program.files().iter().zip(&applied.contents) {
            let before = file.engine().dump(file.content());
            let after = file.engine().dump(content);
            if before == after {
                continue;
            }
            let diff = TextDiff::from_lines(&before, &after);
            out.push_str(
                &diff
                    .unified_diff()
                    .header(
                        &format!("before: {}", file.path()),
                        &format!("after: {}", file.path()),
                    )
                    .to_string(),
            );
        }
        out
    }
}

fn working<'a>(
    contents: &'a mut [Content],
    tables: &'a mut [Vec<Position>],
    file: usize,
) -> WorkingFile<'a> {
    WorkingFile {
        content: &mut contents[file],
        points: &mut tables[file],
    }
}

impl PartialEq for Patch<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.edits == other.edits
    }
}

impl Eq for Patch<'_> {}

impl fmt::Debug for Patch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Patch").field("edits", &self.edits).finish()
    }
}

impl fmt::Display for Patch<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.edits.is_empty() {
            return write!(f, "(empty)");
        }
        for (i, edit) in self.edits.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{edit}")?;
        }
        Ok(())
    }
}
