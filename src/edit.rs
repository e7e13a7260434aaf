use crate::engine::Direction;
use crate::program::{Program, Selection};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// A modification point of one target file: `file` indexes
/// [`Program::files`], `index` indexes that file's point table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Point {
    pub file: usize,
    pub index: usize,
}

impl Point {
    pub fn new(file: usize, index: usize) -> Self {
        Self { file, index }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.index)
    }
}

/// One intended mutation, addressed by modification point indices of the
/// pristine program.
///
/// `Deletion` behaves as a `Replacement` without ingredient, and `Moving` as
/// an `Insertion` followed by the `Deletion` of its ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edit {
    Replacement {
        target: Point,
        ingredient: Option<Point>,
    },
    Insertion {
        target: Point,
        ingredient: Point,
        direction: Direction,
    },
    Deletion {
        target: Point,
    },
    Moving {
        target: Point,
        ingredient: Point,
        direction: Direction,
    },
}

impl Edit {
    pub fn kind(&self) -> EditKind {
        match self {
            Edit::Replacement { .. } => EditKind::Replacement,
            Edit::Insertion { .. } => EditKind::Insertion,
            Edit::Deletion { .. } => EditKind::Deletion,
            Edit::Moving { .. } => EditKind::Moving,
        }
    }

    pub fn target(&self) -> Point {
        match *self {
            Edit::Replacement { target, .. }
            | Edit::Insertion { target, .. }
            | Edit::Deletion { target }
            | Edit::Moving { target, .. } => target,
        }
    }

    pub fn ingredient(&self) -> Option<Point> {
        match *self {
            Edit::Replacement { ingredient, .. } => ingredient,
            Edit::Insertion { ingredient, .. } | Edit::Moving { ingredient, .. } => {
                Some(ingredient)
            }
            Edit::Deletion { .. } => None,
        }
    }

    /// Draw a random edit of `kind` for `program`.
    ///
    /// The target is picked with `selection`; the ingredient uniformly among
    /// the points of files sharing the target's engine. Returns `None` when
    /// the program has no modification point to offer.
    pub fn random(
        kind: EditKind,
        program: &Program,
        selection: Selection,
        rng: &mut StdRng,
    ) -> Option<Self> {
        let target = program.random_target(None, selection, rng)?;
        let edit = match kind {
            EditKind::Deletion => Edit::Deletion { target },
            EditKind::Replacement => Edit::Replacement {
                target,
                ingredient: Some(program.random_ingredient(target, rng)?),
            },
            EditKind::Insertion => Edit::Insertion {
                target,
                ingredient: program.random_ingredient(target, rng)?,
                direction: random_direction(rng),
            },
            EditKind::Moving => Edit::Moving {
                target,
                ingredient: program.random_ingredient(target, rng)?,
                direction: random_direction(rng),
            },
        };
        Some(edit)
    }
}

fn random_direction(rng: &mut StdRng) -> Direction {
    if rng.gen_bool(0.5) {
        Direction::Before
    } else {
        Direction::After
    }
}

impl fmt::Display for Edit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edit::Replacement {
                target,
                ingredient: Some(ingredient),
            } => write!(f, "Replacement({target}, {ingredient})"),
            Edit::Replacement {
                target,
                ingredient: None,
            } => write!(f, "Replacement({target}, -)"),
            Edit::Insertion {
                target,
                ingredient,
                direction,
            } => write!(f, "Insertion({target}, {ingredient}, {direction})"),
            Edit::Deletion { target } => write!(f, "Deletion({target})"),
            Edit::Moving {
                target,
                ingredient,
                direction,
            } => write!(f, "Moving({target}, {ingredient}, {direction})"),
        }
    }
}

/// Edit operator family, used to configure the neighbourhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Replacement,
    Insertion,
    Deletion,
    Moving,
}

impl EditKind {
    pub const ALL: [EditKind; 4] = [
        EditKind::Replacement,
        EditKind::Insertion,
        EditKind::Deletion,
        EditKind::Moving,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EditKind::Replacement => "replacement",
            EditKind::Insertion => "insertion",
            EditKind::Deletion => "deletion",
            EditKind::Moving => "moving",
        }
    }
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EditKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EditKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                format!("unknown edit kind '{s}' (expected replacement, insertion, deletion or moving)")
            })
    }
}
