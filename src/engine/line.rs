use crate::engine::{Content, Direction, Engine, EngineError, Ingredient, WorkingFile};
use crate::position::{shift_table, Position, LINE_CONTAINER};

/// Line-granularity engine: a file is a list of lines, a position is a
/// single `line[k]` step and a deleted line becomes an empty line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineEngine;

/// Index of the line addressed by `position`.
///
/// # Panics
///
/// Panics if `position` is not a single `line` step.
fn line_index(position: &Position) -> usize {
    match position.steps() {
        [step] if step.container == LINE_CONTAINER => step.index,
        _ => panic!("not a line position: {position}"),
    }
}

fn ingredient_text(ingredient: Ingredient<'_>) -> Option<String> {
    ingredient
        .content
        .expect_lines()
        .get(line_index(ingredient.position))
        .cloned()
}

impl Engine for LineEngine {
    fn id(&self) -> &str {
        "line"
    }

    fn parse(&self, source: &str) -> Result<Content, EngineError> {
        Ok(Content::Lines(
            source.lines().map(|line| line.trim_end().to_string()).collect(),
        ))
    }

    fn modification_points(&self, content: &Content) -> Vec<Position> {
        (0..content.expect_lines().len()).map(Position::line).collect()
    }

    fn node_text(&self, content: &Content, position: &Position) -> Option<String> {
        content.expect_lines().get(line_index(position)).cloned()
    }

    fn dump(&self, content: &Content) -> String {
        let mut out = content.expect_lines().join("\n");
        out.push('\n');
        out
    }

    fn replace(
        &self,
        working: WorkingFile<'_>,
        target: usize,
        ingredient: Option<Ingredient<'_>>,
    ) -> bool {
        let Some(position) = working.points.get(target) else {
            return false;
        };
        let k = line_index(position);
        let text = match ingredient {
            Some(ingredient) => match ingredient_text(ingredient) {
                Some(text) => text,
                None => return false,
            },
            None => String::new(),
        };
        match working.content.expect_lines_mut().get_mut(k) {
            Some(line) => {
                *line = text;
                true
            }
            None => false,
        }
    }

    fn insert(
        &self,
        working: WorkingFile<'_>,
        target: usize,
        ingredient: Ingredient<'_>,
        direction: Direction,
    ) -> bool {
        let Some(position) = working.points.get(target) else {
            return false;
        };
        let k = line_index(position);
        let Some(text) = ingredient_text(ingredient) else {
            return false;
        };
        let lines = working.content.expect_lines_mut();
        if k >= lines.len() {
            return false;
        }
        let at = match direction {
            Direction::Before => k,
            Direction::After => k + 1,
        };
        lines.insert(at, text);
        *working.points = shift_table(working.points, &[], LINE_CONTAINER, at, true);
        true
    }
}
