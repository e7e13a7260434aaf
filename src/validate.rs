//! Syntax validation of mutated sources.
//!
//! A mutated file is re-parsed with tree-sitter and its ERROR / MISSING nodes
//! are compared against the original's. Byte ranges move around as soon as a
//! statement is inserted, so the comparison is by count: a candidate is
//! rejected only when it has more error nodes than the file it came from.

use crate::engine::{EngineError, Language};
use crate::pool;

/// Location of an error node in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorLocation {
    pub byte_start: usize,
    pub byte_end: usize,
    pub line: usize,
    pub column: usize,
    pub context: String,
}

/// Every ERROR or MISSING node of `source`, in document order.
pub fn syntax_errors(language: Language, source: &str) -> Result<Vec<ErrorLocation>, EngineError> {
    let tree = pool::parse(language, source)?;
    let mut errors = Vec::new();
    if tree.root_node().has_error() {
        collect_errors(tree.root_node(), source, &mut errors);
    }
    Ok(errors)
}

/// Whether `edited` has more syntax errors than `original`.
pub fn introduces_errors(
    language: Language,
    original: &str,
    edited: &str,
) -> Result<bool, EngineError> {
    let before = syntax_errors(language, original)?.len();
    let after = syntax_errors(language, edited)?.len();
    Ok(after > before)
}

fn collect_errors(node: tree_sitter::Node<'_>, source: &str, errors: &mut Vec<ErrorLocation>) {
    if node.is_error() || node.is_missing() {
        let start = node.start_position();
        let byte_start = node.start_byte();
        let byte_end = node.end_byte();

        let context_start = floor_char_boundary(source, byte_start.saturating_sub(20));
        let context_end = floor_char_boundary(source, (byte_end + 20).min(source.len()));
        let context = source
            .get(context_start..context_end)
            .unwrap_or("")
            .replace('\n', "\\n");

        errors.push(ErrorLocation {
            byte_start,
            byte_end,
            line: start.row + 1,
            column: start.column + 1,
            context,
        });
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.has_error() || child.is_missing() {
            collect_errors(child, source, errors);
        }
    }
}

fn floor_char_boundary(source: &str, mut index: usize) -> usize {
    while index > 0 && !source.is_char_boundary(index) {
        index -= 1;
    }
    index
}
