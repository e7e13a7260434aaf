//! Thread-local parser pooling.
//!
//! Tree-sitter parsers are cheap to reuse and comparatively costly to build.
//! One parser per language is created lazily on each thread and reused for
//! every subsequent parse on that thread.

use crate::engine::lang::{new_parser, Language};
use crate::engine::EngineError;
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tree_sitter::{Parser, Tree};

thread_local! {
    static PARSERS: RefCell<HashMap<Language, Parser>> = RefCell::new(HashMap::new());
}

/// Execute `f` with the pooled parser for `language`.
///
/// # Example
///
/// ```no_run
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use graft::engine::Language;
/// use graft::pool::with_parser;
///
/// let tree = with_parser(Language::Python, |parser| parser.parse("x = 1\n", None))?;
/// assert!(tree.is_some());
/// # Ok(())
/// # }
/// ```
pub fn with_parser<F, R>(language: Language, f: F) -> Result<R, EngineError>
where
    F: FnOnce(&mut Parser) -> R,
{
    PARSERS.with(|cell| {
        let mut parsers = cell.borrow_mut();
        let parser = match parsers.entry(language) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(new_parser(language)?),
        };
        Ok(f(parser))
    })
}

/// Parse `source` with the pooled parser.
pub fn parse(language: Language, source: &str) -> Result<Tree, EngineError> {
    with_parser(language, |parser| parser.parse(source, None))?.ok_or(
        EngineError::ParseFailed {
            language: language.name(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_parser_across_calls() {
        let first = parse(Language::Python, "a = 1\n").unwrap();
        let second = parse(Language::Python, "b = 2\n").unwrap();
        assert_eq!(first.root_node().kind(), "module");
        assert_eq!(second.root_node().kind(), "module");
        let pooled = PARSERS.with(|cell| cell.borrow().contains_key(&Language::Python));
        assert!(pooled);
    }
}
