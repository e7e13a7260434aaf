//! Node addressing inside a mutable program tree.
//!
//! A [`Position`] is a path of `(container, index)` steps from the root of a
//! file's content. Engines enumerate positions in pre-order to build the
//! modification point table; edits then refer to points by their index into
//! that table, and the table entries are rewritten as insertions shift
//! siblings around.

use std::fmt;

/// One step of a [`Position`]: the named child list and the slot inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Step {
    pub container: String,
    pub index: usize,
}

impl Step {
    pub fn new(container: impl Into<String>, index: usize) -> Self {
        Self {
            container: container.into(),
            index,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.container, self.index)
    }
}

/// Path from the content root to a node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Position {
    steps: Vec<Step>,
}

impl Position {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// Position of a line in a line-granularity file.
    pub fn line(index: usize) -> Self {
        Self::new(vec![Step::new(LINE_CONTAINER, index)])
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    pub fn last(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Steps leading to the parent node (everything but the last step).
    pub fn parent(&self) -> &[Step] {
        match self.steps.split_last() {
            Some((_, parent)) => parent,
            None => &[],
        }
    }

    /// Extend this position by one step.
    pub fn child(&self, container: impl Into<String>, index: usize) -> Self {
        let mut steps = self.steps.clone();
        steps.push(Step::new(container, index));
        Self { steps }
    }

    /// True when `self` is `prefix` or lies below it.
    pub fn starts_with(&self, prefix: &[Step]) -> bool {
        self.steps.starts_with(prefix)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "/");
        }
        for step in &self.steps {
            write!(f, "/{step}")?;
        }
        Ok(())
    }
}

/// Container label used by the line engine.
pub const LINE_CONTAINER: &str = "line";

/// Whether `label` is a well-formed container label.
///
/// Labels are identifiers optionally followed by `#n` to tell apart several
/// same-named child lists of one node. Anything else cannot have been produced
/// by an engine and indicates corrupted bookkeeping.
pub fn is_container_label(label: &str) -> bool {
    let (name, ordinal) = match label.split_once('#') {
        Some((name, ordinal)) => (name, Some(ordinal)),
        None => (label, None),
    };
    let name_ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    let ordinal_ok = ordinal.map_or(true, |o| {
        !o.is_empty() && o.chars().all(|c| c.is_ascii_digit())
    });
    name_ok && ordinal_ok
}

/// Panic unless every step of `position` carries a well-formed label.
pub(crate) fn assert_well_formed(position: &Position) {
    for step in position.steps() {
        assert!(
            is_container_label(&step.container),
            "malformed container label {:?} in position {}",
            step.container,
            position
        );
    }
}

/// Shift the table entries that follow an insertion point.
///
/// Every position that passes through `parent` and then through slot `i` of
/// `container` is moved to slot `i + 1` when `i > cutoff`, or when
/// `i == cutoff` and `inclusive` is set. Descendants move along with their
/// ancestor because the rewritten step is shared by their whole path.
/// Entries under other parents or other containers are left untouched.
pub fn shift_table(
    table: &[Position],
    parent: &[Step],
    container: &str,
    cutoff: usize,
    inclusive: bool,
) -> Vec<Position> {
    let depth = parent.len();
    table
        .iter()
        .map(|position| {
            let mut position = position.clone();
            if position.depth() > depth && position.starts_with(parent) {
                let step = &mut position.steps[depth];
                let moves = if inclusive {
                    step.index >= cutoff
                } else {
                    step.index > cutoff
                };
                if step.container == container && moves {
                    step.index += 1;
                }
            }
            position
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pos(steps: &[(&str, usize)]) -> Position {
        Position::new(steps.iter().map(|(c, i)| Step::new(*c, *i)).collect())
    }

    #[test]
    fn display_renders_path() {
        let p = pos(&[("body", 0), ("orelse", 2)]);
        assert_eq!(p.to_string(), "/body[0]/orelse[2]");
        assert_eq!(Position::default().to_string(), "/");
    }

    #[test]
    fn parent_drops_last_step() {
        let p = pos(&[("body", 1), ("body", 3)]);
        assert_eq!(p.parent(), &[Step::new("body", 1)]);
        assert!(Position::default().parent().is_empty());
    }

    #[test]
    fn labels() {
        assert!(is_container_label("body"));
        assert!(is_container_label("consequence#2"));
        assert!(is_container_label("line"));
        assert!(!is_container_label(""));
        assert!(!is_container_label("body#"));
        assert!(!is_container_label("bo dy"));
        assert!(!is_container_label("#3"));
    }

    #[test]
    #[should_panic(expected = "malformed container label")]
    fn malformed_label_panics() {
        assert_well_formed(&pos(&[("body", 0), ("not a label", 1)]));
    }

    #[test]
    fn shift_moves_later_siblings_and_descendants() {
        let table = vec![
            pos(&[("body", 0)]),
            pos(&[("body", 1)]),
            pos(&[("body", 1), ("body", 0)]),
            pos(&[("body", 2)]),
        ];
        let shifted = shift_table(&table, &[], "body", 1, true);
        assert_eq!(
            shifted,
            vec![
                pos(&[("body", 0)]),
                pos(&[("body", 2)]),
                pos(&[("body", 2), ("body", 0)]),
                pos(&[("body", 3)]),
            ]
        );
    }

    #[test]
    fn shift_exclusive_keeps_cutoff() {
        let table = vec![pos(&[("body", 1)]), pos(&[("body", 2)])];
        let shifted = shift_table(&table, &[], "body", 1, false);
        assert_eq!(shifted, vec![pos(&[("body", 1)]), pos(&[("body", 3)])]);
    }

    #[test]
    fn shift_ignores_sibling_containers() {
        let parent = [Step::new("body", 0)];
        let table = vec![
            pos(&[("body", 0), ("consequence", 1)]),
            pos(&[("body", 0), ("alternative", 1)]),
            pos(&[("body", 1), ("consequence", 1)]),
        ];
        let shifted = shift_table(&table, &parent, "consequence", 0, true);
        assert_eq!(
            shifted,
            vec![
                pos(&[("body", 0), ("consequence", 2)]),
                pos(&[("body", 0), ("alternative", 1)]),
                pos(&[("body", 1), ("consequence", 1)]),
            ]
        );
    }

    proptest! {
        #[test]
        fn shift_is_plus_one_from_cutoff(n in 1usize..40, k in 0usize..40) {
            let k = k % n;
            let table: Vec<Position> = (0..n).map(Position::line).collect();
            let shifted = shift_table(&table, &[], LINE_CONTAINER, k, true);
            for (before, after) in table.iter().zip(&shifted) {
                let i = before.last().unwrap().index;
                let j = after.last().unwrap().index;
                if i < k {
                    prop_assert_eq!(i, j);
                } else {
                    prop_assert_eq!(i + 1, j);
                }
            }
        }

        #[test]
        fn shift_preserves_length_and_order(n in 0usize..30, k in 0usize..30, inclusive: bool) {
            let table: Vec<Position> = (0..n).map(|i| pos(&[("body", i), ("body", 0)])).collect();
            let shifted = shift_table(&table, &[], "body", k, inclusive);
            prop_assert_eq!(shifted.len(), table.len());
            let mut sorted = shifted.clone();
            sorted.sort();
            prop_assert_eq!(sorted, shifted);
        }
    }
}
