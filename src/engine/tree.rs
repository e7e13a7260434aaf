//! Statement-tree engine built on tree-sitter.
//!
//! The concrete syntax tree produced by tree-sitter is immutable, so it is
//! converted once into an owned arena of statement nodes. Each node keeps its
//! source text split around the statement lists (blocks) it owns; each block
//! keeps its items plus the exact text that precedes every item. Serializing
//! an untouched tree therefore reproduces the file byte for byte, comments
//! and all.
//!
//! Copying a subtree between arenas (ingredient from the pristine tree into a
//! candidate's working copy) appends fresh nodes; replaced nodes simply
//! become unreachable.

use crate::engine::lang::Language;
use crate::engine::{Content, Direction, Engine, EngineError, Ingredient, WorkingFile};
use crate::pool;
use crate::position::{assert_well_formed, shift_table, Position};
use crate::validate;
use std::collections::HashMap;
use tracing::debug;

pub type NodeId = usize;

/// Label of the top-level statement list.
pub const ROOT_LABEL: &str = "body";

const ROOT_KIND: &str = "root";
const PLACEHOLDER_KIND: &str = "placeholder";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Text(String),
    Block(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    label: String,
    items: Vec<NodeId>,
    /// Text preceding each item, parallel to `items`.
    leads: Vec<String>,
    tail: String,
    /// Whitespace put between an inserted item and its neighbour.
    separator: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Node {
    kind: String,
    /// Leading whitespace of the line the node starts on.
    indent: String,
    parts: Vec<Part>,
    blocks: Vec<Block>,
}

/// Owned, mutable statement tree of one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree {
    language: Language,
    nodes: Vec<Node>,
    root: NodeId,
}

impl SyntaxTree {
    pub fn parse(language: Language, source: &str) -> Result<Self, EngineError> {
        let parsed = pool::parse(language, source)?;
        let ts_root = parsed.root_node();

        let mut builder = Builder {
            language,
            source,
            nodes: Vec::new(),
        };
        let block = builder.block(ts_root, ROOT_LABEL.to_string());
        let root = builder.push(Node {
            kind: ROOT_KIND.to_string(),
            indent: String::new(),
            parts: vec![
                Part::Text(source[..ts_root.start_byte()].to_string()),
                Part::Block(0),
                Part::Text(source[ts_root.end_byte()..].to_string()),
            ],
            blocks: vec![block],
        });

        Ok(Self {
            language,
            nodes: builder.nodes,
            root,
        })
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Pre-order enumeration of every statement position.
    pub fn positions(&self) -> Vec<Position> {
        let mut out = Vec::new();
        self.visit(self.root, &Position::default(), &mut out);
        out
    }

    fn visit(&self, id: NodeId, prefix: &Position, out: &mut Vec<Position>) {
        for block in &self.nodes[id].blocks {
            for (index, item) in block.items.iter().enumerate() {
                let position = prefix.child(block.label.as_str(), index);
                out.push(position.clone());
                self.visit(*item, &position, out);
            }
        }
    }

    /// Resolve `position` to (owner node, block slot, item index).
    ///
    /// # Panics
    ///
    /// Panics if a step carries a label no engine could have produced.
    fn locate(&self, position: &Position) -> Option<(NodeId, usize, usize)> {
        assert_well_formed(position);
        let (last, parent) = position.steps().split_last()?;
        let mut node = self.root;
        for step in parent {
            let block = self.block_slot(node, &step.container)?;
            node = *self.nodes[node].blocks[block].items.get(step.index)?;
        }
        let block = self.block_slot(node, &last.container)?;
        (last.index < self.nodes[node].blocks[block].items.len())
            .then_some((node, block, last.index))
    }

    fn block_slot(&self, node: NodeId, label: &str) -> Option<usize> {
        self.nodes[node]
            .blocks
            .iter()
            .position(|block| block.label == label)
    }

    fn node_at(&self, position: &Position) -> Option<NodeId> {
        let (owner, block, index) = self.locate(position)?;
        Some(self.nodes[owner].blocks[block].items[index])
    }

    /// Kind of the node at `position` (the tree-sitter kind, or
    /// `placeholder` for a deleted slot).
    pub fn kind_at(&self, position: &Position) -> Option<&str> {
        self.node_at(position)
            .map(|id| self.nodes[id].kind.as_str())
    }

    pub fn text_at(&self, position: &Position) -> Option<String> {
        let id = self.node_at(position)?;
        let mut out = String::new();
        self.write(id, &mut out);
        Some(out)
    }

    pub fn to_source(&self) -> String {
        let mut out = String::new();
        self.write(self.root, &mut out);
        out
    }

    fn write(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        for part in &node.parts {
            match part {
                Part::Text(text) => out.push_str(text),
                Part::Block(slot) => {
                    let block = &node.blocks[*slot];
                    for (lead, item) in block.leads.iter().zip(&block.items) {
                        out.push_str(lead);
                        self.write(*item, out);
                    }
                    out.push_str(&block.tail);
                }
            }
        }
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn push_placeholder(&mut self, indent: String) -> NodeId {
        let text = self.language.placeholder().to_string();
        self.push(Node {
            kind: PLACEHOLDER_KIND.to_string(),
            indent,
            parts: vec![Part::Text(text)],
            blocks: Vec::new(),
        })
    }

    /// Deep-copy the subtree rooted at `id` in `source` into this arena,
    /// moving every continuation line from the copied node's indentation to
    /// `indent`.
    fn import(&mut self, source: &SyntaxTree, id: NodeId, indent: &str) -> NodeId {
        let from = source.nodes[id].indent.clone();
        self.import_with(source, id, &mut Reindent::new(&from, indent))
    }

    /// Texts are visited in serialization order so a line break at the end
    /// of one segment reindents the start of the next.
    fn import_with(&mut self, source: &SyntaxTree, id: NodeId, shift: &mut Reindent<'_>) -> NodeId {
        let node = &source.nodes[id];
        let mut parts = Vec::with_capacity(node.parts.len());
        let mut blocks: Vec<Option<Block>> = vec![None; node.blocks.len()];
        for part in &node.parts {
            match part {
                Part::Text(text) => parts.push(Part::Text(shift.apply(text))),
                Part::Block(slot) => {
                    let block = &node.blocks[*slot];
                    let mut items = Vec::with_capacity(block.items.len());
                    let mut leads = Vec::with_capacity(block.leads.len());
                    for (lead, item) in block.leads.iter().zip(&block.items) {
                        leads.push(shift.apply(lead));
                        items.push(self.import_with(source, *item, shift));
                    }
                    blocks[*slot] = Some(Block {
                        label: block.label.clone(),
                        items,
                        leads,
                        tail: shift.apply(&block.tail),
                        separator: match block.separator.strip_prefix('\n') {
                            Some(indent) => format!("\n{}", shift.indentation(indent)),
                            None => block.separator.clone(),
                        },
                    });
                    parts.push(Part::Block(*slot));
                }
            }
        }
        self.push(Node {
            kind: node.kind.clone(),
            indent: shift.indentation(&node.indent),
            parts,
            // every block is referenced by exactly one part
            blocks: blocks.into_iter().flatten().collect(),
        })
    }

    fn indent_of(&self, owner: NodeId, slot: usize, index: usize) -> String {
        let id = self.nodes[owner].blocks[slot].items[index];
        self.nodes[id].indent.clone()
    }

    fn insert_item(&mut self, owner: NodeId, slot: usize, at: usize, item: NodeId) {
        let block = &mut self.nodes[owner].blocks[slot];
        let separator = block.separator.clone();
        if at == 0 {
            // the new first item inherits whatever opened the block
            let opening = std::mem::replace(&mut block.leads[0], separator);
            block.leads.insert(0, opening);
        } else {
            block.leads.insert(at, separator);
        }
        block.items.insert(at, item);
    }
}

/// Moves line starts from one indentation prefix to another across a run of
/// consecutive text segments. Lines not starting with `from` are left alone.
struct Reindent<'a> {
    from: &'a str,
    to: &'a str,
    /// The previous segment ended with a line break.
    line_start: bool,
}

impl<'a> Reindent<'a> {
    fn new(from: &'a str, to: &'a str) -> Self {
        Self {
            from,
            to,
            line_start: false,
        }
    }

    fn indentation(&self, indent: &str) -> String {
        match indent.strip_prefix(self.from) {
            Some(rest) => format!("{}{rest}", self.to),
            None => indent.to_string(),
        }
    }

    fn apply(&mut self, text: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        if self.from == self.to {
            self.line_start = text.ends_with('\n');
            return text.to_string();
        }

        let pieces: Vec<&str> = text.split('\n').collect();
        let mut out = String::with_capacity(text.len());
        for (i, piece) in pieces.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let at_line_start = i > 0 || self.line_start;
            // empty pieces are blank lines, or a line the next segment starts
            if !at_line_start || piece.is_empty() {
                out.push_str(piece);
            } else {
                out.push_str(&self.indentation(piece));
            }
        }
        self.line_start = text.ends_with('\n');
        out
    }
}

struct Builder<'s> {
    language: Language,
    source: &'s str,
    nodes: Vec<Node>,
}

impl<'s> Builder<'s> {
    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn block(&mut self, node: tree_sitter::Node<'_>, label: String) -> Block {
        let mut cursor = node.walk();
        let children: Vec<_> = node
            .named_children(&mut cursor)
            .filter(|child| !child.is_extra())
            .collect();

        let mut items = Vec::with_capacity(children.len());
        let mut leads = Vec::with_capacity(children.len());
        let mut at = node.start_byte();
        for child in &children {
            let start = child.start_byte().max(at);
            leads.push(self.source[at..start].to_string());
            items.push(self.statement(*child));
            at = child.end_byte().max(start);
        }
        let end = node.end_byte().max(at);

        Block {
            label,
            items,
            leads,
            tail: self.source[at..end].to_string(),
            separator: self.separator(children.first().map(|c| c.start_byte())),
        }
    }

    /// Newline plus the first item's indentation when it starts its own
    /// line, the language's inline separator otherwise.
    fn separator(&self, first_item: Option<usize>) -> String {
        let inline = self.language.inline_separator().to_string();
        let Some(start) = first_item else {
            return inline;
        };
        let line_start = self.source[..start].rfind('\n').map_or(0, |i| i + 1);
        let indent = &self.source[line_start..start];
        if indent.chars().all(|c| c == ' ' || c == '\t') {
            format!("\n{indent}")
        } else {
            inline
        }
    }

    /// Leading whitespace of the line containing byte `at`.
    fn line_indent(&self, at: usize) -> &'s str {
        let source = self.source;
        let line_start = source[..at].rfind('\n').map_or(0, |i| i + 1);
        let line = &source[line_start..];
        let width = line
            .find(|c: char| c != ' ' && c != '\t')
            .unwrap_or(line.len())
            .min(at - line_start);
        &line[..width]
    }

    fn statement(&mut self, node: tree_sitter::Node<'_>) -> NodeId {
        let kind = node.kind().to_string();
        let indent = self.line_indent(node.start_byte()).to_string();

        if self.language.is_block(node.kind()) {
            let block = self.block(node, kind.clone());
            return self.push(Node {
                kind,
                indent,
                parts: vec![Part::Block(0)],
                blocks: vec![block],
            });
        }

        let mut found = Vec::new();
        self.collect_blocks(node, true, &mut found);

        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut parts = Vec::with_capacity(found.len() * 2 + 1);
        let mut blocks = Vec::with_capacity(found.len());
        let mut at = node.start_byte();
        for (block_node, label) in found {
            let count = seen.entry(label.clone()).or_insert(0);
            *count += 1;
            let label = if *count == 1 {
                label
            } else {
                format!("{label}#{count}")
            };

            let start = block_node.start_byte().max(at);
            parts.push(Part::Text(self.source[at..start].to_string()));
            parts.push(Part::Block(blocks.len()));
            blocks.push(self.block(block_node, label));
            at = block_node.end_byte().max(start);
        }
        let end = node.end_byte().max(at);
        parts.push(Part::Text(self.source[at..end].to_string()));

        self.push(Node {
            kind,
            indent,
            parts,
            blocks,
        })
    }

    /// Outermost block descendants of `node`, labelled by the field they
    /// occupy in their parent.
    fn collect_blocks<'t>(
        &self,
        node: tree_sitter::Node<'t>,
        top: bool,
        out: &mut Vec<(tree_sitter::Node<'t>, String)>,
    ) {
        let mut cursor = node.walk();
        if !cursor.goto_first_child() {
            return;
        }
        loop {
            let child = cursor.node();
            if self.language.is_block(child.kind()) {
                let label = match cursor.field_name() {
                    Some(field) => field.to_string(),
                    None if top => child.kind().to_string(),
                    None => node.kind().to_string(),
                };
                out.push((child, label));
            } else if child.child_count() > 0 {
                self.collect_blocks(child, false, out);
            }
            if !cursor.goto_next_sibling() {
                break;
            }
        }
    }
}

/// Engine for one tree-sitter language.
#[derive(Debug, Clone)]
pub struct TreeEngine {
    language: Language,
    id: String,
}

impl TreeEngine {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            id: format!("tree:{}", language.name()),
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }
}

impl Engine for TreeEngine {
    fn id(&self) -> &str {
        &self.id
    }

    fn parse(&self, source: &str) -> Result<Content, EngineError> {
        SyntaxTree::parse(self.language, source).map(Content::Tree)
    }

    fn modification_points(&self, content: &Content) -> Vec<Position> {
        content.expect_tree().positions()
    }

    fn node_text(&self, content: &Content, position: &Position) -> Option<String> {
        content.expect_tree().text_at(position)
    }

    fn dump(&self, content: &Content) -> String {
        content.expect_tree().to_source()
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
        let tree = working.content.expect_tree_mut();
        let Some((owner, slot, index)) = tree.locate(position) else {
            debug!(%position, "replacement target no longer resolves");
            return false;
        };

        let indent = tree.indent_of(owner, slot, index);
        let replacement = match ingredient {
            Some(ingredient) => {
                let source = ingredient.content.expect_tree();
                let Some(id) = source.node_at(ingredient.position) else {
                    debug!(position = %ingredient.position, "ingredient does not resolve");
                    return false;
                };
                tree.import(source, id, &indent)
            }
            None => tree.push_placeholder(indent),
        };
        tree.nodes[owner].blocks[slot].items[index] = replacement;
        true
    }

    fn insert(
        &self,
        working: WorkingFile<'_>,
        target: usize,
        ingredient: Ingredient<'_>,
        direction: Direction,
    ) -> bool {
        let Some(position) = working.points.get(target).cloned() else {
            return false;
        };
        let tree = working.content.expect_tree_mut();
        let Some((owner, slot, index)) = tree.locate(&position) else {
            debug!(%position, "insertion target no longer resolves");
            return false;
        };
        let source = ingredient.content.expect_tree();
        let Some(id) = source.node_at(ingredient.position) else {
            debug!(position = %ingredient.position, "ingredient does not resolve");
            return false;
        };

        let indent = tree.indent_of(owner, slot, index);
        let copy = tree.import(source, id, &indent);
        let at = match direction {
            Direction::Before => index,
            Direction::After => index + 1,
        };
        tree.insert_item(owner, slot, at, copy);

        let label = tree.nodes[owner].blocks[slot].label.clone();
        *working.points = shift_table(working.points, position.parent(), &label, at, true);
        true
    }

    fn introduces_syntax_errors(&self, original: &Content, mutated: &Content) -> bool {
        let before = original.expect_tree().to_source();
        let after = mutated.expect_tree().to_source();
        validate::introduces_errors(self.language, &before, &after).unwrap_or(true)
    }
}
