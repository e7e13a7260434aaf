//! Target languages supported by the tree engine.
//!
//! Grammars come from `ast-grep-language`'s bundled tree-sitter parsers, so
//! each language only has to describe which node kinds hold statement lists
//! and what text stands in for a deleted statement.

use crate::engine::errors::EngineError;
use ast_grep_language::{LanguageExt, SupportLang};
use tree_sitter::Parser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    Python,
    Rust,
    Java,
    JavaScript,
    C,
}

impl Language {
    pub const ALL: [Language; 5] = [
        Language::Python,
        Language::Rust,
        Language::Java,
        Language::JavaScript,
        Language::C,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Rust => "rust",
            Language::Java => "java",
            Language::JavaScript => "javascript",
            Language::C => "c",
        }
    }

    /// File extensions (without the dot) claimed by this language.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py"],
            Language::Rust => &["rs"],
            Language::Java => &["java"],
            Language::JavaScript => &["js", "mjs", "cjs"],
            Language::C => &["c", "h"],
        }
    }

    pub fn support_lang(self) -> SupportLang {
        match self {
            Language::Python => SupportLang::Python,
            Language::Rust => SupportLang::Rust,
            Language::Java => SupportLang::Java,
            Language::JavaScript => SupportLang::JavaScript,
            Language::C => SupportLang::C,
        }
    }

    /// Node kinds whose named children form a statement list.
    pub fn block_kinds(self) -> &'static [&'static str] {
        match self {
            Language::Python => &["module", "block"],
            Language::Rust => &["source_file", "block", "declaration_list"],
            Language::Java => &[
                "program",
                "block",
                "class_body",
                "constructor_body",
                "interface_body",
            ],
            Language::JavaScript => &["program", "statement_block", "class_body"],
            Language::C => &["translation_unit", "compound_statement"],
        }
    }

    pub fn is_block(self, kind: &str) -> bool {
        self.block_kinds().contains(&kind)
    }

    /// Text of the no-op statement that fills a deleted slot.
    pub fn placeholder(self) -> &'static str {
        match self {
            Language::Python => "pass",
            // rustc rejects a bare `;` at item level
            Language::Rust => "",
            Language::Java | Language::JavaScript | Language::C => ";",
        }
    }

    /// Separator used between statements of a block written on one line.
    pub fn inline_separator(self) -> &'static str {
        match self {
            Language::Python => "; ",
            _ => " ",
        }
    }
}

/// Create a tree-sitter parser for `language`.
pub fn new_parser(language: Language) -> Result<Parser, EngineError> {
    let mut parser = Parser::new();
    let ts_lang = language.support_lang().get_ts_language();
    parser
        .set_language(&ts_lang)
        .map_err(|_| EngineError::LanguageSet {
            language: language.name(),
        })?;
    Ok(parser)
}
