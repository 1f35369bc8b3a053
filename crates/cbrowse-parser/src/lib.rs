//! Structural C/C++ parsing for type location.
//!
//! The parser here is not a compiler front end. It walks a translation unit far enough to
//! report namespaces, class-like declarations (with their base clauses), enums, typedefs,
//! function bodies and `#include` directives to a [`SourceVisitor`]. Bodies of functions are
//! still walked so that local declarations are reported, bracketed by
//! [`SourceVisitor::enter_function_body`] / [`SourceVisitor::exit_function_body`].

mod lexer;
mod outline;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub use outline::OutlineParser;

/// Byte range of a declared name inside the parsed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceSpan {
    pub offset: u32,
    pub length: u32,
}

impl SourceSpan {
    pub fn new(offset: usize, length: usize) -> Self {
        Self {
            offset: offset as u32,
            length: length as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKey {
    Class,
    Struct,
    Union,
}

/// A class, struct or union definition (forward declarations are not reported).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    pub key: ClassKey,
    /// Name as written, split on `::`. Out-of-line nested definitions have several segments.
    pub name: Vec<String>,
    pub span: SourceSpan,
    /// Base classes as written, each split on `::`, template arguments dropped.
    pub bases: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludeDirective {
    pub target: String,
    pub angled: bool,
    /// First existing candidate from the including file's directory (quoted form only)
    /// followed by the include search path.
    pub resolved: Option<PathBuf>,
    pub span: SourceSpan,
}

/// Receives structural events in source order. Every method defaults to a no-op.
pub trait SourceVisitor {
    /// Anonymous namespaces are reported with an empty name.
    fn enter_namespace(&mut self, _name: &str, _span: SourceSpan) {}
    fn exit_namespace(&mut self) {}
    fn enter_class(&mut self, _decl: &ClassDecl) {}
    fn exit_class(&mut self) {}
    fn declare_enum(&mut self, _name: &[String], _span: SourceSpan) {}
    fn declare_typedef(&mut self, _name: &str, _span: SourceSpan) {}
    fn enter_function_body(&mut self) {}
    fn exit_function_body(&mut self) {}
    fn enter_inclusion(&mut self, _include: &IncludeDirective) {}
    fn exit_inclusion(&mut self) {}

    /// Polled between declarations; once `true` the parser returns without further events.
    fn should_stop(&self) -> bool {
        false
    }
}

/// Preprocessor context handed to the parser.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    /// Object-like macros. An empty replacement makes the name disappear (export macros);
    /// a single-identifier replacement substitutes it.
    pub macros: HashMap<String, String>,
    pub include_paths: Vec<PathBuf>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define(mut self, name: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.macros.insert(name.into(), replacement.into());
        self
    }

    pub fn include_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.include_paths.push(dir.into());
        self
    }

    /// Resolves an include directive the way a compiler driver would search for it.
    pub fn resolve_include(&self, includer: &Path, target: &str, angled: bool) -> Option<PathBuf> {
        let local = if angled {
            None
        } else {
            includer.parent().map(|dir| dir.join(target))
        };
        local
            .into_iter()
            .chain(self.include_paths.iter().map(|dir| dir.join(target)))
            .find(|candidate| candidate.is_file())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unterminated block comment starting at byte {position}")]
    UnterminatedComment { position: usize },
    #[error("unbalanced closing brace at byte {position}")]
    UnbalancedBraces { position: usize },
    #[error("unexpected end of file with {open} unclosed scope(s)")]
    UnexpectedEof { open: usize },
}

pub trait StructuralParser: Send + Sync {
    fn parse(
        &self,
        path: &Path,
        text: &str,
        symbols: &SymbolTable,
        visitor: &mut dyn SourceVisitor,
    ) -> Result<(), ParseError>;
}
