//! Syntax-side types shared by every stage of the Quill backend.
//!
//! The front end (tokenizer, parser, structural validator) is not part of
//! this workspace; it hands over a [`TreeNode`] per module, which
//! [`Ast::from_tree`] turns into an index arena the analyzer annotates in
//! place.

mod ast;
mod diagnostic;
mod module;
mod token;
mod tree;
mod types;

pub use ast::{Ast, AstNode, NodeId, NodeKind, ScopeId};
pub use diagnostic::{Diagnostic, Diagnostics, Severity, Stage};
pub use module::{Module, ModuleResult};
pub use token::{Span, Token, TokenKind};
pub use tree::{TreeNode, build};
pub use types::{DataType, ParseTypeError};
