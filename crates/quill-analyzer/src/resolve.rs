//! Symbol resolution for annotated trees.
//!
//! Once the scope pass has set `scope` on every node, the declaration an
//! expression refers to is a pure function of the tree and the table. The
//! analyzer and the generator both resolve through here so they always
//! agree.

use quill_syntax::{Ast, NodeId, NodeKind, TokenKind};

use crate::literal::parse_int_literal;
use crate::symbols::{FuncId, Symbol, SymbolTable, VarId};

/// Whether `id` is the member name on the right of an `Access`
pub fn is_member_name(ast: &Ast, id: NodeId) -> bool {
    ast.parent(id)
        .is_some_and(|p| ast.kind(p) == NodeKind::Access && ast.child(p, 1) == Some(id))
}

/// Compile-time value of an integer-literal index
pub fn static_index(ast: &Ast, id: NodeId) -> Option<u32> {
    let node = &ast[id];
    if node.kind != NodeKind::Literal || node.token.kind != TokenKind::Integer {
        return None;
    }
    let (literal, _) = parse_int_literal(&node.token.lexeme).ok()?;
    u32::try_from(literal.value).ok()
}

/// Declaration an `Identifier`, `Access`, `Indexer` or `FunctionCall`
/// refers to
pub fn resolve(table: &SymbolTable, ast: &Ast, id: NodeId) -> Option<Symbol> {
    let node = &ast[id];
    let scope = node.scope?;
    match node.kind {
        NodeKind::Identifier if is_member_name(ast, id) => table.member(scope, &node.token.lexeme),
        NodeKind::Identifier => table.lookup_before(scope, &node.token.lexeme, id),
        NodeKind::Access => resolve(table, ast, ast.child(id, 1)?),
        NodeKind::Indexer => {
            let key = static_index(ast, ast.child(id, 1)?).unwrap_or(0);
            table.member(scope, &key.to_string())
        }
        NodeKind::FunctionCall => resolve(table, ast, ast.child(id, 0)?),
        _ => None,
    }
}

pub fn variable(table: &SymbolTable, ast: &Ast, id: NodeId) -> Option<VarId> {
    match resolve(table, ast, id)? {
        Symbol::Variable(v) => Some(v),
        _ => None,
    }
}

pub fn function(table: &SymbolTable, ast: &Ast, id: NodeId) -> Option<FuncId> {
    match resolve(table, ast, id)? {
        Symbol::Function(f) => Some(f),
        _ => None,
    }
}

/// Variable registered for a `VariableDef` node
pub fn declared_variable(table: &SymbolTable, ast: &Ast, def: NodeId) -> Option<VarId> {
    let scope = ast[def].scope?;
    table.variable_for_decl(scope, ast.lexeme(def), def)
}
