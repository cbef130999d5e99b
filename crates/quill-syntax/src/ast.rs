use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

use crate::token::Token;
use crate::tree::TreeNode;
use crate::types::DataType;

/// Index of a node inside its [`Ast`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Opaque handle to a scope of the analyzer's symbol table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

/// Stable node-kind tags produced by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    // Declarations
    Program,
    Import,
    ImportItem,
    Alias,
    Struct,
    Function,
    Parameters,
    Global,
    Map,
    VariableDef,
    Type,
    Const,
    Export,

    // Statements
    Block,
    Assignment,
    If,
    ElseIf,
    Else,
    While,
    Break,
    Continue,
    Return,
    ReturnVoid,

    // Expressions
    FunctionCall,
    Identifier,
    Access,
    Indexer,
    Literal,
    UnaryOp,
    BinaryOp,
}

impl NodeKind {
    /// Kinds that leave a value on the VM stack
    pub fn is_expression(self) -> bool {
        matches!(
            self,
            NodeKind::FunctionCall
                | NodeKind::Identifier
                | NodeKind::Access
                | NodeKind::Indexer
                | NodeKind::Literal
                | NodeKind::UnaryOp
                | NodeKind::BinaryOp
        )
    }

    /// Kinds that name storage (assignment targets)
    pub fn is_place(self) -> bool {
        matches!(
            self,
            NodeKind::Identifier | NodeKind::Access | NodeKind::Indexer
        )
    }
}

/// A node of the syntax tree. The front end fills `kind`, `token`,
/// `children` and `valid`; the analyzer fills `scope` and `data_type`; the
/// generator sets `generated`.
#[derive(Debug, Clone)]
pub struct AstNode {
    pub kind: NodeKind,
    pub token: Token,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    /// `None` when structural validation did not look at the node
    pub valid: Option<bool>,
    pub scope: Option<ScopeId>,
    pub data_type: Option<DataType>,
    pub generated: bool,
}

impl AstNode {
    pub fn is_invalid(&self) -> bool {
        self.valid == Some(false)
    }
}

/// Arena-allocated syntax tree addressed by [`NodeId`]
#[derive(Debug, Clone)]
pub struct Ast {
    nodes: Vec<AstNode>,
    root: NodeId,
}

impl Ast {
    /// Flatten an owned tree into the arena. Nodes are numbered in pre-order,
    /// so the root is always `NodeId(0)`.
    pub fn from_tree(tree: &TreeNode) -> Self {
        let mut ast = Ast {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        ast.push_tree(tree, None);
        ast
    }

    fn push_tree(&mut self, tree: &TreeNode, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(AstNode {
            kind: tree.kind,
            token: tree.token.clone(),
            children: Vec::with_capacity(tree.children.len()),
            parent,
            valid: tree.valid,
            scope: None,
            data_type: None,
            generated: false,
        });
        for child in &tree.children {
            let child_id = self.push_tree(child, Some(id));
            self.nodes[id.0 as usize].children.push(child_id);
        }
        id
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn kind(&self, id: NodeId) -> NodeKind {
        self[id].kind
    }

    pub fn lexeme(&self, id: NodeId) -> &str {
        &self[id].token.lexeme
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self[id].children
    }

    pub fn child(&self, id: NodeId, position: usize) -> Option<NodeId> {
        self[id].children.get(position).copied()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self[id].parent
    }

    /// First direct child of the given kind
    pub fn child_of_kind(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self[id]
            .children
            .iter()
            .copied()
            .find(|&c| self.kind(c) == kind)
    }

    pub fn has_child(&self, id: NodeId, kind: NodeKind) -> bool {
        self.child_of_kind(id, kind).is_some()
    }

    /// First direct child that is an expression (e.g. a variable's initializer)
    pub fn first_expression(&self, id: NodeId) -> Option<NodeId> {
        self[id]
            .children
            .iter()
            .copied()
            .find(|&c| self.kind(c).is_expression())
    }

    /// Position of `id` among its parent's children
    pub fn sibling_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self[parent].children.iter().position(|&c| c == id)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.sibling_index(id)?;
        self.child(parent, index + 1)
    }

    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.sibling_index(id)?;
        index.checked_sub(1).and_then(|i| self.child(parent, i))
    }

    /// Strict ancestors of `id`, innermost first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&p| self.parent(p))
    }

    /// Innermost ancestor of the given kind
    pub fn enclosing(&self, id: NodeId, kind: NodeKind) -> Option<NodeId> {
        self.ancestors(id).find(|&a| self.kind(a) == kind)
    }

    /// All node ids in pre-order
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            for &child in self[id].children.iter().rev() {
                stack.push(child);
            }
        }
        order
    }
}

impl Index<NodeId> for Ast {
    type Output = AstNode;

    fn index(&self, id: NodeId) -> &AstNode {
        &self.nodes[id.0 as usize]
    }
}

impl IndexMut<NodeId> for Ast {
    fn index_mut(&mut self, id: NodeId) -> &mut AstNode {
        &mut self.nodes[id.0 as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::*;

    #[test]
    fn from_tree_links_parents_in_preorder() {
        let tree = program(
            "m",
            vec![function("f", "void", vec![], vec![ret_void()])],
        );
        let ast = Ast::from_tree(&tree);
        assert_eq!(ast.root(), NodeId(0));
        assert_eq!(ast.kind(NodeId(1)), NodeKind::Function);
        let block = ast.child_of_kind(NodeId(1), NodeKind::Block).unwrap();
        let ret = ast.child(block, 0).unwrap();
        assert_eq!(ast.kind(ret), NodeKind::ReturnVoid);
        assert_eq!(ast.enclosing(ret, NodeKind::Function), Some(NodeId(1)));
        assert_eq!(ast.preorder().len(), ast.len());
    }

    #[test]
    fn sibling_lookup() {
        let tree = block(vec![
            if_(boolean(true), vec![]),
            else_(vec![]),
        ]);
        let ast = Ast::from_tree(&tree);
        let first = ast.child(ast.root(), 0).unwrap();
        let second = ast.next_sibling(first).unwrap();
        assert_eq!(ast.kind(second), NodeKind::Else);
        assert_eq!(ast.previous_sibling(second), Some(first));
        assert_eq!(ast.next_sibling(second), None);
    }
}
