use serde::{Deserialize, Serialize};

use crate::ast::NodeKind;
use crate::token::{Token, TokenKind};

/// Owned interchange form of a syntax tree, as a front end produces it
/// (and as the CLI reads it from JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub kind: NodeKind,
    #[serde(default)]
    pub token: Token,
    #[serde(default)]
    pub children: Vec<TreeNode>,
    #[serde(default)]
    pub valid: Option<bool>,
}

impl TreeNode {
    pub fn new(kind: NodeKind, token: Token, children: Vec<TreeNode>) -> Self {
        Self {
            kind,
            token,
            children,
            valid: None,
        }
    }

    pub fn leaf(kind: NodeKind, token: Token) -> Self {
        Self::new(kind, token, Vec::new())
    }

    /// Set the source position of this node's token
    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.token = self.token.at(line, column);
        self
    }

    /// Mark the node as rejected by structural validation
    pub fn invalid(mut self) -> Self {
        self.valid = Some(false);
        self
    }
}

/// Terse constructors for building trees by hand.
///
/// Front ends and tests use these to produce trees with the shapes the
/// analyzer expects (see the node-shape table in the crate docs).
pub mod build {
    use super::*;

    fn word(kind: NodeKind, text: &str, children: Vec<TreeNode>) -> TreeNode {
        TreeNode::new(kind, Token::new(TokenKind::Identifier, text), children)
    }

    fn keyword(kind: NodeKind, text: &str, children: Vec<TreeNode>) -> TreeNode {
        TreeNode::new(kind, Token::new(TokenKind::Keyword, text), children)
    }

    // ── Declarations ────────────────────────────────────────

    pub fn program(module: &str, items: Vec<TreeNode>) -> TreeNode {
        word(NodeKind::Program, module, items)
    }

    /// `import module` (no items) or `import module: a, b as c`
    pub fn import(module: &str, items: Vec<TreeNode>) -> TreeNode {
        keyword(NodeKind::Import, module, items)
    }

    pub fn import_as(module: &str, local: &str) -> TreeNode {
        import(module, vec![alias(local)])
    }

    pub fn import_item(name: &str, local: Option<&str>) -> TreeNode {
        let children = local.map(alias).into_iter().collect();
        word(NodeKind::ImportItem, name, children)
    }

    pub fn alias(name: &str) -> TreeNode {
        word(NodeKind::Alias, name, Vec::new())
    }

    pub fn structure(name: &str, fields: Vec<TreeNode>) -> TreeNode {
        keyword(NodeKind::Struct, name, fields)
    }

    pub fn function(
        name: &str,
        returns: &str,
        params: Vec<TreeNode>,
        body: Vec<TreeNode>,
    ) -> TreeNode {
        word(
            NodeKind::Function,
            name,
            vec![
                ty(returns),
                TreeNode::new(NodeKind::Parameters, Token::default(), params),
                block(body),
            ],
        )
    }

    pub fn global(type_name: &str, name: &str, init: Option<TreeNode>) -> TreeNode {
        keyword(NodeKind::Global, "global", vec![var(type_name, name, init)])
    }

    /// Memory-mapped variable, optionally pinned to a byte offset
    pub fn map(type_name: &str, name: &str, offset: Option<u32>) -> TreeNode {
        let mut children = Vec::new();
        if let Some(offset) = offset {
            children.push(int(&offset.to_string()));
        }
        children.push(var(type_name, name, None));
        keyword(NodeKind::Map, "map", children)
    }

    pub fn var(type_name: &str, name: &str, init: Option<TreeNode>) -> TreeNode {
        let mut children = vec![ty(type_name)];
        children.extend(init);
        word(NodeKind::VariableDef, name, children)
    }

    pub fn param(type_name: &str, name: &str) -> TreeNode {
        var(type_name, name, None)
    }

    pub fn field(type_name: &str, name: &str) -> TreeNode {
        var(type_name, name, None)
    }

    pub fn ty(notation: &str) -> TreeNode {
        word(NodeKind::Type, notation, Vec::new())
    }

    /// Attach an `Export` modifier. Globals and mapped variables carry the
    /// modifier on their inner `VariableDef`.
    pub fn exported(node: TreeNode) -> TreeNode {
        modify(node, NodeKind::Export, "export")
    }

    /// Attach a `Const` modifier
    pub fn constant(node: TreeNode) -> TreeNode {
        modify(node, NodeKind::Const, "const")
    }

    fn modify(mut node: TreeNode, kind: NodeKind, text: &str) -> TreeNode {
        let modifier = keyword(kind, text, Vec::new());
        if matches!(node.kind, NodeKind::Global | NodeKind::Map) {
            if let Some(def) = node
                .children
                .iter_mut()
                .find(|c| c.kind == NodeKind::VariableDef)
            {
                def.children.insert(1, modifier);
                return node;
            }
        }
        if node.kind == NodeKind::VariableDef {
            node.children.insert(1.min(node.children.len()), modifier);
        } else {
            node.children.push(modifier);
        }
        node
    }

    // ── Statements ──────────────────────────────────────────

    pub fn block(statements: Vec<TreeNode>) -> TreeNode {
        TreeNode::new(NodeKind::Block, Token::default(), statements)
    }

    pub fn assign(target: TreeNode, value: TreeNode) -> TreeNode {
        TreeNode::new(
            NodeKind::Assignment,
            Token::new(TokenKind::Punctuation, "="),
            vec![target, value],
        )
    }

    pub fn if_(condition: TreeNode, body: Vec<TreeNode>) -> TreeNode {
        keyword(NodeKind::If, "if", vec![condition, block(body)])
    }

    pub fn else_if(condition: TreeNode, body: Vec<TreeNode>) -> TreeNode {
        keyword(NodeKind::ElseIf, "elif", vec![condition, block(body)])
    }

    pub fn else_(body: Vec<TreeNode>) -> TreeNode {
        keyword(NodeKind::Else, "else", vec![block(body)])
    }

    pub fn while_(condition: TreeNode, body: Vec<TreeNode>) -> TreeNode {
        keyword(NodeKind::While, "while", vec![condition, block(body)])
    }

    pub fn ret(value: TreeNode) -> TreeNode {
        keyword(NodeKind::Return, "return", vec![value])
    }

    pub fn ret_void() -> TreeNode {
        keyword(NodeKind::ReturnVoid, "return", Vec::new())
    }

    pub fn brk() -> TreeNode {
        keyword(NodeKind::Break, "break", Vec::new())
    }

    pub fn cont() -> TreeNode {
        keyword(NodeKind::Continue, "continue", Vec::new())
    }

    // ── Expressions ─────────────────────────────────────────

    pub fn call(callee: TreeNode, args: Vec<TreeNode>) -> TreeNode {
        let text = callee_text(&callee);
        let mut children = vec![callee];
        children.extend(args);
        TreeNode::new(
            NodeKind::FunctionCall,
            Token::new(TokenKind::Identifier, text),
            children,
        )
    }

    /// Call a dotted path such as `int.load` or `math.square`
    pub fn call_path(path: &str, args: Vec<TreeNode>) -> TreeNode {
        let mut segments = path.split('.');
        let first = segments.next().unwrap_or_default();
        let callee = segments.fold(ident(first), access);
        call(callee, args)
    }

    fn callee_text(callee: &TreeNode) -> String {
        match callee.kind {
            NodeKind::Access => {
                let left = callee.children.first().map(callee_text).unwrap_or_default();
                let right = callee.children.get(1).map(callee_text).unwrap_or_default();
                format!("{left}.{right}")
            }
            _ => callee.token.lexeme.clone(),
        }
    }

    pub fn ident(name: &str) -> TreeNode {
        word(NodeKind::Identifier, name, Vec::new())
    }

    pub fn access(left: TreeNode, member: &str) -> TreeNode {
        TreeNode::new(
            NodeKind::Access,
            Token::new(TokenKind::Punctuation, "."),
            vec![left, ident(member)],
        )
    }

    pub fn index(left: TreeNode, position: TreeNode) -> TreeNode {
        TreeNode::new(
            NodeKind::Indexer,
            Token::new(TokenKind::Punctuation, "["),
            vec![left, position],
        )
    }

    pub fn int(text: &str) -> TreeNode {
        TreeNode::leaf(NodeKind::Literal, Token::new(TokenKind::Integer, text))
    }

    pub fn float(text: &str) -> TreeNode {
        TreeNode::leaf(NodeKind::Literal, Token::new(TokenKind::Float, text))
    }

    pub fn boolean(value: bool) -> TreeNode {
        let (kind, text) = if value {
            (TokenKind::True, "true")
        } else {
            (TokenKind::False, "false")
        };
        TreeNode::leaf(NodeKind::Literal, Token::new(kind, text))
    }

    pub fn unary(op: &str, operand: TreeNode) -> TreeNode {
        TreeNode::new(
            NodeKind::UnaryOp,
            Token::new(TokenKind::Operator, op),
            vec![operand],
        )
    }

    pub fn binary(op: &str, left: TreeNode, right: TreeNode) -> TreeNode {
        TreeNode::new(
            NodeKind::BinaryOp,
            Token::new(TokenKind::Operator, op),
            vec![left, right],
        )
    }

    /// Numeric conversion `value as type`
    pub fn convert(value: TreeNode, target: &str) -> TreeNode {
        binary("as", value, ty(target))
    }

    /// Bit-pattern reinterpretation `value bitcast type`
    pub fn bitcast(value: TreeNode, target: &str) -> TreeNode {
        binary("bitcast", value, ty(target))
    }
}
