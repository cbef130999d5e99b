use crate::ast::Ast;
use crate::token::Token;
use crate::tree::TreeNode;

/// Everything the pipeline produces for one compilation unit
#[derive(Debug, Default, Clone)]
pub struct ModuleResult {
    pub tokens: Vec<Token>,
    pub ast: Option<Ast>,
    pub buffer: Option<Vec<u8>>,
    pub success: bool,
}

/// One compilation unit
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub lines: Vec<String>,
    pub result: ModuleResult,
}

impl Module {
    pub fn new(name: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            name: name.into(),
            lines,
            result: ModuleResult::default(),
        }
    }

    /// A module whose front end already ran and produced `tree`
    pub fn from_tree(name: impl Into<String>, tree: &TreeNode) -> Self {
        let mut module = Module::new(name, Vec::new());
        module.result.ast = Some(Ast::from_tree(tree));
        module
    }
}
