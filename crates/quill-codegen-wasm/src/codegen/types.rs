use std::collections::HashMap;

use quill_analyzer::VarId;
use quill_syntax::{DataType, NodeId};

use crate::binary::ValType;

/// Context for compiling a single function body
pub(crate) struct FuncCtx {
    /// Local index of every primitive leaf of a parameter or local variable
    pub(crate) locals: HashMap<VarId, u32>,
    /// Next local index to assign
    pub(crate) next_local: u32,
    /// Locals declared in the body (beyond parameters)
    pub(crate) extra_locals: Vec<ValType>,
    /// Debug names by local index, parameters included
    pub(crate) names: Vec<(u32, String)>,
    /// Enclosing loops, innermost last
    pub(crate) loop_depth_stack: Vec<LoopInfo>,
    /// Current block nesting depth (incremented for every block/loop/if)
    pub(crate) block_depth: u32,
    pub(crate) return_type: DataType,
}

#[derive(Clone, Copy)]
pub(crate) struct LoopInfo {
    /// Label depth for `break` (the outer block)
    pub(crate) break_depth: u32,
    /// Label depth for `continue` (the loop itself)
    pub(crate) continue_depth: u32,
}

impl FuncCtx {
    pub(crate) fn new(return_type: DataType) -> Self {
        Self {
            locals: HashMap::new(),
            next_local: 0,
            extra_locals: Vec::new(),
            names: Vec::new(),
            loop_depth_stack: Vec::new(),
            block_depth: 0,
            return_type,
        }
    }

    pub(crate) fn add_param(&mut self, leaf: VarId, name: String) -> u32 {
        let idx = self.next_local;
        self.locals.insert(leaf, idx);
        self.names.push((idx, name));
        self.next_local += 1;
        idx
    }

    pub(crate) fn declare_local(&mut self, leaf: VarId, ty: ValType, name: String) -> u32 {
        if let Some(&idx) = self.locals.get(&leaf) {
            return idx;
        }
        let idx = self.add_param(leaf, name);
        self.extra_locals.push(ty);
        idx
    }
}

/// Where a primitive leaf lives at run time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Storage {
    Local(u32),
    Global(u32),
    /// Linear memory at a constant base address
    Memory(u32),
}

/// A resolved place expression: the variable it names plus the
/// non-constant subscripts along the way, each with its element stride
#[derive(Debug, Clone)]
pub(crate) struct Place {
    pub(crate) var: VarId,
    pub(crate) dynamic: Vec<(NodeId, u32)>,
}

impl Place {
    pub(crate) fn of(var: VarId) -> Self {
        Self {
            var,
            dynamic: Vec::new(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("Codegen error at line {line}, column {column}: {message}")]
    Error {
        message: String,
        line: usize,
        column: usize,
        length: usize,
    },
}

impl CodegenError {
    pub fn message(&self) -> &str {
        match self {
            CodegenError::Error { message, .. } => message,
        }
    }
}
