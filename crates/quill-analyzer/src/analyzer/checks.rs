use quill_syntax::{DataType, NodeId, NodeKind, Stage};

use super::*;
use crate::resolve::{self, static_index};
use crate::symbols::Symbol;

impl Analyzer<'_> {
    /// Final analysis: every rule for a node's kind runs, and each may add
    /// diagnostics. Nothing in the tree changes.
    pub fn check(&mut self) {
        for id in self.ast.preorder() {
            match self.ast.kind(id) {
                NodeKind::Assignment => self.check_assignment(id),
                NodeKind::VariableDef => self.check_initializer(id),
                NodeKind::FunctionCall => self.check_call(id),
                NodeKind::Return | NodeKind::ReturnVoid => self.check_return(id),
                NodeKind::If | NodeKind::While => self.check_condition(id),
                NodeKind::ElseIf => {
                    self.check_condition(id);
                    self.check_else_placement(id);
                }
                NodeKind::Else => self.check_else_placement(id),
                NodeKind::Break | NodeKind::Continue => self.check_loop_exit(id),
                NodeKind::Indexer => self.check_index(id),
                _ => {}
            }
        }
    }

    fn check_assignment(&mut self, id: NodeId) {
        let (Some(target), Some(value)) = (self.ast.child(id, 0), self.ast.child(id, 1)) else {
            return;
        };
        let target_ty = self.type_of(target);
        let value_ty = self.type_of(value);
        if target_ty.is_invalid() || value_ty.is_invalid() {
            return;
        }
        let text = self.describe(target);
        let var = match resolve::resolve(self.table, self.ast, target) {
            Some(Symbol::Variable(var)) if self.ast.kind(target).is_place() => var,
            _ => {
                self.error(Stage::Analysis, target, format!("cannot assign to `{text}`"));
                return;
            }
        };
        if self.table.variable(var).constant {
            self.error(Stage::Analysis, target, format!("cannot assign to constant `{text}`"));
        }
        if target_ty != value_ty {
            self.error(
                Stage::Analysis,
                value,
                format!("cannot assign a value of type `{value_ty}` to `{text}` of type `{target_ty}`"),
            );
        } else if target_ty.is_composite() && !self.ast.kind(value).is_place() {
            self.error(
                Stage::Analysis,
                value,
                format!("`{target_ty}` values can only be copied from variables"),
            );
        }
    }

    fn check_initializer(&mut self, id: NodeId) {
        let Some(init) = self.ast.first_expression(id) else {
            return;
        };
        let Some(var) = resolve::declared_variable(self.table, self.ast, id) else {
            return;
        };
        let name = self.ast.lexeme(id).to_string();
        let (declared, global, mapped) = {
            let v = self.table.variable(var);
            (v.data_type.clone(), v.global, v.mapped)
        };

        if mapped {
            self.error(Stage::Analysis, init, format!("mapped variable `{name}` cannot have an initializer"));
            return;
        }
        if global && declared.is_composite() {
            self.error(Stage::Analysis, init, format!("global `{name}` of type `{declared}` cannot have an initializer"));
            return;
        }
        let init_ty = self.type_of(init);
        if init_ty.is_invalid() || declared.is_invalid() {
            return;
        }
        if init_ty != declared {
            self.error(
                Stage::Analysis,
                init,
                format!("cannot initialize `{name}` of type `{declared}` with a value of type `{init_ty}`"),
            );
            return;
        }
        if global && !self.is_constant_expression(init) {
            self.error(
                Stage::Analysis,
                init,
                format!("initializer of global `{name}` must be a constant"),
            );
        } else if declared.is_composite() && !self.ast.kind(init).is_place() {
            self.error(
                Stage::Analysis,
                init,
                format!("`{declared}` values can only be copied from variables"),
            );
        }
    }

    /// Literal or negated literal
    fn is_constant_expression(&self, id: NodeId) -> bool {
        match self.ast.kind(id) {
            NodeKind::Literal => true,
            NodeKind::UnaryOp if self.ast.lexeme(id) == "-" => self
                .ast
                .child(id, 0)
                .is_some_and(|c| self.ast.kind(c) == NodeKind::Literal),
            _ => false,
        }
    }

    fn check_call(&mut self, id: NodeId) {
        if self.ast[id].is_invalid() {
            return;
        }
        let Some(func) = resolve::function(self.table, self.ast, id) else {
            return;
        };
        let args: Vec<NodeId> = self.ast.children(id).iter().skip(1).copied().collect();
        let (name, params) = {
            let f = self.table.function(func);
            let params: Vec<DataType> = f
                .params
                .iter()
                .map(|&p| self.table.variable(p).data_type.clone())
                .collect();
            (self.ast.lexeme(id).to_string(), params)
        };
        if args.len() != params.len() {
            self.error(
                Stage::Analysis,
                id,
                format!(
                    "`{name}` expects {} argument(s) but {} were given",
                    params.len(),
                    args.len()
                ),
            );
            return;
        }
        for (i, (&arg, expected)) in args.iter().zip(&params).enumerate() {
            let actual = self.type_of(arg);
            if actual.is_invalid() {
                continue;
            }
            if &actual != expected {
                self.error(
                    Stage::Analysis,
                    arg,
                    format!(
                        "the {} parameter of `{name}` expects `{expected}` but got `{actual}`",
                        ordinal(i + 1)
                    ),
                );
            } else if expected.is_composite() && !self.ast.kind(arg).is_place() {
                self.error(
                    Stage::Analysis,
                    arg,
                    format!("`{expected}` arguments can only be copied from variables"),
                );
            }
        }
    }

    fn check_return(&mut self, id: NodeId) {
        let function = self
            .ast
            .enclosing(id, NodeKind::Function)
            .and_then(|f| self.table.function_for_decl(self.program, f));
        let Some(function) = function else {
            self.error(Stage::Analysis, id, "return outside of a function");
            return;
        };
        let (name, expected) = {
            let f = self.table.function(function);
            (f.name.clone(), f.return_type.clone())
        };
        match self.ast.child(id, 0) {
            None if expected == DataType::Void => {}
            None => self.error(
                Stage::Analysis,
                id,
                format!("`{name}` must return a value of type `{expected}`"),
            ),
            Some(value) => {
                let actual = self.type_of(value);
                if expected == DataType::Void {
                    self.error(
                        Stage::Analysis,
                        value,
                        format!("`{name}` returns void but a value of type `{actual}` is returned"),
                    );
                } else if !actual.is_invalid() && actual != expected {
                    self.error(
                        Stage::Analysis,
                        value,
                        format!("`{name}` returns `{expected}` but a value of type `{actual}` is returned"),
                    );
                }
            }
        }
    }

    fn check_condition(&mut self, id: NodeId) {
        let Some(condition) = self.ast.child(id, 0) else {
            return;
        };
        let ty = self.type_of(condition);
        if !ty.is_invalid() && ty != DataType::Bool {
            self.error(
                Stage::Analysis,
                condition,
                format!("condition must be `bool`, found `{ty}`"),
            );
        }
    }

    fn check_else_placement(&mut self, id: NodeId) {
        let follows_if = self
            .ast
            .previous_sibling(id)
            .is_some_and(|p| matches!(self.ast.kind(p), NodeKind::If | NodeKind::ElseIf));
        if !follows_if {
            let keyword = self.ast.lexeme(id).to_string();
            self.error(Stage::Analysis, id, format!("`{keyword}` without a preceding `if`"));
        }
    }

    fn check_loop_exit(&mut self, id: NodeId) {
        let inside_loop = self
            .ast
            .ancestors(id)
            .take_while(|&a| self.ast.kind(a) != NodeKind::Function)
            .any(|a| self.ast.kind(a) == NodeKind::While);
        if !inside_loop {
            let keyword = self.ast.lexeme(id).to_string();
            self.error(Stage::Analysis, id, format!("`{keyword}` outside of a loop"));
        }
    }

    fn check_index(&mut self, id: NodeId) {
        if self.ast[id].is_invalid() {
            return;
        }
        let Some(index) = self.ast.child(id, 1) else {
            return;
        };
        if static_index(self.ast, index).is_some() {
            return;
        }
        let index_ty = self.type_of(index);
        if !index_ty.is_invalid() && !matches!(index_ty, DataType::Int | DataType::UInt) {
            self.error(
                Stage::Analysis,
                index,
                format!("array index must be `int` or `uint`, found `{index_ty}`"),
            );
        }
        let mapped = resolve::variable(self.table, self.ast, id)
            .is_some_and(|v| self.table.variable(v).mapped);
        if !mapped {
            let text = self.ast.child(id, 0).map(|l| self.describe(l)).unwrap_or_default();
            self.error(
                Stage::Analysis,
                id,
                format!("`{text}` can only be indexed by a constant: it is not memory-mapped"),
            );
        }
    }
}

/// `1st`, `2nd`, `3rd`, `4th`, ... `11th`, `12th`, `13th`, `21st`
fn ordinal(n: usize) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}
