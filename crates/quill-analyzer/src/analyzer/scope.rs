use quill_syntax::{DataType, NodeId, NodeKind, ScopeId, Stage};

use super::*;
use crate::resolve::{self, is_member_name, static_index};
use crate::symbols::Symbol;

impl Analyzer<'_> {
    /// Set `scope` on every node. Nodes that already carry one are left
    /// alone, so the pass can run again without changing anything.
    pub fn assign_scopes(&mut self) {
        self.place_maps();
        self.complete_imported_layouts();
        for id in self.ast.preorder() {
            self.scope_of(id);
        }
    }

    /// Give every `map` without an explicit offset the next free slot after
    /// the mapped variables declared before it (4-byte aligned, from 0).
    /// Runs after linking so imported struct types have a size.
    fn place_maps(&mut self) {
        let mut cursor = 0u32;
        for item in self.ast.children(self.ast.root()).to_vec() {
            if self.ast.kind(item) != NodeKind::Map {
                continue;
            }
            let Some(def) = self.ast.child_of_kind(item, NodeKind::VariableDef) else {
                continue;
            };
            if self.ast[def].is_invalid() {
                continue;
            }
            let name = self.ast.lexeme(def).to_string();
            let Some(var) = self.table.variable_for_decl(self.program, &name, def) else {
                continue;
            };
            // unresolved types are reported when the definition is scoped
            let ty = self.table.variable(var).data_type.clone();
            if !self.type_resolves(self.program, &ty) {
                continue;
            }
            if !self.ast.has_child(item, NodeKind::Literal) {
                self.table.variable_mut(var).offset = align(cursor, 4);
            }
            if self.lay_out(var, self.program, def) {
                let v = self.table.variable(var);
                cursor = cursor.max(align(v.offset.saturating_add(v.size), 4));
            }
        }
    }

    /// Import clones of composite variables whose types only resolve after
    /// linking are flattened here, resolving names in their origin module.
    fn complete_imported_layouts(&mut self) {
        let mut pending = self.table.module_variables(self.program);
        for func in self.table.module_functions(self.program) {
            pending.extend(self.table.function(func).params.iter().copied());
        }
        for var in pending {
            let v = self.table.variable(var);
            if !v.data_type.is_composite() || self.table.layout_scope(var).is_some() {
                continue;
            }
            let Some(origin) = v.import.as_deref().and_then(|m| self.table.find_module(m)) else {
                continue;
            };
            if self.type_resolves(origin, &v.data_type.clone()) {
                let max = self.options.max_layout_depth;
                if let Err(err) = layout::lay_out_in(self.table, var, origin, max) {
                    log::warn!("imported `{}`: {err}", self.table.variable(var).name);
                }
            }
        }
    }

    /// Scope a node lives in, computed on first request
    fn scope_of(&mut self, id: NodeId) -> ScopeId {
        if let Some(scope) = self.ast[id].scope {
            return scope;
        }
        let scope = match self.ast.kind(id) {
            NodeKind::Program => self.program,
            NodeKind::Block => {
                let parent = self.enclosing_scope(id);
                self.table.add_scope(parent, "block")
            }
            NodeKind::Parameters => {
                let function = self.ast.parent(id).and_then(|f| self.table.function_for_decl(self.program, f));
                match function {
                    Some(f) => self.table.function(f).body_scope,
                    None => self.table.add_scope(self.program, "params"),
                }
            }
            NodeKind::VariableDef => {
                let scope = self.enclosing_scope(id);
                self.ast[id].scope = Some(scope);
                self.declare_variable(id, scope);
                scope
            }
            NodeKind::Access | NodeKind::Indexer => self.member_scope(id),
            NodeKind::Identifier => {
                let scope = match self.ast.parent(id) {
                    Some(access) if is_member_name(self.ast, id) => self.scope_of(access),
                    _ => self.enclosing_scope(id),
                };
                self.ast[id].scope = Some(scope);
                self.check_identifier(id);
                scope
            }
            NodeKind::FunctionCall => {
                let scope = self.enclosing_scope(id);
                self.ast[id].scope = Some(scope);
                if let Some(callee) = self.ast.child(id, 0) {
                    self.scope_of(callee);
                    self.check_callee(id, callee);
                }
                scope
            }
            NodeKind::Const | NodeKind::Export => {
                let scope = self.enclosing_scope(id);
                self.apply_modifier(id);
                scope
            }
            _ => self.enclosing_scope(id),
        };
        self.ast[id].scope = Some(scope);
        scope
    }

    /// Lexical scope for the children of `id`'s parent
    fn enclosing_scope(&mut self, id: NodeId) -> ScopeId {
        let Some(parent) = self.ast.parent(id) else {
            return self.program;
        };
        match self.ast.kind(parent) {
            NodeKind::Program => self.program,
            NodeKind::Function => match self.table.function_for_decl(self.program, parent) {
                Some(f) => self.table.function(f).body_scope,
                None => self.program,
            },
            NodeKind::Struct => {
                let name = self.ast.lexeme(parent);
                match self.table.struct_for_decl(self.program, name, parent) {
                    Some(st) => self.table.structure(st).template,
                    None => self.program,
                }
            }
            // The operands of a member access are evaluated where the
            // access itself is, not inside the member scope.
            NodeKind::Access | NodeKind::Indexer => self.enclosing_scope(parent),
            _ => self.scope_of(parent),
        }
    }

    fn declare_variable(&mut self, id: NodeId, scope: ScopeId) {
        let name = self.ast.lexeme(id).to_string();
        let Some(ty) = self.declared_type(id) else {
            self.reject(Stage::Scope, id, format!("`{name}` has no valid type"));
            return;
        };

        let var = match self.table.variable_for_decl(scope, &name, id) {
            Some(hoisted) => hoisted,
            None if self.ast[id].is_invalid() => return,
            None => {
                if self.table.scope(scope).declares(&name) {
                    self.reject(Stage::Scope, id, format!("`{name}` already found in this scope"));
                    return;
                }
                let var = self.table.add_variable(scope, &name, ty.clone());
                self.table.variable_mut(var).decl = Some(id);
                var
            }
        };

        let parent_kind = self.ast.parent(id).map(|p| self.ast.kind(p));
        let constant = self.ast.has_child(id, NodeKind::Const);
        let export = self.ast.has_child(id, NodeKind::Export);
        {
            let v = self.table.variable_mut(var);
            v.global |= matches!(parent_kind, Some(NodeKind::Global | NodeKind::Map));
            v.mapped |= parent_kind == Some(NodeKind::Map);
            v.constant |= constant;
            v.export |= export;
        }

        if !self.type_resolves(scope, &ty) {
            let missing = unresolved_struct(&ty).unwrap_or_default();
            self.reject(Stage::Scope, id, format!("no struct named `{missing}`"));
            return;
        }
        // Field templates are sized per instance when their owner is laid out.
        if parent_kind == Some(NodeKind::Struct) {
            return;
        }
        if ty == DataType::Void {
            self.reject(Stage::Scope, id, format!("variable `{name}` cannot be void"));
            return;
        }
        // hoisting already reported a failed layout
        if !self.ast[id].is_invalid() {
            self.lay_out(var, scope, id);
        }
    }

    fn member_scope(&mut self, id: NodeId) -> ScopeId {
        let fallback = self.enclosing_scope(id);
        let Some(left) = self.ast.child(id, 0) else {
            return fallback;
        };
        self.scope_of(left);
        if self.ast[left].is_invalid() {
            self.ast[id].valid = Some(false);
            return fallback;
        }
        let symbol = resolve::resolve(self.table, self.ast, left);
        let scope = symbol.and_then(|s| self.table.scope_of_symbol(s));
        let left_text = self.describe(left);

        match (self.ast.kind(id), symbol, scope) {
            (NodeKind::Indexer, Some(Symbol::Variable(var)), Some(scope)) => {
                let ty = self.table.variable(var).data_type.clone();
                let DataType::Array(_, len) = ty else {
                    self.reject(Stage::Scope, id, format!("`{left_text}` of type `{ty}` cannot be indexed"));
                    return fallback;
                };
                if let Some(index) = self.ast.child(id, 1).and_then(|i| static_index(self.ast, i)) {
                    if index >= len {
                        self.reject(
                            Stage::Scope,
                            id,
                            format!("index {index} is out of range for `{left_text}` of type `{ty}`"),
                        );
                        return fallback;
                    }
                }
                scope
            }
            (NodeKind::Indexer, _, _) => {
                self.reject(Stage::Scope, id, format!("`{left_text}` cannot be indexed"));
                fallback
            }
            (_, _, Some(scope)) => scope,
            (_, _, None) => {
                self.reject(Stage::Scope, id, format!("no scope named `{left_text}`"));
                fallback
            }
        }
    }

    fn check_identifier(&mut self, id: NodeId) {
        let name = self.ast.lexeme(id).to_string();
        let member = is_member_name(self.ast, id);
        if member && self.ast.parent(id).is_some_and(|p| self.ast[p].is_invalid()) {
            self.ast[id].valid = Some(false);
            return;
        }
        if resolve::resolve(self.table, self.ast, id).is_some() {
            return;
        }
        if member {
            let owner = self
                .ast
                .parent(id)
                .and_then(|p| self.ast.child(p, 0))
                .map(|l| self.describe(l))
                .unwrap_or_default();
            self.reject(Stage::Scope, id, format!("`{owner}` has no member named `{name}`"));
        } else {
            self.reject(Stage::Scope, id, format!("`{name}` is not declared"));
        }
    }

    fn check_callee(&mut self, call: NodeId, callee: NodeId) {
        if self.ast[callee].is_invalid() {
            self.ast[call].valid = Some(false);
            return;
        }
        match resolve::resolve(self.table, self.ast, callee) {
            Some(Symbol::Function(_)) => {}
            _ => {
                let text = self.describe(callee);
                self.reject(Stage::Scope, call, format!("`{text}` is not a function"));
            }
        }
    }

    /// `Const`/`Export` mark the declaration they belong to
    fn apply_modifier(&mut self, id: NodeId) {
        let Some(owner) = self.ast.parent(id) else {
            return;
        };
        let kind = self.ast.kind(id);
        match self.ast.kind(owner) {
            NodeKind::VariableDef => {
                self.scope_of(owner);
                let Some(var) = resolve::declared_variable(self.table, self.ast, owner) else {
                    return;
                };
                let mut targets = vec![var];
                let mut i = 0;
                while i < targets.len() {
                    if let Some(layout) = self.table.layout_scope(targets[i]) {
                        targets.extend(self.table.scope(layout).variables.values().copied());
                    }
                    i += 1;
                }
                for target in targets {
                    let v = self.table.variable_mut(target);
                    match kind {
                        NodeKind::Const => v.constant = true,
                        _ => v.export = true,
                    }
                }
            }
            NodeKind::Function if kind == NodeKind::Export => {
                if let Some(f) = self.table.function_for_decl(self.program, owner) {
                    self.table.function_mut(f).export = true;
                }
            }
            NodeKind::Struct if kind == NodeKind::Export => {
                let name = self.ast.lexeme(owner);
                if let Some(st) = self.table.struct_for_decl(self.program, name, owner) {
                    self.table.structure_mut(st).export = true;
                }
            }
            _ => {
                let modifier = self.ast.lexeme(id).to_string();
                self.warning(Stage::Scope, id, format!("`{modifier}` has no effect here"));
            }
        }
    }

    /// Source-like rendering of a place expression for messages
    pub(super) fn describe(&self, id: NodeId) -> String {
        match self.ast.kind(id) {
            NodeKind::Access => {
                let left = self.ast.child(id, 0).map(|l| self.describe(l)).unwrap_or_default();
                let right = self.ast.child(id, 1).map(|r| self.describe(r)).unwrap_or_default();
                format!("{left}.{right}")
            }
            NodeKind::Indexer => {
                let left = self.ast.child(id, 0).map(|l| self.describe(l)).unwrap_or_default();
                let index = self.ast.child(id, 1).map(|i| self.describe(i)).unwrap_or_default();
                format!("{left}[{index}]")
            }
            NodeKind::FunctionCall | NodeKind::Identifier | NodeKind::Literal => {
                self.ast.lexeme(id).to_string()
            }
            _ => format!("{:?}", self.ast.kind(id)),
        }
    }
}

fn unresolved_struct(ty: &DataType) -> Option<String> {
    match ty {
        DataType::Struct(name) => Some(name.clone()),
        DataType::Array(element, _) => unresolved_struct(element),
        _ => None,
    }
}

fn align(value: u32, to: u32) -> u32 {
    value.div_ceil(to).saturating_mul(to)
}
