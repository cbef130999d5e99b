use quill_syntax::{DataType, NodeId, NodeKind, Stage};

use super::*;
use crate::literal::parse_int_literal;

impl Analyzer<'_> {
    /// Declare the module's top-level symbols ahead of general scoping:
    /// imports first, then structs, functions, and finally globals, so any
    /// of them may be referenced regardless of textual order.
    pub fn hoist(&mut self) {
        let root = self.ast.root();
        self.ast[root].scope = Some(self.program);
        let items = self.ast.children(root).to_vec();

        for &item in &items {
            if self.ast.kind(item) == NodeKind::Import {
                self.ast[item].scope = Some(self.program);
            }
        }
        for &item in &items {
            if self.ast.kind(item) == NodeKind::Struct {
                self.hoist_struct(item);
            }
        }
        for &item in &items {
            if self.ast.kind(item) == NodeKind::Function {
                self.hoist_function(item);
            }
        }
        for &item in &items {
            if matches!(self.ast.kind(item), NodeKind::Global | NodeKind::Map) {
                self.hoist_global(item);
            }
        }
        log::debug!(
            "hoisted `{}`: {} struct(s), {} function(s), {} global(s)",
            self.module,
            self.table.scope(self.program).structs.len(),
            self.table.scope(self.program).functions.len(),
            self.table.scope(self.program).variables.len(),
        );
    }

    /// Duplicate check against the module scope
    fn claim_name(&mut self, id: NodeId, name: &str) -> bool {
        if self.table.scope(self.program).declares(name) {
            self.reject(Stage::Hoist, id, format!("`{name}` already found in this scope"));
            return false;
        }
        true
    }

    fn hoist_struct(&mut self, id: NodeId) {
        let name = self.ast.lexeme(id).to_string();
        self.ast[id].scope = Some(self.program);
        if !self.claim_name(id, &name) {
            return;
        }
        let st = self.table.add_struct(self.program, &name);
        let template = self.table.structure(st).template;
        let mut fields = Vec::new();
        for field in self.ast.children(id).to_vec() {
            if self.ast.kind(field) != NodeKind::VariableDef {
                continue;
            }
            let field_name = self.ast.lexeme(field).to_string();
            if self.table.scope(template).declares(&field_name) {
                self.reject(
                    Stage::Hoist,
                    field,
                    format!("field `{field_name}` already found in struct `{name}`"),
                );
                continue;
            }
            let ty = self.declared_type(field).unwrap_or(DataType::Invalid);
            let var = self.table.add_variable(template, &field_name, ty.clone());
            let v = self.table.variable_mut(var);
            v.decl = Some(field);
            v.size = ty.primitive_size();
            fields.push(var);
        }
        let export = self.ast.has_child(id, NodeKind::Export);
        let s = self.table.structure_mut(st);
        s.decl = Some(id);
        s.fields = fields;
        s.export = export;
    }

    fn hoist_function(&mut self, id: NodeId) {
        let name = self.ast.lexeme(id).to_string();
        self.ast[id].scope = Some(self.program);
        if !self.claim_name(id, &name) {
            return;
        }
        let returns = self.declared_type(id).unwrap_or(DataType::Invalid);
        let func = self.table.add_function(self.program, &name, returns);
        let body_scope = self.table.function(func).body_scope;
        self.table.register_function_decl(self.program, id, func);

        let mut params = Vec::new();
        if let Some(list) = self.ast.child_of_kind(id, NodeKind::Parameters) {
            self.ast[list].scope = Some(body_scope);
            for param in self.ast.children(list).to_vec() {
                let param_name = self.ast.lexeme(param).to_string();
                if self.table.scope(body_scope).declares(&param_name) {
                    self.reject(
                        Stage::Hoist,
                        param,
                        format!("parameter `{param_name}` already found in `{name}`"),
                    );
                    continue;
                }
                let ty = self.declared_type(param).unwrap_or(DataType::Invalid);
                let var = self.table.add_variable(body_scope, &param_name, ty.clone());
                self.table.variable_mut(var).decl = Some(param);
                // Parameters of local struct types get their slots now so
                // that importers cloning the signature see the leaves.
                if ty.is_composite() && self.type_resolves(body_scope, &ty) {
                    self.lay_out(var, body_scope, param);
                } else {
                    self.table.variable_mut(var).size = ty.primitive_size();
                }
                params.push(var);
            }
        }

        let export = self.ast.has_child(id, NodeKind::Export);
        let f = self.table.function_mut(func);
        f.decl = Some(id);
        f.params = params;
        f.export = export;
    }

    /// Globals of types declared in this module are laid out now. Mapped
    /// variables without an explicit offset wait for
    /// [`place_maps`](Self::place_maps), once imported struct types resolve.
    fn hoist_global(&mut self, id: NodeId) {
        self.ast[id].scope = Some(self.program);
        let Some(def) = self.ast.child_of_kind(id, NodeKind::VariableDef) else {
            return;
        };
        let name = self.ast.lexeme(def).to_string();
        if !self.claim_name(def, &name) {
            return;
        }
        let mapped = self.ast.kind(id) == NodeKind::Map;
        let ty = self.declared_type(def).unwrap_or(DataType::Invalid);
        let var = self.table.add_variable(self.program, &name, ty.clone());
        {
            let v = self.table.variable_mut(var);
            v.decl = Some(def);
            v.global = true;
            v.mapped = mapped;
        }
        let constant = self.ast.has_child(def, NodeKind::Const);
        let export = self.ast.has_child(def, NodeKind::Export);
        {
            let v = self.table.variable_mut(var);
            v.constant = constant;
            v.export = export;
        }

        if mapped {
            let Some(lit) = self.ast.child_of_kind(id, NodeKind::Literal) else {
                return;
            };
            let offset = match parse_int_literal(self.ast.lexeme(lit)) {
                Ok((value, _)) if value.value <= u32::MAX as u64 => value.value as u32,
                _ => {
                    let text = self.ast.lexeme(lit).to_string();
                    self.reject(Stage::Hoist, lit, format!("invalid memory offset `{text}`"));
                    0
                }
            };
            self.table.variable_mut(var).offset = offset;
        }

        if self.type_resolves(self.program, &ty) {
            self.lay_out(var, self.program, def);
        }
    }
}
