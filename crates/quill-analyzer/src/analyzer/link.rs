use quill_syntax::{NodeId, NodeKind, ScopeId, Stage};

use super::*;
use crate::symbols::Symbol;

impl Analyzer<'_> {
    /// Resolve the module's imports against the hoisted symbols of its
    /// siblings. Imported declarations are cloned into this module's scope
    /// tree, never shared.
    pub fn link(&mut self) {
        let root = self.ast.root();
        for item in self.ast.children(root).to_vec() {
            if self.ast.kind(item) != NodeKind::Import {
                continue;
            }
            let source_name = self.ast.lexeme(item).to_string();
            let Some(source) = self.table.find_module(&source_name) else {
                self.reject(Stage::Link, item, format!("no module named `{source_name}`"));
                continue;
            };
            if source == self.program {
                self.reject(Stage::Link, item, format!("module `{source_name}` cannot import itself"));
                continue;
            }

            let named: Vec<NodeId> = self
                .ast
                .children(item)
                .iter()
                .copied()
                .filter(|&c| self.ast.kind(c) == NodeKind::ImportItem)
                .collect();
            if named.is_empty() {
                self.link_namespace(item, source, &source_name);
            } else {
                for entry in named {
                    self.link_item(entry, source, &source_name);
                }
            }
        }
    }

    /// `import module: name [as alias]`
    fn link_item(&mut self, entry: NodeId, source: ScopeId, source_name: &str) {
        self.ast[entry].scope = Some(self.program);
        let name = self.ast.lexeme(entry).to_string();
        let local = match self.ast.child_of_kind(entry, NodeKind::Alias) {
            Some(alias) => self.ast.lexeme(alias).to_string(),
            None => name.clone(),
        };

        let Some(symbol) = self.table.member(source, &name) else {
            self.reject(
                Stage::Link,
                entry,
                format!("no symbol named `{name}` in module `{source_name}`"),
            );
            return;
        };
        if !self.is_exported(symbol) {
            self.reject(
                Stage::Link,
                entry,
                format!("`{name}` is not exported by module `{source_name}`"),
            );
            return;
        }
        if self.table.scope(self.program).declares(&local) {
            self.reject(Stage::Link, entry, format!("`{local}` already found in this scope"));
            return;
        }
        self.clone_symbol(symbol, self.program, &local, source_name);
        log::debug!("`{}` imports `{name}` from `{source_name}` as `{local}`", self.module);
    }

    /// `import module [as alias]`: every exported symbol lands in a
    /// namespace scope named after the module (or the alias).
    fn link_namespace(&mut self, item: NodeId, source: ScopeId, source_name: &str) {
        let alias = self
            .ast
            .child_of_kind(item, NodeKind::Alias)
            .map(|a| self.ast.lexeme(a).to_string());
        let local = alias.clone().unwrap_or_else(|| source_name.to_string());
        if self.table.scope(self.program).declares(&local) {
            self.reject(Stage::Link, item, format!("`{local}` already found in this scope"));
            return;
        }

        let namespace = self.table.add_named_scope(self.program, &local);
        {
            let ns = self.table.scope_mut(namespace);
            ns.import = Some(source_name.to_string());
            ns.alias = alias;
        }

        let exported: Vec<(String, Symbol)> = {
            let scope = self.table.scope(source);
            let structs = scope.structs.iter().map(|(n, &s)| (n.clone(), Symbol::Struct(s)));
            let functions = scope.functions.iter().map(|(n, &f)| (n.clone(), Symbol::Function(f)));
            let variables = scope.variables.iter().map(|(n, &v)| (n.clone(), Symbol::Variable(v)));
            structs.chain(functions).chain(variables).collect()
        };
        let mut count = 0;
        for (name, symbol) in exported {
            if self.is_exported(symbol) {
                self.clone_symbol(symbol, namespace, &name, source_name);
                count += 1;
            }
        }
        log::debug!(
            "`{}` imports {count} symbol(s) from `{source_name}` into `{local}`",
            self.module
        );
    }

    fn is_exported(&self, symbol: Symbol) -> bool {
        match symbol {
            Symbol::Variable(v) => self.table.variable(v).export,
            Symbol::Function(f) => self.table.function(f).export,
            Symbol::Struct(s) => self.table.structure(s).export,
            Symbol::Scope(_) => false,
        }
    }

    fn clone_symbol(&mut self, symbol: Symbol, into: ScopeId, name: &str, origin: &str) {
        match symbol {
            Symbol::Variable(v) => {
                self.table.clone_variable(v, into, name, origin);
            }
            Symbol::Function(f) => {
                self.table.clone_function(f, into, name, origin);
            }
            Symbol::Struct(s) => {
                self.table.clone_struct(s, into, name, origin);
            }
            Symbol::Scope(_) => {}
        }
    }
}
