use quill_syntax::{Ast, DataType, Diagnostics, Module, NodeId, NodeKind, ScopeId, Span, Stage};

use crate::CompileOptions;
use crate::layout::{self, LayoutError};
use crate::symbols::{SymbolTable, VarId};

mod checks;
mod hoist;
mod link;
mod scope;
mod typeck;

#[cfg(test)]
mod tests;

/// Runs the analysis passes over one module's tree, annotating it in place
/// and recording symbols in the shared table.
///
/// The passes must run in order: [`hoist`](Self::hoist),
/// [`link`](Self::link), [`assign_scopes`](Self::assign_scopes),
/// [`assign_types`](Self::assign_types), [`check`](Self::check). Each pass
/// walks the whole tree even after errors so one run reports every
/// diagnostic it can.
pub struct Analyzer<'a> {
    module: &'a str,
    ast: &'a mut Ast,
    table: &'a mut SymbolTable,
    diagnostics: &'a mut Diagnostics,
    options: &'a CompileOptions,
    program: ScopeId,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        module: &'a str,
        ast: &'a mut Ast,
        table: &'a mut SymbolTable,
        diagnostics: &'a mut Diagnostics,
        options: &'a CompileOptions,
    ) -> Self {
        let program = table.module_scope(module);
        Self {
            module,
            ast,
            table,
            diagnostics,
            options,
            program,
        }
    }

    /// Scope, type and check passes; hoisting and linking must already
    /// have run for every module of the compilation.
    pub fn analyze(&mut self) {
        self.assign_scopes();
        self.assign_types();
        self.check();
    }

    // ── Diagnostics ─────────────────────────────────────────

    fn span(&self, id: NodeId) -> Span {
        self.ast[id].token.span
    }

    fn error(&mut self, stage: Stage, id: NodeId, message: impl Into<String>) {
        let span = self.span(id);
        self.diagnostics.error(stage, self.module, span, message);
    }

    fn warning(&mut self, stage: Stage, id: NodeId, message: impl Into<String>) {
        let span = self.span(id);
        self.diagnostics.warning(stage, self.module, span, message);
    }

    /// Report an error and poison the node so typing short-circuits
    fn reject(&mut self, stage: Stage, id: NodeId, message: impl Into<String>) {
        self.error(stage, id, message);
        self.ast[id].valid = Some(false);
    }

    // ── Shared helpers ──────────────────────────────────────

    /// Declared type of a declaration node's `Type` child
    fn declared_type(&self, id: NodeId) -> Option<DataType> {
        let ty = self.ast.child_of_kind(id, NodeKind::Type)?;
        DataType::parse(self.ast.lexeme(ty)).ok()
    }

    /// Whether every struct named by `ty` resolves from `scope`
    fn type_resolves(&self, scope: ScopeId, ty: &DataType) -> bool {
        match ty {
            DataType::Struct(name) => self.table.resolve_struct(scope, name).is_some(),
            DataType::Array(element, _) => self.type_resolves(scope, element),
            DataType::Invalid => false,
            _ => true,
        }
    }

    fn lay_out(&mut self, var: VarId, type_scope: ScopeId, at: NodeId) -> bool {
        match layout::lay_out_in(self.table, var, type_scope, self.options.max_layout_depth) {
            Ok(()) => true,
            Err(LayoutError::TooDeep { ty, max }) => {
                let name = self.table.variable(var).name.clone();
                self.reject(
                    Stage::Layout,
                    at,
                    format!("type `{ty}` of `{name}` nests deeper than {max} levels"),
                );
                false
            }
            Err(LayoutError::OutOfAddressSpace { ty }) => {
                let (name, offset) = {
                    let v = self.table.variable(var);
                    (v.name.clone(), v.offset)
                };
                self.reject(
                    Stage::Layout,
                    at,
                    format!("`{name}` of type `{ty}` at offset {offset} does not fit in memory"),
                );
                false
            }
        }
    }
}

/// Dependency order of a compilation's modules, as indices into the
/// slice given to [`import_order`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOrder {
    /// Every module after the modules it imports
    pub ordered: Vec<usize>,
    /// Modules on or behind an import cycle, in file order
    pub cyclic: Vec<usize>,
}

/// Sort modules so that each one follows the modules it imports. Imports of
/// modules outside the compilation are ignored; link reports them.
pub fn import_order(modules: &[Module]) -> ImportOrder {
    let names: Vec<&str> = modules.iter().map(|m| m.name.as_str()).collect();
    let imports: Vec<Vec<usize>> = modules
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let Some(ast) = m.result.ast.as_ref() else {
                return Vec::new();
            };
            ast.children(ast.root())
                .iter()
                .filter(|&&id| ast.kind(id) == NodeKind::Import)
                .filter_map(|&id| names.iter().position(|&n| n == ast.lexeme(id)))
                .filter(|&dep| dep != i)
                .collect()
        })
        .collect();

    let mut placed = vec![false; modules.len()];
    let mut order = ImportOrder::default();
    while let Some(next) =
        (0..modules.len()).find(|&i| !placed[i] && imports[i].iter().all(|&dep| placed[dep]))
    {
        placed[next] = true;
        order.ordered.push(next);
    }
    order.cyclic = (0..modules.len()).filter(|&i| !placed[i]).collect();
    order
}

/// Analyze every module of a compilation against one shared table.
///
/// All modules are hoisted before any is linked, and all are linked before
/// any is scoped or typed, so imports may name modules in any order.
/// Linking follows [`import_order`] so that a module re-exporting an
/// imported symbol has it before its own importers look for it; modules on
/// an import cycle link last, in file order.
pub fn analyze_modules(
    modules: &mut [Module],
    table: &mut SymbolTable,
    diagnostics: &mut Diagnostics,
    options: &CompileOptions,
) {
    log::debug!("hoisting {} module(s)", modules.len());
    for module in modules.iter_mut() {
        if let Some(ast) = module.result.ast.as_mut() {
            Analyzer::new(&module.name, ast, table, diagnostics, options).hoist();
        }
    }

    let order = import_order(modules);
    if !order.cyclic.is_empty() {
        let names: Vec<&str> = order.cyclic.iter().map(|&i| modules[i].name.as_str()).collect();
        log::debug!("import cycle through {}", names.join(", "));
    }
    log::debug!("linking imports");
    for i in order.ordered.into_iter().chain(order.cyclic) {
        let module = &mut modules[i];
        if let Some(ast) = module.result.ast.as_mut() {
            Analyzer::new(&module.name, ast, table, diagnostics, options).link();
        }
    }

    for module in modules.iter_mut() {
        if let Some(ast) = module.result.ast.as_mut() {
            log::debug!("analyzing module `{}`", module.name);
            Analyzer::new(&module.name, ast, table, diagnostics, options).analyze();
        }
    }
}
