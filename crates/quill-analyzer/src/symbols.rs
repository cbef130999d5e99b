use std::collections::HashMap;

use indexmap::IndexMap;
use quill_syntax::{DataType, NodeId, ScopeId};

use crate::builtins;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructId(pub u32);

/// Anything an identifier can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Variable(VarId),
    Function(FuncId),
    Struct(StructId),
    Scope(ScopeId),
}

/// A lexical scope. Only namespaces (builtin type namespaces, bare imports)
/// and variable layouts are registered by name in their parent's
/// `children`; block and function scopes are anonymous.
#[derive(Debug, Clone)]
pub struct Scope {
    pub name: String,
    pub parent: Option<ScopeId>,
    pub children: IndexMap<String, ScopeId>,
    pub variables: IndexMap<String, VarId>,
    pub functions: IndexMap<String, FuncId>,
    pub structs: IndexMap<String, StructId>,
    /// Local rename applied on import
    pub alias: Option<String>,
    /// Originating module of an imported namespace
    pub import: Option<String>,
    pub export: bool,
    /// Set when this scope holds the flattened fields/elements of a variable
    pub layout_of: Option<VarId>,
}

impl Scope {
    fn new(name: impl Into<String>, parent: Option<ScopeId>) -> Self {
        Self {
            name: name.into(),
            parent,
            children: IndexMap::new(),
            variables: IndexMap::new(),
            functions: IndexMap::new(),
            structs: IndexMap::new(),
            alias: None,
            import: None,
            export: false,
            layout_of: None,
        }
    }

    /// Whether `name` is already declared directly in this scope
    pub fn declares(&self, name: &str) -> bool {
        self.variables.contains_key(name)
            || self.functions.contains_key(name)
            || self.structs.contains_key(name)
            || self.children.contains_key(name)
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub scope: ScopeId,
    /// `None` for synthesized layout leaves and import clones
    pub decl: Option<NodeId>,
    pub name: String,
    pub data_type: DataType,
    pub global: bool,
    pub constant: bool,
    pub export: bool,
    pub mapped: bool,
    /// Byte offset in linear memory, meaningful only when `mapped`
    pub offset: u32,
    pub size: u32,
    /// Module the variable was imported from
    pub import: Option<String>,
    /// Name in the originating module when imported under another name
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub scope: ScopeId,
    /// Scope holding the parameters; the body block nests inside it
    pub body_scope: ScopeId,
    pub decl: Option<NodeId>,
    pub name: String,
    pub return_type: DataType,
    pub params: Vec<VarId>,
    pub import: Option<String>,
    pub export: bool,
    pub alias: Option<String>,
    /// Builtin intrinsic that lowers to a single native instruction
    pub builtin: bool,
}

#[derive(Debug, Clone)]
pub struct Struct {
    pub scope: ScopeId,
    /// Anonymous scope holding the un-offset field templates
    pub template: ScopeId,
    pub decl: Option<NodeId>,
    pub name: String,
    pub fields: Vec<VarId>,
    pub import: Option<String>,
    pub export: bool,
    pub alias: Option<String>,
}

/// Arena holding every scope and declaration of a compilation. Scope 0 is
/// the root, seeded with the builtin intrinsic namespaces; each module's
/// program scope hangs below it.
#[derive(Debug, Clone)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    variables: Vec<Variable>,
    functions: Vec<Function>,
    structs: Vec<Struct>,
    modules: IndexMap<String, ScopeId>,
    /// Declaration node → function, per module program scope
    function_decls: HashMap<(ScopeId, NodeId), FuncId>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    /// A table whose root scope already holds the builtin intrinsics
    pub fn new() -> Self {
        let mut table = SymbolTable {
            scopes: vec![Scope::new("<root>", None)],
            variables: Vec::new(),
            functions: Vec::new(),
            structs: Vec::new(),
            modules: IndexMap::new(),
            function_decls: HashMap::new(),
        };
        builtins::seed(&mut table);
        table
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    // ── Arena access ────────────────────────────────────────

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0 as usize]
    }

    pub fn variable_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.variables[id.0 as usize]
    }

    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.0 as usize]
    }

    pub fn structure(&self, id: StructId) -> &Struct {
        &self.structs[id.0 as usize]
    }

    pub fn structure_mut(&mut self, id: StructId) -> &mut Struct {
        &mut self.structs[id.0 as usize]
    }

    // ── Construction ────────────────────────────────────────

    /// Anonymous child scope (blocks, function bodies, struct templates)
    pub fn add_scope(&mut self, parent: ScopeId, name: &str) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope::new(name, Some(parent)));
        id
    }

    /// Child scope registered by name in its parent (namespaces, layouts)
    pub fn add_named_scope(&mut self, parent: ScopeId, name: &str) -> ScopeId {
        let id = self.add_scope(parent, name);
        self.scope_mut(parent).children.insert(name.to_string(), id);
        id
    }

    /// Program scope of a module, created on first request
    pub fn module_scope(&mut self, module: &str) -> ScopeId {
        if let Some(&id) = self.modules.get(module) {
            return id;
        }
        let root = self.root();
        let id = self.add_scope(root, module);
        self.modules.insert(module.to_string(), id);
        id
    }

    pub fn find_module(&self, module: &str) -> Option<ScopeId> {
        self.modules.get(module).copied()
    }

    pub fn add_variable(&mut self, scope: ScopeId, name: &str, data_type: DataType) -> VarId {
        let id = VarId(self.variables.len() as u32);
        self.variables.push(Variable {
            scope,
            decl: None,
            name: name.to_string(),
            data_type,
            global: false,
            constant: false,
            export: false,
            mapped: false,
            offset: 0,
            size: 0,
            import: None,
            alias: None,
        });
        self.scope_mut(scope).variables.insert(name.to_string(), id);
        id
    }

    pub fn add_function(
        &mut self,
        scope: ScopeId,
        name: &str,
        return_type: DataType,
    ) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        let body_scope = self.add_scope(scope, name);
        self.functions.push(Function {
            scope,
            body_scope,
            decl: None,
            name: name.to_string(),
            return_type,
            params: Vec::new(),
            import: None,
            export: false,
            alias: None,
            builtin: false,
        });
        self.scope_mut(scope).functions.insert(name.to_string(), id);
        id
    }

    pub fn add_struct(&mut self, scope: ScopeId, name: &str) -> StructId {
        let id = StructId(self.structs.len() as u32);
        let template = self.add_scope(scope, name);
        self.structs.push(Struct {
            scope,
            template,
            decl: None,
            name: name.to_string(),
            fields: Vec::new(),
            import: None,
            export: false,
            alias: None,
        });
        self.scope_mut(scope).structs.insert(name.to_string(), id);
        id
    }

    pub fn register_function_decl(&mut self, module: ScopeId, decl: NodeId, func: FuncId) {
        self.function_decls.insert((module, decl), func);
    }

    /// Function declared by a `Function` node of the module
    pub fn function_for_decl(&self, module: ScopeId, decl: NodeId) -> Option<FuncId> {
        self.function_decls.get(&(module, decl)).copied()
    }

    // ── Lookup ──────────────────────────────────────────────

    /// Symbol declared directly in `scope`
    pub fn member(&self, scope: ScopeId, name: &str) -> Option<Symbol> {
        let s = self.scope(scope);
        if let Some(&v) = s.variables.get(name) {
            return Some(Symbol::Variable(v));
        }
        if let Some(&f) = s.functions.get(name) {
            return Some(Symbol::Function(f));
        }
        if let Some(&st) = s.structs.get(name) {
            return Some(Symbol::Struct(st));
        }
        s.children.get(name).map(|&c| Symbol::Scope(c))
    }

    /// Innermost declaration of `name` visible from `scope`
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<Symbol> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(symbol) = self.member(id, name) {
                return Some(symbol);
            }
            current = self.scope(id).parent;
        }
        None
    }

    /// Like [`lookup`](Self::lookup), but local variables declared after
    /// `site` (a later node of the same tree) are not yet visible. Module
    /// scopes are hoisted and see every declaration.
    pub fn lookup_before(&self, scope: ScopeId, name: &str, site: NodeId) -> Option<Symbol> {
        let mut current = Some(scope);
        while let Some(id) = current {
            match self.member(id, name) {
                Some(Symbol::Variable(v))
                    if !self.is_module_scope(id)
                        && self.variable(v).decl.is_some_and(|decl| decl > site) => {}
                Some(symbol) => return Some(symbol),
                None => {}
            }
            current = self.scope(id).parent;
        }
        None
    }

    pub fn is_module_scope(&self, scope: ScopeId) -> bool {
        self.modules.values().any(|&m| m == scope)
    }

    /// Name of the module whose program scope is `scope`
    pub fn module_name(&self, scope: ScopeId) -> Option<&str> {
        self.modules
            .iter()
            .find(|&(_, &m)| m == scope)
            .map(|(name, _)| name.as_str())
    }

    /// Variable declared directly in `scope` by the `VariableDef` node `decl`
    pub fn variable_for_decl(&self, scope: ScopeId, name: &str, decl: NodeId) -> Option<VarId> {
        self.scope(scope)
            .variables
            .get(name)
            .copied()
            .filter(|&v| self.variable(v).decl == Some(decl))
    }

    /// Struct declared directly in `scope` by the `Struct` node `decl`
    pub fn struct_for_decl(&self, scope: ScopeId, name: &str, decl: NodeId) -> Option<StructId> {
        self.scope(scope)
            .structs
            .get(name)
            .copied()
            .filter(|&st| self.structure(st).decl == Some(decl))
    }

    /// Struct named by a (possibly module-qualified) type name
    pub fn resolve_struct(&self, scope: ScopeId, name: &str) -> Option<StructId> {
        let mut segments = name.split('.');
        let first = segments.next()?;
        let rest: Vec<&str> = segments.collect();
        if rest.is_empty() {
            let mut current = Some(scope);
            while let Some(id) = current {
                if let Some(&st) = self.scope(id).structs.get(first) {
                    return Some(st);
                }
                current = self.scope(id).parent;
            }
            return None;
        }
        let mut namespace = match self.lookup(scope, first)? {
            Symbol::Scope(s) => s,
            _ => return None,
        };
        for (i, segment) in rest.iter().enumerate() {
            if i + 1 == rest.len() {
                return self.scope(namespace).structs.get(*segment).copied();
            }
            namespace = *self.scope(namespace).children.get(*segment)?;
        }
        None
    }

    /// Scope a symbol exposes to member access: a variable's layout or a
    /// namespace
    pub fn scope_of_symbol(&self, symbol: Symbol) -> Option<ScopeId> {
        match symbol {
            Symbol::Variable(v) => self.layout_scope(v),
            Symbol::Scope(s) => Some(s),
            _ => None,
        }
    }

    /// Child scope holding the flattened fields/elements of a variable
    pub fn layout_scope(&self, var: VarId) -> Option<ScopeId> {
        let v = self.variable(var);
        self.scope(v.scope)
            .children
            .get(&v.name)
            .copied()
            .filter(|&s| self.scope(s).layout_of == Some(var))
    }

    /// Primitive leaves of a variable in layout order. A scalar is its own
    /// single leaf; a composite that was never laid out has none.
    pub fn leaves(&self, var: VarId) -> Vec<VarId> {
        let mut out = Vec::new();
        self.collect_leaves(var, &mut out);
        out
    }

    fn collect_leaves(&self, var: VarId, out: &mut Vec<VarId>) {
        match self.layout_scope(var) {
            Some(layout) => {
                for &child in self.scope(layout).variables.values() {
                    self.collect_leaves(child, out);
                }
            }
            None if self.variable(var).data_type.is_scalar() => out.push(var),
            None => {}
        }
    }

    /// Dotted path of a (possibly flattened) variable, e.g. `points.1.x`.
    /// With `original`, import renames are undone so the path names the
    /// symbol in its defining module.
    pub fn qualified_name(&self, var: VarId, original: bool) -> String {
        let v = self.variable(var);
        let own = if original {
            v.alias.clone().unwrap_or_else(|| v.name.clone())
        } else {
            v.name.clone()
        };
        match self.scope(v.scope).layout_of {
            Some(owner) => format!("{}.{}", self.qualified_name(owner, original), own),
            None => own,
        }
    }

    // ── Cloning for imports ─────────────────────────────────

    /// Clone a variable (and its layout) into `into` under `name`
    pub fn clone_variable(&mut self, source: VarId, into: ScopeId, name: &str, origin: &str) -> VarId {
        let src = self.variable(source).clone();
        let id = self.add_variable(into, name, src.data_type.clone());
        {
            let v = self.variable_mut(id);
            v.global = src.global;
            v.constant = src.constant;
            v.export = src.export;
            v.mapped = src.mapped;
            v.offset = src.offset;
            v.size = src.size;
            v.import = Some(src.import.clone().unwrap_or_else(|| origin.to_string()));
            let original = src.alias.clone().unwrap_or(src.name.clone());
            v.alias = (original != name).then_some(original);
        }
        if let Some(layout) = self.layout_scope(source) {
            let target = self.add_named_scope(into, name);
            self.scope_mut(target).layout_of = Some(id);
            let children: Vec<(String, VarId)> = self
                .scope(layout)
                .variables
                .iter()
                .map(|(n, &v)| (n.clone(), v))
                .collect();
            for (child_name, child) in children {
                self.clone_variable(child, target, &child_name, origin);
            }
        }
        id
    }

    pub fn clone_function(&mut self, source: FuncId, into: ScopeId, name: &str, origin: &str) -> FuncId {
        let src = self.function(source).clone();
        let id = self.add_function(into, name, src.return_type.clone());
        let body_scope = self.function(id).body_scope;
        let mut params = Vec::with_capacity(src.params.len());
        for &param in &src.params {
            let param_name = self.variable(param).name.clone();
            params.push(self.clone_variable(param, body_scope, &param_name, origin));
        }
        let original = src.alias.clone().unwrap_or(src.name.clone());
        let f = self.function_mut(id);
        f.params = params;
        f.export = src.export;
        f.import = Some(src.import.unwrap_or_else(|| origin.to_string()));
        f.alias = (original != name).then_some(original);
        id
    }

    pub fn clone_struct(&mut self, source: StructId, into: ScopeId, name: &str, origin: &str) -> StructId {
        let src = self.structure(source).clone();
        let id = self.add_struct(into, name);
        // Field types keep resolving in the defining module.
        let template_parent = self.scope(src.template).parent;
        let template = self.structure(id).template;
        self.scope_mut(template).parent = template_parent;
        let mut fields = Vec::with_capacity(src.fields.len());
        for &field in &src.fields {
            let field_name = self.variable(field).name.clone();
            fields.push(self.clone_variable(field, template, &field_name, origin));
        }
        let original = src.alias.clone().unwrap_or(src.name.clone());
        let st = self.structure_mut(id);
        st.fields = fields;
        st.export = src.export;
        st.import = Some(src.import.unwrap_or_else(|| origin.to_string()));
        st.alias = (original != name).then_some(original);
        id
    }

    // ── Module-level enumeration for the generator ─────────

    /// Every non-builtin function reachable from a module scope, including
    /// those in imported namespaces, in declaration order
    pub fn module_functions(&self, module: ScopeId) -> Vec<FuncId> {
        let mut out = Vec::new();
        self.collect_functions(module, &mut out);
        out
    }

    fn collect_functions(&self, scope: ScopeId, out: &mut Vec<FuncId>) {
        let s = self.scope(scope);
        out.extend(s.functions.values().copied().filter(|&f| !self.function(f).builtin));
        for &child in s.children.values() {
            if self.scope(child).import.is_some() {
                self.collect_functions(child, out);
            }
        }
    }

    /// Every variable declared at module level, including imported
    /// namespaces, in declaration order
    pub fn module_variables(&self, module: ScopeId) -> Vec<VarId> {
        let mut out = Vec::new();
        self.collect_variables(module, &mut out);
        out
    }

    fn collect_variables(&self, scope: ScopeId, out: &mut Vec<VarId>) {
        let s = self.scope(scope);
        out.extend(s.variables.values().copied());
        for &child in s.children.values() {
            if self.scope(child).import.is_some() {
                self.collect_variables(child, out);
            }
        }
    }
}
