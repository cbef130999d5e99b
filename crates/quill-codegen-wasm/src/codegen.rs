use std::collections::HashMap;
use std::collections::HashSet;

use quill_analyzer::literal::{parse_float_literal, parse_int_literal};
use quill_analyzer::resolve::{self, static_index};
use quill_analyzer::signatures::{BinaryOperator, UnaryOperator};
use quill_analyzer::{CompileOptions, FuncId, SymbolTable, VarId};
use quill_syntax::{Ast, DataType, Diagnostics, NodeId, NodeKind, ScopeId, Span, Stage, TokenKind};

use crate::binary::{
    BinaryModule, Export, ExportKind, FuncType, FunctionBody, Global, GlobalType, Import,
    ImportDesc, InitExpr, Limits, NameSection, ValType,
};
use crate::instructions::{BlockType, InstructionSink, MemArg, memory_opcode, opcode};

mod compile_expr;
mod compile_func;
mod compile_stmt;
mod intrinsics;
mod operators;
mod types;


pub use types::CodegenError;
pub(crate) use types::{FuncCtx, LoopInfo, Place, Storage};

const PAGE_SIZE: u32 = 65_536;

fn codegen_err(message: impl Into<String>, span: Span) -> CodegenError {
    CodegenError::Error {
        message: message.into(),
        line: span.line,
        column: span.column,
        length: span.length,
    }
}

/// Generates one module's binary from its annotated tree. A fresh
/// generator is used per module; nothing is shared between modules except
/// the read-only symbol table.
pub struct WasmCodegen<'a> {
    module: &'a str,
    table: &'a SymbolTable,
    options: &'a CompileOptions,
    diagnostics: &'a mut Diagnostics,
    program: ScopeId,
    binary: BinaryModule,
    /// Function index of every callable non-builtin function
    func_indices: HashMap<FuncId, u32>,
    /// Global index of every primitive leaf kept in a VM global
    global_indices: HashMap<VarId, u32>,
    export_names: HashSet<String>,
}

impl<'a> WasmCodegen<'a> {
    pub fn new(
        module: &'a str,
        table: &'a SymbolTable,
        options: &'a CompileOptions,
        diagnostics: &'a mut Diagnostics,
    ) -> Result<Self, CodegenError> {
        let program = table
            .find_module(module)
            .ok_or_else(|| codegen_err(format!("module `{module}` was never analyzed"), Span::default()))?;
        Ok(Self {
            module,
            table,
            options,
            diagnostics,
            program,
            binary: BinaryModule::new(),
            func_indices: HashMap::new(),
            global_indices: HashMap::new(),
            export_names: HashSet::new(),
        })
    }

    /// Assemble the module: signatures and indices first (imports before
    /// local definitions), then globals, memory, exports and start, and
    /// finally every function body.
    pub fn compile(&mut self, ast: &mut Ast) -> Result<Vec<u8>, CodegenError> {
        let table = self.table;
        for id in ast.preorder() {
            ast[id].generated = false;
        }

        // Phase 1: functions
        let (imported, local): (Vec<FuncId>, Vec<FuncId>) = table
            .module_functions(self.program)
            .into_iter()
            .partition(|&f| table.function(f).import.is_some());

        for &f in &imported {
            let type_index = self.signature(ast, f)?;
            let func = table.function(f);
            let index = self.binary.imported_functions();
            self.binary.imports.push(Import {
                module: func.import.clone().unwrap_or_default(),
                field: func.alias.clone().unwrap_or_else(|| func.name.clone()),
                desc: ImportDesc::Function(type_index),
            });
            self.func_indices.insert(f, index);
        }
        let first_local = self.binary.imported_functions();
        for (i, &f) in local.iter().enumerate() {
            let type_index = self.signature(ast, f)?;
            self.binary.functions.push(type_index);
            self.func_indices.insert(f, first_local + i as u32);
        }

        // Phase 2: globals and memory
        self.collect_globals(ast)?;
        self.binary.memory = Some(Limits {
            min: self.memory_pages(),
            max: None,
        });
        self.export("memory", ExportKind::Memory, 0, Span::default())?;

        // Phase 3: function exports and start
        for &f in &local {
            let func = table.function(f);
            if func.export {
                let span = self.decl_span(ast, func.decl);
                self.export(&func.name, ExportKind::Function, self.func_indices[&f], span)?;
            }
        }
        self.choose_start(ast, &local);

        // Phase 4: bodies
        let mut names = NameSection {
            module: Some(self.module.to_string()),
            ..NameSection::default()
        };
        for &f in &local {
            let (body, locals) = self.compile_function(ast, f)?;
            self.binary.code.push(body);
            names.locals.push((self.func_indices[&f], locals));
        }
        let mut functions: Vec<(u32, String)> = self
            .func_indices
            .iter()
            .map(|(&f, &index)| (index, table.function(f).name.clone()))
            .collect();
        functions.sort_by_key(|&(index, _)| index);
        names.functions = functions;
        if self.options.emit_names {
            self.binary.names = Some(names);
        }

        log::debug!(
            "generated `{}`: {} import(s), {} function(s), {} global(s), {} export(s)",
            self.module,
            self.binary.imports.len(),
            self.binary.functions.len(),
            self.binary.globals.len(),
            self.binary.exports.len(),
        );
        Ok(self.binary.encode())
    }

    fn decl_span(&self, ast: &Ast, decl: Option<NodeId>) -> Span {
        decl.map(|d| ast[d].token.span).unwrap_or_default()
    }

    /// Type index for a function, expanding composite parameters to their
    /// primitive leaves
    fn signature(&mut self, ast: &Ast, f: FuncId) -> Result<u32, CodegenError> {
        let table = self.table;
        let func = table.function(f);
        let span = if func.import.is_some() {
            Span::default()
        } else {
            self.decl_span(ast, func.decl)
        };
        let mut params = Vec::new();
        for &param in &func.params {
            for leaf in table.leaves(param) {
                params.push(self.val_type(leaf, span)?);
            }
        }
        let results = match &func.return_type {
            DataType::Void => Vec::new(),
            ty => vec![ValType::of(ty).ok_or_else(|| {
                codegen_err(
                    format!(
                        "`{}` returns `{ty}`, which has no scalar representation",
                        func.name
                    ),
                    span,
                )
            })?],
        };
        Ok(self.binary.add_type(FuncType { params, results }))
    }

    fn val_type(&self, leaf: VarId, span: Span) -> Result<ValType, CodegenError> {
        let v = self.table.variable(leaf);
        ValType::of(&v.data_type).ok_or_else(|| {
            codegen_err(
                format!("`{}` of type `{}` has no scalar representation", v.name, v.data_type),
                span,
            )
        })
    }

    fn export(&mut self, name: &str, kind: ExportKind, index: u32, span: Span) -> Result<(), CodegenError> {
        if !self.export_names.insert(name.to_string()) {
            return Err(codegen_err(format!("export name `{name}` is used twice"), span));
        }
        self.binary.exports.push(Export {
            name: name.to_string(),
            kind,
            index,
        });
        Ok(())
    }

    /// One VM global per primitive leaf of every module-level variable
    /// that is not memory-mapped. Imported leaves come first.
    fn collect_globals(&mut self, ast: &Ast) -> Result<(), CodegenError> {
        let table = self.table;
        let (imported, local): (Vec<VarId>, Vec<VarId>) = table
            .module_variables(self.program)
            .into_iter()
            .filter(|&v| !table.variable(v).mapped)
            .partition(|&v| table.variable(v).import.is_some());

        for var in imported {
            for leaf in table.leaves(var) {
                let val_type = self.val_type(leaf, Span::default())?;
                let v = table.variable(leaf);
                let index = self.binary.imported_globals();
                self.binary.imports.push(Import {
                    module: v.import.clone().unwrap_or_default(),
                    field: table.qualified_name(leaf, true),
                    desc: ImportDesc::Global(GlobalType {
                        val_type,
                        mutable: !v.constant,
                    }),
                });
                self.global_indices.insert(leaf, index);
            }
        }

        for var in local {
            let span = self.decl_span(ast, table.variable(var).decl);
            let initializer = self.global_initializer(ast, var)?;
            for leaf in table.leaves(var) {
                let val_type = self.val_type(leaf, span)?;
                let v = table.variable(leaf);
                let index = self.binary.imported_globals() + self.binary.globals.len() as u32;
                self.binary.globals.push(Global {
                    ty: GlobalType {
                        val_type,
                        mutable: !v.constant,
                    },
                    init: initializer.unwrap_or(InitExpr::zero(val_type)),
                });
                self.global_indices.insert(leaf, index);
                if v.export {
                    let name = table.qualified_name(leaf, false);
                    self.export(&name, ExportKind::Global, index, span)?;
                }
            }
        }
        Ok(())
    }

    fn global_initializer(&self, ast: &Ast, var: VarId) -> Result<Option<InitExpr>, CodegenError> {
        let Some(def) = self.table.variable(var).decl else {
            return Ok(None);
        };
        match ast.first_expression(def) {
            Some(init) => self.constant(ast, init).map(Some),
            None => Ok(None),
        }
    }

    /// Value of a literal or negated literal
    fn constant(&self, ast: &Ast, id: NodeId) -> Result<InitExpr, CodegenError> {
        let span = ast[id].token.span;
        match ast.kind(id) {
            NodeKind::Literal => self.literal_constant(ast, id),
            NodeKind::UnaryOp if ast.lexeme(id) == "-" => {
                let operand = ast
                    .child(id, 0)
                    .ok_or_else(|| codegen_err("negation without an operand", span))?;
                Ok(self.constant(ast, operand)?.negate())
            }
            _ => Err(codegen_err(
                format!("`{}` is not a constant expression", ast.lexeme(id)),
                span,
            )),
        }
    }

    fn literal_constant(&self, ast: &Ast, id: NodeId) -> Result<InitExpr, CodegenError> {
        let token = &ast[id].token;
        let ty = self.type_of(ast, id)?;
        let malformed = |err: String| codegen_err(err, token.span);
        Ok(match token.kind {
            TokenKind::True => InitExpr::I32(1),
            TokenKind::False => InitExpr::I32(0),
            TokenKind::Integer => {
                let (value, _) = parse_int_literal(&token.lexeme).map_err(|e| malformed(e.to_string()))?;
                match ty {
                    DataType::Long | DataType::ULong => InitExpr::I64(value.as_i64()),
                    _ => InitExpr::I32(value.as_i32()),
                }
            }
            TokenKind::Float => {
                let (value, _) = parse_float_literal(&token.lexeme).map_err(|e| malformed(e.to_string()))?;
                match ty {
                    DataType::Float => InitExpr::F32(value as f32),
                    _ => InitExpr::F64(value),
                }
            }
            _ => return Err(malformed(format!("`{}` is not a literal", token.lexeme))),
        })
    }

    /// Type the analyzer assigned to a node
    fn type_of(&self, ast: &Ast, id: NodeId) -> Result<DataType, CodegenError> {
        ast[id]
            .data_type
            .clone()
            .filter(|ty| !ty.is_invalid())
            .ok_or_else(|| {
                codegen_err(
                    format!("`{}` has no type", ast.lexeme(id)),
                    ast[id].token.span,
                )
            })
    }

    /// Pages covering the highest mapped byte, and at least the configured
    /// minimum
    fn memory_pages(&self) -> u32 {
        let highest = self
            .table
            .module_variables(self.program)
            .into_iter()
            .map(|v| self.table.variable(v))
            .filter(|v| v.mapped && v.import.is_none())
            .map(|v| v.offset.saturating_add(v.size))
            .max()
            .unwrap_or(0);
        highest.div_ceil(PAGE_SIZE).max(self.options.memory_pages)
    }

    fn choose_start(&mut self, ast: &Ast, local: &[FuncId]) {
        let table = self.table;
        let wanted = &self.options.start_function;
        let Some(&f) = local.iter().find(|&&f| &table.function(f).name == wanted) else {
            return;
        };
        let func = table.function(f);
        if func.params.is_empty() && func.return_type == DataType::Void {
            self.binary.start = Some(self.func_indices[&f]);
            return;
        }
        let span = self.decl_span(ast, func.decl);
        self.diagnostics.warning(
            Stage::Codegen,
            self.module,
            span,
            format!("`{wanted}` is not used as the start function: it must take no parameters and return void"),
        );
    }
}
