use super::*;

impl WasmCodegen<'_> {
    /// Compile a function declaration into its body and local names
    pub(super) fn compile_function(
        &self,
        ast: &mut Ast,
        f: FuncId,
    ) -> Result<(FunctionBody, Vec<(u32, String)>), CodegenError> {
        let func = self.table.function(f);
        let decl = func
            .decl
            .ok_or_else(|| codegen_err(format!("`{}` has no body", func.name), Span::default()))?;
        let span = ast[decl].token.span;
        let body = ast
            .child_of_kind(decl, NodeKind::Block)
            .ok_or_else(|| codegen_err(format!("`{}` has no body", func.name), span))?;

        let mut ctx = FuncCtx::new(func.return_type.clone());
        for &param in &func.params {
            for leaf in self.table.leaves(param) {
                ctx.add_param(leaf, self.table.qualified_name(leaf, false));
            }
        }
        self.prescan_locals(ast, body, &mut ctx)?;

        let mut insn = InstructionSink::new();
        self.compile_block(ast, body, &mut insn, &mut ctx)?;
        // falling off the end of a value-returning function traps
        if func.return_type != DataType::Void {
            insn.unreachable();
        }
        insn.end();

        log::trace!(
            "compiled `{}`: {} local(s), {} byte(s)",
            func.name,
            ctx.next_local,
            insn.len()
        );
        Ok((
            FunctionBody {
                locals: ctx.extra_locals,
                code: insn.into_bytes(),
            },
            ctx.names,
        ))
    }

    /// Give every primitive leaf of every local declared in the body a VM
    /// local, in declaration order
    fn prescan_locals(&self, ast: &Ast, node: NodeId, ctx: &mut FuncCtx) -> Result<(), CodegenError> {
        for &child in ast.children(node) {
            if ast.kind(child) == NodeKind::VariableDef {
                let span = ast[child].token.span;
                let var = resolve::declared_variable(self.table, ast, child).ok_or_else(|| {
                    codegen_err(format!("`{}` was never declared", ast.lexeme(child)), span)
                })?;
                for leaf in self.table.leaves(var) {
                    let ty = self.val_type(leaf, span)?;
                    ctx.declare_local(leaf, ty, self.table.qualified_name(leaf, false));
                }
            }
            self.prescan_locals(ast, child, ctx)?;
        }
        Ok(())
    }
}
