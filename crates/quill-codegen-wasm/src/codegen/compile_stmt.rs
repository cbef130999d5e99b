use super::*;

impl WasmCodegen<'_> {
    pub(super) fn compile_block(
        &self,
        ast: &mut Ast,
        block: NodeId,
        insn: &mut InstructionSink,
        ctx: &mut FuncCtx,
    ) -> Result<(), CodegenError> {
        let statements = ast.children(block).to_vec();
        for stmt in statements {
            // consumed by a preceding `if`
            if ast[stmt].generated {
                continue;
            }
            self.compile_stmt(ast, stmt, insn, ctx)?;
        }
        Ok(())
    }

    pub(super) fn compile_stmt(
        &self,
        ast: &mut Ast,
        stmt: NodeId,
        insn: &mut InstructionSink,
        ctx: &mut FuncCtx,
    ) -> Result<(), CodegenError> {
        let span = ast[stmt].token.span;
        log::trace!("emit {:?} at {}:{}", ast.kind(stmt), span.line, span.column);
        match ast.kind(stmt) {
            NodeKind::Block => {
                self.compile_block(ast, stmt, insn, ctx)?;
            }
            NodeKind::VariableDef => {
                self.compile_local(ast, stmt, insn, ctx)?;
            }
            NodeKind::Assignment => {
                let (Some(target), Some(value)) = (ast.child(stmt, 0), ast.child(stmt, 1)) else {
                    return Err(codegen_err("incomplete assignment", span));
                };
                let place = self.place(ast, target)?;
                self.compile_store(ast, &place, value, insn, ctx)?;
            }
            NodeKind::If => {
                self.compile_if(ast, stmt, insn, ctx)?;
            }
            NodeKind::ElseIf | NodeKind::Else => {
                return Err(codegen_err(
                    format!("`{}` without a preceding `if`", ast.lexeme(stmt)),
                    span,
                ));
            }
            NodeKind::While => {
                self.compile_while(ast, stmt, insn, ctx)?;
            }
            NodeKind::Break => {
                if let Some(loop_info) = ctx.loop_depth_stack.last() {
                    let relative = ctx.block_depth - loop_info.break_depth;
                    insn.br(relative);
                } else {
                    return Err(codegen_err("break outside of loop", span));
                }
            }
            NodeKind::Continue => {
                if let Some(loop_info) = ctx.loop_depth_stack.last() {
                    let relative = ctx.block_depth - loop_info.continue_depth;
                    insn.br(relative);
                } else {
                    return Err(codegen_err("continue outside of loop", span));
                }
            }
            NodeKind::Return => {
                let value = ast
                    .child(stmt, 0)
                    .ok_or_else(|| codegen_err("return without a value", span))?;
                if !ctx.return_type.is_scalar() {
                    return Err(codegen_err(
                        format!("cannot return a value from a function returning `{}`", ctx.return_type),
                        span,
                    ));
                }
                self.compile_expr(ast, value, insn, ctx)?;
                insn.return_();
            }
            NodeKind::ReturnVoid => {
                insn.return_();
            }
            kind if kind.is_expression() => {
                // expression statement: discard the value
                self.compile_expr(ast, stmt, insn, ctx)?;
                if self.type_of(ast, stmt)? != DataType::Void {
                    insn.drop();
                }
            }
            _ => {}
        }
        ast[stmt].generated = true;
        Ok(())
    }

    /// Local declaration: the initializer, or zero for every leaf so that a
    /// declaration inside a loop starts fresh on each iteration
    fn compile_local(
        &self,
        ast: &Ast,
        def: NodeId,
        insn: &mut InstructionSink,
        ctx: &mut FuncCtx,
    ) -> Result<(), CodegenError> {
        let span = ast[def].token.span;
        let var = resolve::declared_variable(self.table, ast, def)
            .ok_or_else(|| codegen_err(format!("`{}` was never declared", ast.lexeme(def)), span))?;
        if let Some(init) = ast.first_expression(def) {
            return self.compile_store(ast, &Place::of(var), init, insn, ctx);
        }
        for leaf in self.table.leaves(var) {
            let ty = self.val_type(leaf, span)?;
            let Storage::Local(index) = self.storage(leaf, ctx, span)? else {
                return Err(codegen_err(format!("`{}` is not a local", ast.lexeme(def)), span));
            };
            insn.constant(InitExpr::zero(ty));
            insn.local_set(index);
        }
        Ok(())
    }

    fn compile_if(
        &self,
        ast: &mut Ast,
        stmt: NodeId,
        insn: &mut InstructionSink,
        ctx: &mut FuncCtx,
    ) -> Result<(), CodegenError> {
        let span = ast[stmt].token.span;
        let (Some(condition), Some(body)) = (ast.child(stmt, 0), ast.child_of_kind(stmt, NodeKind::Block)) else {
            return Err(codegen_err("incomplete `if`", span));
        };
        self.compile_expr(ast, condition, insn, ctx)?;

        insn.if_(BlockType::Empty);
        ctx.block_depth += 1;

        self.compile_block(ast, body, insn, ctx)?;

        // A following `elif`/`else` continues this structured block.
        if let Some(next) = ast.next_sibling(stmt) {
            match ast.kind(next) {
                NodeKind::ElseIf => {
                    ast[next].generated = true;
                    insn.else_();
                    self.compile_if(ast, next, insn, ctx)?;
                }
                NodeKind::Else => {
                    ast[next].generated = true;
                    insn.else_();
                    if let Some(else_body) = ast.child_of_kind(next, NodeKind::Block) {
                        self.compile_block(ast, else_body, insn, ctx)?;
                    }
                }
                _ => {}
            }
        }

        insn.end();
        ctx.block_depth -= 1;
        Ok(())
    }

    fn compile_while(
        &self,
        ast: &mut Ast,
        stmt: NodeId,
        insn: &mut InstructionSink,
        ctx: &mut FuncCtx,
    ) -> Result<(), CodegenError> {
        let span = ast[stmt].token.span;
        let (Some(condition), Some(body)) = (ast.child(stmt, 0), ast.child_of_kind(stmt, NodeKind::Block)) else {
            return Err(codegen_err("incomplete `while`", span));
        };

        // block (for break)
        insn.block(BlockType::Empty);
        ctx.block_depth += 1;
        let break_depth = ctx.block_depth;

        // loop (for continue)
        insn.loop_(BlockType::Empty);
        ctx.block_depth += 1;
        let continue_depth = ctx.block_depth;

        ctx.loop_depth_stack.push(LoopInfo {
            break_depth,
            continue_depth,
        });

        self.compile_expr(ast, condition, insn, ctx)?;
        insn.i32_eqz();
        insn.br_if(ctx.block_depth - break_depth);

        self.compile_block(ast, body, insn, ctx)?;

        // back to the condition
        insn.br(ctx.block_depth - continue_depth);

        insn.end();
        ctx.block_depth -= 1;
        insn.end();
        ctx.block_depth -= 1;

        ctx.loop_depth_stack.pop();
        Ok(())
    }
}
