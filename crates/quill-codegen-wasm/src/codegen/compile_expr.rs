use super::*;

impl WasmCodegen<'_> {
    pub(super) fn compile_expr(
        &self,
        ast: &Ast,
        expr: NodeId,
        insn: &mut InstructionSink,
        ctx: &mut FuncCtx,
    ) -> Result<(), CodegenError> {
        let span = ast[expr].token.span;
        match ast.kind(expr) {
            NodeKind::Literal => {
                insn.constant(self.literal_constant(ast, expr)?);
            }
            NodeKind::Identifier | NodeKind::Access | NodeKind::Indexer => {
                let place = self.place(ast, expr)?;
                if !self.table.variable(place.var).data_type.is_scalar() {
                    return Err(codegen_err(
                        format!("`{}` is not a scalar value", self.table.qualified_name(place.var, false)),
                        span,
                    ));
                }
                self.load(place.var, &place, ast, insn, ctx, span)?;
            }
            NodeKind::FunctionCall => {
                self.compile_call(ast, expr, insn, ctx)?;
            }
            NodeKind::UnaryOp => {
                self.compile_unary(ast, expr, insn, ctx)?;
            }
            NodeKind::BinaryOp => {
                self.compile_binary(ast, expr, insn, ctx)?;
            }
            kind => {
                return Err(codegen_err(format!("{kind:?} is not an expression"), span));
            }
        }
        Ok(())
    }

    fn compile_call(
        &self,
        ast: &Ast,
        call: NodeId,
        insn: &mut InstructionSink,
        ctx: &mut FuncCtx,
    ) -> Result<(), CodegenError> {
        let span = ast[call].token.span;
        let f = resolve::function(self.table, ast, call)
            .ok_or_else(|| codegen_err(format!("`{}` is not a function", ast.lexeme(call)), span))?;
        let func = self.table.function(f);
        let args = ast.children(call).get(1..).unwrap_or_default();

        if func.builtin {
            let path = format!("{}.{}", self.table.scope(func.scope).name, func.name);
            return self.compile_intrinsic(ast, &path, args, insn, ctx, span);
        }

        for (&arg, &param) in args.iter().zip(&func.params) {
            if self.table.variable(param).data_type.is_scalar() {
                self.compile_expr(ast, arg, insn, ctx)?;
                continue;
            }
            // composite argument: one value per leaf
            let source = self.place(ast, arg)?;
            for leaf in self.table.leaves(source.var) {
                self.load(leaf, &source, ast, insn, ctx, span)?;
            }
        }
        let index = self
            .func_indices
            .get(&f)
            .ok_or_else(|| codegen_err(format!("`{}` has no function index", func.name), span))?;
        insn.call(*index);
        Ok(())
    }

    fn compile_unary(
        &self,
        ast: &Ast,
        expr: NodeId,
        insn: &mut InstructionSink,
        ctx: &mut FuncCtx,
    ) -> Result<(), CodegenError> {
        let span = ast[expr].token.span;
        let operand = ast
            .child(expr, 0)
            .ok_or_else(|| codegen_err("unary operator without an operand", span))?;
        let op = UnaryOperator::from_lexeme(ast.lexeme(expr))
            .ok_or_else(|| codegen_err(format!("unknown unary operator `{}`", ast.lexeme(expr)), span))?;
        let ty = self.type_of(ast, operand)?;

        match op {
            UnaryOperator::Neg if ast.kind(operand) == NodeKind::Literal => {
                insn.constant(self.literal_constant(ast, operand)?.negate());
            }
            UnaryOperator::Neg => match ty {
                DataType::Float => {
                    self.compile_expr(ast, operand, insn, ctx)?;
                    insn.op(opcode::F32_NEG);
                }
                DataType::Double => {
                    self.compile_expr(ast, operand, insn, ctx)?;
                    insn.op(opcode::F64_NEG);
                }
                DataType::Long | DataType::ULong => {
                    insn.i64_const(0);
                    self.compile_expr(ast, operand, insn, ctx)?;
                    insn.op(opcode::I64_SUB);
                }
                _ => {
                    insn.i32_const(0);
                    self.compile_expr(ast, operand, insn, ctx)?;
                    insn.op(opcode::I32_SUB);
                }
            },
            UnaryOperator::Not => {
                self.compile_expr(ast, operand, insn, ctx)?;
                insn.i32_eqz();
            }
            UnaryOperator::BitNot => {
                self.compile_expr(ast, operand, insn, ctx)?;
                match ValType::of(&ty) {
                    Some(ValType::I64) => insn.i64_const(-1).op(opcode::I64_XOR),
                    _ => insn.i32_const(-1).op(opcode::I32_XOR),
                };
            }
        }
        Ok(())
    }

    fn compile_binary(
        &self,
        ast: &Ast,
        expr: NodeId,
        insn: &mut InstructionSink,
        ctx: &mut FuncCtx,
    ) -> Result<(), CodegenError> {
        let span = ast[expr].token.span;
        let (Some(left), Some(right)) = (ast.child(expr, 0), ast.child(expr, 1)) else {
            return Err(codegen_err("binary operator without two operands", span));
        };
        let op = BinaryOperator::from_lexeme(ast.lexeme(expr))
            .ok_or_else(|| codegen_err(format!("unknown binary operator `{}`", ast.lexeme(expr)), span))?;
        let left_ty = self.type_of(ast, left)?;

        match op {
            BinaryOperator::And => {
                self.compile_expr(ast, left, insn, ctx)?;
                insn.if_(BlockType::Value(ValType::I32));
                ctx.block_depth += 1;
                self.compile_expr(ast, right, insn, ctx)?;
                insn.else_().i32_const(0).end();
                ctx.block_depth -= 1;
            }
            BinaryOperator::Or => {
                self.compile_expr(ast, left, insn, ctx)?;
                insn.if_(BlockType::Value(ValType::I32));
                ctx.block_depth += 1;
                insn.i32_const(1).else_();
                self.compile_expr(ast, right, insn, ctx)?;
                insn.end();
                ctx.block_depth -= 1;
            }
            BinaryOperator::Convert => {
                let target = self.type_of(ast, right)?;
                let lowering = operators::conversion(&left_ty, &target).ok_or_else(|| {
                    codegen_err(format!("cannot `as` `{left_ty}` to `{target}`"), span)
                })?;
                self.compile_expr(ast, left, insn, ctx)?;
                match lowering {
                    operators::Conversion::Ops(ops) => {
                        for &code in ops {
                            insn.op(code);
                        }
                    }
                    operators::Conversion::NonZero { zero, ne } => {
                        insn.constant(zero).op(ne);
                    }
                }
            }
            BinaryOperator::Reinterpret => {
                let target = self.type_of(ast, right)?;
                let ops = operators::reinterpret(&left_ty, &target).ok_or_else(|| {
                    codegen_err(format!("cannot `bitcast` `{left_ty}` to `{target}`"), span)
                })?;
                self.compile_expr(ast, left, insn, ctx)?;
                for &code in ops {
                    insn.op(code);
                }
            }
            _ => {
                let code = operators::binary_opcode(op, &left_ty).ok_or_else(|| {
                    codegen_err(
                        format!("operator `{}` is not defined for `{left_ty}`", op.lexeme()),
                        span,
                    )
                })?;
                self.compile_expr(ast, left, insn, ctx)?;
                self.compile_expr(ast, right, insn, ctx)?;
                insn.op(code);
            }
        }
        Ok(())
    }

    // ── Places ──────────────────────────────────────────────

    /// Resolve a place expression to the variable it names and the
    /// subscripts only known at run time
    pub(super) fn place(&self, ast: &Ast, id: NodeId) -> Result<Place, CodegenError> {
        let span = ast[id].token.span;
        let var = resolve::variable(self.table, ast, id)
            .ok_or_else(|| codegen_err(format!("`{}` is not a variable", ast.lexeme(id)), span))?;
        let mut place = Place::of(var);
        self.collect_subscripts(ast, id, &mut place.dynamic)?;
        Ok(place)
    }

    fn collect_subscripts(&self, ast: &Ast, id: NodeId, out: &mut Vec<(NodeId, u32)>) -> Result<(), CodegenError> {
        match ast.kind(id) {
            NodeKind::Access => {
                if let Some(left) = ast.child(id, 0) {
                    self.collect_subscripts(ast, left, out)?;
                }
            }
            NodeKind::Indexer => {
                let span = ast[id].token.span;
                let (Some(left), Some(index)) = (ast.child(id, 0), ast.child(id, 1)) else {
                    return Err(codegen_err("incomplete index expression", span));
                };
                self.collect_subscripts(ast, left, out)?;
                if static_index(ast, index).is_none() {
                    // stride is the size of the element the index selects
                    let element = resolve::variable(self.table, ast, id)
                        .ok_or_else(|| codegen_err("index into a non-array", span))?;
                    out.push((index, self.table.variable(element).size));
                }
            }
            _ => {}
        }
        Ok(())
    }

    pub(super) fn storage(&self, leaf: VarId, ctx: &FuncCtx, span: Span) -> Result<Storage, CodegenError> {
        if let Some(&index) = ctx.locals.get(&leaf) {
            return Ok(Storage::Local(index));
        }
        let v = self.table.variable(leaf);
        if v.mapped {
            if v.import.is_some() {
                return Err(codegen_err(
                    format!(
                        "`{}` is mapped in the memory of module `{}` and cannot be used here",
                        self.table.qualified_name(leaf, false),
                        v.import.as_deref().unwrap_or_default()
                    ),
                    span,
                ));
            }
            return Ok(Storage::Memory(v.offset));
        }
        self.global_indices
            .get(&leaf)
            .map(|&index| Storage::Global(index))
            .ok_or_else(|| {
                codegen_err(
                    format!("`{}` has no storage", self.table.qualified_name(leaf, false)),
                    span,
                )
            })
    }

    /// Push the address of a mapped leaf
    fn address(
        &self,
        base: u32,
        place: &Place,
        ast: &Ast,
        insn: &mut InstructionSink,
        ctx: &mut FuncCtx,
    ) -> Result<(), CodegenError> {
        insn.i32_const(base as i32);
        for &(index, stride) in &place.dynamic {
            self.compile_expr(ast, index, insn, ctx)?;
            insn.i32_const(stride as i32).i32_mul().i32_add();
        }
        Ok(())
    }

    /// Push the value of one primitive leaf of `place`
    pub(super) fn load(
        &self,
        leaf: VarId,
        place: &Place,
        ast: &Ast,
        insn: &mut InstructionSink,
        ctx: &mut FuncCtx,
        span: Span,
    ) -> Result<(), CodegenError> {
        match self.storage(leaf, ctx, span)? {
            Storage::Local(index) => {
                insn.local_get(index);
            }
            Storage::Global(index) => {
                insn.global_get(index);
            }
            Storage::Memory(base) => {
                let ty = self.val_type(leaf, span)?;
                self.address(base, place, ast, insn, ctx)?;
                let code = match ty {
                    ValType::I32 => memory_opcode::I32_LOAD,
                    ValType::I64 => memory_opcode::I64_LOAD,
                    ValType::F32 => memory_opcode::F32_LOAD,
                    ValType::F64 => memory_opcode::F64_LOAD,
                };
                insn.memory_access(code, MemArg::natural(ty.size()));
            }
        }
        Ok(())
    }

    /// Assign `value` to `place`, leaf by leaf for composites
    pub(super) fn compile_store(
        &self,
        ast: &Ast,
        place: &Place,
        value: NodeId,
        insn: &mut InstructionSink,
        ctx: &mut FuncCtx,
    ) -> Result<(), CodegenError> {
        let span = ast[value].token.span;
        if self.table.variable(place.var).data_type.is_scalar() {
            let target = self.storage(place.var, ctx, span)?;
            if let Storage::Memory(base) = target {
                self.address(base, place, ast, insn, ctx)?;
            }
            self.compile_expr(ast, value, insn, ctx)?;
            return self.store(place.var, target, insn, span);
        }

        let source = self.place(ast, value)?;
        let targets = self.table.leaves(place.var);
        let sources = self.table.leaves(source.var);
        if targets.len() != sources.len() {
            return Err(codegen_err(
                format!(
                    "cannot copy {} value(s) into {} slot(s)",
                    sources.len(),
                    targets.len()
                ),
                span,
            ));
        }
        for (target_leaf, source_leaf) in targets.into_iter().zip(sources) {
            let target = self.storage(target_leaf, ctx, span)?;
            if let Storage::Memory(base) = target {
                self.address(base, place, ast, insn, ctx)?;
            }
            self.load(source_leaf, &source, ast, insn, ctx, span)?;
            self.store(target_leaf, target, insn, span)?;
        }
        Ok(())
    }

    /// Pop the value on top of the stack into a leaf. A memory target
    /// expects its address below the value.
    fn store(&self, leaf: VarId, target: Storage, insn: &mut InstructionSink, span: Span) -> Result<(), CodegenError> {
        match target {
            Storage::Local(index) => {
                insn.local_set(index);
            }
            Storage::Global(index) => {
                insn.global_set(index);
            }
            Storage::Memory(_) => {
                let ty = self.val_type(leaf, span)?;
                let code = match ty {
                    ValType::I32 => memory_opcode::I32_STORE,
                    ValType::I64 => memory_opcode::I64_STORE,
                    ValType::F32 => memory_opcode::F32_STORE,
                    ValType::F64 => memory_opcode::F64_STORE,
                };
                insn.memory_access(code, MemArg::natural(ty.size()));
            }
        }
        Ok(())
    }
}
