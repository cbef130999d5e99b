use super::*;

/// The single instruction a builtin lowers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lowering {
    Op(u8),
    /// Load or store with the access width in bytes
    Memory(u8, u32),
    MemorySize,
    MemoryGrow,
}

/// Lowering of a builtin by its dotted path
pub(crate) fn lowering(path: &str) -> Option<Lowering> {
    use memory_opcode::*;
    use opcode::*;

    let (namespace, name) = path.split_once('.')?;
    let lowering = match (namespace, name) {
        ("memory", "size") => Lowering::MemorySize,
        ("memory", "grow") => Lowering::MemoryGrow,

        ("int" | "uint", "load") => Lowering::Memory(I32_LOAD, 4),
        ("int", "load8") => Lowering::Memory(I32_LOAD8_S, 1),
        ("uint", "load8") => Lowering::Memory(I32_LOAD8_U, 1),
        ("int", "load16") => Lowering::Memory(I32_LOAD16_S, 2),
        ("uint", "load16") => Lowering::Memory(I32_LOAD16_U, 2),
        ("int" | "uint", "store") => Lowering::Memory(I32_STORE, 4),
        ("int" | "uint", "store8") => Lowering::Memory(I32_STORE8, 1),
        ("int" | "uint", "store16") => Lowering::Memory(I32_STORE16, 2),
        ("int" | "uint", "clz") => Lowering::Op(I32_CLZ),
        ("int" | "uint", "ctz") => Lowering::Op(I32_CTZ),
        ("int" | "uint", "popcnt") => Lowering::Op(I32_POPCNT),
        ("int" | "uint", "rotl") => Lowering::Op(I32_ROTL),
        ("int" | "uint", "rotr") => Lowering::Op(I32_ROTR),

        ("long" | "ulong", "load") => Lowering::Memory(I64_LOAD, 8),
        ("long", "load8") => Lowering::Memory(I64_LOAD8_S, 1),
        ("ulong", "load8") => Lowering::Memory(I64_LOAD8_U, 1),
        ("long", "load16") => Lowering::Memory(I64_LOAD16_S, 2),
        ("ulong", "load16") => Lowering::Memory(I64_LOAD16_U, 2),
        ("long", "load32") => Lowering::Memory(I64_LOAD32_S, 4),
        ("ulong", "load32") => Lowering::Memory(I64_LOAD32_U, 4),
        ("long" | "ulong", "store") => Lowering::Memory(I64_STORE, 8),
        ("long" | "ulong", "store8") => Lowering::Memory(I64_STORE8, 1),
        ("long" | "ulong", "store16") => Lowering::Memory(I64_STORE16, 2),
        ("long" | "ulong", "store32") => Lowering::Memory(I64_STORE32, 4),
        ("long" | "ulong", "clz") => Lowering::Op(I64_CLZ),
        ("long" | "ulong", "ctz") => Lowering::Op(I64_CTZ),
        ("long" | "ulong", "popcnt") => Lowering::Op(I64_POPCNT),
        ("long" | "ulong", "rotl") => Lowering::Op(I64_ROTL),
        ("long" | "ulong", "rotr") => Lowering::Op(I64_ROTR),

        ("float", "load") => Lowering::Memory(F32_LOAD, 4),
        ("float", "store") => Lowering::Memory(F32_STORE, 4),
        ("float", "abs") => Lowering::Op(F32_ABS),
        ("float", "ceil") => Lowering::Op(F32_CEIL),
        ("float", "floor") => Lowering::Op(F32_FLOOR),
        ("float", "trunc") => Lowering::Op(F32_TRUNC),
        ("float", "nearest") => Lowering::Op(F32_NEAREST),
        ("float", "sqrt") => Lowering::Op(F32_SQRT),
        ("float", "min") => Lowering::Op(F32_MIN),
        ("float", "max") => Lowering::Op(F32_MAX),
        ("float", "copysign") => Lowering::Op(F32_COPYSIGN),

        ("double", "load") => Lowering::Memory(F64_LOAD, 8),
        ("double", "store") => Lowering::Memory(F64_STORE, 8),
        ("double", "abs") => Lowering::Op(F64_ABS),
        ("double", "ceil") => Lowering::Op(F64_CEIL),
        ("double", "floor") => Lowering::Op(F64_FLOOR),
        ("double", "trunc") => Lowering::Op(F64_TRUNC),
        ("double", "nearest") => Lowering::Op(F64_NEAREST),
        ("double", "sqrt") => Lowering::Op(F64_SQRT),
        ("double", "min") => Lowering::Op(F64_MIN),
        ("double", "max") => Lowering::Op(F64_MAX),
        ("double", "copysign") => Lowering::Op(F64_COPYSIGN),

        _ => return None,
    };
    Some(lowering)
}

impl WasmCodegen<'_> {
    /// Arguments in order, then the builtin's instruction
    pub(super) fn compile_intrinsic(
        &self,
        ast: &Ast,
        path: &str,
        args: &[NodeId],
        insn: &mut InstructionSink,
        ctx: &mut FuncCtx,
        span: Span,
    ) -> Result<(), CodegenError> {
        let lowering =
            lowering(path).ok_or_else(|| codegen_err(format!("`{path}` is not an intrinsic"), span))?;
        for &arg in args {
            self.compile_expr(ast, arg, insn, ctx)?;
        }
        match lowering {
            Lowering::Op(code) => insn.op(code),
            Lowering::Memory(code, width) => insn.memory_access(code, MemArg::natural(width)),
            Lowering::MemorySize => insn.memory_size(),
            Lowering::MemoryGrow => insn.memory_grow(),
        };
        Ok(())
    }
}
