//! Instruction encoding. [`InstructionSink`] appends opcodes and their
//! immediates to a function's code buffer; numeric opcodes without
//! immediates are named in [`opcode`] so lowering tables can pick them.

use crate::binary::{InitExpr, ValType};
use crate::writer::Writer;

/// Opcodes that take no immediate operand
pub mod opcode {
    pub const UNREACHABLE: u8 = 0x00;
    pub const ELSE: u8 = 0x05;
    pub const END: u8 = 0x0B;
    pub const RETURN: u8 = 0x0F;
    pub const DROP: u8 = 0x1A;

    pub const I32_EQZ: u8 = 0x45;
    pub const I32_EQ: u8 = 0x46;
    pub const I32_NE: u8 = 0x47;
    pub const I32_LT_S: u8 = 0x48;
    pub const I32_LT_U: u8 = 0x49;
    pub const I32_GT_S: u8 = 0x4A;
    pub const I32_GT_U: u8 = 0x4B;
    pub const I32_LE_S: u8 = 0x4C;
    pub const I32_LE_U: u8 = 0x4D;
    pub const I32_GE_S: u8 = 0x4E;
    pub const I32_GE_U: u8 = 0x4F;

    pub const I64_EQ: u8 = 0x51;
    pub const I64_NE: u8 = 0x52;
    pub const I64_LT_S: u8 = 0x53;
    pub const I64_LT_U: u8 = 0x54;
    pub const I64_GT_S: u8 = 0x55;
    pub const I64_GT_U: u8 = 0x56;
    pub const I64_LE_S: u8 = 0x57;
    pub const I64_LE_U: u8 = 0x58;
    pub const I64_GE_S: u8 = 0x59;
    pub const I64_GE_U: u8 = 0x5A;

    pub const F32_EQ: u8 = 0x5B;
    pub const F32_NE: u8 = 0x5C;
    pub const F32_LT: u8 = 0x5D;
    pub const F32_GT: u8 = 0x5E;
    pub const F32_LE: u8 = 0x5F;
    pub const F32_GE: u8 = 0x60;

    pub const F64_EQ: u8 = 0x61;
    pub const F64_NE: u8 = 0x62;
    pub const F64_LT: u8 = 0x63;
    pub const F64_GT: u8 = 0x64;
    pub const F64_LE: u8 = 0x65;
    pub const F64_GE: u8 = 0x66;

    pub const I32_CLZ: u8 = 0x67;
    pub const I32_CTZ: u8 = 0x68;
    pub const I32_POPCNT: u8 = 0x69;
    pub const I32_ADD: u8 = 0x6A;
    pub const I32_SUB: u8 = 0x6B;
    pub const I32_MUL: u8 = 0x6C;
    pub const I32_DIV_S: u8 = 0x6D;
    pub const I32_DIV_U: u8 = 0x6E;
    pub const I32_REM_S: u8 = 0x6F;
    pub const I32_REM_U: u8 = 0x70;
    pub const I32_AND: u8 = 0x71;
    pub const I32_OR: u8 = 0x72;
    pub const I32_XOR: u8 = 0x73;
    pub const I32_SHL: u8 = 0x74;
    pub const I32_SHR_S: u8 = 0x75;
    pub const I32_SHR_U: u8 = 0x76;
    pub const I32_ROTL: u8 = 0x77;
    pub const I32_ROTR: u8 = 0x78;

    pub const I64_CLZ: u8 = 0x79;
    pub const I64_CTZ: u8 = 0x7A;
    pub const I64_POPCNT: u8 = 0x7B;
    pub const I64_ADD: u8 = 0x7C;
    pub const I64_SUB: u8 = 0x7D;
    pub const I64_MUL: u8 = 0x7E;
    pub const I64_DIV_S: u8 = 0x7F;
    pub const I64_DIV_U: u8 = 0x80;
    pub const I64_REM_S: u8 = 0x81;
    pub const I64_REM_U: u8 = 0x82;
    pub const I64_AND: u8 = 0x83;
    pub const I64_OR: u8 = 0x84;
    pub const I64_XOR: u8 = 0x85;
    pub const I64_SHL: u8 = 0x86;
    pub const I64_SHR_S: u8 = 0x87;
    pub const I64_SHR_U: u8 = 0x88;
    pub const I64_ROTL: u8 = 0x89;
    pub const I64_ROTR: u8 = 0x8A;

    pub const F32_ABS: u8 = 0x8B;
    pub const F32_NEG: u8 = 0x8C;
    pub const F32_CEIL: u8 = 0x8D;
    pub const F32_FLOOR: u8 = 0x8E;
    pub const F32_TRUNC: u8 = 0x8F;
    pub const F32_NEAREST: u8 = 0x90;
    pub const F32_SQRT: u8 = 0x91;
    pub const F32_ADD: u8 = 0x92;
    pub const F32_SUB: u8 = 0x93;
    pub const F32_MUL: u8 = 0x94;
    pub const F32_DIV: u8 = 0x95;
    pub const F32_MIN: u8 = 0x96;
    pub const F32_MAX: u8 = 0x97;
    pub const F32_COPYSIGN: u8 = 0x98;

    pub const F64_ABS: u8 = 0x99;
    pub const F64_NEG: u8 = 0x9A;
    pub const F64_CEIL: u8 = 0x9B;
    pub const F64_FLOOR: u8 = 0x9C;
    pub const F64_TRUNC: u8 = 0x9D;
    pub const F64_NEAREST: u8 = 0x9E;
    pub const F64_SQRT: u8 = 0x9F;
    pub const F64_ADD: u8 = 0xA0;
    pub const F64_SUB: u8 = 0xA1;
    pub const F64_MUL: u8 = 0xA2;
    pub const F64_DIV: u8 = 0xA3;
    pub const F64_MIN: u8 = 0xA4;
    pub const F64_MAX: u8 = 0xA5;
    pub const F64_COPYSIGN: u8 = 0xA6;

    pub const I32_WRAP_I64: u8 = 0xA7;
    pub const I32_TRUNC_F32_S: u8 = 0xA8;
    pub const I32_TRUNC_F32_U: u8 = 0xA9;
    pub const I32_TRUNC_F64_S: u8 = 0xAA;
    pub const I32_TRUNC_F64_U: u8 = 0xAB;
    pub const I64_EXTEND_I32_S: u8 = 0xAC;
    pub const I64_EXTEND_I32_U: u8 = 0xAD;
    pub const I64_TRUNC_F32_S: u8 = 0xAE;
    pub const I64_TRUNC_F32_U: u8 = 0xAF;
    pub const I64_TRUNC_F64_S: u8 = 0xB0;
    pub const I64_TRUNC_F64_U: u8 = 0xB1;
    pub const F32_CONVERT_I32_S: u8 = 0xB2;
    pub const F32_CONVERT_I32_U: u8 = 0xB3;
    pub const F32_CONVERT_I64_S: u8 = 0xB4;
    pub const F32_CONVERT_I64_U: u8 = 0xB5;
    pub const F32_DEMOTE_F64: u8 = 0xB6;
    pub const F64_CONVERT_I32_S: u8 = 0xB7;
    pub const F64_CONVERT_I32_U: u8 = 0xB8;
    pub const F64_CONVERT_I64_S: u8 = 0xB9;
    pub const F64_CONVERT_I64_U: u8 = 0xBA;
    pub const F64_PROMOTE_F32: u8 = 0xBB;
    pub const I32_REINTERPRET_F32: u8 = 0xBC;
    pub const I64_REINTERPRET_F64: u8 = 0xBD;
    pub const F32_REINTERPRET_I32: u8 = 0xBE;
    pub const F64_REINTERPRET_I64: u8 = 0xBF;
}

/// Opcodes of memory accesses; each takes a [`MemArg`]
pub mod memory_opcode {
    pub const I32_LOAD: u8 = 0x28;
    pub const I64_LOAD: u8 = 0x29;
    pub const F32_LOAD: u8 = 0x2A;
    pub const F64_LOAD: u8 = 0x2B;
    pub const I32_LOAD8_S: u8 = 0x2C;
    pub const I32_LOAD8_U: u8 = 0x2D;
    pub const I32_LOAD16_S: u8 = 0x2E;
    pub const I32_LOAD16_U: u8 = 0x2F;
    pub const I64_LOAD8_S: u8 = 0x30;
    pub const I64_LOAD8_U: u8 = 0x31;
    pub const I64_LOAD16_S: u8 = 0x32;
    pub const I64_LOAD16_U: u8 = 0x33;
    pub const I64_LOAD32_S: u8 = 0x34;
    pub const I64_LOAD32_U: u8 = 0x35;
    pub const I32_STORE: u8 = 0x36;
    pub const I64_STORE: u8 = 0x37;
    pub const F32_STORE: u8 = 0x38;
    pub const F64_STORE: u8 = 0x39;
    pub const I32_STORE8: u8 = 0x3A;
    pub const I32_STORE16: u8 = 0x3B;
    pub const I64_STORE8: u8 = 0x3C;
    pub const I64_STORE16: u8 = 0x3D;
    pub const I64_STORE32: u8 = 0x3E;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    Empty,
    Value(ValType),
}

/// Alignment exponent and constant offset of a memory access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemArg {
    pub align: u32,
    pub offset: u32,
}

impl MemArg {
    /// Natural alignment for an access of `bytes` width, offset 0
    pub fn natural(bytes: u32) -> Self {
        Self {
            align: bytes.trailing_zeros(),
            offset: 0,
        }
    }
}

/// Append-only instruction stream of one function body
#[derive(Debug, Default, Clone)]
pub struct InstructionSink {
    out: Writer,
}

impl InstructionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out.into_bytes()
    }

    /// Any opcode from [`opcode`]
    pub fn op(&mut self, code: u8) -> &mut Self {
        self.out.byte(code);
        self
    }

    // ── Control ─────────────────────────────────────────────

    pub fn unreachable(&mut self) -> &mut Self {
        self.op(opcode::UNREACHABLE)
    }

    fn block_type(&mut self, ty: BlockType) {
        match ty {
            BlockType::Empty => self.out.byte(0x40),
            BlockType::Value(v) => self.out.byte(v.code()),
        };
    }

    pub fn block(&mut self, ty: BlockType) -> &mut Self {
        self.out.byte(0x02);
        self.block_type(ty);
        self
    }

    pub fn loop_(&mut self, ty: BlockType) -> &mut Self {
        self.out.byte(0x03);
        self.block_type(ty);
        self
    }

    pub fn if_(&mut self, ty: BlockType) -> &mut Self {
        self.out.byte(0x04);
        self.block_type(ty);
        self
    }

    pub fn else_(&mut self) -> &mut Self {
        self.op(opcode::ELSE)
    }

    pub fn end(&mut self) -> &mut Self {
        self.op(opcode::END)
    }

    pub fn br(&mut self, depth: u32) -> &mut Self {
        self.out.byte(0x0C).u32(depth);
        self
    }

    pub fn br_if(&mut self, depth: u32) -> &mut Self {
        self.out.byte(0x0D).u32(depth);
        self
    }

    pub fn return_(&mut self) -> &mut Self {
        self.op(opcode::RETURN)
    }

    pub fn call(&mut self, function: u32) -> &mut Self {
        self.out.byte(0x10).u32(function);
        self
    }

    pub fn drop(&mut self) -> &mut Self {
        self.op(opcode::DROP)
    }

    // ── Variables ───────────────────────────────────────────

    pub fn local_get(&mut self, index: u32) -> &mut Self {
        self.out.byte(0x20).u32(index);
        self
    }

    pub fn local_set(&mut self, index: u32) -> &mut Self {
        self.out.byte(0x21).u32(index);
        self
    }

    pub fn global_get(&mut self, index: u32) -> &mut Self {
        self.out.byte(0x23).u32(index);
        self
    }

    pub fn global_set(&mut self, index: u32) -> &mut Self {
        self.out.byte(0x24).u32(index);
        self
    }

    // ── Memory ──────────────────────────────────────────────

    /// Any opcode from [`memory_opcode`]
    pub fn memory_access(&mut self, code: u8, arg: MemArg) -> &mut Self {
        self.out.byte(code).u32(arg.align).u32(arg.offset);
        self
    }

    pub fn memory_size(&mut self) -> &mut Self {
        self.out.byte(0x3F).byte(0x00);
        self
    }

    pub fn memory_grow(&mut self) -> &mut Self {
        self.out.byte(0x40).byte(0x00);
        self
    }

    // ── Constants ───────────────────────────────────────────

    pub fn i32_const(&mut self, value: i32) -> &mut Self {
        self.out.byte(0x41).s32(value);
        self
    }

    pub fn i64_const(&mut self, value: i64) -> &mut Self {
        self.out.byte(0x42).s64(value);
        self
    }

    pub fn constant(&mut self, value: InitExpr) -> &mut Self {
        value.encode_instruction(&mut self.out);
        self
    }

    pub fn i32_add(&mut self) -> &mut Self {
        self.op(opcode::I32_ADD)
    }

    pub fn i32_mul(&mut self) -> &mut Self {
        self.op(opcode::I32_MUL)
    }

    pub fn i32_eqz(&mut self) -> &mut Self {
        self.op(opcode::I32_EQZ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_control_encoding() {
        let mut insn = InstructionSink::new();
        insn.block(BlockType::Empty)
            .loop_(BlockType::Empty)
            .br_if(1)
            .br(0)
            .end()
            .end()
            .if_(BlockType::Value(ValType::I32))
            .i32_const(1)
            .else_()
            .i32_const(0)
            .end();
        assert_eq!(
            insn.into_bytes(),
            [
                0x02, 0x40, 0x03, 0x40, 0x0D, 0x01, 0x0C, 0x00, 0x0B, 0x0B, 0x04, 0x7F, 0x41, 0x01,
                0x05, 0x41, 0x00, 0x0B
            ]
        );
    }

    #[test]
    fn memory_access_uses_natural_alignment() {
        let mut insn = InstructionSink::new();
        insn.memory_access(memory_opcode::I64_LOAD, MemArg::natural(8))
            .memory_access(memory_opcode::I32_STORE16, MemArg::natural(2))
            .memory_access(memory_opcode::I32_LOAD8_U, MemArg::natural(1));
        assert_eq!(
            insn.into_bytes(),
            [0x29, 0x03, 0x00, 0x3B, 0x01, 0x00, 0x2D, 0x00, 0x00]
        );
    }

    #[test]
    fn constants_use_signed_leb_and_raw_floats() {
        let mut insn = InstructionSink::new();
        insn.i32_const(-1).i64_const(128).constant(InitExpr::F64(1.0));
        assert_eq!(
            insn.into_bytes(),
            [0x41, 0x7F, 0x42, 0x80, 0x01, 0x44, 0, 0, 0, 0, 0, 0, 0xF0, 0x3F]
        );
    }
}
