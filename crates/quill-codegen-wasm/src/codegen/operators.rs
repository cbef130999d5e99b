//! Opcode selection for the typed operators. Operand types are the ones the
//! analyzer accepted, so every row here has a matching signature.

use quill_analyzer::signatures::BinaryOperator;
use quill_syntax::DataType;

use crate::binary::{InitExpr, ValType};
use crate::instructions::opcode::*;

/// Instruction for a value-producing binary operator, chosen by the left
/// operand's type. `&&`, `||` and the conversions are lowered separately.
pub(crate) fn binary_opcode(op: BinaryOperator, operand: &DataType) -> Option<u8> {
    use BinaryOperator::*;

    let val_type = ValType::of(operand)?;
    let unsigned = operand.is_unsigned();
    let code = match (val_type, op) {
        (ValType::I32, Add) => I32_ADD,
        (ValType::I32, Sub) => I32_SUB,
        (ValType::I32, Mul) => I32_MUL,
        (ValType::I32, Div) if unsigned => I32_DIV_U,
        (ValType::I32, Div) => I32_DIV_S,
        (ValType::I32, Rem) if unsigned => I32_REM_U,
        (ValType::I32, Rem) => I32_REM_S,
        (ValType::I32, BitAnd) => I32_AND,
        (ValType::I32, BitOr) => I32_OR,
        (ValType::I32, BitXor) => I32_XOR,
        (ValType::I32, Shl) => I32_SHL,
        (ValType::I32, Shr) if unsigned => I32_SHR_U,
        (ValType::I32, Shr) => I32_SHR_S,
        (ValType::I32, Eq) => I32_EQ,
        (ValType::I32, Ne) => I32_NE,
        (ValType::I32, Lt) if unsigned => I32_LT_U,
        (ValType::I32, Lt) => I32_LT_S,
        (ValType::I32, Le) if unsigned => I32_LE_U,
        (ValType::I32, Le) => I32_LE_S,
        (ValType::I32, Gt) if unsigned => I32_GT_U,
        (ValType::I32, Gt) => I32_GT_S,
        (ValType::I32, Ge) if unsigned => I32_GE_U,
        (ValType::I32, Ge) => I32_GE_S,

        (ValType::I64, Add) => I64_ADD,
        (ValType::I64, Sub) => I64_SUB,
        (ValType::I64, Mul) => I64_MUL,
        (ValType::I64, Div) if unsigned => I64_DIV_U,
        (ValType::I64, Div) => I64_DIV_S,
        (ValType::I64, Rem) if unsigned => I64_REM_U,
        (ValType::I64, Rem) => I64_REM_S,
        (ValType::I64, BitAnd) => I64_AND,
        (ValType::I64, BitOr) => I64_OR,
        (ValType::I64, BitXor) => I64_XOR,
        (ValType::I64, Shl) => I64_SHL,
        (ValType::I64, Shr) if unsigned => I64_SHR_U,
        (ValType::I64, Shr) => I64_SHR_S,
        (ValType::I64, Eq) => I64_EQ,
        (ValType::I64, Ne) => I64_NE,
        (ValType::I64, Lt) if unsigned => I64_LT_U,
        (ValType::I64, Lt) => I64_LT_S,
        (ValType::I64, Le) if unsigned => I64_LE_U,
        (ValType::I64, Le) => I64_LE_S,
        (ValType::I64, Gt) if unsigned => I64_GT_U,
        (ValType::I64, Gt) => I64_GT_S,
        (ValType::I64, Ge) if unsigned => I64_GE_U,
        (ValType::I64, Ge) => I64_GE_S,

        (ValType::F32, Add) => F32_ADD,
        (ValType::F32, Sub) => F32_SUB,
        (ValType::F32, Mul) => F32_MUL,
        (ValType::F32, Div) => F32_DIV,
        (ValType::F32, Eq) => F32_EQ,
        (ValType::F32, Ne) => F32_NE,
        (ValType::F32, Lt) => F32_LT,
        (ValType::F32, Le) => F32_LE,
        (ValType::F32, Gt) => F32_GT,
        (ValType::F32, Ge) => F32_GE,

        (ValType::F64, Add) => F64_ADD,
        (ValType::F64, Sub) => F64_SUB,
        (ValType::F64, Mul) => F64_MUL,
        (ValType::F64, Div) => F64_DIV,
        (ValType::F64, Eq) => F64_EQ,
        (ValType::F64, Ne) => F64_NE,
        (ValType::F64, Lt) => F64_LT,
        (ValType::F64, Le) => F64_LE,
        (ValType::F64, Gt) => F64_GT,
        (ValType::F64, Ge) => F64_GE,

        _ => return None,
    };
    Some(code)
}

/// Lowering of `value as target`, applied after the value is pushed
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Conversion {
    Ops(&'static [u8]),
    /// `value != zero`, for conversions to `bool`
    NonZero { zero: InitExpr, ne: u8 },
}

/// Lowering for `value as target`. Integer widening extends by the source's
/// signedness; float truncation picks the target's. `bool` converts as the
/// unsigned 0 or 1.
pub(crate) fn conversion(from: &DataType, to: &DataType) -> Option<Conversion> {
    use DataType::*;

    let ops: &'static [u8] = match (from, to) {
        (a, b) if a == b => &[],
        (Int | UInt, Int | UInt) | (Long | ULong, Long | ULong) => &[],

        (Int, Long | ULong) => &[I64_EXTEND_I32_S],
        (UInt | Bool, Long | ULong) => &[I64_EXTEND_I32_U],
        (Long | ULong, Int | UInt) => &[I32_WRAP_I64],

        (Int, Float) => &[F32_CONVERT_I32_S],
        (UInt | Bool, Float) => &[F32_CONVERT_I32_U],
        (Long, Float) => &[F32_CONVERT_I64_S],
        (ULong, Float) => &[F32_CONVERT_I64_U],
        (Int, Double) => &[F64_CONVERT_I32_S],
        (UInt | Bool, Double) => &[F64_CONVERT_I32_U],
        (Long, Double) => &[F64_CONVERT_I64_S],
        (ULong, Double) => &[F64_CONVERT_I64_U],

        (Float, Int) => &[I32_TRUNC_F32_S],
        (Float, UInt) => &[I32_TRUNC_F32_U],
        (Double, Int) => &[I32_TRUNC_F64_S],
        (Double, UInt) => &[I32_TRUNC_F64_U],
        (Float, Long) => &[I64_TRUNC_F32_S],
        (Float, ULong) => &[I64_TRUNC_F32_U],
        (Double, Long) => &[I64_TRUNC_F64_S],
        (Double, ULong) => &[I64_TRUNC_F64_U],

        (Float, Double) => &[F64_PROMOTE_F32],
        (Double, Float) => &[F32_DEMOTE_F64],

        (Bool, Int | UInt) => &[],
        (_, Bool) => {
            let zero = InitExpr::zero(ValType::of(from)?);
            let ne = binary_opcode(BinaryOperator::Ne, from)?;
            return Some(Conversion::NonZero { zero, ne });
        }
        _ => return None,
    };
    Some(Conversion::Ops(ops))
}

/// Instructions for `value bitcast target`. Signed/unsigned pairs share a
/// representation and need none.
pub(crate) fn reinterpret(from: &DataType, to: &DataType) -> Option<&'static [u8]> {
    use DataType::*;

    let ops: &'static [u8] = match (from, to) {
        (Int | UInt, Int | UInt) | (Long | ULong, Long | ULong) => &[],
        (Int | UInt, Float) => &[F32_REINTERPRET_I32],
        (Float, Int | UInt) => &[I32_REINTERPRET_F32],
        (Long | ULong, Double) => &[F64_REINTERPRET_I64],
        (Double, Long | ULong) => &[I64_REINTERPRET_F64],
        _ => return None,
    };
    Some(ops)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signedness_picks_the_variant() {
        assert_eq!(binary_opcode(BinaryOperator::Div, &DataType::Int), Some(I32_DIV_S));
        assert_eq!(binary_opcode(BinaryOperator::Div, &DataType::UInt), Some(I32_DIV_U));
        assert_eq!(binary_opcode(BinaryOperator::Shr, &DataType::ULong), Some(I64_SHR_U));
        assert_eq!(binary_opcode(BinaryOperator::Lt, &DataType::Long), Some(I64_LT_S));
    }

    #[test]
    fn bool_compares_as_i32() {
        assert_eq!(binary_opcode(BinaryOperator::Eq, &DataType::Bool), Some(I32_EQ));
        assert_eq!(binary_opcode(BinaryOperator::BitXor, &DataType::Bool), Some(I32_XOR));
    }

    #[test]
    fn floats_have_no_integer_only_operators() {
        assert_eq!(binary_opcode(BinaryOperator::Add, &DataType::Double), Some(F64_ADD));
        assert_eq!(binary_opcode(BinaryOperator::Rem, &DataType::Float), None);
        assert_eq!(binary_opcode(BinaryOperator::Shl, &DataType::Double), None);
        assert_eq!(binary_opcode(BinaryOperator::Add, &DataType::Void), None);
    }

    #[test]
    fn every_scalar_pair_converts() {
        for from in &DataType::SCALARS {
            for to in &DataType::SCALARS {
                assert!(conversion(from, to).is_some(), "{from} as {to}");
            }
        }
        let ops = |codes: &'static [u8]| Some(Conversion::Ops(codes));
        assert_eq!(conversion(&DataType::Int, &DataType::ULong), ops(&[I64_EXTEND_I32_S]));
        assert_eq!(conversion(&DataType::UInt, &DataType::Long), ops(&[I64_EXTEND_I32_U]));
        assert_eq!(conversion(&DataType::Double, &DataType::UInt), ops(&[I32_TRUNC_F64_U]));
        assert_eq!(conversion(&DataType::Void, &DataType::Int), None);
    }

    #[test]
    fn bool_converts_as_zero_or_one() {
        let ops = |codes: &'static [u8]| Some(Conversion::Ops(codes));
        assert_eq!(conversion(&DataType::Bool, &DataType::Int), ops(&[]));
        assert_eq!(conversion(&DataType::Bool, &DataType::UInt), ops(&[]));
        assert_eq!(conversion(&DataType::Bool, &DataType::Long), ops(&[I64_EXTEND_I32_U]));
        assert_eq!(conversion(&DataType::Bool, &DataType::ULong), ops(&[I64_EXTEND_I32_U]));
        assert_eq!(conversion(&DataType::Bool, &DataType::Float), ops(&[F32_CONVERT_I32_U]));
        assert_eq!(conversion(&DataType::Bool, &DataType::Double), ops(&[F64_CONVERT_I32_U]));
        assert_eq!(conversion(&DataType::Bool, &DataType::Bool), ops(&[]));

        let non_zero = |zero, ne| Some(Conversion::NonZero { zero, ne });
        assert_eq!(conversion(&DataType::Int, &DataType::Bool), non_zero(InitExpr::I32(0), I32_NE));
        assert_eq!(conversion(&DataType::ULong, &DataType::Bool), non_zero(InitExpr::I64(0), I64_NE));
        assert_eq!(conversion(&DataType::Float, &DataType::Bool), non_zero(InitExpr::F32(0.0), F32_NE));
        assert_eq!(conversion(&DataType::Double, &DataType::Bool), non_zero(InitExpr::F64(0.0), F64_NE));
    }

    #[test]
    fn reinterpret_requires_equal_width() {
        assert_eq!(reinterpret(&DataType::Int, &DataType::Float), Some(&[F32_REINTERPRET_I32][..]));
        assert_eq!(reinterpret(&DataType::Double, &DataType::ULong), Some(&[I64_REINTERPRET_F64][..]));
        assert_eq!(reinterpret(&DataType::UInt, &DataType::Int), Some(&[][..]));
        assert_eq!(reinterpret(&DataType::Int, &DataType::Double), None);
        assert_eq!(reinterpret(&DataType::Float, &DataType::Double), None);
    }
}
