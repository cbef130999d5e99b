//! Operator signature tables. Each operator lists its valid overloads as
//! fixed (operand types → result type) tuples; there is no implicit
//! widening, so an operand pair either matches a row exactly or the
//! expression is invalid.

use quill_syntax::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    /// Numeric conversion with truncation/extension (`as`)
    Convert,
    /// Same-width bit-pattern reinterpretation (`bitcast`)
    Reinterpret,
}

impl UnaryOperator {
    pub fn from_lexeme(lexeme: &str) -> Option<Self> {
        Some(match lexeme {
            "-" => UnaryOperator::Neg,
            "!" => UnaryOperator::Not,
            "~" => UnaryOperator::BitNot,
            _ => return None,
        })
    }
}

impl BinaryOperator {
    pub const ALL: [BinaryOperator; 20] = [
        BinaryOperator::Add,
        BinaryOperator::Sub,
        BinaryOperator::Mul,
        BinaryOperator::Div,
        BinaryOperator::Rem,
        BinaryOperator::BitAnd,
        BinaryOperator::BitOr,
        BinaryOperator::BitXor,
        BinaryOperator::Shl,
        BinaryOperator::Shr,
        BinaryOperator::Eq,
        BinaryOperator::Ne,
        BinaryOperator::Lt,
        BinaryOperator::Le,
        BinaryOperator::Gt,
        BinaryOperator::Ge,
        BinaryOperator::And,
        BinaryOperator::Or,
        BinaryOperator::Convert,
        BinaryOperator::Reinterpret,
    ];

    pub fn from_lexeme(lexeme: &str) -> Option<Self> {
        BinaryOperator::ALL
            .into_iter()
            .find(|op| op.lexeme() == lexeme)
    }

    pub fn lexeme(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Convert => "as",
            BinaryOperator::Reinterpret => "bitcast",
        }
    }

    /// Conversions take a type, not a value, as right operand
    pub fn takes_type_operand(self) -> bool {
        matches!(self, BinaryOperator::Convert | BinaryOperator::Reinterpret)
    }
}

fn same_typed(types: &[DataType], result: Option<DataType>) -> Vec<(DataType, DataType, DataType)> {
    types
        .iter()
        .map(|t| {
            let out = result.clone().unwrap_or_else(|| t.clone());
            (t.clone(), t.clone(), out)
        })
        .collect()
}

/// Every overload of a binary operator as (left, right, result)
pub fn binary_signatures(op: BinaryOperator) -> Vec<(DataType, DataType, DataType)> {
    use BinaryOperator::*;

    let mut integer_or_bool = DataType::INTEGER.to_vec();
    integer_or_bool.push(DataType::Bool);
    let mut numeric_or_bool = DataType::NUMERIC.to_vec();
    numeric_or_bool.push(DataType::Bool);

    match op {
        Add | Sub | Mul | Div => same_typed(&DataType::NUMERIC, None),
        Rem | Shl | Shr => same_typed(&DataType::INTEGER, None),
        BitAnd | BitOr | BitXor => same_typed(&integer_or_bool, None),
        Eq | Ne => same_typed(&numeric_or_bool, Some(DataType::Bool)),
        Lt | Le | Gt | Ge => same_typed(&DataType::NUMERIC, Some(DataType::Bool)),
        And | Or => same_typed(&[DataType::Bool], None),
        Convert => DataType::SCALARS
            .iter()
            .flat_map(|from| {
                DataType::SCALARS
                    .iter()
                    .map(move |to| (from.clone(), to.clone(), to.clone()))
            })
            .collect(),
        Reinterpret => {
            let pairs = [
                (DataType::Int, DataType::Float),
                (DataType::UInt, DataType::Float),
                (DataType::Long, DataType::Double),
                (DataType::ULong, DataType::Double),
                (DataType::Int, DataType::UInt),
                (DataType::Long, DataType::ULong),
            ];
            pairs
                .into_iter()
                .flat_map(|(a, b)| [(a.clone(), b.clone(), b.clone()), (b, a.clone(), a)])
                .collect()
        }
    }
}

/// Every overload of a unary operator as (operand, result)
pub fn unary_signatures(op: UnaryOperator) -> Vec<(DataType, DataType)> {
    let operands: Vec<DataType> = match op {
        UnaryOperator::Neg => vec![DataType::Int, DataType::Long, DataType::Float, DataType::Double],
        UnaryOperator::Not => vec![DataType::Bool],
        UnaryOperator::BitNot => DataType::INTEGER.to_vec(),
    };
    operands.into_iter().map(|t| (t.clone(), t)).collect()
}

pub fn resolve_binary(op: BinaryOperator, left: &DataType, right: &DataType) -> Option<DataType> {
    binary_signatures(op)
        .into_iter()
        .find(|(l, r, _)| l == left && r == right)
        .map(|(_, _, out)| out)
}

pub fn resolve_unary(op: UnaryOperator, operand: &DataType) -> Option<DataType> {
    unary_signatures(op)
        .into_iter()
        .find(|(t, _)| t == operand)
        .map(|(_, out)| out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexemes_round_trip() {
        for op in BinaryOperator::ALL {
            assert_eq!(BinaryOperator::from_lexeme(op.lexeme()), Some(op));
        }
    }

    #[test]
    fn no_implicit_widening() {
        assert_eq!(
            resolve_binary(BinaryOperator::Add, &DataType::Int, &DataType::Int),
            Some(DataType::Int)
        );
        assert_eq!(resolve_binary(BinaryOperator::Add, &DataType::Int, &DataType::Long), None);
        assert_eq!(resolve_binary(BinaryOperator::Rem, &DataType::Float, &DataType::Float), None);
    }

    #[test]
    fn comparisons_yield_bool() {
        for (_, _, out) in binary_signatures(BinaryOperator::Lt) {
            assert_eq!(out, DataType::Bool);
        }
        assert_eq!(
            resolve_binary(BinaryOperator::Eq, &DataType::Bool, &DataType::Bool),
            Some(DataType::Bool)
        );
    }

    #[test]
    fn reinterpret_requires_same_width() {
        for (from, to, _) in binary_signatures(BinaryOperator::Reinterpret) {
            assert_eq!(from.primitive_size(), to.primitive_size());
        }
        assert_eq!(
            resolve_binary(BinaryOperator::Reinterpret, &DataType::Int, &DataType::Double),
            None
        );
    }

    #[test]
    fn conversion_covers_every_scalar_pair() {
        assert_eq!(binary_signatures(BinaryOperator::Convert).len(), 49);
        for ty in DataType::SCALARS {
            let as_bool = resolve_binary(BinaryOperator::Convert, &ty, &DataType::Bool);
            assert_eq!(as_bool, Some(DataType::Bool), "{ty} as bool");
            let from_bool = resolve_binary(BinaryOperator::Convert, &DataType::Bool, &ty);
            assert_eq!(from_bool, Some(ty.clone()), "bool as {ty}");
        }
        assert_eq!(
            resolve_binary(BinaryOperator::Reinterpret, &DataType::Bool, &DataType::Int),
            None
        );
    }

    #[test]
    fn unary_tables() {
        assert_eq!(resolve_unary(UnaryOperator::Neg, &DataType::UInt), None);
        assert_eq!(resolve_unary(UnaryOperator::Not, &DataType::Bool), Some(DataType::Bool));
        assert_eq!(resolve_unary(UnaryOperator::BitNot, &DataType::ULong), Some(DataType::ULong));
    }
}
