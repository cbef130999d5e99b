use quill_syntax::{DataType, NodeId, NodeKind, Stage, TokenKind};

use super::*;
use crate::literal::{parse_float_literal, parse_int_literal};
use crate::resolve;
use crate::signatures::{BinaryOperator, UnaryOperator, resolve_binary, resolve_unary};
use crate::symbols::Symbol;

impl Analyzer<'_> {
    /// Set `data_type` on every node; already typed nodes keep their type.
    pub fn assign_types(&mut self) {
        for id in self.ast.preorder() {
            self.type_of(id);
        }
    }

    pub(super) fn type_of(&mut self, id: NodeId) -> DataType {
        if let Some(ty) = &self.ast[id].data_type {
            return ty.clone();
        }
        let ty = if self.ast[id].is_invalid() {
            DataType::Invalid
        } else {
            self.infer(id)
        };
        log::trace!("{:?} `{}`: {ty}", self.ast.kind(id), self.ast.lexeme(id));
        self.ast[id].data_type = Some(ty.clone());
        ty
    }

    fn infer(&mut self, id: NodeId) -> DataType {
        match self.ast.kind(id) {
            NodeKind::Literal => self.literal_type(id),
            NodeKind::Identifier | NodeKind::Access | NodeKind::Indexer => self.place_type(id),
            NodeKind::FunctionCall => match resolve::resolve(self.table, self.ast, id) {
                Some(Symbol::Function(f)) => self.table.function(f).return_type.clone(),
                _ => DataType::Invalid,
            },
            NodeKind::UnaryOp => self.unary_type(id),
            NodeKind::BinaryOp => self.binary_type(id),
            NodeKind::VariableDef => match resolve::declared_variable(self.table, self.ast, id) {
                Some(var) => self.table.variable(var).data_type.clone(),
                None => DataType::Invalid,
            },
            NodeKind::Type => DataType::parse(self.ast.lexeme(id)).unwrap_or(DataType::Invalid),
            NodeKind::Function => self.declared_type(id).unwrap_or(DataType::Invalid),
            _ => DataType::Void,
        }
    }

    fn literal_type(&mut self, id: NodeId) -> DataType {
        let token = self.ast[id].token.clone();
        match token.kind {
            TokenKind::True | TokenKind::False => DataType::Bool,
            TokenKind::Integer => match parse_int_literal(&token.lexeme) {
                Ok((_, ty)) => ty,
                Err(err) => {
                    self.error(Stage::Type, id, err.to_string());
                    DataType::Invalid
                }
            },
            TokenKind::Float => match parse_float_literal(&token.lexeme) {
                Ok((_, ty)) => ty,
                Err(err) => {
                    self.error(Stage::Type, id, err.to_string());
                    DataType::Invalid
                }
            },
            _ => {
                self.error(Stage::Type, id, format!("`{}` is not a literal", token.lexeme));
                DataType::Invalid
            }
        }
    }

    /// Type of the variable a place expression names. Namespaces, structs
    /// and functions have no value type.
    fn place_type(&mut self, id: NodeId) -> DataType {
        match resolve::resolve(self.table, self.ast, id) {
            Some(Symbol::Variable(var)) => self.table.variable(var).data_type.clone(),
            _ => DataType::Invalid,
        }
    }

    fn unary_type(&mut self, id: NodeId) -> DataType {
        let Some(operand) = self.ast.child(id, 0) else {
            return DataType::Invalid;
        };
        let operand_ty = self.type_of(operand);
        if operand_ty.is_invalid() {
            return DataType::Invalid;
        }
        let lexeme = self.ast.lexeme(id).to_string();
        let Some(op) = UnaryOperator::from_lexeme(&lexeme) else {
            self.error(Stage::Type, id, format!("unknown unary operator `{lexeme}`"));
            return DataType::Invalid;
        };
        if op == UnaryOperator::Neg && !self.negated_literal_fits(operand, &operand_ty) {
            let text = self.ast.lexeme(operand).to_string();
            self.error(
                Stage::Type,
                id,
                format!("literal `-{text}` does not fit in {operand_ty}"),
            );
            return DataType::Invalid;
        }
        match resolve_unary(op, &operand_ty) {
            Some(ty) => ty,
            None => {
                self.error(
                    Stage::Type,
                    operand,
                    format!("operator `{lexeme}` cannot be applied to `{operand_ty}`"),
                );
                DataType::Invalid
            }
        }
    }

    /// A negated integer literal may reach the signed minimum, one past
    /// the positive maximum, and no further.
    fn negated_literal_fits(&self, operand: NodeId, ty: &DataType) -> bool {
        if self.ast.kind(operand) != NodeKind::Literal
            || self.ast[operand].token.kind != TokenKind::Integer
        {
            return true;
        }
        let limit = match ty {
            DataType::Int => 1u64 << 31,
            DataType::Long => 1u64 << 63,
            _ => return true,
        };
        parse_int_literal(self.ast.lexeme(operand)).is_ok_and(|(lit, _)| lit.value <= limit)
    }

    fn binary_type(&mut self, id: NodeId) -> DataType {
        let (Some(left), Some(right)) = (self.ast.child(id, 0), self.ast.child(id, 1)) else {
            return DataType::Invalid;
        };
        let lexeme = self.ast.lexeme(id).to_string();
        let Some(op) = BinaryOperator::from_lexeme(&lexeme) else {
            self.error(Stage::Type, id, format!("unknown binary operator `{lexeme}`"));
            return DataType::Invalid;
        };
        let left_ty = self.type_of(left);
        let right_ty = if op.takes_type_operand() {
            let target = DataType::parse(self.ast.lexeme(right)).unwrap_or(DataType::Invalid);
            self.ast[right].data_type = Some(target.clone());
            target
        } else {
            self.type_of(right)
        };
        if left_ty.is_invalid() || right_ty.is_invalid() {
            return DataType::Invalid;
        }

        if let Some(ty) = resolve_binary(op, &left_ty, &right_ty) {
            return ty;
        }
        if op.takes_type_operand() {
            self.error(
                Stage::Type,
                left,
                format!("cannot `{lexeme}` a value of type `{left_ty}`"),
            );
            self.error(
                Stage::Type,
                right,
                format!("`{right_ty}` is not a valid `{lexeme}` target for `{left_ty}`"),
            );
        } else {
            self.error(
                Stage::Type,
                left,
                format!("left operand of `{lexeme}` is `{left_ty}`; no overload takes (`{left_ty}`, `{right_ty}`)"),
            );
            self.error(
                Stage::Type,
                right,
                format!("right operand of `{lexeme}` is `{right_ty}`; no overload takes (`{left_ty}`, `{right_ty}`)"),
            );
        }
        DataType::Invalid
    }
}
