//! Numeric literal parsing and range checking.

use quill_syntax::DataType;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LiteralError {
    #[error("malformed numeric literal `{0}`")]
    Malformed(String),
    #[error("literal `{text}` does not fit in {ty}")]
    OutOfRange { text: String, ty: DataType },
}

/// A checked integer literal. `value` is the raw magnitude; signed types
/// reinterpret it as a two's-complement bit pattern of their width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntLiteral {
    pub value: u64,
    pub radix: u32,
}

impl IntLiteral {
    pub fn as_i32(self) -> i32 {
        self.value as u32 as i32
    }

    pub fn as_i64(self) -> i64 {
        self.value as i64
    }
}

/// Split `text` into (digits, radix, suffix)
fn split_int(text: &str) -> (&str, u32, &str) {
    let lower = text.to_ascii_lowercase();
    let (radix, prefix_len) = if lower.starts_with("0x") {
        (16, 2)
    } else if lower.starts_with("0o") {
        (8, 2)
    } else if lower.starts_with("0b") {
        (2, 2)
    } else {
        (10, 0)
    };
    let body = &text[prefix_len..];
    let suffix_len = body
        .chars()
        .rev()
        .take_while(|c| matches!(c, 'u' | 'U' | 'l' | 'L'))
        .count();
    let (digits, suffix) = body.split_at(body.len() - suffix_len);
    (digits, radix, suffix)
}

/// Type selected by an integer suffix, if the suffix is valid
fn suffix_type(suffix: &str) -> Option<DataType> {
    match suffix.to_ascii_lowercase().as_str() {
        "" => Some(DataType::Int),
        "u" => Some(DataType::UInt),
        "l" => Some(DataType::Long),
        "ul" | "lu" => Some(DataType::ULong),
        _ => None,
    }
}

/// Parse an integer literal and check it against its declared width.
///
/// Unsuffixed literals must fit 32 bits; values above `i32::MAX` are kept
/// as bit patterns so that `0xFFFFFFFF` and `-2147483648` both work.
pub fn parse_int_literal(text: &str) -> Result<(IntLiteral, DataType), LiteralError> {
    let (digits, radix, suffix) = split_int(text);
    let ty = suffix_type(suffix).ok_or_else(|| LiteralError::Malformed(text.to_string()))?;
    let cleaned: String = digits.chars().filter(|&c| c != '_').collect();
    // a sign is an operator, never part of the literal
    if cleaned.is_empty() || digits.starts_with('_') || cleaned.contains(['+', '-']) {
        return Err(LiteralError::Malformed(text.to_string()));
    }
    let value = u64::from_str_radix(&cleaned, radix).map_err(|err| {
        if matches!(err.kind(), std::num::IntErrorKind::PosOverflow) {
            LiteralError::OutOfRange {
                text: text.to_string(),
                ty: ty.clone(),
            }
        } else {
            LiteralError::Malformed(text.to_string())
        }
    })?;
    let limit = match ty {
        DataType::Int | DataType::UInt => u32::MAX as u64,
        _ => u64::MAX,
    };
    if value > limit {
        return Err(LiteralError::OutOfRange {
            text: text.to_string(),
            ty,
        });
    }
    Ok((IntLiteral { value, radix }, ty))
}

/// Render an integer literal in the given radix with a suffix
pub fn format_int_literal(value: u64, radix: u32, suffix: &str) -> String {
    let digits = match radix {
        16 => format!("0x{value:x}"),
        8 => format!("0o{value:o}"),
        2 => format!("0b{value:b}"),
        _ => value.to_string(),
    };
    format!("{digits}{suffix}")
}

/// Parse a float literal: `f` suffix selects `float`, otherwise `double`
pub fn parse_float_literal(text: &str) -> Result<(f64, DataType), LiteralError> {
    let (body, ty) = match text.strip_suffix(['f', 'F']) {
        Some(body) => (body, DataType::Float),
        None => (text, DataType::Double),
    };
    let cleaned: String = body.chars().filter(|&c| c != '_').collect();
    if cleaned.starts_with(['+', '-']) {
        return Err(LiteralError::Malformed(text.to_string()));
    }
    let value: f64 = cleaned
        .parse()
        .map_err(|_| LiteralError::Malformed(text.to_string()))?;
    let fits = match ty {
        DataType::Float => (value as f32).is_finite(),
        _ => value.is_finite(),
    };
    if !fits {
        return Err(LiteralError::OutOfRange {
            text: text.to_string(),
            ty,
        });
    }
    Ok((value, ty))
}
