use std::fmt;
use std::str::FromStr;

/// Static type of a declaration or expression.
///
/// The textual notation (`int`, `Point`, `int[4]`, `geo.Point[2][3]`) is what
/// declarations carry in their `Type` node; `Display` and [`DataType::parse`]
/// convert between the two forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    Bool,
    Void,
    /// Poisoned type: the node or one of its operands failed to check.
    Invalid,
    /// Named struct type, possibly module-qualified (`geo.Point`).
    Struct(String),
    /// Fixed-size array `element[len]`.
    Array(Box<DataType>, u32),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed type notation `{0}`")]
pub struct ParseTypeError(pub String);

impl DataType {
    /// Every scalar type, in signature-table order.
    pub const SCALARS: [DataType; 7] = [
        DataType::Int,
        DataType::UInt,
        DataType::Long,
        DataType::ULong,
        DataType::Float,
        DataType::Double,
        DataType::Bool,
    ];

    /// Scalar types that take part in arithmetic.
    pub const NUMERIC: [DataType; 6] = [
        DataType::Int,
        DataType::UInt,
        DataType::Long,
        DataType::ULong,
        DataType::Float,
        DataType::Double,
    ];

    /// Fixed-width integer types.
    pub const INTEGER: [DataType; 4] = [
        DataType::Int,
        DataType::UInt,
        DataType::Long,
        DataType::ULong,
    ];

    /// Parse a type notation. Array suffixes bind right-most last, so
    /// `int[4][2]` is an array of two `int[4]`.
    pub fn parse(notation: &str) -> Result<DataType, ParseTypeError> {
        let text = notation.trim();
        if let Some(open) = text.rfind('[') {
            let Some(inner) = text[open + 1..].strip_suffix(']') else {
                return Err(ParseTypeError(notation.to_string()));
            };
            let len: u32 = inner
                .trim()
                .parse()
                .map_err(|_| ParseTypeError(notation.to_string()))?;
            let element = DataType::parse(&text[..open])?;
            return Ok(DataType::Array(Box::new(element), len));
        }
        if text.is_empty() || text.contains(']') {
            return Err(ParseTypeError(notation.to_string()));
        }
        Ok(match text {
            "int" => DataType::Int,
            "uint" => DataType::UInt,
            "long" => DataType::Long,
            "ulong" => DataType::ULong,
            "float" => DataType::Float,
            "double" => DataType::Double,
            "bool" => DataType::Bool,
            "void" => DataType::Void,
            "Invalid" => DataType::Invalid,
            name => {
                let well_formed = name
                    .split('.')
                    .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_alphanumeric() || c == '_'));
                if !well_formed {
                    return Err(ParseTypeError(notation.to_string()));
                }
                DataType::Struct(name.to_string())
            }
        })
    }

    /// Scalar types are the ones a VM local/global can hold directly.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            DataType::Int
                | DataType::UInt
                | DataType::Long
                | DataType::ULong
                | DataType::Float
                | DataType::Double
                | DataType::Bool
        )
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, DataType::Struct(_) | DataType::Array(..))
    }

    /// Unsigned integers select the `_u` instruction variants.
    pub fn is_unsigned(&self) -> bool {
        matches!(self, DataType::UInt | DataType::ULong)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, DataType::Invalid)
    }

    /// Byte size of a scalar. Composites are sized by layout, everything
    /// else contributes nothing.
    pub fn primitive_size(&self) -> u32 {
        match self {
            DataType::Int | DataType::UInt | DataType::Float | DataType::Bool => 4,
            DataType::Long | DataType::ULong | DataType::Double => 8,
            _ => 0,
        }
    }

    /// Element type of an array.
    pub fn element(&self) -> Option<&DataType> {
        match self {
            DataType::Array(element, _) => Some(element),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int => write!(f, "int"),
            DataType::UInt => write!(f, "uint"),
            DataType::Long => write!(f, "long"),
            DataType::ULong => write!(f, "ulong"),
            DataType::Float => write!(f, "float"),
            DataType::Double => write!(f, "double"),
            DataType::Bool => write!(f, "bool"),
            DataType::Void => write!(f, "void"),
            DataType::Invalid => write!(f, "Invalid"),
            DataType::Struct(name) => write!(f, "{name}"),
            DataType::Array(element, len) => write!(f, "{element}[{len}]"),
        }
    }
}

impl FromStr for DataType {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::parse(s)
    }
}
