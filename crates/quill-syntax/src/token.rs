use serde::{Deserialize, Serialize};

/// Source location span
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub line: usize,
    pub column: usize,
    /// Number of characters covered by the token
    #[serde(default)]
    pub length: usize,
}

impl Span {
    pub fn new(line: usize, column: usize, length: usize) -> Self {
        Self {
            line,
            column,
            length,
        }
    }
}

/// Token categories the front end hands over with every node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    // Literals
    Integer,      // 42, 0x2A, 7ul
    Float,        // 3.14, 2.5f
    True,         // true
    False,        // false

    Identifier,   // names, type names, module names
    Operator,     // + - * / as bitcast ...
    Keyword,      // if, while, return ...
    Punctuation,  // . [ =

    /// Synthetic nodes that carry no source text
    #[default]
    None,
}

/// A single token
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub kind: TokenKind,
    #[serde(default)]
    pub lexeme: String,
    #[serde(default)]
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>) -> Self {
        let lexeme = lexeme.into();
        let length = lexeme.chars().count();
        Self {
            kind,
            lexeme,
            span: Span::new(0, 0, length),
        }
    }

    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.span.line = line;
        self.span.column = column;
        self
    }
}
