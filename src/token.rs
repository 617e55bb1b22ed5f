//! Tokens and the fixed operator table.
//!
//! A [`Token`] is an immutable piece of source text tagged with a kind and the
//! 1-based position it started at. The [`Operator`] table is the single source
//! of truth for precedence and arity, including the two internal pseudo
//! operators (`buildin-function`, `user-function`) used to defer function
//! application until their operand materializes.

use std::fmt;

use crate::errors::SourcePos;

/// The kind of a token produced by the tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A numeric literal, possibly with a decimal point and exponent.
    Number,
    /// A variable, function or constant name (Unicode letters allowed).
    Identifier,
    /// An arithmetic, comparison or logical operator symbol.
    Operator,
    /// `(`, `)`, `{`, `}`, `⌊`, `⌋`, `⌈`, `⌉` or `|`.
    Brace,
    /// `[` or `]`.
    List,
    /// A solve-statement marker (`:` after a non-keyword identifier).
    Colon,
    /// The assignment `=`.
    Assign,
    Comma,
    /// A quoted description string.
    Text,
    /// Statement terminator (newline).
    End,
    /// `in:` keyword.
    In,
    /// `out:` keyword.
    Out,
    /// `maneuver:` keyword.
    Maneuver,
    /// `alarm:` keyword.
    Alarm,
    /// `if` or `otherwise` (reserved).
    Conditional,
    /// `={` piecewise block opener (reserved).
    Piecewise,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Number => "number",
            TokenKind::Identifier => "identifier",
            TokenKind::Operator => "operator",
            TokenKind::Brace => "brace",
            TokenKind::List => "list bracket",
            TokenKind::Colon => "':'",
            TokenKind::Assign => "'='",
            TokenKind::Comma => "','",
            TokenKind::Text => "text",
            TokenKind::End => "end of statement",
            TokenKind::In => "'in:'",
            TokenKind::Out => "'out:'",
            TokenKind::Maneuver => "'maneuver:'",
            TokenKind::Alarm => "'alarm:'",
            TokenKind::Conditional => "conditional",
            TokenKind::Piecewise => "piecewise block",
        };
        f.write_str(name)
    }
}

/// One positioned token.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: SourcePos,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, pos: SourcePos) -> Self {
        Self {
            kind,
            text: text.into(),
            pos,
        }
    }

    /// Human-readable form used in "unexpected token" diagnostics.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Number | TokenKind::Identifier | TokenKind::Operator => {
                format!("{} '{}'", self.kind, self.text)
            }
            _ => self.kind.to_string(),
        }
    }
}

/// Whether an operator takes one operand, two, or either depending on context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Unary,
    Binary,
    /// Resolved to unary or binary by the "possibly valid expression" test.
    Both,
}

/// An entry in the fixed operator table. Higher precedence binds tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operator {
    pub symbol: &'static str,
    pub precedence: u8,
    pub arity: Arity,
}

/// Precedence a `Both` operator takes when it resolves to unary.
pub const UNARY_PRECEDENCE: u8 = 8;

/// Precedence of the deferred-call pseudo operators; matches the
/// multiplication level, so `sin x * y` parses as `sin(x*y)` while
/// `sin x + y` parses as `sin(x) + y`.
pub const CALL_PRECEDENCE: u8 = 7;

/// Internal pseudo operator applied when a deferred built-in call's operand
/// becomes available.
pub const BUILTIN_CALL: &str = "buildin-function";
/// Internal pseudo operator applied when a deferred user-function call's
/// operand becomes available.
pub const USER_CALL: &str = "user-function";

const OPERATORS: &[Operator] = &[
    Operator { symbol: "=", precedence: 1, arity: Arity::Binary },
    Operator { symbol: "or", precedence: 2, arity: Arity::Binary },
    Operator { symbol: "and", precedence: 3, arity: Arity::Binary },
    Operator { symbol: "not", precedence: 4, arity: Arity::Unary },
    Operator { symbol: "==", precedence: 5, arity: Arity::Binary },
    Operator { symbol: "!=", precedence: 5, arity: Arity::Binary },
    Operator { symbol: "<", precedence: 5, arity: Arity::Binary },
    Operator { symbol: ">", precedence: 5, arity: Arity::Binary },
    Operator { symbol: "<=", precedence: 5, arity: Arity::Binary },
    Operator { symbol: ">=", precedence: 5, arity: Arity::Binary },
    Operator { symbol: "+", precedence: 6, arity: Arity::Binary },
    Operator { symbol: "-", precedence: 6, arity: Arity::Both },
    Operator { symbol: "*", precedence: 7, arity: Arity::Binary },
    Operator { symbol: "·", precedence: 7, arity: Arity::Binary },
    Operator { symbol: "×", precedence: 7, arity: Arity::Binary },
    Operator { symbol: "/", precedence: 7, arity: Arity::Binary },
    Operator { symbol: "÷", precedence: 7, arity: Arity::Binary },
    Operator { symbol: "%", precedence: 7, arity: Arity::Binary },
    Operator { symbol: "√", precedence: 7, arity: Arity::Both },
    Operator { symbol: "^", precedence: 8, arity: Arity::Binary },
    Operator { symbol: "⌊", precedence: 8, arity: Arity::Unary },
    Operator { symbol: "⌈", precedence: 8, arity: Arity::Unary },
    Operator { symbol: "|", precedence: 8, arity: Arity::Unary },
    Operator { symbol: BUILTIN_CALL, precedence: CALL_PRECEDENCE, arity: Arity::Binary },
    Operator { symbol: USER_CALL, precedence: CALL_PRECEDENCE, arity: Arity::Binary },
];

/// Looks up an operator by its symbol.
pub fn lookup(symbol: &str) -> Option<&'static Operator> {
    OPERATORS.iter().find(|op| op.symbol == symbol)
}
