//! Token definition.

use std::fmt;

use ark_util::Span;

/// The different token categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenType {
    /// One of `(` `)` `[` `]` `{` `}`.
    Grouping,
    String,
    Number,
    Operator,
    Identifier,
    /// `&name`, explicit closure capture.
    Capture,
    /// `.name`, closure field access.
    GetField,
    Keyword,
    /// The quote shorthand `'`.
    Shorthand,
    /// `...name`, variadic tail.
    Spread,
    Comment,
    Skip,
    /// A character sequence matching nothing; always paired with an error.
    Mismatch,
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenType::Grouping => "Grouping",
            TokenType::String => "String",
            TokenType::Number => "Number",
            TokenType::Operator => "Operator",
            TokenType::Identifier => "Identifier",
            TokenType::Capture => "Capture",
            TokenType::GetField => "GetField",
            TokenType::Keyword => "Keyword",
            TokenType::Shorthand => "Shorthand",
            TokenType::Spread => "Spread",
            TokenType::Comment => "Comment",
            TokenType::Skip => "Skip",
            TokenType::Mismatch => "Mismatch",
        };
        f.write_str(name)
    }
}

/// A single token: category, text and source position.
///
/// String tokens carry their *decoded* content (escape sequences already
/// resolved); capture/field/spread tokens carry the bare name without their
/// prefix.
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub ttype: TokenType,
    pub text: String,
    pub span: Span,
}

impl Token {
    pub fn new(ttype: TokenType, text: impl Into<String>, span: Span) -> Self {
        Self {
            ttype,
            text: text.into(),
            span,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.ttype, self.text)
    }
}
