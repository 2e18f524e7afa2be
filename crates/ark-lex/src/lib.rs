//! ark-lex - Tokenizer for ArkScript source code.
//!
//! The lexer transforms UTF-8 source text into a stream of positioned
//! tokens. It handles groupings, strings with escape sequences, numbers,
//! operators, identifiers, keywords, captures, field access, spreads,
//! comments and the quote shorthand.

mod lexer;
mod token;

pub use lexer::Lexer;
pub use token::{Token, TokenType};
