//! Core lexer implementation.
//!
//! The lexer walks the source a character at a time. Groupings, strings and
//! comments are handled on the spot; everything else accumulates into a
//! word which is then classified against the closed token sets: number,
//! operator, keyword, capture, field access, spread or identifier.

use ark_util::lang::{KEYWORDS, OPERATORS};
use ark_util::{CodeError, FileId, Span};

use crate::token::{Token, TokenType};

/// Characters allowed in identifiers besides letters and digits.
const IDENT_SPECIALS: &str = ":!?@_-+*/|=<>%$";

/// Lexer for ArkScript source code.
pub struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    file_id: FileId,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    /// Creates a new lexer for the given source code.
    pub fn new(source: &'a str, file_id: FileId) -> Self {
        Self {
            chars: source.chars().peekable(),
            file_id,
            line: 1,
            column: 1,
            tokens: Vec::new(),
        }
    }

    /// Tokenize the whole input.
    ///
    /// Comments and whitespace are consumed but not emitted. The first
    /// character sequence matching nothing aborts with a [`CodeError`].
    pub fn tokenize(mut self) -> Result<Vec<Token>, CodeError> {
        while let Some(&c) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.bump();
                }
                '#' => self.skip_comment(),
                '(' | ')' | '[' | ']' | '{' | '}' => {
                    let span = self.span();
                    self.bump();
                    self.tokens
                        .push(Token::new(TokenType::Grouping, c.to_string(), span));
                }
                '"' => self.lex_string()?,
                '\'' => {
                    let span = self.span();
                    self.bump();
                    self.tokens.push(Token::new(TokenType::Shorthand, "'", span));
                }
                _ => self.lex_word()?,
            }
        }
        Ok(self.tokens)
    }

    fn span(&self) -> Span {
        Span::new(self.file_id, self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_comment(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    /// Lex a double-quoted string, decoding escape sequences.
    fn lex_string(&mut self) -> Result<(), CodeError> {
        let span = self.span();
        self.bump(); // opening quote

        let mut content = String::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(CodeError::new("unterminated string", span));
            };
            match c {
                '"' => break,
                '\\' => {
                    let esc_span = self.span();
                    let Some(esc) = self.bump() else {
                        return Err(CodeError::new("unterminated escape sequence", esc_span));
                    };
                    match esc {
                        'n' => content.push('\n'),
                        'r' => content.push('\r'),
                        't' => content.push('\t'),
                        'v' => content.push('\u{000b}'),
                        '0' => content.push('\0'),
                        'a' => content.push('\u{0007}'),
                        'b' => content.push('\u{0008}'),
                        'f' => content.push('\u{000c}'),
                        '\\' => content.push('\\'),
                        '"' => content.push('"'),
                        'u' => {
                            let mut code = 0u32;
                            for _ in 0..4 {
                                let Some(h) = self.bump().and_then(|c| c.to_digit(16)) else {
                                    return Err(CodeError::new(
                                        "expected 4 hexadecimal digits after \\u",
                                        esc_span,
                                    ));
                                };
                                code = code * 16 + h;
                            }
                            let Some(decoded) = char::from_u32(code) else {
                                return Err(CodeError::new(
                                    format!("invalid unicode codepoint {code:#x}"),
                                    esc_span,
                                ));
                            };
                            content.push(decoded);
                        }
                        other => {
                            return Err(CodeError::new(
                                format!("unknown escape sequence \\{other}"),
                                esc_span,
                            ));
                        }
                    }
                }
                _ => content.push(c),
            }
        }

        self.tokens.push(Token::new(TokenType::String, content, span));
        Ok(())
    }

    /// Accumulate a word up to the next delimiter and classify it.
    fn lex_word(&mut self) -> Result<(), CodeError> {
        let span = self.span();
        let mut word = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_whitespace() || matches!(c, '(' | ')' | '[' | ']' | '{' | '}' | '"' | '#' | '\'')
            {
                break;
            }
            word.push(c);
            self.bump();
        }

        let ttype = classify(&word);
        if ttype == TokenType::Mismatch {
            return Err(
                CodeError::new(format!("token `{word}' matches nothing known"), span)
                    .with_expr(word),
            );
        }

        // captures, field reads and spreads are stored without their prefix
        let text = match ttype {
            TokenType::Capture => word[1..].to_string(),
            TokenType::GetField => word[1..].to_string(),
            TokenType::Spread => word[3..].to_string(),
            _ => word,
        };
        self.tokens.push(Token::new(ttype, text, span));
        Ok(())
    }
}

/// Decide the token category of an accumulated word.
fn classify(word: &str) -> TokenType {
    if KEYWORDS.contains(&word) {
        return TokenType::Keyword;
    }
    if OPERATORS.contains(&word) {
        return TokenType::Operator;
    }
    if is_number(word) {
        return TokenType::Number;
    }
    if let Some(rest) = word.strip_prefix("...") {
        if is_identifier(rest) {
            return TokenType::Spread;
        }
    }
    if let Some(rest) = word.strip_prefix('&') {
        if is_identifier(rest) {
            return TokenType::Capture;
        }
    }
    if let Some(rest) = word.strip_prefix('.') {
        if is_identifier(rest) {
            return TokenType::GetField;
        }
    }
    if is_identifier(word) {
        return TokenType::Identifier;
    }
    TokenType::Mismatch
}

/// Signed decimal number with optional fraction and exponent.
fn is_number(word: &str) -> bool {
    let rest = word.strip_prefix(['+', '-']).unwrap_or(word);
    if rest.is_empty() {
        return false;
    }
    let (mantissa, exponent) = match rest.split_once(['e', 'E']) {
        Some((m, e)) => (m, Some(e)),
        None => (rest, None),
    };

    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (mantissa, None),
    };
    if int_part.is_empty() || !int_part.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    if let Some(frac) = frac_part {
        if frac.is_empty() || !frac.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
    }
    if let Some(exp) = exponent {
        let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
        if exp.is_empty() || !exp.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
    }
    true
}

/// Identifiers start with a letter or a special, and may contain `.` in
/// later positions (dotted names: import prefixes, closure field chains).
fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_alphabetic() && !IDENT_SPECIALS.contains(first) {
        return false;
    }
    chars.all(|c| c.is_alphanumeric() || c == '.' || IDENT_SPECIALS.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(source: &str) -> Vec<Token> {
        Lexer::new(source, FileId(0)).tokenize().unwrap()
    }

    fn types(source: &str) -> Vec<TokenType> {
        lex(source).into_iter().map(|t| t.ttype).collect()
    }

    #[test]
    fn test_groupings() {
        assert_eq!(
            types("()[]{}"),
            vec![TokenType::Grouping; 6],
        );
    }

    #[test]
    fn test_simple_expression() {
        let tokens = lex("(let a 12)");
        assert_eq!(tokens[1].ttype, TokenType::Keyword);
        assert_eq!(tokens[1].text, "let");
        assert_eq!(tokens[2].ttype, TokenType::Identifier);
        assert_eq!(tokens[3].ttype, TokenType::Number);
        assert_eq!(tokens[3].text, "12");
    }

    #[test]
    fn test_numbers() {
        for good in ["0", "42", "-3", "+7", "3.14", "1e9", "2.5e-3", "-0.5E+2"] {
            assert!(is_number(good), "{good} should lex as a number");
        }
        for bad in ["", "-", ".5", "1.", "1e", "1e+", "a1", "1.2.3"] {
            assert!(!is_number(bad), "{bad} should not lex as a number");
        }
    }

    #[test]
    fn test_operators() {
        assert_eq!(types("+ - <= != @ mod"), vec![TokenType::Operator; 6]);
    }

    #[test]
    fn test_identifier_with_specials() {
        let tokens = lex("str:format list? $symcat pkg.value");
        assert!(tokens.iter().all(|t| t.ttype == TokenType::Identifier));
    }

    #[test]
    fn test_capture_field_spread() {
        let tokens = lex("&x .field ...rest");
        assert_eq!(tokens[0].ttype, TokenType::Capture);
        assert_eq!(tokens[0].text, "x");
        assert_eq!(tokens[1].ttype, TokenType::GetField);
        assert_eq!(tokens[1].text, "field");
        assert_eq!(tokens[2].ttype, TokenType::Spread);
        assert_eq!(tokens[2].text, "rest");
    }

    #[test]
    fn test_string_escapes() {
        let tokens = lex(r#""a\nb\t\"cA""#);
        assert_eq!(tokens[0].ttype, TokenType::String);
        assert_eq!(tokens[0].text, "a\nb\t\"cA");
    }

    #[test]
    fn test_unterminated_string_is_an_error() {
        assert!(Lexer::new("\"oops", FileId(0)).tokenize().is_err());
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = lex("(print 1) # a comment\n(print 2)");
        assert!(tokens.iter().all(|t| t.ttype != TokenType::Comment));
        assert_eq!(tokens.len(), 8);
    }

    #[test]
    fn test_positions() {
        let tokens = lex("(let a\n  12)");
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[0].span.column, 1);
        let twelve = &tokens[3];
        assert_eq!(twelve.span.line, 2);
        assert_eq!(twelve.span.column, 3);
    }

    #[test]
    fn test_positions_nondecreasing() {
        let tokens = lex("(begin\n  (let a 1)\n  (let b 2))");
        let mut last = (0u32, 0u32);
        for tok in &tokens {
            let pos = (tok.span.line, tok.span.column);
            assert!(pos.0 > last.0 || (pos.0 == last.0 && pos.1 >= last.1));
            last = pos;
        }
    }

    #[test]
    fn test_mismatch_errors() {
        assert!(Lexer::new("(let a ~~)", FileId(0)).tokenize().is_err());
    }

    #[test]
    fn test_quote_shorthand() {
        let tokens = lex("'(+ 1 2)");
        assert_eq!(tokens[0].ttype, TokenType::Shorthand);
    }
}
