//! Predictive recursive parser.
//!
//! Grammar notes:
//! - `{ … }` rewrites to `(begin …)` and `[ … ]` to `(list …)`;
//! - `'expr` builds a zero-argument function wrapping `expr`;
//! - every keyword form has a fixed shape, enforced here;
//! - `($ …)` builds a [`NodeKind::Macro`] node for the macro processor;
//! - dotted identifiers (`pkg.value`, `closure.field`) become
//!   [`NodeKind::Field`] chains.
//!
//! Top-level `(import …)` directives are accumulated into [`Import`]
//! descriptors as they are parsed.

use ark_lex::{Token, TokenType};
use ark_util::lang::Keyword;
use ark_util::{CodeError, Span};

use crate::import::Import;
use crate::node::{Node, NodeKind};

/// The parser, consuming a token stream into an AST.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    imports: Vec<Import>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            imports: Vec::new(),
        }
    }

    /// Parse the whole token stream.
    ///
    /// Returns the root `(begin …)` node and the list of top-level imports,
    /// in order of appearance.
    pub fn parse(mut self) -> Result<(Node, Vec<Import>), CodeError> {
        let root_span = self.peek().map(|t| t.span).unwrap_or(Span::DUMMY);
        let mut children = vec![Node::keyword(Keyword::Begin, root_span)];
        while self.peek().is_some() {
            children.push(self.parse_expr(false)?);
        }
        Ok((Node::list(children, root_span), self.imports))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn last_span(&self) -> Span {
        self.tokens.last().map(|t| t.span).unwrap_or(Span::DUMMY)
    }

    fn expect_next(&mut self, what: &str) -> Result<Token, CodeError> {
        self.next()
            .ok_or_else(|| CodeError::new(format!("expected {what}, got end of input"), self.last_span()))
    }

    fn expect_grouping(&mut self, symbol: &str) -> Result<Token, CodeError> {
        let tok = self.expect_next(&format!("`{symbol}'"))?;
        if tok.ttype != TokenType::Grouping || tok.text != symbol {
            return Err(
                CodeError::new(format!("expected `{symbol}', got `{}'", tok.text), tok.span)
                    .with_expr(tok.text),
            );
        }
        Ok(tok)
    }

    /// Parse one expression. `in_macro` relaxes spread/field placement
    /// rules inside `($ …)` definitions.
    fn parse_expr(&mut self, in_macro: bool) -> Result<Node, CodeError> {
        let tok = self.expect_next("an expression")?;
        match tok.ttype {
            TokenType::Grouping => match tok.text.as_str() {
                "(" => self.parse_form(tok.span, in_macro),
                "{" => {
                    // { ... } => (begin ...)
                    let mut children = vec![Node::keyword(Keyword::Begin, tok.span)];
                    self.parse_until(&mut children, "}", in_macro)?;
                    Ok(Node::list(children, tok.span))
                }
                "[" => {
                    // [ ... ] => (list ...)
                    let mut children = vec![Node::symbol("list", tok.span)];
                    self.parse_until(&mut children, "]", in_macro)?;
                    Ok(Node::list(children, tok.span))
                }
                other => Err(
                    CodeError::new(format!("unexpected `{other}'"), tok.span).with_expr(other),
                ),
            },
            TokenType::String => Ok(Node::string(tok.text, tok.span)),
            TokenType::Number => {
                let value: f64 = tok.text.parse().map_err(|_| {
                    CodeError::new(format!("invalid number `{}'", tok.text), tok.span)
                })?;
                Ok(Node::number(value, tok.span))
            }
            TokenType::Identifier => Ok(identifier_node(&tok)?),
            TokenType::Operator => Ok(Node::symbol(tok.text, tok.span)),
            TokenType::Shorthand => {
                // 'expr => (fun () expr)
                let body = self.parse_expr(in_macro)?;
                Ok(Node::list(
                    vec![
                        Node::keyword(Keyword::Fun, tok.span),
                        Node::list(Vec::new(), tok.span),
                        body,
                    ],
                    tok.span,
                ))
            }
            TokenType::Spread if in_macro => Ok(Node::spread(tok.text, tok.span)),
            TokenType::Spread => Err(CodeError::new(
                "spread is only allowed as the last parameter of a function or macro",
                tok.span,
            )
            .with_expr(format!("...{}", tok.text))),
            TokenType::Capture => Err(CodeError::new(
                "captures are only allowed in function argument lists",
                tok.span,
            )
            .with_expr(format!("&{}", tok.text))),
            TokenType::Keyword => Err(CodeError::new(
                format!("keyword `{}' is not a value", tok.text),
                tok.span,
            )
            .with_expr(tok.text)),
            TokenType::GetField => Err(CodeError::new(
                "stray field access outside of a dotted name",
                tok.span,
            )
            .with_expr(format!(".{}", tok.text))),
            TokenType::Comment | TokenType::Skip | TokenType::Mismatch => Err(CodeError::new(
                format!("unexpected token `{}'", tok.text),
                tok.span,
            )),
        }
    }

    fn parse_until(
        &mut self,
        children: &mut Vec<Node>,
        closing: &str,
        in_macro: bool,
    ) -> Result<(), CodeError> {
        loop {
            match self.peek() {
                Some(tok) if tok.ttype == TokenType::Grouping && tok.text == closing => {
                    self.next();
                    return Ok(());
                }
                Some(_) => children.push(self.parse_expr(in_macro)?),
                None => {
                    return Err(CodeError::new(
                        format!("expected `{closing}' before end of input"),
                        self.last_span(),
                    ))
                }
            }
        }
    }

    /// Parse a parenthesized form, dispatching on its head.
    fn parse_form(&mut self, span: Span, in_macro: bool) -> Result<Node, CodeError> {
        match self.peek() {
            Some(tok) if tok.ttype == TokenType::Keyword => {
                let keyword: Keyword = tok.text.parse().expect("lexer produced a valid keyword");
                let kw_span = tok.span;
                self.next();
                self.parse_keyword_form(keyword, span, kw_span, in_macro)
            }
            Some(tok) if tok.ttype == TokenType::Identifier && tok.text == "$" => {
                let dollar_span = tok.span;
                self.next();
                self.parse_macro_definition(dollar_span)
            }
            _ => {
                // plain call or data list
                let mut children = Vec::new();
                self.parse_until(&mut children, ")", in_macro)?;
                Ok(Node::list(children, span))
            }
        }
    }

    fn parse_keyword_form(
        &mut self,
        keyword: Keyword,
        span: Span,
        kw_span: Span,
        in_macro: bool,
    ) -> Result<Node, CodeError> {
        let mut children = vec![Node::keyword(keyword, kw_span)];
        match keyword {
            Keyword::If => {
                children.push(self.parse_expr(in_macro)?); // condition
                children.push(self.parse_expr(in_macro)?); // then
                if !self.at_closing() {
                    children.push(self.parse_expr(in_macro)?); // else
                }
                self.expect_grouping(")")?;
            }
            Keyword::Let | Keyword::Mut | Keyword::Set => {
                children.push(self.parse_binding_name(keyword, in_macro)?);
                children.push(self.parse_expr(in_macro)?);
                self.expect_grouping(")")?;
            }
            Keyword::Fun => {
                children.push(self.parse_fun_args()?);
                children.push(self.parse_expr(in_macro)?);
                self.expect_grouping(")")?;
            }
            Keyword::While => {
                children.push(self.parse_expr(in_macro)?);
                children.push(self.parse_expr(in_macro)?);
                self.expect_grouping(")")?;
            }
            Keyword::Begin => {
                let mut rest = Vec::new();
                self.parse_until(&mut rest, ")", in_macro)?;
                children.extend(rest);
            }
            Keyword::Import => {
                return self.parse_import(span, kw_span);
            }
            Keyword::Del => {
                let name = self.expect_next("a symbol to delete")?;
                if name.ttype != TokenType::Identifier {
                    return Err(CodeError::new(
                        format!("del expects a symbol, got `{}'", name.text),
                        name.span,
                    ));
                }
                children.push(Node::symbol(name.text, name.span));
                self.expect_grouping(")")?;
            }
        }
        Ok(Node::list(children, span))
    }

    /// let/mut/set bind a plain, undotted symbol.
    fn parse_binding_name(&mut self, keyword: Keyword, in_macro: bool) -> Result<Node, CodeError> {
        let name = self.expect_next("a symbol")?;
        match name.ttype {
            TokenType::Identifier if !name.text.contains('.') => {
                Ok(Node::symbol(name.text, name.span))
            }
            TokenType::Identifier => Err(CodeError::new(
                format!("{keyword} cannot bind the dotted name `{}'", name.text),
                name.span,
            )
            .with_expr(name.text)),
            // macro bodies may bind generated names such as ($symcat a 1)
            TokenType::Grouping if in_macro && name.text == "(" => {
                self.parse_form(name.span, in_macro)
            }
            _ => Err(CodeError::new(
                format!("{keyword} expects a symbol, got `{}'", name.text),
                name.span,
            )
            .with_expr(name.text)),
        }
    }

    /// `(fun (args…) body)` argument list: symbols and captures, with an
    /// optional spread in last position.
    fn parse_fun_args(&mut self) -> Result<Node, CodeError> {
        let open = self.expect_grouping("(")?;
        let mut args: Vec<Node> = Vec::new();
        loop {
            let tok = self.expect_next("an argument or `)'")?;
            match tok.ttype {
                TokenType::Grouping if tok.text == ")" => break,
                TokenType::Identifier if !tok.text.contains('.') => {
                    args.push(Node::symbol(tok.text, tok.span));
                }
                TokenType::Capture => args.push(Node::capture(tok.text, tok.span)),
                TokenType::Spread => args.push(Node::spread(tok.text, tok.span)),
                _ => {
                    return Err(CodeError::new(
                        format!("invalid function parameter `{}'", tok.text),
                        tok.span,
                    )
                    .with_expr(tok.text))
                }
            }
        }
        if let Some(pos) = args
            .iter()
            .position(|a| matches!(a.kind, NodeKind::Spread(_)))
        {
            if pos + 1 != args.len() {
                return Err(CodeError::new(
                    "a spread parameter must be the last one",
                    args[pos].span,
                ));
            }
        }
        Ok(Node::list(args, open.span))
    }

    /// `(import pkg.sub)`, `(import pkg.sub:*)`, `(import pkg :a :b)`.
    fn parse_import(&mut self, span: Span, kw_span: Span) -> Result<Node, CodeError> {
        let pkg = self.expect_next("a package name")?;
        if pkg.ttype != TokenType::Identifier {
            return Err(CodeError::new(
                format!("import expects a package name, got `{}'", pkg.text),
                pkg.span,
            )
            .with_expr(pkg.text));
        }

        let (raw, glob) = match pkg.text.strip_suffix(":*") {
            Some(stripped) => (stripped, true),
            None => (pkg.text.as_str(), false),
        };
        let package: Vec<String> = raw.split('.').map(str::to_string).collect();
        if package.iter().any(String::is_empty) {
            return Err(
                CodeError::new(format!("malformed package name `{}'", pkg.text), pkg.span)
                    .with_expr(pkg.text.clone()),
            );
        }

        let mut symbols = Vec::new();
        loop {
            match self.peek() {
                Some(tok) if tok.ttype == TokenType::Identifier && tok.text.starts_with(':') => {
                    if glob {
                        return Err(CodeError::new(
                            "cannot mix a glob import with selected symbols",
                            tok.span,
                        ));
                    }
                    symbols.push(tok.text[1..].to_string());
                    self.next();
                }
                _ => break,
            }
        }
        self.expect_grouping(")")?;

        let mut children = vec![
            Node::keyword(Keyword::Import, kw_span),
            Node::symbol(pkg.text.clone(), pkg.span),
        ];
        children.extend(
            symbols
                .iter()
                .map(|s| Node::symbol(format!(":{s}"), pkg.span)),
        );

        self.imports.push(Import {
            prefix: package.last().cloned().unwrap_or_default(),
            package,
            with_prefix: !glob,
            symbols,
            span: kw_span,
        });
        Ok(Node::list(children, span))
    }

    /// `($ name value)`, `($ name (args…) body)` or `($ if cond then [else])`.
    fn parse_macro_definition(&mut self, span: Span) -> Result<Node, CodeError> {
        // compile-time conditional
        if matches!(self.peek(), Some(tok) if tok.ttype == TokenType::Keyword && tok.text == "if") {
            let kw_span = self.peek().map(|t| t.span).unwrap_or(span);
            self.next();
            let mut children = vec![Node::keyword(Keyword::If, kw_span)];
            children.push(self.parse_expr(true)?);
            children.push(self.parse_expr(true)?);
            if !self.at_closing() {
                children.push(self.parse_expr(true)?);
            }
            self.expect_grouping(")")?;
            return Ok(Node::new(NodeKind::Macro(children), span));
        }

        let name = self.expect_next("a macro name")?;
        if name.ttype != TokenType::Identifier {
            return Err(CodeError::new(
                format!("expected a macro name, got `{}'", name.text),
                name.span,
            )
            .with_expr(name.text));
        }
        let mut children = vec![Node::symbol(name.text, name.span)];
        children.push(self.parse_expr(true)?);
        if !self.at_closing() {
            children.push(self.parse_expr(true)?);
        }
        self.expect_grouping(")")?;

        // ($ name (args) body): validate the parameter list
        if children.len() == 3 {
            let args = &children[1];
            let valid = matches!(&args.kind, NodeKind::List(items) if items
                .iter()
                .all(|a| matches!(a.kind, NodeKind::Symbol(_) | NodeKind::Spread(_))));
            if !valid {
                return Err(CodeError::new(
                    "macro parameters must be symbols, with an optional trailing spread",
                    args.span,
                )
                .with_expr(args.repr()));
            }
        }
        Ok(Node::new(NodeKind::Macro(children), span))
    }

    fn at_closing(&self) -> bool {
        matches!(
            self.peek(),
            Some(tok) if tok.ttype == TokenType::Grouping && tok.text == ")"
        ) || self.peek().is_none()
    }
}

/// Identifier token to node: plain symbol, or a field chain when dotted.
fn identifier_node(tok: &Token) -> Result<Node, CodeError> {
    if !tok.text.contains('.') {
        return Ok(Node::symbol(tok.text.clone(), tok.span));
    }
    let segments: Vec<&str> = tok.text.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(
            CodeError::new(format!("malformed dotted name `{}'", tok.text), tok.span)
                .with_expr(tok.text.clone()),
        );
    }
    Ok(Node::new(
        NodeKind::Field(
            segments
                .into_iter()
                .map(|s| Node::symbol(s, tok.span))
                .collect(),
        ),
        tok.span,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_lex::Lexer;
    use ark_util::FileId;

    fn parse(source: &str) -> (Node, Vec<Import>) {
        let tokens = Lexer::new(source, FileId(0)).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn parse_err(source: &str) -> CodeError {
        let tokens = Lexer::new(source, FileId(0)).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap_err()
    }

    #[test]
    fn test_root_is_begin() {
        let (ast, _) = parse("(print 1)");
        assert!(ast.starts_with_keyword(Keyword::Begin));
        assert_eq!(ast.children().unwrap().len(), 2);
    }

    #[test]
    fn test_brace_sugar() {
        let (ast, _) = parse("{ (print 1) (print 2) }");
        let block = &ast.children().unwrap()[1];
        assert!(block.starts_with_keyword(Keyword::Begin));
        assert_eq!(block.children().unwrap().len(), 3);
    }

    #[test]
    fn test_bracket_sugar() {
        let (ast, _) = parse("[1 2 3]");
        let list = &ast.children().unwrap()[1];
        let children = list.children().unwrap();
        assert_eq!(children[0].string_payload(), Some("list"));
        assert_eq!(children.len(), 4);
    }

    #[test]
    fn test_if_shape() {
        let (ast, _) = parse("(if (= a 0) 1 2)");
        let form = &ast.children().unwrap()[1];
        assert!(form.starts_with_keyword(Keyword::If));
        assert_eq!(form.children().unwrap().len(), 4);

        let (ast, _) = parse("(if true 1)");
        let form = &ast.children().unwrap()[1];
        assert_eq!(form.children().unwrap().len(), 3);
    }

    #[test]
    fn test_let_shape() {
        let (ast, _) = parse("(let a 12)");
        let form = &ast.children().unwrap()[1];
        let children = form.children().unwrap();
        assert!(children[0].is_keyword(Keyword::Let));
        assert_eq!(children[1].string_payload(), Some("a"));
        assert_eq!(children[2].number_payload(), Some(12.0));
    }

    #[test]
    fn test_let_requires_symbol() {
        let err = parse_err("(let 12 12)");
        assert!(err.message.contains("let expects a symbol"));
        assert!(parse_err("(let a.b 12)").message.contains("dotted name"));
    }

    #[test]
    fn test_fun_args() {
        let (ast, _) = parse("(fun (a &b ...rest) a)");
        let form = &ast.children().unwrap()[1];
        let args = form.children().unwrap()[1].children().unwrap();
        assert!(matches!(args[0].kind, NodeKind::Symbol(_)));
        assert!(matches!(args[1].kind, NodeKind::Capture(_)));
        assert!(matches!(args[2].kind, NodeKind::Spread(_)));
    }

    #[test]
    fn test_spread_must_be_last() {
        let err = parse_err("(fun (...rest a) a)");
        assert!(err.message.contains("last"));
    }

    #[test]
    fn test_import_basic() {
        let (_, imports) = parse("(import foo.bar)");
        assert_eq!(imports.len(), 1);
        assert!(imports[0].is_basic());
        assert_eq!(imports[0].prefix, "bar");
        assert_eq!(imports[0].package, vec!["foo", "bar"]);
    }

    #[test]
    fn test_import_glob() {
        let (_, imports) = parse("(import foo.bar:*)");
        assert!(imports[0].is_glob());
        assert_eq!(imports[0].package_string(), "foo.bar");
    }

    #[test]
    fn test_import_selective() {
        let (_, imports) = parse("(import foo :a :b)");
        assert!(imports[0].is_selective());
        assert_eq!(imports[0].symbols, vec!["a", "b"]);
    }

    #[test]
    fn test_symbol_macro() {
        let (ast, _) = parse("($ answer 42)");
        let mac = &ast.children().unwrap()[1];
        assert!(matches!(mac.kind, NodeKind::Macro(_)));
        assert_eq!(mac.children().unwrap().len(), 2);
    }

    #[test]
    fn test_function_macro() {
        let (ast, _) = parse("($ when (c body) (if c body nil))");
        let mac = &ast.children().unwrap()[1];
        assert_eq!(mac.children().unwrap().len(), 3);
    }

    #[test]
    fn test_conditional_macro() {
        let (ast, _) = parse("($ if (= 1 1) (let a 1) (let a 2))");
        let mac = &ast.children().unwrap()[1];
        let children = mac.children().unwrap();
        assert!(matches!(mac.kind, NodeKind::Macro(_)));
        assert!(children[0].is_keyword(Keyword::If));
    }

    #[test]
    fn test_dotted_identifier_is_field() {
        let (ast, _) = parse("(print pkg.value)");
        let call = &ast.children().unwrap()[1];
        let field = &call.children().unwrap()[1];
        assert_eq!(field.field_name().unwrap(), "pkg.value");
    }

    #[test]
    fn test_quote_shorthand_builds_thunk() {
        let (ast, _) = parse("'(+ 1 2)");
        let thunk = &ast.children().unwrap()[1];
        assert!(thunk.starts_with_keyword(Keyword::Fun));
        assert!(thunk.children().unwrap()[1]
            .children()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unbalanced_parens() {
        assert!(parse_err("(print 1").message.contains("`)'"));
        assert!(parse_err(")").message.contains("unexpected"));
    }

    #[test]
    fn test_capture_outside_fun_args() {
        let err = parse_err("(print &x)");
        assert!(err.message.contains("captures"));
    }

    #[test]
    fn test_preorder_positions_nondecreasing() {
        let (ast, _) = parse("(begin\n  (let a 1)\n  (let b (fun (x) (+ x 1))))");
        fn walk(node: &Node, last: &mut (u32, u32)) {
            if !node.span.is_dummy() {
                let pos = (node.span.line, node.span.column);
                assert!(
                    pos.0 > last.0 || (pos.0 == last.0 && pos.1 >= last.1),
                    "positions went backwards: {last:?} -> {pos:?}"
                );
                *last = pos;
            }
            if let Some(children) = node.children() {
                // children on the same line may share the parent position
                let mut inner = *last;
                for child in children {
                    walk(child, &mut inner);
                }
            }
        }
        let mut last = (0, 0);
        walk(&ast, &mut last);
    }
}
