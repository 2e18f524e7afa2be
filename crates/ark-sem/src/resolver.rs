//! Name resolution and mutability checking.
//!
//! Walks the expanded AST with a stack of lexical scopes recording
//! `(name, is_mutable)` pairs. Rejects redeclarations, `set` on immutable
//! bindings and references that resolve to nothing (not a binding, not a
//! language symbol, not a builtin, not a plugin export), offering a
//! nearest-name suggestion in the latter case.

use std::collections::HashSet;

use ark_par::{Node, NodeKind};
use ark_util::lang::{builtin_index, Keyword, LIST_INSTRUCTIONS, OPERATORS};
use ark_util::{suggestion, CodeError};

/// A binding known to the resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Variable {
    name: String,
    is_mutable: bool,
}

/// The name-resolution pass.
pub struct NameResolution {
    scopes: Vec<Vec<Variable>>,
    /// Names exported by native plugins, registered before the pass runs.
    plugin_symbols: HashSet<String>,
    /// Every name ever defined, kept for suggestions.
    seen: HashSet<String>,
}

impl Default for NameResolution {
    fn default() -> Self {
        Self::new()
    }
}

impl NameResolution {
    pub fn new() -> Self {
        Self {
            scopes: vec![Vec::new()],
            plugin_symbols: HashSet::new(),
            seen: HashSet::new(),
        }
    }

    /// Treat a plugin-exported name as defined.
    pub fn register_plugin_symbols<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.plugin_symbols.insert(name.into());
        }
    }

    /// Check the whole AST. The AST is left untouched, this pass only
    /// produces errors.
    pub fn process(mut self, ast: &Node) -> Result<(), CodeError> {
        self.visit(ast)
    }

    fn visit(&mut self, node: &Node) -> Result<(), CodeError> {
        match &node.kind {
            NodeKind::Symbol(name) => self.check_reference(name, node),
            NodeKind::Field(segments) => {
                // either a package-prefixed symbol as a whole, or a field
                // chain rooted at a known closure
                let joined = node.field_name().unwrap_or_default();
                if self.is_defined(&joined) {
                    return Ok(());
                }
                let head = segments
                    .first()
                    .and_then(Node::string_payload)
                    .unwrap_or_default();
                self.check_reference(head, node)
            }
            NodeKind::List(children) => {
                match children.first().and_then(Node::keyword_payload) {
                    Some(Keyword::Let) | Some(Keyword::Mut) => self.visit_binding(node),
                    Some(Keyword::Set) => self.visit_set(node),
                    Some(Keyword::Fun) => self.visit_fun(node),
                    Some(Keyword::Del) => self.visit_del(node),
                    Some(Keyword::Import) => Err(CodeError::new(
                        "import directive survived import solving",
                        node.span,
                    )),
                    _ => {
                        for child in children {
                            self.visit(child)?;
                        }
                        Ok(())
                    }
                }
            }
            _ => Ok(()),
        }
    }

    fn visit_binding(&mut self, node: &Node) -> Result<(), CodeError> {
        let children = node.children().expect("binding node is a list");
        let is_let = children[0].is_keyword(Keyword::Let);
        let name = children
            .get(1)
            .and_then(Node::string_payload)
            .ok_or_else(|| CodeError::new("binding without a name", node.span))?;

        if is_language_symbol(name) {
            return Err(CodeError::new(
                format!("`{name}' is a language symbol and can not be redefined"),
                node.span,
            )
            .with_expr(node.repr()));
        }
        if is_let && self.current_scope_has(name) {
            return Err(CodeError::new(
                format!("`{name}' is already defined in this scope, can not let it again"),
                node.span,
            )
            .with_expr(node.repr()));
        }
        // registered before the initializer so functions can recurse
        self.register(name, !is_let);
        for child in children.iter().skip(2) {
            self.visit(child)?;
        }
        Ok(())
    }

    fn visit_set(&mut self, node: &Node) -> Result<(), CodeError> {
        let children = node.children().expect("set node is a list");
        let name = children
            .get(1)
            .and_then(Node::string_payload)
            .ok_or_else(|| CodeError::new("set without a name", node.span))?;

        match self.lookup(name) {
            Some(true) => {}
            Some(false) => {
                return Err(CodeError::new(
                    format!("can not set `{name}', it is immutable; declare it with mut"),
                    node.span,
                )
                .with_expr(node.repr()));
            }
            None => return Err(self.unbound_error(name, node)),
        }
        for child in children.iter().skip(2) {
            self.visit(child)?;
        }
        Ok(())
    }

    fn visit_fun(&mut self, node: &Node) -> Result<(), CodeError> {
        let children = node.children().expect("fun node is a list");
        let args = children
            .get(1)
            .and_then(Node::children)
            .ok_or_else(|| CodeError::new("function without an argument list", node.span))?;

        self.scopes.push(Vec::new());
        for arg in args {
            match &arg.kind {
                NodeKind::Symbol(name) | NodeKind::Spread(name) => {
                    if is_language_symbol(name) {
                        self.scopes.pop();
                        return Err(CodeError::new(
                            format!("`{name}' is a language symbol and can not be a parameter"),
                            arg.span,
                        ));
                    }
                    self.register(name, true)
                }
                NodeKind::Capture(name) => {
                    // a capture references the enclosing environment
                    if self
                        .scopes
                        .iter()
                        .rev()
                        .skip(1)
                        .flatten()
                        .all(|v| v.name != *name)
                    {
                        let err = self.unbound_error(name, arg);
                        self.scopes.pop();
                        return Err(err);
                    }
                    self.register(name, false);
                }
                _ => {
                    self.scopes.pop();
                    return Err(CodeError::new("invalid function parameter", arg.span));
                }
            }
        }
        let result = children
            .iter()
            .skip(2)
            .try_for_each(|child| self.visit(child));
        self.scopes.pop();
        result
    }

    fn visit_del(&mut self, node: &Node) -> Result<(), CodeError> {
        let children = node.children().expect("del node is a list");
        let name = children
            .get(1)
            .and_then(Node::string_payload)
            .ok_or_else(|| CodeError::new("del without a name", node.span))?;
        if self.lookup(name).is_none() {
            return Err(self.unbound_error(name, node));
        }
        for scope in self.scopes.iter_mut().rev() {
            if let Some(pos) = scope.iter().position(|v| v.name == name) {
                scope.remove(pos);
                break;
            }
        }
        Ok(())
    }

    fn check_reference(&mut self, name: &str, node: &Node) -> Result<(), CodeError> {
        if self.is_defined(name) {
            Ok(())
        } else {
            Err(self.unbound_error(name, node))
        }
    }

    fn is_defined(&self, name: &str) -> bool {
        self.lookup(name).is_some()
            || OPERATORS.contains(&name)
            || LIST_INSTRUCTIONS.contains(&name)
            || builtin_index(name).is_some()
            || self.plugin_symbols.contains(name)
    }

    /// Mutability of the nearest binding with this name, innermost first.
    fn lookup(&self, name: &str) -> Option<bool> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|v| v.name == name)
            .map(|v| v.is_mutable)
    }

    fn current_scope_has(&self, name: &str) -> bool {
        self.scopes
            .last()
            .map(|scope| scope.iter().any(|v| v.name == name))
            .unwrap_or(false)
    }

    fn register(&mut self, name: &str, is_mutable: bool) {
        self.seen.insert(name.to_string());
        let scope = self.scopes.last_mut().expect("at least the global scope");
        if let Some(existing) = scope.iter_mut().find(|v| v.name == name) {
            existing.is_mutable = is_mutable;
        } else {
            scope.push(Variable {
                name: name.to_string(),
                is_mutable,
            });
        }
    }

    fn unbound_error(&self, name: &str, node: &Node) -> CodeError {
        let candidates = self
            .seen
            .iter()
            .map(String::as_str)
            .chain(OPERATORS)
            .chain(LIST_INSTRUCTIONS)
            .chain(ark_util::lang::BUILTIN_NAMES)
            .chain(self.plugin_symbols.iter().map(String::as_str));
        let message = match suggestion::suggest(name, candidates) {
            Some(close) => format!("unbound variable `{name}', did you mean `{close}'?"),
            None => format!("unbound variable `{name}'"),
        };
        CodeError::new(message, node.span).with_expr(node.repr())
    }
}

/// True for names owned by the language: operators, list instructions and
/// builtins can not be rebound.
fn is_language_symbol(name: &str) -> bool {
    OPERATORS.contains(&name) || LIST_INSTRUCTIONS.contains(&name) || builtin_index(name).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_lex::Lexer;
    use ark_par::Parser;
    use ark_util::FileId;

    fn resolve(source: &str) -> Result<(), CodeError> {
        let tokens = Lexer::new(source, FileId(0)).tokenize().unwrap();
        let (ast, _) = Parser::new(tokens).parse().unwrap();
        NameResolution::new().process(&ast)
    }

    #[test]
    fn test_simple_program_resolves() {
        assert!(resolve("(let a 1)\n(print (+ a 1))").is_ok());
    }

    #[test]
    fn test_unbound_symbol() {
        let err = resolve("(print missing)").unwrap_err();
        assert!(err.message.contains("unbound variable `missing'"));
    }

    #[test]
    fn test_suggestion() {
        let err = resolve("(let value 1)\n(print vlaue)").unwrap_err();
        assert!(err.message.contains("did you mean `value'?"), "{}", err.message);
    }

    #[test]
    fn test_set_on_immutable() {
        let err = resolve("(let x 1)\n(set x 2)").unwrap_err();
        assert!(err.message.contains("immutable"));
    }

    #[test]
    fn test_set_on_mutable() {
        assert!(resolve("(mut x 1)\n(set x 2)").is_ok());
    }

    #[test]
    fn test_let_redeclaration() {
        let err = resolve("(let x 1)\n(let x 2)").unwrap_err();
        assert!(err.message.contains("already defined"));
    }

    #[test]
    fn test_function_arguments_resolve() {
        assert!(resolve("(let f (fun (a b) (+ a b)))\n(f 1 2)").is_ok());
    }

    #[test]
    fn test_recursive_function_resolves() {
        assert!(resolve("(let f (fun (n) (if (= n 0) 0 (f (- n 1)))))\n(f 3)").is_ok());
    }

    #[test]
    fn test_capture_must_exist() {
        let err = resolve("(let f (fun (&ghost) ghost))").unwrap_err();
        assert!(err.message.contains("unbound"));
        assert!(resolve("(let x 1)\n(let f (fun (&x) x))").is_ok());
    }

    #[test]
    fn test_del_then_use() {
        let err = resolve("(mut x 1)\n(del x)\n(print x)").unwrap_err();
        assert!(err.message.contains("unbound"));
    }

    #[test]
    fn test_builtins_and_operators_are_known() {
        assert!(resolve("(print (len [1 2]))\n(print (math:cos 0))").is_ok());
    }

    #[test]
    fn test_plugin_symbols() {
        let tokens = Lexer::new("(http:get \"url\")", FileId(0)).tokenize().unwrap();
        let (ast, _) = Parser::new(tokens).parse().unwrap();
        let mut pass = NameResolution::new();
        pass.register_plugin_symbols(["http:get"]);
        assert!(pass.process(&ast).is_ok());
    }

    #[test]
    fn test_shadowing_in_function_scope() {
        assert!(resolve("(let x 1)\n(let f (fun (x) (+ x 1)))").is_ok());
    }

    #[test]
    fn test_language_symbols_can_not_be_rebound() {
        let err = resolve("(let print 1)").unwrap_err();
        assert!(err.message.contains("language symbol"));
        let err = resolve("(let f (fun (head) head))").unwrap_err();
        assert!(err.message.contains("language symbol"));
    }
}
