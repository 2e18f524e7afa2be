//! Dead top-level binding elimination.
//!
//! A top-level `let`/`mut` whose name appears exactly once in the whole
//! program (the declaration itself) is dropped, unless its initializer is
//! a list node: calls and function values are preserved for their side
//! effects. Nested `begin` blocks are walked for the same analysis. This
//! is the only AST-level optimization.

use rustc_hash::FxHashMap;
use tracing::debug;

use ark_par::{Node, NodeKind};
use ark_util::lang::Keyword;

/// The AST optimizer.
#[derive(Default)]
pub struct Optimizer {
    appearances: FxHashMap<String, usize>,
}

impl Optimizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove unused top-level bindings from `ast`.
    pub fn process(mut self, mut ast: Node) -> Node {
        if !ast.is_list() {
            return ast;
        }
        self.run_on_global_scope_vars(&ast, |appearances, name, _| {
            appearances.insert(name.to_string(), 0);
        });
        self.count_occurrences(&ast);
        self.remove_unused(&mut ast);
        ast
    }

    /// Apply `f` to every top-level `let`/`mut` declaration, walking into
    /// nested `begin` blocks.
    fn run_on_global_scope_vars(
        &mut self,
        node: &Node,
        f: fn(&mut FxHashMap<String, usize>, &str, &Node),
    ) {
        let Some(children) = node.children() else {
            return;
        };
        for child in children {
            if child.starts_with_keyword(Keyword::Begin) {
                self.run_on_global_scope_vars(child, f);
            } else if child.starts_with_keyword(Keyword::Let)
                || child.starts_with_keyword(Keyword::Mut)
            {
                if let Some(name) = child
                    .children()
                    .and_then(|c| c.get(1))
                    .and_then(Node::string_payload)
                {
                    f(&mut self.appearances, name, child);
                }
            }
        }
    }

    fn count_occurrences(&mut self, node: &Node) {
        match &node.kind {
            NodeKind::Symbol(name) | NodeKind::Capture(name) => {
                if let Some(count) = self.appearances.get_mut(name.as_str()) {
                    *count += 1;
                }
            }
            NodeKind::Field(segments) => {
                // the head of a chain is a reference; so is the joined name
                if let Some(head) = segments.first().and_then(Node::string_payload) {
                    if let Some(count) = self.appearances.get_mut(head) {
                        *count += 1;
                    }
                }
                if let Some(joined) = node.field_name() {
                    if let Some(count) = self.appearances.get_mut(joined.as_str()) {
                        *count += 1;
                    }
                }
            }
            NodeKind::List(children) | NodeKind::Macro(children) => {
                for child in children {
                    self.count_occurrences(child);
                }
            }
            _ => {}
        }
    }

    /// Drop declarations seen exactly once whose initializer is not a list.
    fn remove_unused(&mut self, node: &mut Node) {
        let Some(children) = node.children_mut() else {
            return;
        };
        children.retain(|child| {
            let is_decl = child.starts_with_keyword(Keyword::Let)
                || child.starts_with_keyword(Keyword::Mut);
            if !is_decl {
                return true;
            }
            let decl_children = child.children().expect("declaration is a list");
            let Some(name) = decl_children.get(1).and_then(Node::string_payload) else {
                return true;
            };
            let only_declared = self.appearances.get(name) == Some(&1);
            let initializer_is_list = decl_children
                .get(2)
                .map(|init| init.is_list())
                .unwrap_or(false);
            if only_declared && !initializer_is_list {
                debug!(name, "removing unused variable");
                return false;
            }
            true
        });
        for child in children.iter_mut() {
            if child.starts_with_keyword(Keyword::Begin) {
                self.remove_unused(child);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_lex::Lexer;
    use ark_par::Parser;
    use ark_util::FileId;

    fn optimize(source: &str) -> Node {
        let tokens = Lexer::new(source, FileId(0)).tokenize().unwrap();
        let (ast, _) = Parser::new(tokens).parse().unwrap();
        Optimizer::new().process(ast)
    }

    #[test]
    fn test_unused_literal_binding_is_removed() {
        let ast = optimize("(let unused 42)\n(print 1)");
        assert!(!ast.repr().contains("unused"));
    }

    #[test]
    fn test_used_binding_is_kept() {
        let ast = optimize("(let a 42)\n(print a)");
        assert!(ast.repr().contains("(let a 42)"));
    }

    #[test]
    fn test_unused_function_is_kept() {
        // a list initializer may carry side effects, keep it
        let ast = optimize("(let f (fun (x) x))");
        assert!(ast.repr().contains("(let f"));
    }

    #[test]
    fn test_nested_begin_blocks_are_walked() {
        let ast = optimize("{ (let dead 1) (print 2) }");
        assert!(!ast.repr().contains("dead"));
    }

    #[test]
    fn test_capture_counts_as_a_reference() {
        let ast = optimize("(let x 1)\n(let f (fun (&x) x))\n(f)");
        assert!(ast.repr().contains("(let x 1)"));
    }
}
