//! AST node definition.
//!
//! A [`Node`] is a tagged payload plus the source position it came from.
//! Lists own their children. The whole tree serializes to JSON and back
//! without loss, which is what the `ast --json` surface builds on.

use std::fmt;

use serde::{Deserialize, Serialize};

use ark_util::lang::Keyword;
use ark_util::Span;

/// Node payloads.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeKind {
    /// A name reference.
    Symbol(String),
    /// `&name` in a function argument list.
    Capture(String),
    /// One of the closed keyword set.
    Keyword(Keyword),
    String(String),
    Number(f64),
    /// Owns its children.
    List(Vec<Node>),
    /// `...name`, a variadic tail parameter.
    Spread(String),
    /// A dotted access chain, children are the segments as symbols.
    Field(Vec<Node>),
    /// A macro definition or a compile-time conditional; never survives
    /// macro expansion.
    Macro(Vec<Node>),
    /// A node removed by a compile-time pass.
    Unused,
}

/// An AST element: payload and source position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self { kind, span }
    }

    pub fn symbol(name: impl Into<String>, span: Span) -> Self {
        Self::new(NodeKind::Symbol(name.into()), span)
    }

    pub fn capture(name: impl Into<String>, span: Span) -> Self {
        Self::new(NodeKind::Capture(name.into()), span)
    }

    pub fn keyword(keyword: Keyword, span: Span) -> Self {
        Self::new(NodeKind::Keyword(keyword), span)
    }

    pub fn string(value: impl Into<String>, span: Span) -> Self {
        Self::new(NodeKind::String(value.into()), span)
    }

    pub fn number(value: f64, span: Span) -> Self {
        Self::new(NodeKind::Number(value), span)
    }

    pub fn list(children: Vec<Node>, span: Span) -> Self {
        Self::new(NodeKind::List(children), span)
    }

    pub fn spread(name: impl Into<String>, span: Span) -> Self {
        Self::new(NodeKind::Spread(name.into()), span)
    }

    pub fn unused(span: Span) -> Self {
        Self::new(NodeKind::Unused, span)
    }

    /// The string payload of a symbol/capture/string/spread node.
    pub fn string_payload(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Symbol(s)
            | NodeKind::Capture(s)
            | NodeKind::String(s)
            | NodeKind::Spread(s) => Some(s),
            _ => None,
        }
    }

    pub fn number_payload(&self) -> Option<f64> {
        match self.kind {
            NodeKind::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn keyword_payload(&self) -> Option<Keyword> {
        match self.kind {
            NodeKind::Keyword(kw) => Some(kw),
            _ => None,
        }
    }

    /// Children of a list/field/macro node.
    pub fn children(&self) -> Option<&[Node]> {
        match &self.kind {
            NodeKind::List(c) | NodeKind::Field(c) | NodeKind::Macro(c) => Some(c),
            _ => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match &mut self.kind {
            NodeKind::List(c) | NodeKind::Field(c) | NodeKind::Macro(c) => Some(c),
            _ => None,
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self.kind, NodeKind::Symbol(_))
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, NodeKind::List(_))
    }

    pub fn is_keyword(&self, keyword: Keyword) -> bool {
        matches!(self.kind, NodeKind::Keyword(kw) if kw == keyword)
    }

    /// True for a list node whose first child is the given keyword.
    pub fn starts_with_keyword(&self, keyword: Keyword) -> bool {
        matches!(
            self.children().and_then(|c| c.first()),
            Some(first) if first.is_keyword(keyword)
        )
    }

    /// Joined name of a field chain, e.g. `pkg.value`.
    pub fn field_name(&self) -> Option<String> {
        match &self.kind {
            NodeKind::Field(segments) => Some(
                segments
                    .iter()
                    .filter_map(|s| s.string_payload())
                    .collect::<Vec<_>>()
                    .join("."),
            ),
            _ => None,
        }
    }

    /// Textual S-expression representation, used in error excerpts and by
    /// the `$repr` predefined macro.
    pub fn repr(&self) -> String {
        match &self.kind {
            NodeKind::Symbol(s) => s.clone(),
            NodeKind::Capture(s) => format!("&{s}"),
            NodeKind::Keyword(kw) => kw.to_string(),
            NodeKind::String(s) => format!("{s:?}"),
            NodeKind::Number(n) => format_number(*n),
            NodeKind::Spread(s) => format!("...{s}"),
            NodeKind::Field(_) => self.field_name().unwrap_or_default(),
            NodeKind::List(children) => {
                let inner: Vec<String> = children.iter().map(Node::repr).collect();
                format!("({})", inner.join(" "))
            }
            NodeKind::Macro(children) => {
                let inner: Vec<String> = children.iter().map(Node::repr).collect();
                format!("($ {})", inner.join(" "))
            }
            NodeKind::Unused => String::new(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

/// Numbers print without a trailing `.0` when they are integral, matching
/// the runtime's own display rules.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repr() {
        let span = Span::DUMMY;
        let node = Node::list(
            vec![
                Node::keyword(Keyword::Let, span),
                Node::symbol("a", span),
                Node::number(12.0, span),
            ],
            span,
        );
        assert_eq!(node.repr(), "(let a 12)");
    }

    #[test]
    fn test_starts_with_keyword() {
        let span = Span::DUMMY;
        let node = Node::list(vec![Node::keyword(Keyword::Begin, span)], span);
        assert!(node.starts_with_keyword(Keyword::Begin));
        assert!(!node.starts_with_keyword(Keyword::Let));
    }

    #[test]
    fn test_field_name() {
        let span = Span::DUMMY;
        let field = Node::new(
            NodeKind::Field(vec![Node::symbol("pkg", span), Node::symbol("value", span)]),
            span,
        );
        assert_eq!(field.field_name().unwrap(), "pkg.value");
    }

    #[test]
    fn test_json_round_trip() {
        let span = Span::new(ark_util::FileId(0), 3, 7);
        let node = Node::list(
            vec![
                Node::keyword(Keyword::If, span),
                Node::symbol("cond", span),
                Node::number(1.5, span),
                Node::string("yes", span),
            ],
            span,
        );
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }
}
