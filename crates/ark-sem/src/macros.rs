//! Compile-time macro expansion.
//!
//! Four macro flavors are handled:
//! - symbol macros `($ name value)`;
//! - function macros `($ name (params…) body)` with an optional spread
//!   tail collecting remaining arguments;
//! - compile-time conditionals `($ if cond then [else])`;
//! - the predefined macros `$symcat`, `$argcount`, `$repr`, `$paste`.
//!
//! Macros are scoped like ordinary bindings: a scope is opened for every
//! `begin` block and function body, and leaving it drops its definitions.
//! Expansion is re-applied until a fixed point, bounded to catch runaway
//! recursion, and arithmetic/comparisons over literals are folded on the
//! spot.

use rustc_hash::FxHashMap;

use ark_par::{Node, NodeKind};
use ark_util::lang::{Keyword, PREDEFINED_MACROS};
use ark_util::CodeError;

/// Upper bound on repeated macro application to one node.
const MAX_MACRO_DEPTH: usize = 256;

/// The macro processor.
#[derive(Default)]
pub struct MacroProcessor {
    /// Macro definitions, one map per lexical scope.
    scopes: Vec<FxHashMap<String, Node>>,
    /// Declared arity of known function definitions, for `$argcount`.
    defined_functions: FxHashMap<String, usize>,
}

impl MacroProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expand every macro of `ast` and strip the definitions from it.
    pub fn process(mut self, mut ast: Node) -> Result<Node, CodeError> {
        self.scopes.push(FxHashMap::default());
        self.process_node(&mut ast)?;
        prune_unused(&mut ast);
        Ok(ast)
    }

    fn process_node(&mut self, node: &mut Node) -> Result<(), CodeError> {
        match &node.kind {
            NodeKind::Macro(_) => self.handle_macro_node(node),
            NodeKind::Symbol(_) => {
                self.apply_until_stable(node)?;
                Ok(())
            }
            NodeKind::List(_) => {
                self.apply_until_stable(node)?;
                // expansion may have produced something new entirely
                if !node.is_list() {
                    return self.process_node(node);
                }
                self.register_function_definition(node);

                let scoped = node.starts_with_keyword(Keyword::Begin);
                if scoped {
                    self.scopes.push(FxHashMap::default());
                }
                if node.starts_with_keyword(Keyword::Fun) {
                    // a function body opens its own macro scope
                    let children = node.children_mut().expect("fun node is a list");
                    self.scopes.push(FxHashMap::default());
                    for child in children.iter_mut().skip(2) {
                        self.process_node(child)?;
                    }
                    self.scopes.pop();
                } else {
                    let children = node.children_mut().expect("list node");
                    for child in children.iter_mut() {
                        self.process_node(child)?;
                    }
                }
                if scoped {
                    self.scopes.pop();
                }
                prune_unused(node);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Register or evaluate a `($ …)` node, replacing it in the tree.
    fn handle_macro_node(&mut self, node: &mut Node) -> Result<(), CodeError> {
        let children = node.children().expect("macro node has children");
        let is_conditional = children
            .first()
            .map(|c| c.is_keyword(Keyword::If))
            .unwrap_or(false);

        if is_conditional {
            // expand macros referenced by the condition before folding it
            let mut cond = children[1].clone();
            self.process_node(&mut cond)?;
            let cond = self.evaluate(cond)?;
            let children = node.children().expect("macro node has children");
            let chosen = if is_truthy(&cond) {
                Some(children[2].clone())
            } else {
                children.get(3).cloned()
            };
            match chosen {
                Some(branch) => {
                    let span = node.span;
                    *node = branch;
                    if node.span.is_dummy() {
                        node.span = span;
                    }
                    self.process_node(node)
                }
                None => {
                    *node = Node::unused(node.span);
                    Ok(())
                }
            }
        } else {
            self.register_macro(node)?;
            *node = Node::unused(node.span);
            Ok(())
        }
    }

    fn register_macro(&mut self, node: &Node) -> Result<(), CodeError> {
        let children = node.children().expect("macro node has children");
        let name = children
            .first()
            .and_then(Node::string_payload)
            .ok_or_else(|| CodeError::new("a macro needs a name", node.span))?;
        if !(2..=3).contains(&children.len()) {
            return Err(CodeError::new(
                format!("malformed macro definition for `{name}'"),
                node.span,
            )
            .with_expr(node.repr()));
        }
        // shadowing is allowed: the innermost definition wins
        self.scopes
            .last_mut()
            .expect("at least one macro scope")
            .insert(name.to_string(), node.clone());
        Ok(())
    }

    /// Track `(let name (fun …))` definitions for `$argcount`.
    fn register_function_definition(&mut self, node: &Node) {
        if !(node.starts_with_keyword(Keyword::Let) || node.starts_with_keyword(Keyword::Mut)) {
            return;
        }
        let Some(children) = node.children() else {
            return;
        };
        let (Some(name), Some(init)) = (
            children.get(1).and_then(Node::string_payload),
            children.get(2),
        ) else {
            return;
        };
        if init.starts_with_keyword(Keyword::Fun) {
            if let Some(args) = init.children().and_then(|c| c.get(1)).and_then(Node::children) {
                self.defined_functions.insert(name.to_string(), args.len());
            }
        }
    }

    fn find_macro(&self, name: &str) -> Option<&Node> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    /// Apply macros on this node until nothing changes, with a depth bound.
    fn apply_until_stable(&mut self, node: &mut Node) -> Result<(), CodeError> {
        for _ in 0..MAX_MACRO_DEPTH {
            if !self.apply_macro(node)? {
                return Ok(());
            }
        }
        Err(CodeError::new(
            "macro expansion depth exceeded, check for a self-referencing macro",
            node.span,
        )
        .with_expr(node.repr()))
    }

    /// Try one macro application. Returns true if the node changed.
    fn apply_macro(&mut self, node: &mut Node) -> Result<bool, CodeError> {
        match &node.kind {
            NodeKind::Symbol(name) => {
                let replacement = self
                    .find_macro(name)
                    .and_then(Node::children)
                    .filter(|children| children.len() == 2)
                    .map(|children| children[1].clone());
                if let Some(value) = replacement {
                    let span = node.span;
                    // the substituted value is folded on the spot
                    *node = self.evaluate(value)?;
                    node.span = span;
                    return Ok(true);
                }
                Ok(false)
            }
            NodeKind::List(children) => {
                let Some(head) = children.first() else {
                    return Ok(false);
                };
                let Some(head_name) = head.string_payload().map(str::to_string) else {
                    return Ok(false);
                };

                if PREDEFINED_MACROS.contains(&head_name.as_str()) {
                    let folded = self.evaluate(node.clone())?;
                    let changed = folded != *node;
                    *node = folded;
                    return Ok(changed);
                }

                let Some(mac) = self.find_macro(&head_name).cloned() else {
                    return Ok(false);
                };
                let mac_children = mac.children().expect("registered macro is well formed");
                match mac_children.len() {
                    // symbol macro used in head position: substitute the head
                    2 => {
                        let replacement = mac_children[1].clone();
                        let node_children = node.children_mut().expect("list node");
                        node_children[0] = replacement;
                        Ok(true)
                    }
                    3 => {
                        let expanded = self.expand_function_macro(node, &mac)?;
                        *node = expanded;
                        Ok(true)
                    }
                    _ => Ok(false),
                }
            }
            _ => Ok(false),
        }
    }

    /// Substitute a function macro's parameters with the call-site
    /// arguments and evaluate the result.
    fn expand_function_macro(&mut self, call: &Node, mac: &Node) -> Result<Node, CodeError> {
        let mac_children = mac.children().expect("macro node");
        let name = mac_children[0].string_payload().unwrap_or_default().to_string();
        let params = mac_children[1].children().expect("validated parameter list");
        let mut body = mac_children[2].clone();

        let call_args = &call.children().expect("call node")[1..];
        let has_spread = matches!(params.last().map(|p| &p.kind), Some(NodeKind::Spread(_)));
        let fixed = if has_spread {
            params.len() - 1
        } else {
            params.len()
        };

        if !has_spread && call_args.len() != params.len() {
            return Err(CodeError::new(
                format!(
                    "macro `{name}' got {} argument(s) but needed {}",
                    call_args.len(),
                    params.len()
                ),
                call.span,
            )
            .with_expr(call.repr()));
        }
        if has_spread && call_args.len() < fixed {
            return Err(CodeError::new(
                format!(
                    "macro `{name}' got {} argument(s) but needed at least {fixed}",
                    call_args.len()
                ),
                call.span,
            )
            .with_expr(call.repr()));
        }

        let mut map: FxHashMap<String, Node> = FxHashMap::default();
        for (param, arg) in params.iter().zip(call_args.iter()) {
            if let NodeKind::Symbol(pname) = &param.kind {
                map.insert(pname.clone(), arg.clone());
            }
        }
        if has_spread {
            let pname = params
                .last()
                .and_then(Node::string_payload)
                .expect("spread parameter has a name");
            let mut rest = vec![Node::symbol("list", call.span)];
            rest.extend(call_args.iter().skip(fixed).cloned());
            map.insert(pname.to_string(), Node::list(rest, call.span));
        }

        let mut shadowed = vec![];
        unify(&map, &mut body, &mut shadowed);
        let mut result = self.evaluate(body)?;
        set_span_deep(&mut result, call.span);
        Ok(result)
    }

    /// Compile-time constant folding over literals, plus the predefined
    /// macros. Non-constant expressions are returned untouched.
    fn evaluate(&mut self, mut node: Node) -> Result<Node, CodeError> {
        let NodeKind::List(_) = node.kind else {
            return Ok(node);
        };
        let head_name = node
            .children()
            .and_then(|c| c.first())
            .and_then(Node::string_payload)
            .map(str::to_string);

        // $paste inserts its argument raw, stopping evaluation
        if head_name.as_deref() == Some("$paste") {
            let children = node.children().expect("list node");
            return Ok(children.get(1).cloned().unwrap_or(Node::unused(node.span)));
        }

        // evaluate children first (innermost folding)
        {
            let children = node.children_mut().expect("list node");
            for child in children.iter_mut().skip(1) {
                if child.is_list() {
                    *child = self.evaluate(child.clone())?;
                }
            }
        }

        let span = node.span;
        let children = node.children().expect("list node");
        let Some(head) = head_name else {
            return Ok(node);
        };

        let folded = match head.as_str() {
            "$symcat" => {
                if children.len() < 3 {
                    return Err(CodeError::new(
                        "$symcat needs a symbol and at least one suffix",
                        span,
                    )
                    .with_expr(node.repr()));
                }
                let base = children[1].string_payload().ok_or_else(|| {
                    CodeError::new("$symcat needs a symbol as first argument", span)
                        .with_expr(node.repr())
                })?;
                let mut out = base.to_string();
                for part in &children[2..] {
                    match &part.kind {
                        NodeKind::Symbol(s) | NodeKind::String(s) => out.push_str(s),
                        NodeKind::Number(n) => out.push_str(&format_integral(*n)),
                        _ => {
                            return Err(CodeError::new(
                                "$symcat accepts symbols, strings and numbers",
                                part.span,
                            )
                            .with_expr(part.repr()))
                        }
                    }
                }
                Some(Node::symbol(out, span))
            }
            "$argcount" => {
                let target = children.get(1).ok_or_else(|| {
                    CodeError::new("$argcount needs a function", span).with_expr(node.repr())
                })?;
                let count = if target.starts_with_keyword(Keyword::Fun) {
                    target
                        .children()
                        .and_then(|c| c.get(1))
                        .and_then(Node::children)
                        .map(|args| args.len())
                } else {
                    target
                        .string_payload()
                        .and_then(|name| self.defined_functions.get(name).copied())
                };
                let count = count.ok_or_else(|| {
                    CodeError::new(
                        "$argcount expects a known function name or an inline function",
                        span,
                    )
                    .with_expr(node.repr())
                })?;
                Some(Node::number(count as f64, span))
            }
            "$repr" => {
                let target = children.get(1).ok_or_else(|| {
                    CodeError::new("$repr needs an argument", span).with_expr(node.repr())
                })?;
                Some(Node::string(target.repr(), span))
            }
            _ => fold_operator(&head, children, span)?,
        };

        Ok(folded.unwrap_or(node))
    }
}

/// Fold an arithmetic/comparison/logic operator over literal operands.
fn fold_operator(head: &str, children: &[Node], span: ark_util::Span) -> Result<Option<Node>, CodeError> {
    let args = &children[1..];
    let numbers: Option<Vec<f64>> = args.iter().map(Node::number_payload).collect();

    let bool_node = |b: bool| Node::symbol(if b { "true" } else { "false" }, span);

    match head {
        "+" | "-" | "*" | "/" | "mod" => {
            let Some(nums) = numbers else { return Ok(None) };
            if nums.len() < 2 {
                return Ok(None);
            }
            let mut acc = nums[0];
            for &n in &nums[1..] {
                acc = match head {
                    "+" => acc + n,
                    "-" => acc - n,
                    "*" => acc * n,
                    "/" => {
                        if n == 0.0 {
                            return Err(CodeError::new("division by zero in a macro", span));
                        }
                        acc / n
                    }
                    _ => {
                        if n == 0.0 {
                            return Err(CodeError::new("modulo by zero in a macro", span));
                        }
                        acc % n
                    }
                };
            }
            Ok(Some(Node::number(acc, span)))
        }
        "=" | "!=" | "<" | ">" | "<=" | ">=" => {
            if args.len() != 2 {
                return Ok(None);
            }
            let ordering = match (&args[0].kind, &args[1].kind) {
                (NodeKind::Number(a), NodeKind::Number(b)) => a.partial_cmp(b),
                (NodeKind::String(a), NodeKind::String(b)) => Some(a.cmp(b)),
                (NodeKind::Symbol(a), NodeKind::Symbol(b))
                    if is_bool_symbol(a) && is_bool_symbol(b) =>
                {
                    Some(a.cmp(b))
                }
                _ => None,
            };
            let Some(ord) = ordering else { return Ok(None) };
            let result = match head {
                "=" => ord.is_eq(),
                "!=" => !ord.is_eq(),
                "<" => ord.is_lt(),
                ">" => ord.is_gt(),
                "<=" => ord.is_le(),
                _ => ord.is_ge(),
            };
            Ok(Some(bool_node(result)))
        }
        "not" => {
            if args.len() != 1 || !is_const(&args[0]) {
                return Ok(None);
            }
            Ok(Some(bool_node(!is_truthy(&args[0]))))
        }
        "and" | "or" => {
            if args.len() < 2 || !args.iter().all(is_const) {
                return Ok(None);
            }
            let result = if head == "and" {
                args.iter().all(is_truthy)
            } else {
                args.iter().any(is_truthy)
            };
            Ok(Some(bool_node(result)))
        }
        "len" => match args {
            [Node {
                kind: NodeKind::String(s),
                ..
            }] => Ok(Some(Node::number(s.chars().count() as f64, span))),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

fn is_bool_symbol(name: &str) -> bool {
    name == "true" || name == "false"
}

/// Integral numbers concatenate into symbols without a trailing `.0`.
fn format_integral(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn is_const(node: &Node) -> bool {
    matches!(
        &node.kind,
        NodeKind::Number(_) | NodeKind::String(_)
    ) || matches!(&node.kind, NodeKind::Symbol(s) if is_bool_symbol(s) || s == "nil")
}

/// Truthiness of a compile-time value: `false`, `nil` and the empty list
/// are false, everything else is true.
pub(crate) fn is_truthy(node: &Node) -> bool {
    match &node.kind {
        NodeKind::Symbol(s) => s != "false" && s != "nil",
        NodeKind::List(children) => {
            !children.is_empty()
                && !(children.len() == 1
                    && children[0].string_payload() == Some("list"))
        }
        NodeKind::Unused => false,
        _ => true,
    }
}

/// Substitute parameters into a macro body, honoring shadowing: a name
/// rebound by an inner `fun` parameter or `let`/`mut` is left alone there.
fn unify(map: &FxHashMap<String, Node>, target: &mut Node, shadowed: &mut Vec<String>) {
    let is_fun = target.starts_with_keyword(Keyword::Fun);
    match &mut target.kind {
        NodeKind::Symbol(name) => {
            if !shadowed.contains(name) {
                if let Some(replacement) = map.get(name.as_str()) {
                    *target = replacement.clone();
                }
            }
        }
        NodeKind::List(_) if is_fun => {
            let children = target.children_mut().expect("fun node");
            let mut introduced = 0;
            if let Some(args) = children.get(1).and_then(Node::children) {
                for arg in args {
                    if let Some(name) = arg.string_payload() {
                        if map.contains_key(name) {
                            shadowed.push(name.to_string());
                            introduced += 1;
                        }
                    }
                }
            }
            for child in children.iter_mut().skip(2) {
                unify(map, child, shadowed);
            }
            shadowed.truncate(shadowed.len() - introduced);
        }
        NodeKind::List(children) | NodeKind::Macro(children) => {
            let mark = shadowed.len();
            let mut i = 0;
            while i < children.len() {
                // splice spread references in place
                if let NodeKind::Spread(name) = &children[i].kind {
                    if let Some(replacement) = map.get(name.as_str()) {
                        let elements: Vec<Node> = replacement
                            .children()
                            .map(|c| c[1..].to_vec())
                            .unwrap_or_default();
                        let count = elements.len();
                        children.splice(i..=i, elements);
                        i += count;
                        continue;
                    }
                }
                unify(map, &mut children[i], shadowed);
                // an inner binding shadows the parameter for the siblings
                // that follow it
                let child = &children[i];
                if child.starts_with_keyword(Keyword::Let) || child.starts_with_keyword(Keyword::Mut)
                {
                    if let Some(name) = child
                        .children()
                        .and_then(|c| c.get(1))
                        .and_then(Node::string_payload)
                    {
                        if map.contains_key(name) {
                            shadowed.push(name.to_string());
                        }
                    }
                }
                i += 1;
            }
            shadowed.truncate(mark);
        }
        _ => {}
    }
}

/// Give macro-generated nodes the position of the call site so errors
/// point at user code.
fn set_span_deep(node: &mut Node, span: ark_util::Span) {
    if node.span.is_dummy() {
        node.span = span;
    }
    if let Some(children) = node.children_mut() {
        for child in children {
            set_span_deep(child, span);
        }
    }
}

/// Drop nodes marked [`NodeKind::Unused`] from list children.
fn prune_unused(node: &mut Node) {
    if let Some(children) = node.children_mut() {
        children.retain(|c| !matches!(c.kind, NodeKind::Unused));
    }
}
