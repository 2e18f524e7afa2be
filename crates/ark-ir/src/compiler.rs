//! AST to IR lowering.
//!
//! The compiler walks the resolved AST and emits one IR block per function
//! plus the main block (page 0). Symbols and constants are interned into
//! the two tables the bytecode container serializes.

use std::collections::HashSet;

use indexmap::IndexSet;
use tracing::debug;

use ark_par::{Node, NodeKind};
use ark_util::lang::{
    builtin_index, list_instruction_index, operator_index, Keyword,
};
use ark_util::{CodeError, Span};

use crate::entity::{link, Entity, LabelId};
use crate::instruction::{Opcode, Word, FIRST_OPERATOR, VARIADIC_ARITY_BIT};

/// A value-table entry.
#[derive(Clone, Debug, PartialEq)]
pub enum TableValue {
    Number(f64),
    String(String),
    /// A function entry: the page holding its body.
    Page(u16),
}

/// Hashable interning key for [`TableValue`]; numbers intern by bit
/// pattern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum ValueKey {
    Number(u64),
    String(String),
    Page(u16),
}

impl ValueKey {
    fn to_value(&self) -> TableValue {
        match self {
            ValueKey::Number(bits) => TableValue::Number(f64::from_bits(*bits)),
            ValueKey::String(s) => TableValue::String(s.clone()),
            ValueKey::Page(p) => TableValue::Page(*p),
        }
    }
}

/// Compiler output before peephole optimization and linking.
#[derive(Debug)]
pub struct IrProgram {
    pub symbols: Vec<String>,
    pub values: Vec<TableValue>,
    pub blocks: Vec<Vec<Entity>>,
}

/// Fully linked program, ready for the bytecode emitter or the VM.
#[derive(Debug, PartialEq)]
pub struct Program {
    pub symbols: Vec<String>,
    pub values: Vec<TableValue>,
    pub pages: Vec<Vec<Word>>,
}

impl IrProgram {
    /// Resolve labels, producing executable pages.
    pub fn link(self) -> Result<Program, CodeError> {
        Ok(Program {
            pages: link(&self.blocks)?,
            symbols: self.symbols,
            values: self.values,
        })
    }
}

/// The AST-to-IR compiler.
#[derive(Default)]
pub struct Compiler {
    symbols: IndexSet<String>,
    values: IndexSet<ValueKey>,
    blocks: Vec<Vec<Entity>>,
    /// Names created by package-prefixing imports; a field chain matching
    /// one of these is a plain symbol, not a closure access.
    prefixed_names: HashSet<String>,
    next_label: LabelId,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefixed_names(mut self, names: HashSet<String>) -> Self {
        self.prefixed_names = names;
        self
    }

    /// Lower the whole program. Page 0 is the main block.
    pub fn compile(mut self, ast: &Node) -> Result<IrProgram, CodeError> {
        self.blocks.push(Vec::new());
        let children = match &ast.kind {
            NodeKind::List(children) => &children[..],
            _ => std::slice::from_ref(ast),
        };
        for child in children.iter().filter(|c| !c.is_keyword(Keyword::Begin)) {
            if self.compile_expr(child, 0)? {
                self.emit(0, Entity::Inst(Opcode::Pop, 0));
            }
        }
        self.emit(0, Entity::Inst(Opcode::Halt, 0));
        debug!(
            pages = self.blocks.len(),
            symbols = self.symbols.len(),
            values = self.values.len(),
            "compilation finished"
        );

        Ok(IrProgram {
            symbols: self.symbols.into_iter().collect(),
            values: self.values.iter().map(ValueKey::to_value).collect(),
            blocks: self.blocks,
        })
    }

    fn emit(&mut self, page: usize, entity: Entity) {
        self.blocks[page].push(entity);
    }

    fn label(&mut self) -> LabelId {
        self.next_label += 1;
        self.next_label - 1
    }

    fn symbol_id(&mut self, name: &str, span: Span) -> Result<u16, CodeError> {
        let (index, _) = self.symbols.insert_full(name.to_string());
        u16::try_from(index)
            .map_err(|_| CodeError::new("more than 65535 symbols in one program", span))
    }

    fn value_id(&mut self, key: ValueKey, span: Span) -> Result<u16, CodeError> {
        let (index, _) = self.values.insert_full(key);
        u16::try_from(index)
            .map_err(|_| CodeError::new("more than 65535 constants in one program", span))
    }

    /// Compile one expression into `page`.
    ///
    /// Returns whether the expression leaves a value on the stack:
    /// declarations, loops and the like are statements and do not.
    fn compile_expr(&mut self, node: &Node, page: usize) -> Result<bool, CodeError> {
        match &node.kind {
            NodeKind::Number(n) => {
                let id = self.value_id(ValueKey::Number(n.to_bits()), node.span)?;
                self.emit(page, Entity::Inst(Opcode::LoadConst, id));
                Ok(true)
            }
            NodeKind::String(s) => {
                let id = self.value_id(ValueKey::String(s.clone()), node.span)?;
                self.emit(page, Entity::Inst(Opcode::LoadConst, id));
                Ok(true)
            }
            NodeKind::Symbol(name) => {
                self.compile_symbol(name, node.span, page)?;
                Ok(true)
            }
            NodeKind::Field(_) => {
                self.compile_field(node, page)?;
                Ok(true)
            }
            NodeKind::List(children) => self.compile_list(node, children, page),
            NodeKind::Unused => Ok(false),
            NodeKind::Keyword(kw) => Err(CodeError::new(
                format!("keyword `{kw}' is not a value"),
                node.span,
            )),
            NodeKind::Capture(name) => Err(CodeError::new(
                format!("capture `&{name}' outside of a function argument list"),
                node.span,
            )),
            NodeKind::Spread(name) => Err(CodeError::new(
                format!("spread `...{name}' outside of a parameter list"),
                node.span,
            )),
            NodeKind::Macro(_) => Err(CodeError::new(
                "macro definition survived macro expansion",
                node.span,
            )),
        }
    }

    fn compile_symbol(&mut self, name: &str, span: Span, page: usize) -> Result<(), CodeError> {
        if operator_index(name).is_some() || list_instruction_index(name).is_some() {
            return Err(CodeError::new(
                format!("`{name}' is an instruction and can not be used as a value"),
                span,
            ));
        }
        if let Some(index) = builtin_index(name) {
            self.emit(page, Entity::Inst(Opcode::Builtin, index));
            return Ok(());
        }
        let id = self.symbol_id(name, span)?;
        self.emit(page, Entity::Inst(Opcode::LoadSymbol, id));
        Ok(())
    }

    /// A dotted chain: either a package-prefixed symbol as a whole, or a
    /// closure field access rooted at its head.
    fn compile_field(&mut self, node: &Node, page: usize) -> Result<(), CodeError> {
        let joined = node.field_name().unwrap_or_default();
        if self.prefixed_names.contains(&joined) {
            let id = self.symbol_id(&joined, node.span)?;
            self.emit(page, Entity::Inst(Opcode::LoadSymbol, id));
            return Ok(());
        }
        let segments = node.children().expect("field node has segments");
        let head = segments[0]
            .string_payload()
            .ok_or_else(|| CodeError::new("malformed field access", node.span))?;
        self.compile_symbol(head, node.span, page)?;
        for segment in &segments[1..] {
            let name = segment
                .string_payload()
                .ok_or_else(|| CodeError::new("malformed field access", segment.span))?;
            let id = self.symbol_id(name, segment.span)?;
            self.emit(page, Entity::Inst(Opcode::GetField, id));
        }
        Ok(())
    }

    fn compile_list(
        &mut self,
        node: &Node,
        children: &[Node],
        page: usize,
    ) -> Result<bool, CodeError> {
        let Some(head) = children.first() else {
            // () is the empty list
            self.emit(page, Entity::Inst(Opcode::List, 0));
            return Ok(true);
        };

        if let Some(keyword) = head.keyword_payload() {
            return self.compile_keyword(keyword, node, children, page);
        }

        if let Some(name) = head.string_payload() {
            if head.is_symbol() {
                if operator_index(name).is_some() {
                    return self.compile_operator(name, node, &children[1..], page);
                }
                if list_instruction_index(name).is_some() {
                    return self.compile_list_instruction(name, node, &children[1..], page);
                }
            }
        }

        // plain call: arguments left to right, then the callee
        let argc = children.len() - 1;
        for arg in &children[1..] {
            self.compile_value(arg, page)?;
        }
        self.compile_value(head, page)?;
        let argc = u16::try_from(argc)
            .map_err(|_| CodeError::new("too many call arguments", node.span))?;
        self.emit(page, Entity::Inst(Opcode::Call, argc));
        Ok(true)
    }

    /// Compile an expression that must produce a value.
    fn compile_value(&mut self, node: &Node, page: usize) -> Result<(), CodeError> {
        if !self.compile_expr(node, page)? {
            return Err(CodeError::new(
                "this expression is a statement and produces no value",
                node.span,
            )
            .with_expr(node.repr()));
        }
        Ok(())
    }

    fn compile_keyword(
        &mut self,
        keyword: Keyword,
        node: &Node,
        children: &[Node],
        page: usize,
    ) -> Result<bool, CodeError> {
        // macro expansion may splice children away; the parser shapes are
        // re-checked here before indexing
        let child = |index: usize| {
            children.get(index).ok_or_else(|| {
                CodeError::new(format!("malformed `{keyword}' form"), node.span)
                    .with_expr(node.repr())
            })
        };
        match keyword {
            Keyword::Begin => {
                let body = &children[1..];
                let Some((last, rest)) = body.split_last() else {
                    return Ok(false);
                };
                for child in rest {
                    if self.compile_expr(child, page)? {
                        self.emit(page, Entity::Inst(Opcode::Pop, 0));
                    }
                }
                self.compile_expr(last, page)
            }
            Keyword::If => {
                let (cond, then_branch) = (child(1)?.clone(), child(2)?.clone());
                self.compile_value(&cond, page)?;
                let else_label = self.label();
                let end_label = self.label();
                self.emit(page, Entity::GotoIfFalse(else_label));
                if !self.compile_expr(&then_branch, page)? {
                    self.push_nil(page);
                }
                self.emit(page, Entity::Goto(end_label));
                self.emit(page, Entity::Label(else_label));
                match children.get(3) {
                    Some(else_branch) => {
                        if !self.compile_expr(else_branch, page)? {
                            self.push_nil(page);
                        }
                    }
                    None => self.push_nil(page),
                }
                self.emit(page, Entity::Label(end_label));
                Ok(true)
            }
            Keyword::Let | Keyword::Mut => {
                let name_node = child(1)?.clone();
                let name = name_node
                    .string_payload()
                    .ok_or_else(|| CodeError::new("binding without a name", node.span))?
                    .to_string();
                self.compile_value(&child(2)?.clone(), page)?;
                let id = self.symbol_id(&name, name_node.span)?;
                let op = if keyword == Keyword::Let {
                    Opcode::Let
                } else {
                    Opcode::Mut
                };
                self.emit(page, Entity::Inst(op, id));
                Ok(false)
            }
            Keyword::Set => {
                let name_node = child(1)?.clone();
                let name = name_node
                    .string_payload()
                    .ok_or_else(|| CodeError::new("set without a name", node.span))?
                    .to_string();
                self.compile_value(&child(2)?.clone(), page)?;
                let id = self.symbol_id(&name, name_node.span)?;
                self.emit(page, Entity::Inst(Opcode::Store, id));
                Ok(false)
            }
            Keyword::Fun => {
                self.compile_function(node, children, page)?;
                Ok(true)
            }
            Keyword::While => {
                let (cond, body) = (child(1)?.clone(), child(2)?.clone());
                let start = self.label();
                let end = self.label();
                self.emit(page, Entity::Label(start));
                self.compile_value(&cond, page)?;
                self.emit(page, Entity::GotoIfFalse(end));
                if self.compile_expr(&body, page)? {
                    self.emit(page, Entity::Inst(Opcode::Pop, 0));
                }
                self.emit(page, Entity::Goto(start));
                self.emit(page, Entity::Label(end));
                Ok(false)
            }
            Keyword::Del => {
                let name_node = child(1)?.clone();
                let name = name_node
                    .string_payload()
                    .ok_or_else(|| CodeError::new("del without a name", node.span))?
                    .to_string();
                let id = self.symbol_id(&name, name_node.span)?;
                self.emit(page, Entity::Inst(Opcode::Del, id));
                Ok(false)
            }
            Keyword::Import => match &children.get(1).map(|c| &c.kind) {
                // the import solver rewrites native imports to a string
                Some(NodeKind::String(package)) => {
                    let id = self.value_id(ValueKey::String(package.clone()), node.span)?;
                    self.emit(page, Entity::Inst(Opcode::Plugin, id));
                    Ok(false)
                }
                _ => Err(CodeError::new(
                    "import directive survived import solving",
                    node.span,
                )),
            },
        }
    }

    fn push_nil(&mut self, page: usize) {
        let nil = builtin_index("nil").expect("nil is a builtin");
        self.emit(page, Entity::Inst(Opcode::Builtin, nil));
    }

    fn compile_operator(
        &mut self,
        name: &str,
        node: &Node,
        args: &[Node],
        page: usize,
    ) -> Result<bool, CodeError> {
        let opcode = Opcode::from_byte(FIRST_OPERATOR + operator_index(name).unwrap())
            .expect("operator table maps to opcodes");
        let arity_error = |expected: &str| {
            Err(CodeError::new(
                format!(
                    "operator `{name}' expects {expected} argument(s), got {}",
                    args.len()
                ),
                node.span,
            )
            .with_expr(node.repr()))
        };

        match name {
            "len" | "empty?" | "tail" | "head" | "nil?" | "toNumber" | "toString" | "type"
            | "not" => {
                if args.len() != 1 {
                    return arity_error("1");
                }
                self.compile_value(&args[0], page)?;
                self.emit(page, Entity::Inst(opcode, 0));
            }
            ">" | "<" | "<=" | ">=" | "!=" | "=" | "@" | "mod" | "assert" | "hasField" => {
                if args.len() != 2 {
                    return arity_error("2");
                }
                self.compile_value(&args[0], page)?;
                self.compile_value(&args[1], page)?;
                self.emit(page, Entity::Inst(opcode, 0));
            }
            // n-ary, folded left to right
            _ => {
                if args.len() < 2 {
                    return arity_error("at least 2");
                }
                self.compile_value(&args[0], page)?;
                self.compile_value(&args[1], page)?;
                self.emit(page, Entity::Inst(opcode, 0));
                for arg in &args[2..] {
                    self.compile_value(arg, page)?;
                    self.emit(page, Entity::Inst(opcode, 0));
                }
            }
        }
        Ok(true)
    }

    fn compile_list_instruction(
        &mut self,
        name: &str,
        node: &Node,
        args: &[Node],
        page: usize,
    ) -> Result<bool, CodeError> {
        for arg in args {
            self.compile_value(arg, page)?;
        }
        let argc = u16::try_from(args.len())
            .map_err(|_| CodeError::new("too many list elements", node.span))?;

        let check_min = |min: usize| {
            if args.len() < min {
                return Err(CodeError::new(
                    format!("`{name}' expects at least {min} argument(s), got {}", args.len()),
                    node.span,
                ));
            }
            Ok(())
        };

        match name {
            "list" => self.emit(page, Entity::Inst(Opcode::List, argc)),
            "append" => {
                check_min(2)?;
                self.emit(page, Entity::Inst(Opcode::Append, argc));
            }
            "concat" => {
                check_min(2)?;
                self.emit(page, Entity::Inst(Opcode::Concat, argc));
            }
            "append!" => {
                check_min(2)?;
                self.emit(page, Entity::Inst(Opcode::AppendInPlace, argc));
            }
            "concat!" => {
                check_min(2)?;
                self.emit(page, Entity::Inst(Opcode::ConcatInPlace, argc));
            }
            "pop" => {
                if args.len() != 2 {
                    return Err(CodeError::new(
                        format!("`pop' expects 2 arguments, got {}", args.len()),
                        node.span,
                    ));
                }
                self.emit(page, Entity::Inst(Opcode::PopList, 0));
            }
            _ => {
                if args.len() != 2 {
                    return Err(CodeError::new(
                        format!("`pop!' expects 2 arguments, got {}", args.len()),
                        node.span,
                    ));
                }
                self.emit(page, Entity::Inst(Opcode::PopListInPlace, 0));
            }
        }
        Ok(true)
    }

    /// Compile `(fun (args…) body)` onto its own page and emit the value
    /// creation at the call site, with capture or environment-save
    /// instructions as needed.
    fn compile_function(
        &mut self,
        node: &Node,
        children: &[Node],
        page: usize,
    ) -> Result<(), CodeError> {
        if children.len() != 3 {
            return Err(CodeError::new("malformed `fun' form", node.span).with_expr(node.repr()));
        }
        let args = children[1]
            .children()
            .ok_or_else(|| CodeError::new("function without an argument list", node.span))?;

        let mut captures: Vec<&str> = Vec::new();
        let mut params: Vec<&str> = Vec::new();
        let mut spread: Option<&str> = None;
        for arg in args {
            match &arg.kind {
                NodeKind::Symbol(name) => params.push(name),
                NodeKind::Capture(name) => captures.push(name),
                NodeKind::Spread(name) => spread = Some(name),
                _ => return Err(CodeError::new("invalid function parameter", arg.span)),
            }
        }

        let fn_page = self.blocks.len();
        u16::try_from(fn_page)
            .map_err(|_| CodeError::new("more than 65535 pages in one program", node.span))?;
        self.blocks.push(Vec::new());

        // arity header: parameter count, bit 15 set for variadic pages
        let mut header = params.len() as u16;
        if spread.is_some() {
            header |= VARIADIC_ARITY_BIT;
        }
        self.emit(fn_page, Entity::Inst(Opcode::Nop, header));

        // arguments are on the stack first to last: bind in reverse
        if let Some(name) = spread {
            let id = self.symbol_id(name, children[1].span)?;
            self.emit(fn_page, Entity::Inst(Opcode::Mut, id));
        }
        for name in params.iter().rev() {
            let id = self.symbol_id(name, children[1].span)?;
            self.emit(fn_page, Entity::Inst(Opcode::Mut, id));
        }

        if !self.compile_expr(&children[2], fn_page)? {
            self.push_nil(fn_page);
        }
        self.emit(fn_page, Entity::Inst(Opcode::Ret, 0));

        // closure creation at the definition site: explicit captures copy
        // values, everything else shares the enclosing scope
        if captures.is_empty() {
            self.emit(page, Entity::Inst(Opcode::SaveEnv, 0));
        } else {
            for name in captures {
                let id = self.symbol_id(name, children[1].span)?;
                self.emit(page, Entity::Inst(Opcode::Capture, id));
            }
        }
        let id = self.value_id(ValueKey::Page(fn_page as u16), node.span)?;
        self.emit(page, Entity::Inst(Opcode::LoadConst, id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_lex::Lexer;
    use ark_par::Parser;
    use ark_util::FileId;

    fn compile(source: &str) -> IrProgram {
        let tokens = Lexer::new(source, FileId(0)).tokenize().unwrap();
        let (ast, _) = Parser::new(tokens).parse().unwrap();
        Compiler::new().compile(&ast).unwrap()
    }

    fn ops(block: &[Entity]) -> Vec<Opcode> {
        block
            .iter()
            .filter_map(|e| match e {
                Entity::Inst(op, _) | Entity::Inst2(op, _, _) => Some(*op),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_let_compiles_to_load_const_let() {
        let program = compile("(let a 12)");
        assert_eq!(
            ops(&program.blocks[0]),
            vec![Opcode::LoadConst, Opcode::Let, Opcode::Halt]
        );
        assert_eq!(program.symbols, vec!["a"]);
        assert_eq!(program.values, vec![TableValue::Number(12.0)]);
    }

    #[test]
    fn test_constants_are_deduplicated() {
        let program = compile("(let a 5)\n(let b 5)\n(let c \"x\")\n(let d \"x\")");
        assert_eq!(program.values.len(), 2);
    }

    #[test]
    fn test_call_pushes_args_then_callee() {
        let program = compile("(print 1 2)");
        let main = &program.blocks[0];
        assert_eq!(
            ops(main),
            vec![
                Opcode::LoadConst,
                Opcode::LoadConst,
                Opcode::Builtin,
                Opcode::Call,
                Opcode::Pop,
                Opcode::Halt
            ]
        );
        assert!(matches!(main[3], Entity::Inst(Opcode::Call, 2)));
    }

    #[test]
    fn test_operator_folding() {
        let program = compile("(print (+ 1 2 3))");
        let counted = ops(&program.blocks[0])
            .iter()
            .filter(|op| **op == Opcode::Add)
            .count();
        assert_eq!(counted, 2);
    }

    #[test]
    fn test_operator_arity_is_checked() {
        let tokens = Lexer::new("(len)", FileId(0)).tokenize().unwrap();
        let (ast, _) = Parser::new(tokens).parse().unwrap();
        let err = Compiler::new().compile(&ast).unwrap_err();
        assert!(err.message.contains("expects 1"));
    }

    #[test]
    fn test_function_gets_its_own_page() {
        let program = compile("(let f (fun (x) (+ x 1)))");
        assert_eq!(program.blocks.len(), 2);
        let body = ops(&program.blocks[1]);
        assert_eq!(body[0], Opcode::Nop);
        assert_eq!(body[1], Opcode::Mut);
        assert_eq!(*body.last().unwrap(), Opcode::Ret);
        assert!(program.values.contains(&TableValue::Page(1)));
        // closure creation saves the environment at the definition site
        assert!(ops(&program.blocks[0]).contains(&Opcode::SaveEnv));
    }

    #[test]
    fn test_arity_header() {
        let program = compile("(let f (fun (a b) a))");
        assert!(matches!(program.blocks[1][0], Entity::Inst(Opcode::Nop, 2)));

        let program = compile("(let g (fun (a ...rest) a))");
        let Entity::Inst(Opcode::Nop, header) = program.blocks[1][0] else {
            panic!("missing arity header");
        };
        assert_eq!(header & VARIADIC_ARITY_BIT, VARIADIC_ARITY_BIT);
        assert_eq!(header & !VARIADIC_ARITY_BIT, 1);
    }

    #[test]
    fn test_explicit_capture_emits_capture() {
        let program = compile("(let x 1)\n(let f (fun (&x) x))");
        let main = ops(&program.blocks[0]);
        assert!(main.contains(&Opcode::Capture));
        assert!(!main.contains(&Opcode::SaveEnv));
    }

    #[test]
    fn test_if_produces_value_in_both_branches() {
        let program = compile("(print (if true 1))");
        let main = ops(&program.blocks[0]);
        // the missing else branch pushes nil
        assert!(main.contains(&Opcode::Builtin));
    }

    #[test]
    fn test_while_is_a_statement() {
        let program = compile("(mut i 0)\n(while (< i 10) (set i (+ i 1)))");
        let main = ops(&program.blocks[0]);
        assert!(main.contains(&Opcode::Lt));
        assert!(main.contains(&Opcode::Store));
    }

    #[test]
    fn test_list_sugar_compiles_to_list_instruction() {
        let program = compile("(print [1 2 3])");
        let main = &program.blocks[0];
        assert!(main.iter().any(|e| matches!(e, Entity::Inst(Opcode::List, 3))));
    }

    #[test]
    fn test_empty_call_is_empty_list() {
        let program = compile("(print ())");
        let main = &program.blocks[0];
        assert!(main.iter().any(|e| matches!(e, Entity::Inst(Opcode::List, 0))));
    }

    #[test]
    fn test_true_false_nil_are_builtins() {
        let program = compile("(print true)\n(print false)\n(print nil)");
        let main = ops(&program.blocks[0]);
        assert_eq!(main.iter().filter(|o| **o == Opcode::Builtin).count(), 6);
    }

    #[test]
    fn test_prefixed_field_is_a_symbol_load() {
        let tokens = Lexer::new("(print pkg.value)", FileId(0)).tokenize().unwrap();
        let (ast, _) = Parser::new(tokens).parse().unwrap();
        let mut prefixed = HashSet::new();
        prefixed.insert("pkg.value".to_string());
        let program = Compiler::new()
            .with_prefixed_names(prefixed)
            .compile(&ast)
            .unwrap();
        assert!(program.symbols.contains(&"pkg.value".to_string()));
        assert!(!ops(&program.blocks[0]).contains(&Opcode::GetField));
    }

    #[test]
    fn test_unprefixed_field_is_a_get_field_chain() {
        let program = compile("(let obj (fun () 1))\n(print obj.field)");
        assert!(ops(&program.blocks[0]).contains(&Opcode::GetField));
    }

    #[test]
    fn test_del() {
        let program = compile("(mut x 1)\n(del x)");
        assert!(ops(&program.blocks[0]).contains(&Opcode::Del));
    }

    #[test]
    fn test_link_produces_pages() {
        let program = compile("(mut i 0)\n(while (< i 3) (set i (+ i 1)))")
            .link()
            .unwrap();
        assert_eq!(program.pages.len(), 1);
        assert!(program.pages[0]
            .iter()
            .any(|w| w.opcode == Opcode::PopJumpIfFalse));
    }
}
