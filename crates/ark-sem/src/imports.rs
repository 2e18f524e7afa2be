//! Import resolution.
//!
//! For every `(import …)` directive the solver locates the module file
//! (relative to the importing file first, then along the configured search
//! path), parses it, recursively solves its own imports, and splices the
//! result in place of the directive. Cycles are detected against the stack
//! of in-progress packages; modules are parsed at most once.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use tracing::debug;

use ark_lex::Lexer;
use ark_par::{Import, Node, NodeKind, Parser};
use ark_util::lang::Keyword;
use ark_util::{CodeError, SourceMap};

/// Result of import solving: the flattened AST plus the set of
/// package-prefixed names (`pkg.value`) the splice created. The compiler
/// uses that set to tell prefixed symbols apart from closure field chains.
#[derive(Debug)]
pub struct SolvedAst {
    pub ast: Node,
    pub prefixed_names: HashSet<String>,
}

/// The import solver.
pub struct ImportSolver {
    search_paths: Vec<PathBuf>,
    /// Cache: package string to its fully solved module AST.
    modules: FxHashMap<String, Node>,
    /// Stack of packages currently being solved, for cycle detection.
    in_progress: Vec<String>,
    /// Packages whose definitions were already spliced into the program.
    spliced: HashSet<String>,
    prefixed_names: HashSet<String>,
}

impl ImportSolver {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            modules: FxHashMap::default(),
            in_progress: Vec::new(),
            spliced: HashSet::new(),
            prefixed_names: HashSet::new(),
        }
    }

    /// Resolve every import of `ast`, in order of appearance.
    ///
    /// `root` is the directory of the file the AST was parsed from; new
    /// module files are registered into `sources` so their spans render.
    pub fn solve(
        mut self,
        root: &Path,
        ast: Node,
        imports: Vec<Import>,
        sources: &mut SourceMap,
    ) -> Result<SolvedAst, CodeError> {
        let ast = self.splice_into(root, ast, imports, sources)?;
        Ok(SolvedAst {
            ast,
            prefixed_names: self.prefixed_names,
        })
    }

    /// Rebuild the root `(begin …)`, replacing import directives with
    /// module content.
    fn splice_into(
        &mut self,
        root: &Path,
        ast: Node,
        imports: Vec<Import>,
        sources: &mut SourceMap,
    ) -> Result<Node, CodeError> {
        let span = ast.span;
        let NodeKind::List(children) = ast.kind else {
            return Ok(ast);
        };
        let mut imports = imports.into_iter();
        let mut out: Vec<Node> = Vec::with_capacity(children.len());

        for child in children {
            if !child.starts_with_keyword(Keyword::Import) {
                out.push(child);
                continue;
            }
            let import = imports.next().ok_or_else(|| {
                CodeError::new("import directive without a matching descriptor", child.span)
            })?;
            let package = import.package_string();

            if self.in_progress.contains(&package) {
                return Err(CodeError::new(
                    format!(
                        "circular import of `{package}' (import chain: {})",
                        self.in_progress.join(" -> ")
                    ),
                    import.span,
                ));
            }
            // a module is spliced into the program once; a re-import of an
            // already loaded package brings nothing new
            if self.spliced.contains(&package) {
                debug!(package = %package, "module already loaded, skipping splice");
                continue;
            }

            let module = self.load_module(root, &import, sources)?;
            self.spliced.insert(package);

            let module_children = match module.kind {
                NodeKind::List(c) => c.into_iter().skip(1).collect::<Vec<_>>(),
                _ => Vec::new(),
            };

            if import.is_glob() {
                out.extend(module_children);
            } else {
                out.extend(self.prefix_module(module_children, &import)?);
            }
        }

        Ok(Node::list(out, span))
    }

    /// Parse (or fetch from cache) a module and solve its own imports.
    fn load_module(
        &mut self,
        root: &Path,
        import: &Import,
        sources: &mut SourceMap,
    ) -> Result<Node, CodeError> {
        let package = import.package_string();
        if let Some(cached) = self.modules.get(&package) {
            return Ok(cached.clone());
        }

        let file = self.find_file(root, import)?;
        debug!(package = %package, file = %file.display(), "loading module");
        let content = std::fs::read_to_string(&file).map_err(|e| {
            CodeError::new(
                format!("unable to read module `{package}': {e}"),
                import.span,
            )
        })?;
        let file_id = sources.add_file(file.clone(), content.clone());

        let tokens = Lexer::new(&content, file_id).tokenize()?;
        let (ast, module_imports) = Parser::new(tokens).parse()?;

        self.in_progress.push(package.clone());
        let module_root = file.parent().unwrap_or(root).to_path_buf();
        let solved = self.splice_into(&module_root, ast, module_imports, sources)?;
        self.in_progress.pop();

        self.modules.insert(package, solved.clone());
        Ok(solved)
    }

    /// Locate a module file: next to the importing file first, then along
    /// the search path.
    fn find_file(&self, root: &Path, import: &Import) -> Result<PathBuf, CodeError> {
        let relative = import.package_path().with_extension("ark");
        let mut candidates = vec![root.join(&relative)];
        candidates.extend(self.search_paths.iter().map(|p| p.join(&relative)));

        candidates
            .into_iter()
            .find(|c| c.is_file())
            .ok_or_else(|| {
                CodeError::new(
                    format!(
                        "unable to find module `{}' (looked next to the importer and in {} search path(s))",
                        import.package_string(),
                        self.search_paths.len()
                    ),
                    import.span,
                )
            })
    }

    /// Apply `pkg.`-prefixing to a module's top-level definitions, for
    /// basic and selective imports.
    fn prefix_module(
        &mut self,
        mut children: Vec<Node>,
        import: &Import,
    ) -> Result<Vec<Node>, CodeError> {
        let defs = collect_top_level_defs(&children);
        let map: FxHashMap<String, String> = defs
            .iter()
            .map(|name| (name.clone(), format!("{}.{name}", import.prefix)))
            .collect();
        for renamed in map.values() {
            self.prefixed_names.insert(renamed.clone());
        }

        for child in &mut children {
            rename_defs(child, &map);
            let mut shadowed = vec![HashSet::new()];
            rename_refs(child, &map, &mut shadowed);
        }

        // selective imports also expose the requested symbols unprefixed
        if import.is_selective() {
            for symbol in &import.symbols {
                if !defs.contains(symbol) {
                    return Err(CodeError::new(
                        format!(
                            "module `{}' does not define symbol `{symbol}'",
                            import.package_string()
                        ),
                        import.span,
                    ));
                }
                children.push(Node::list(
                    vec![
                        Node::keyword(Keyword::Let, import.span),
                        Node::symbol(symbol.clone(), import.span),
                        Node::symbol(format!("{}.{symbol}", import.prefix), import.span),
                    ],
                    import.span,
                ));
            }
        }
        Ok(children)
    }
}

/// Names defined by `let`/`mut` at the top level of a module, walking
/// through nested `begin` blocks.
fn collect_top_level_defs(children: &[Node]) -> HashSet<String> {
    let mut defs = HashSet::new();
    for child in children {
        if child.starts_with_keyword(Keyword::Begin) {
            if let Some(inner) = child.children() {
                defs.extend(collect_top_level_defs(&inner[1..]));
            }
        } else if child.starts_with_keyword(Keyword::Let) || child.starts_with_keyword(Keyword::Mut)
        {
            if let Some(name) = child
                .children()
                .and_then(|c| c.get(1))
                .and_then(Node::string_payload)
            {
                defs.insert(name.to_string());
            }
        }
    }
    defs
}

/// Rename top-level definition sites according to `map`.
fn rename_defs(node: &mut Node, map: &FxHashMap<String, String>) {
    if node.starts_with_keyword(Keyword::Begin) {
        if let Some(children) = node.children_mut() {
            for child in children.iter_mut().skip(1) {
                rename_defs(child, map);
            }
        }
        return;
    }
    if node.starts_with_keyword(Keyword::Let) || node.starts_with_keyword(Keyword::Mut) {
        if let Some(children) = node.children_mut() {
            if let Some(name_node) = children.get_mut(1) {
                if let NodeKind::Symbol(name) = &name_node.kind {
                    if let Some(renamed) = map.get(name) {
                        name_node.kind = NodeKind::Symbol(renamed.clone());
                    }
                }
            }
        }
    }
}

/// Rename references to top-level definitions, honoring shadowing by
/// function parameters and nested bindings.
fn rename_refs(node: &mut Node, map: &FxHashMap<String, String>, shadowed: &mut Vec<HashSet<String>>) {
    fn is_shadowed(name: &str, shadowed: &[HashSet<String>]) -> bool {
        shadowed.iter().any(|scope| scope.contains(name))
    }
    fn rename_one(name: &mut String, map: &FxHashMap<String, String>, shadowed: &[HashSet<String>]) {
        if !is_shadowed(name, shadowed) {
            if let Some(renamed) = map.get(name.as_str()) {
                *name = renamed.clone();
            }
        }
    }

    if let NodeKind::Symbol(name) = &mut node.kind {
        rename_one(name, map, shadowed);
        return;
    }
    if let NodeKind::Field(segments) = &mut node.kind {
        // only the head of a field chain is a reference
        if let Some(NodeKind::Symbol(head)) = segments.first_mut().map(|n| &mut n.kind) {
            rename_one(head, map, shadowed);
        }
        return;
    }

    let is_fun = node.starts_with_keyword(Keyword::Fun);
    let is_binding =
        node.starts_with_keyword(Keyword::Let) || node.starts_with_keyword(Keyword::Mut);

    let Some(children) = node.children_mut() else {
        return;
    };

    if is_fun {
        let mut scope = HashSet::new();
        if let Some(args) = children.get_mut(1).and_then(Node::children_mut) {
            for arg in args.iter_mut() {
                if let Some(name) = arg.string_payload() {
                    scope.insert(name.to_string());
                }
                // captures reference the enclosing scope, not the new one
                if let NodeKind::Capture(name) = &mut arg.kind {
                    rename_one(name, map, shadowed);
                }
            }
        }
        shadowed.push(scope);
        if let Some(body) = children.get_mut(2) {
            rename_refs(body, map, shadowed);
        }
        shadowed.pop();
        return;
    }

    if is_binding {
        // an inner binding shadows the imported name from here on; top
        // level definition sites were already renamed to dotted names
        if let Some(NodeKind::Symbol(name)) = children.get(1).map(|n| n.kind.clone()) {
            if !name.contains('.') {
                if let Some(scope) = shadowed.last_mut() {
                    scope.insert(name);
                }
            }
        }
        for child in children.iter_mut().skip(2) {
            rename_refs(child, map, shadowed);
        }
        return;
    }

    for child in children.iter_mut() {
        rename_refs(child, map, shadowed);
    }
}
