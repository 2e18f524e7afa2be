//! ark-drv - The pipeline welding every pass together.
//!
//! Source text flows through lexer, parser, import solver, macro
//! processor, optimizer, name resolution, compiler, IR optimizer and
//! linker. The [`Pipeline`] owns the source map so errors from any pass
//! render with their file excerpt.

use std::path::{Path, PathBuf};

use tracing::debug;

use ark_ir::{Compiler, IrOptimizer, Program};
use ark_lex::Lexer;
use ark_par::{Node, Parser};
use ark_sem::{ImportSolver, MacroProcessor, NameResolution, Optimizer};
use ark_util::{CodeError, SourceMap};

/// Native packages exposed to compiled programs: package name plus the
/// exported symbol names (the VM binds the handlers).
#[derive(Default, Clone)]
pub struct PluginSymbols {
    pub packages: Vec<(String, Vec<String>)>,
}

/// The compilation pipeline.
pub struct Pipeline {
    search_paths: Vec<PathBuf>,
    plugin_symbols: PluginSymbols,
    sources: SourceMap,
}

impl Pipeline {
    pub fn new(search_paths: Vec<PathBuf>) -> Self {
        Self {
            search_paths,
            plugin_symbols: PluginSymbols::default(),
            sources: SourceMap::new(),
        }
    }

    /// Declare a native package so name resolution accepts its exports.
    pub fn register_plugin_symbols(
        &mut self,
        package: impl Into<String>,
        symbols: Vec<String>,
    ) {
        self.plugin_symbols.packages.push((package.into(), symbols));
    }

    pub fn sources(&self) -> &SourceMap {
        &self.sources
    }

    /// Render a pass error with its source excerpt.
    pub fn render_error(&self, err: &CodeError) -> String {
        err.render(&self.sources)
    }

    /// Compile a file all the way to a linked program.
    pub fn compile_file(&mut self, path: &Path) -> Result<Program, CodeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CodeError::new(
                format!("unable to read {}: {e}", path.display()),
                ark_util::Span::DUMMY,
            )
        })?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        self.compile_source(path, &root, &content)
    }

    /// Compile in-memory source. `root` anchors relative imports.
    pub fn compile_source(
        &mut self,
        name: &Path,
        root: &Path,
        content: &str,
    ) -> Result<Program, CodeError> {
        let (ast, prefixed) = self.expanded_ast(name, root, content)?;

        let mut resolution = NameResolution::new();
        for (_, symbols) in &self.plugin_symbols.packages {
            resolution.register_plugin_symbols(symbols.iter().cloned());
        }
        resolution.process(&ast)?;
        debug!("name resolution passed");

        let program = Compiler::new().with_prefixed_names(prefixed).compile(&ast)?;
        let program = IrOptimizer::new().process(program);
        program.link()
    }

    /// Parse a file into its raw AST, without running the later passes.
    pub fn parse_file(&mut self, path: &Path) -> Result<Node, CodeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CodeError::new(
                format!("unable to read {}: {e}", path.display()),
                ark_util::Span::DUMMY,
            )
        })?;
        let file_id = self.sources.add_file(path, content.clone());
        let tokens = Lexer::new(&content, file_id).tokenize()?;
        let (ast, _) = Parser::new(tokens).parse()?;
        Ok(ast)
    }

    /// Lex, parse, solve imports, expand macros, drop dead bindings.
    fn expanded_ast(
        &mut self,
        name: &Path,
        root: &Path,
        content: &str,
    ) -> Result<(Node, std::collections::HashSet<String>), CodeError> {
        let file_id = self.sources.add_file(name, content.to_string());
        let tokens = Lexer::new(content, file_id).tokenize()?;
        debug!(tokens = tokens.len(), file = %name.display(), "lexed");

        let (ast, imports) = Parser::new(tokens).parse()?;
        debug!(imports = imports.len(), "parsed");

        let solved = ImportSolver::new(self.search_paths.clone()).solve(
            root,
            ast,
            imports,
            &mut self.sources,
        )?;

        let ast = MacroProcessor::new().process(solved.ast)?;
        debug!("macros expanded");

        let ast = Optimizer::new().process(ast);
        Ok((ast, solved.prefixed_names))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> Result<Program, CodeError> {
        Pipeline::new(Vec::new()).compile_source(
            Path::new("<test>"),
            Path::new("."),
            source,
        )
    }

    #[test]
    fn test_compile_simple_program() {
        let program = compile("(print (+ 1 2))").unwrap();
        assert_eq!(program.pages.len(), 1);
        assert!(!program.symbols.is_empty() || !program.values.is_empty());
    }

    #[test]
    fn test_mutability_violation_fails_compilation() {
        let err = compile("(let x 1) (set x 2)").unwrap_err();
        assert!(err.message.contains("immutable"));
    }

    #[test]
    fn test_unbound_symbol_fails_compilation() {
        let err = compile("(print qux)").unwrap_err();
        assert!(err.message.contains("unbound"));
    }

    #[test]
    fn test_macro_expansion_removes_macro_symbols() {
        let program = compile("($ when (c body) (if c body nil))\n(print (when true 7))").unwrap();
        assert!(!program.symbols.contains(&"when".to_string()));
    }

    #[test]
    fn test_plugin_symbols_resolve() {
        let mut pipeline = Pipeline::new(Vec::new());
        pipeline.register_plugin_symbols("http", vec!["http:get".to_string()]);
        let program = pipeline
            .compile_source(Path::new("<t>"), Path::new("."), "(print (http:get \"url\"))")
            .unwrap();
        assert!(program.symbols.contains(&"http:get".to_string()));
    }

    #[test]
    fn test_error_rendering_includes_excerpt() {
        let mut pipeline = Pipeline::new(Vec::new());
        let err = pipeline
            .compile_source(Path::new("bad.ark"), Path::new("."), "(let x 1)\n(set x 2)")
            .unwrap_err();
        let rendered = pipeline.render_error(&err);
        assert!(rendered.contains("bad.ark"));
        assert!(rendered.contains("(set x 2)"));
        assert!(rendered.contains("^"));
    }
}
