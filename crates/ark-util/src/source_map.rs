//! Registry of loaded source files.
//!
//! The [`SourceMap`] owns the text of every file that went through the
//! pipeline (the entry file plus everything pulled in by imports) and maps
//! [`FileId`]s back to paths and lines for diagnostic rendering.

use std::path::{Path, PathBuf};

use crate::span::{FileId, Span};

/// A single loaded source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path the file was loaded from, or a synthetic name such as `<string>`.
    pub path: PathBuf,
    /// Full file content.
    pub content: String,
}

/// All loaded files, indexed by [`FileId`].
#[derive(Debug, Default, Clone)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a file and return its id.
    pub fn add_file(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> FileId {
        let id = FileId::new(self.files.len() as u32);
        self.files.push(SourceFile {
            path: path.into(),
            content: content.into(),
        });
        id
    }

    pub fn get(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.index())
    }

    /// Path of a file, or `<unknown>` for dummy ids.
    pub fn name(&self, id: FileId) -> &Path {
        self.get(id)
            .map(|f| f.path.as_path())
            .unwrap_or_else(|| Path::new("<unknown>"))
    }

    /// Fetch a single source line (1-based), without its newline.
    pub fn line(&self, id: FileId, line: u32) -> Option<&str> {
        let file = self.get(id)?;
        file.content.lines().nth(line.saturating_sub(1) as usize)
    }

    /// Render a multi-line excerpt around `span` with a caret under the
    /// offending column, in the shape used by every compile-time error.
    pub fn excerpt(&self, span: Span) -> String {
        let mut out = String::new();
        if span.is_dummy() {
            return out;
        }

        let first = span.line.saturating_sub(2).max(1);
        for line_no in first..=span.line {
            if let Some(text) = self.line(span.file_id, line_no) {
                out.push_str(&format!("{:>5} | {}\n", line_no, text));
            }
        }
        let caret_col = span.column.saturating_sub(1) as usize;
        out.push_str(&format!("{:>5} | {}^\n", "", " ".repeat(caret_col)));
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (FileId, &SourceFile)> {
        self.files
            .iter()
            .enumerate()
            .map(|(i, f)| (FileId::new(i as u32), f))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_get() {
        let mut map = SourceMap::new();
        let id = map.add_file("foo.ark", "(print 1)");
        assert_eq!(map.name(id), Path::new("foo.ark"));
        assert_eq!(map.get(id).unwrap().content, "(print 1)");
    }

    #[test]
    fn test_line_lookup() {
        let mut map = SourceMap::new();
        let id = map.add_file("foo.ark", "(let a 1)\n(let b 2)\n");
        assert_eq!(map.line(id, 1), Some("(let a 1)"));
        assert_eq!(map.line(id, 2), Some("(let b 2)"));
        assert_eq!(map.line(id, 3), None);
    }

    #[test]
    fn test_excerpt_has_caret() {
        let mut map = SourceMap::new();
        let id = map.add_file("foo.ark", "(set x 2)");
        let rendered = map.excerpt(Span::new(id, 1, 6));
        assert!(rendered.contains("(set x 2)"));
        assert!(rendered.contains("^"));
    }

    #[test]
    fn test_excerpt_dummy_is_empty() {
        let map = SourceMap::new();
        assert!(map.excerpt(Span::DUMMY).is_empty());
    }
}
