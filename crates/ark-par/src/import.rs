//! Import descriptors.

use ark_util::Span;

/// A single `(import …)` directive found at top level.
///
/// Three shapes exist:
/// - *basic* `(import foo.bar)`: `with_prefix` and no symbols, exported
///   names become `bar.name`;
/// - *glob* `(import foo.bar:*)`: everything is spliced unprefixed;
/// - *selective* `(import foo.bar :a :b)`: only the listed symbols are
///   exposed unprefixed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Import {
    /// Last package segment, e.g. `bar` for `foo.bar`.
    pub prefix: String,
    /// All package segments.
    pub package: Vec<String>,
    /// Whether exported symbols keep the package prefix.
    pub with_prefix: bool,
    /// Symbols requested by a selective import; empty otherwise.
    pub symbols: Vec<String>,
    /// Position of the import directive.
    pub span: Span,
}

impl Import {
    /// Dotted package name, e.g. `foo.bar`.
    pub fn package_string(&self) -> String {
        self.package.join(".")
    }

    /// Package as a relative filesystem path, e.g. `foo/bar`.
    pub fn package_path(&self) -> std::path::PathBuf {
        self.package.iter().collect()
    }

    pub fn is_glob(&self) -> bool {
        !self.with_prefix && self.symbols.is_empty()
    }

    pub fn is_basic(&self) -> bool {
        self.with_prefix && self.symbols.is_empty()
    }

    pub fn is_selective(&self) -> bool {
        !self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn import(package: &[&str], with_prefix: bool, symbols: &[&str]) -> Import {
        Import {
            prefix: package.last().unwrap().to_string(),
            package: package.iter().map(|s| s.to_string()).collect(),
            with_prefix,
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            span: Span::DUMMY,
        }
    }

    #[test]
    fn test_shapes() {
        assert!(import(&["foo", "bar"], true, &[]).is_basic());
        assert!(import(&["foo", "bar"], false, &[]).is_glob());
        assert!(import(&["foo"], true, &["a", "b"]).is_selective());
    }

    #[test]
    fn test_package_string_and_path() {
        let imp = import(&["foo", "bar", "egg"], true, &[]);
        assert_eq!(imp.package_string(), "foo.bar.egg");
        assert_eq!(imp.package_path(), std::path::PathBuf::from("foo/bar/egg"));
        assert_eq!(imp.prefix, "egg");
    }
}
