//! Closed language tables.
//!
//! These arrays are shared between the lexer, the parser, the macro
//! processor, the name-resolution pass, the compiler and the VM. Order
//! matters for [`OPERATORS`] (index maps to the operator opcodes), for
//! [`LIST_INSTRUCTIONS`] (index maps to the list opcodes) and for
//! [`BUILTIN_NAMES`] (index is the `BUILTIN` immediate argument).

use std::fmt;
use std::str::FromStr;

/// The language keywords.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Keyword {
    Fun,
    Let,
    Mut,
    Set,
    If,
    While,
    Begin,
    Import,
    Del,
}

/// Keyword spellings, in [`Keyword`] discriminant order.
pub const KEYWORDS: [&str; 9] = [
    "fun", "let", "mut", "set", "if", "while", "begin", "import", "del",
];

impl Keyword {
    pub fn as_str(&self) -> &'static str {
        KEYWORDS[*self as usize]
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fun" => Ok(Keyword::Fun),
            "let" => Ok(Keyword::Let),
            "mut" => Ok(Keyword::Mut),
            "set" => Ok(Keyword::Set),
            "if" => Ok(Keyword::If),
            "while" => Ok(Keyword::While),
            "begin" => Ok(Keyword::Begin),
            "import" => Ok(Keyword::Import),
            "del" => Ok(Keyword::Del),
            _ => Err(()),
        }
    }
}

/// Operator spellings. The index of an operator in this table, added to the
/// first operator opcode (`0x20`), gives its opcode.
pub const OPERATORS: [&str; 25] = [
    "+", "-", "*", "/",
    ">", "<", "<=", ">=", "!=", "=",
    "len", "empty?", "tail", "head",
    "nil?", "assert",
    "toNumber", "toString",
    "@", "and", "or", "mod",
    "type", "hasField",
    "not",
];

/// List builtins compiled to dedicated instructions instead of `BUILTIN`
/// calls. Index order maps to `LIST`, `APPEND`, `CONCAT`,
/// `APPEND_IN_PLACE`, `CONCAT_IN_PLACE`, `POP_LIST`, `POP_LIST_IN_PLACE`.
pub const LIST_INSTRUCTIONS: [&str; 7] = [
    "list", "append", "concat", "append!", "concat!", "pop", "pop!",
];

/// Compile-time-only macro functions understood by the macro processor.
pub const PREDEFINED_MACROS: [&str; 4] = ["$symcat", "$argcount", "$repr", "$paste"];

/// Builtin names, in registry order. The position of a name in this table
/// is the immediate argument of the `BUILTIN` instruction; the VM registry
/// must stay aligned with it.
pub const BUILTIN_NAMES: [&str; 49] = [
    // value constants
    "false", "true", "nil",
    // list
    "list:reverse", "list:find", "list:removeAt", "list:slice", "list:sort",
    "list:fill", "list:setAt",
    // io
    "print", "puts", "input", "io:writeFile", "io:readFile",
    "io:fileExists?", "io:listFiles", "io:isDir?", "io:makeDir",
    "io:removeFiles",
    // time
    "time",
    // system
    "sys:exec", "sleep", "sys:exit",
    // string
    "str:format", "str:find", "str:removeAt", "str:ord", "str:chr",
    // math
    "math:exp", "math:ln", "math:ceil", "math:floor", "math:round",
    "math:NaN?", "math:Inf?", "math:cos", "math:sin", "math:tan",
    "math:arccos", "math:arcsin", "math:arctan",
    "math:pi", "math:e", "math:tau", "math:Inf", "math:NaN",
    // async
    "async", "await",
];

/// Index of a builtin name, if any.
pub fn builtin_index(name: &str) -> Option<u16> {
    BUILTIN_NAMES.iter().position(|n| *n == name).map(|i| i as u16)
}

/// Index of an operator name, if any.
pub fn operator_index(name: &str) -> Option<u8> {
    OPERATORS.iter().position(|n| *n == name).map(|i| i as u8)
}

/// Index of a list instruction name, if any.
pub fn list_instruction_index(name: &str) -> Option<u8> {
    LIST_INSTRUCTIONS
        .iter()
        .position(|n| *n == name)
        .map(|i| i as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_round_trip() {
        for name in KEYWORDS {
            let kw: Keyword = name.parse().unwrap();
            assert_eq!(kw.as_str(), name);
        }
        assert!("bogus".parse::<Keyword>().is_err());
    }

    #[test]
    fn test_operator_index() {
        assert_eq!(operator_index("+"), Some(0));
        assert_eq!(operator_index("not"), Some(24));
        assert_eq!(operator_index("list"), None);
    }

    #[test]
    fn test_list_instruction_index() {
        assert_eq!(list_instruction_index("list"), Some(0));
        assert_eq!(list_instruction_index("pop!"), Some(6));
    }

    #[test]
    fn test_builtin_index() {
        assert_eq!(builtin_index("false"), Some(0));
        assert_eq!(builtin_index("print"), Some(10));
        assert_eq!(builtin_index("no:such"), None);
    }
}
