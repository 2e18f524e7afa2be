//! Bytecode serialization.

use sha2::{Digest, Sha256};

use ark_ir::{Program, TableValue};

use crate::{
    CODE_SEGMENT_START, FUNC_TYPE, MAGIC, NUMBER_TYPE, STRING_TYPE, SYM_TABLE_START,
    VAL_TABLE_START,
};

/// Compiler version embedded in every container.
pub fn version() -> (u16, u16, u16) {
    let parse = |s: &str| s.parse::<u16>().unwrap_or(0);
    (
        parse(env!("CARGO_PKG_VERSION_MAJOR")),
        parse(env!("CARGO_PKG_VERSION_MINOR")),
        parse(env!("CARGO_PKG_VERSION_PATCH")),
    )
}

/// Serialize a linked program into the `.arkc` container.
///
/// The sha256 field covers everything that follows it (the symbol table,
/// the value table and the code segment).
pub fn emit(program: &Program, timestamp: u64) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);

    let (major, minor, patch) = version();
    out.extend_from_slice(&major.to_be_bytes());
    out.extend_from_slice(&minor.to_be_bytes());
    out.extend_from_slice(&patch.to_be_bytes());
    out.extend_from_slice(&timestamp.to_be_bytes());

    let mut body = Vec::new();
    write_symbol_table(&mut body, &program.symbols);
    write_value_table(&mut body, &program.values);
    write_code_segment(&mut body, program);

    let digest = Sha256::digest(&body);
    out.extend_from_slice(&digest);
    out.extend_from_slice(&body);
    out
}

fn write_symbol_table(out: &mut Vec<u8>, symbols: &[String]) {
    out.push(SYM_TABLE_START);
    out.extend_from_slice(&(symbols.len() as u16).to_be_bytes());
    for symbol in symbols {
        out.extend_from_slice(symbol.as_bytes());
        out.push(0);
    }
}

fn write_value_table(out: &mut Vec<u8>, values: &[TableValue]) {
    out.push(VAL_TABLE_START);
    out.extend_from_slice(&(values.len() as u16).to_be_bytes());
    for value in values {
        match value {
            TableValue::Number(n) => {
                out.push(NUMBER_TYPE);
                // shortest decimal representation that round-trips
                out.extend_from_slice(format!("{n}").as_bytes());
                out.push(0);
            }
            TableValue::String(s) => {
                out.push(STRING_TYPE);
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            TableValue::Page(page) => {
                out.push(FUNC_TYPE);
                out.extend_from_slice(&page.to_be_bytes());
            }
        }
    }
}

fn write_code_segment(out: &mut Vec<u8>, program: &Program) {
    out.push(CODE_SEGMENT_START);
    for page in &program.pages {
        out.extend_from_slice(&(page.len() as u16).to_be_bytes());
        for word in page {
            out.extend_from_slice(&word.encode());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HASHED_OFFSET, SHA_OFFSET};
    use ark_ir::{Opcode, Word};

    fn sample_program() -> Program {
        Program {
            symbols: vec!["a".to_string(), "b".to_string()],
            values: vec![
                TableValue::Number(12.0),
                TableValue::String("hello".to_string()),
                TableValue::Page(1),
            ],
            pages: vec![
                vec![
                    Word::new(Opcode::LoadConst, 0),
                    Word::new(Opcode::Let, 0),
                    Word::new(Opcode::Halt, 0),
                ],
                vec![Word::new(Opcode::Ret, 0)],
            ],
        }
    }

    #[test]
    fn test_header_layout() {
        let bytes = emit(&sample_program(), 1234);
        assert_eq!(&bytes[0..4], b"ark\0");
        assert_eq!(bytes[SHA_OFFSET - 8..SHA_OFFSET], 1234u64.to_be_bytes());
        assert_eq!(bytes[HASHED_OFFSET], crate::SYM_TABLE_START);
    }

    #[test]
    fn test_sha_covers_body() {
        let bytes = emit(&sample_program(), 0);
        let digest = sha2::Sha256::digest(&bytes[HASHED_OFFSET..]);
        assert_eq!(&bytes[SHA_OFFSET..SHA_OFFSET + 32], digest.as_slice());
    }

    #[test]
    fn test_symbols_are_nul_terminated() {
        let bytes = emit(&sample_program(), 0);
        let table = &bytes[HASHED_OFFSET..];
        assert_eq!(table[0], crate::SYM_TABLE_START);
        assert_eq!(&table[1..3], &2u16.to_be_bytes());
        assert_eq!(&table[3..5], b"a\0");
        assert_eq!(&table[5..7], b"b\0");
    }

    #[test]
    fn test_emit_is_deterministic() {
        let program = sample_program();
        assert_eq!(emit(&program, 42), emit(&program, 42));
    }
}
