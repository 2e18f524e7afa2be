//! Bytecode verification, decoding and disassembly.

use sha2::{Digest, Sha256};
use thiserror::Error;

use ark_ir::{Opcode, Program, TableValue, Word};

use crate::{
    CODE_SEGMENT_START, FUNC_TYPE, HASHED_OFFSET, MAGIC, NUMBER_TYPE, SHA_OFFSET, STRING_TYPE,
    SYM_TABLE_START, VAL_TABLE_START,
};

/// Errors raised while decoding a container.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReaderError {
    #[error("not an ark bytecode file: bad magic")]
    BadMagic,

    #[error("truncated bytecode file while reading {0}")]
    Truncated(&'static str),

    #[error("integrity check failed: sha256 mismatch")]
    ShaMismatch,

    #[error("expected {expected} marker, found {found:#04x}")]
    BadMarker { expected: &'static str, found: u8 },

    #[error("invalid value table entry of type {0:#04x}")]
    BadValueType(u8),

    #[error("invalid number literal `{0}' in value table")]
    BadNumber(String),

    #[error("unknown opcode {0:#04x} in code segment")]
    UnknownOpcode(u8),

    #[error("function entry references page {page} but only {pages} page(s) exist")]
    BadPageReference { page: u16, pages: usize },

    #[error("instruction references symbol {id} but the table holds {count} entries")]
    BadSymbolReference { id: u16, count: usize },

    #[error("instruction references constant {id} but the table holds {count} entries")]
    BadConstReference { id: u16, count: usize },
}

/// A fully decoded container.
#[derive(Debug, PartialEq)]
pub struct BytecodeFile {
    pub version: (u16, u16, u16),
    pub timestamp: u64,
    pub sha256: [u8; 32],
    pub program: Program,
}

/// Selectable display segment for [`disassemble`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    All,
    HeadersOnly,
    Symbols,
    Values,
    Code,
    /// A single page of the code segment.
    Page(u16),
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], ReaderError> {
        let end = self.pos.checked_add(n).ok_or(ReaderError::Truncated(what))?;
        if end > self.bytes.len() {
            return Err(ReaderError::Truncated(what));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, ReaderError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, ReaderError> {
        let bytes = self.take(2, what)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn cstring(&mut self, what: &'static str) -> Result<String, ReaderError> {
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos] != 0 {
            self.pos += 1;
        }
        if self.pos >= self.bytes.len() {
            return Err(ReaderError::Truncated(what));
        }
        let s = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();
        self.pos += 1; // NUL
        Ok(s)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

/// Decode and verify a container.
///
/// Checks the magic, recomputes the sha256 of everything after the digest
/// field, then decodes the three tables. Function entries referencing
/// nonexistent pages are rejected.
pub fn read(bytes: &[u8]) -> Result<BytecodeFile, ReaderError> {
    if bytes.len() < HASHED_OFFSET || bytes[0..4] != MAGIC {
        return Err(ReaderError::BadMagic);
    }

    let mut cursor = Cursor { bytes, pos: 4 };
    let version = (
        cursor.u16("version")?,
        cursor.u16("version")?,
        cursor.u16("version")?,
    );
    let timestamp_bytes = cursor.take(8, "timestamp")?;
    let timestamp = u64::from_be_bytes(timestamp_bytes.try_into().expect("8 bytes"));

    let mut sha256 = [0u8; 32];
    sha256.copy_from_slice(cursor.take(32, "sha256")?);

    let digest = Sha256::digest(&bytes[HASHED_OFFSET..]);
    if digest.as_slice() != sha256 {
        return Err(ReaderError::ShaMismatch);
    }
    debug_assert_eq!(cursor.pos, SHA_OFFSET + 32);

    // symbol table
    let marker = cursor.u8("symbol table marker")?;
    if marker != SYM_TABLE_START {
        return Err(ReaderError::BadMarker {
            expected: "symbol table",
            found: marker,
        });
    }
    let count = cursor.u16("symbol count")?;
    let mut symbols = Vec::with_capacity(count as usize);
    for _ in 0..count {
        symbols.push(cursor.cstring("symbol name")?);
    }

    // value table
    let marker = cursor.u8("value table marker")?;
    if marker != VAL_TABLE_START {
        return Err(ReaderError::BadMarker {
            expected: "value table",
            found: marker,
        });
    }
    let count = cursor.u16("value count")?;
    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tag = cursor.u8("value tag")?;
        let value = match tag {
            NUMBER_TYPE => {
                let text = cursor.cstring("number value")?;
                let number: f64 = text
                    .parse()
                    .map_err(|_| ReaderError::BadNumber(text.clone()))?;
                TableValue::Number(number)
            }
            STRING_TYPE => TableValue::String(cursor.cstring("string value")?),
            FUNC_TYPE => TableValue::Page(cursor.u16("page address")?),
            other => return Err(ReaderError::BadValueType(other)),
        };
        values.push(value);
    }

    // code segment
    let marker = cursor.u8("code segment marker")?;
    if marker != CODE_SEGMENT_START {
        return Err(ReaderError::BadMarker {
            expected: "code segment",
            found: marker,
        });
    }
    let mut pages = Vec::new();
    while !cursor.at_end() {
        let size = cursor.u16("page size")? as usize;
        let mut page = Vec::with_capacity(size);
        for _ in 0..size {
            let raw = cursor.take(4, "instruction")?;
            let word = Word::decode([raw[0], raw[1], raw[2], raw[3]])
                .ok_or(ReaderError::UnknownOpcode(raw[1]))?;
            page.push(word);
        }
        pages.push(page);
    }

    // every function entry must reference an existing page
    for value in &values {
        if let TableValue::Page(page) = value {
            if *page as usize >= pages.len() {
                return Err(ReaderError::BadPageReference {
                    page: *page,
                    pages: pages.len(),
                });
            }
        }
    }

    let program = Program {
        symbols,
        values,
        pages,
    };
    validate_table_references(&program)?;

    Ok(BytecodeFile {
        version,
        timestamp,
        sha256,
        program,
    })
}

/// Every symbol or constant id embedded in the code must reference an
/// existing table entry.
fn validate_table_references(program: &Program) -> Result<(), ReaderError> {
    use Opcode::*;

    let check_symbol = |id: u16| {
        if (id as usize) < program.symbols.len() {
            Ok(())
        } else {
            Err(ReaderError::BadSymbolReference {
                id,
                count: program.symbols.len(),
            })
        }
    };
    let check_const = |id: u16| {
        if (id as usize) < program.values.len() {
            Ok(())
        } else {
            Err(ReaderError::BadConstReference {
                id,
                count: program.values.len(),
            })
        }
    };

    for page in &program.pages {
        for word in page {
            match word.opcode {
                LoadSymbol | Store | Let | Mut | Del | Capture | GetField | Increment
                | Decrement => check_symbol(word.primary)?,
                LoadConst | Plugin => check_const(word.primary)?,
                LoadConstLoadConst => {
                    check_const(word.primary)?;
                    check_const(word.secondary)?;
                }
                LoadConstStore | LoadConstSetVal => {
                    check_const(word.primary)?;
                    check_symbol(word.secondary)?;
                }
                StoreFrom | SetValFrom | StoreTail | StoreHead | SetValTail | SetValHead => {
                    check_symbol(word.primary)?;
                    check_symbol(word.secondary)?;
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// Render a decoded container in a human readable way.
pub fn disassemble(file: &BytecodeFile, segment: Segment) -> String {
    let mut out = String::new();
    let (major, minor, patch) = file.version;

    if matches!(segment, Segment::All | Segment::HeadersOnly) {
        out.push_str(&format!("version:   {major}.{minor}.{patch}\n"));
        out.push_str(&format!("timestamp: {}\n", file.timestamp));
        out.push_str(&format!("sha256:    {}\n", hex::encode(file.sha256)));
    }
    if matches!(segment, Segment::All | Segment::Symbols) {
        out.push_str(&format!("\nsymbols ({}):\n", file.program.symbols.len()));
        for (i, symbol) in file.program.symbols.iter().enumerate() {
            out.push_str(&format!("  {i:5}  {symbol}\n"));
        }
    }
    if matches!(segment, Segment::All | Segment::Values) {
        out.push_str(&format!("\nvalues ({}):\n", file.program.values.len()));
        for (i, value) in file.program.values.iter().enumerate() {
            let rendered = match value {
                TableValue::Number(n) => format!("(number) {n}"),
                TableValue::String(s) => format!("(string) {s:?}"),
                TableValue::Page(p) => format!("(function) page {p}"),
            };
            out.push_str(&format!("  {i:5}  {rendered}\n"));
        }
    }
    match segment {
        Segment::All | Segment::Code => {
            for (page_no, page) in file.program.pages.iter().enumerate() {
                disassemble_page(&mut out, file, page_no, page);
            }
        }
        Segment::Page(page_no) => {
            if let Some(page) = file.program.pages.get(page_no as usize) {
                disassemble_page(&mut out, file, page_no as usize, page);
            } else {
                out.push_str(&format!("\npage {page_no} does not exist\n"));
            }
        }
        _ => {}
    }
    out
}

fn disassemble_page(out: &mut String, file: &BytecodeFile, page_no: usize, page: &[Word]) {
    out.push_str(&format!("\npage {page_no} ({} instructions):\n", page.len()));
    for (i, word) in page.iter().enumerate() {
        let annotation = annotate(file, word);
        if word.opcode.is_fused() {
            out.push_str(&format!(
                "  {i:5}  {:<20} {:>5} {:>5}{annotation}\n",
                word.opcode.to_string(),
                word.primary,
                word.secondary
            ));
        } else if word.opcode.has_argument() {
            out.push_str(&format!(
                "  {i:5}  {:<20} {:>5}{annotation}\n",
                word.opcode.to_string(),
                word.primary
            ));
        } else {
            out.push_str(&format!("  {i:5}  {}\n", word.opcode));
        }
    }
}

/// Human friendly argument rendering for symbol/constant references.
fn annotate(file: &BytecodeFile, word: &Word) -> String {
    use Opcode::*;
    let symbol = |id: u16| {
        file.program
            .symbols
            .get(id as usize)
            .map(|s| format!("  ; {s}"))
            .unwrap_or_default()
    };
    let value = |id: u16| {
        file.program
            .values
            .get(id as usize)
            .map(|v| match v {
                TableValue::Number(n) => format!("  ; {n}"),
                TableValue::String(s) => format!("  ; {s:?}"),
                TableValue::Page(p) => format!("  ; page {p}"),
            })
            .unwrap_or_default()
    };
    match word.opcode {
        LoadSymbol | Store | Let | Mut | Del | Capture | GetField | Increment | Decrement => {
            symbol(word.primary)
        }
        LoadConst | Plugin => value(word.primary),
        Builtin => ark_util::lang::BUILTIN_NAMES
            .get(word.primary as usize)
            .map(|n| format!("  ; {n}"))
            .unwrap_or_default(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emitter::emit;

    fn sample_program() -> Program {
        Program {
            symbols: vec!["counter".to_string()],
            values: vec![
                TableValue::Number(3.25),
                TableValue::String("hi".to_string()),
                TableValue::Page(1),
            ],
            pages: vec![
                vec![
                    Word::new(Opcode::LoadConst, 0),
                    Word::new(Opcode::Let, 0),
                    Word::new(Opcode::Halt, 0),
                ],
                vec![
                    Word::new(Opcode::Nop, 1),
                    Word::new(Opcode::Mut, 0),
                    Word::new(Opcode::Ret, 0),
                ],
            ],
        }
    }

    #[test]
    fn test_round_trip() {
        let program = sample_program();
        let bytes = emit(&program, 99);
        let file = read(&bytes).unwrap();

        assert_eq!(file.version, crate::emitter::version());
        assert_eq!(file.timestamp, 99);
        assert_eq!(file.program.symbols, program.symbols);
        assert_eq!(file.program.values, program.values);
        assert_eq!(file.program.pages, program.pages);
    }

    #[test]
    fn test_reemit_is_byte_identical() {
        let bytes = emit(&sample_program(), 1234);
        let file = read(&bytes).unwrap();
        assert_eq!(emit(&file.program, file.timestamp), bytes);
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = emit(&sample_program(), 0);
        bytes[0] = b'x';
        assert_eq!(read(&bytes), Err(ReaderError::BadMagic));
    }

    #[test]
    fn test_sha_mismatch_on_corruption() {
        let mut bytes = emit(&sample_program(), 0);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert_eq!(read(&bytes), Err(ReaderError::ShaMismatch));
    }

    #[test]
    fn test_truncated_file() {
        let bytes = emit(&sample_program(), 0);
        assert!(matches!(
            read(&bytes[..10]),
            Err(ReaderError::BadMagic) | Err(ReaderError::Truncated(_))
        ));
    }

    #[test]
    fn test_dangling_symbol_reference() {
        let mut program = sample_program();
        program.pages[0].push(Word::new(Opcode::LoadSymbol, 40));
        let bytes = emit(&program, 0);
        assert!(matches!(
            read(&bytes),
            Err(ReaderError::BadSymbolReference { id: 40, .. })
        ));
    }

    #[test]
    fn test_dangling_page_reference() {
        let mut program = sample_program();
        program.values.push(TableValue::Page(9));
        let bytes = emit(&program, 0);
        assert!(matches!(
            read(&bytes),
            Err(ReaderError::BadPageReference { page: 9, .. })
        ));
    }

    #[test]
    fn test_disassemble_segments() {
        let bytes = emit(&sample_program(), 7);
        let file = read(&bytes).unwrap();

        let all = disassemble(&file, Segment::All);
        assert!(all.contains("version:"));
        assert!(all.contains("counter"));
        assert!(all.contains("page 0"));
        assert!(all.contains("page 1"));

        let symbols = disassemble(&file, Segment::Symbols);
        assert!(symbols.contains("counter"));
        assert!(!symbols.contains("page 0"));

        let page = disassemble(&file, Segment::Page(1));
        assert!(page.contains("page 1"));
        assert!(!page.contains("page 0 ("));

        let missing = disassemble(&file, Segment::Page(9));
        assert!(missing.contains("does not exist"));
    }
}
