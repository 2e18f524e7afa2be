//! IR entities and the label link step.
//!
//! The compiler emits [`Entity`] sequences per page. Labels are
//! placeholders occupying no instruction slot; the final [`link`] step
//! resolves gotos to absolute page-relative instruction indices.

use std::collections::HashMap;

use ark_util::CodeError;

use crate::instruction::{Opcode, Word};

/// Identifier of a jump label, unique within a compilation.
pub type LabelId = usize;

/// One IR element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Entity {
    /// A jump target; does not become an instruction.
    Label(LabelId),
    Goto(LabelId),
    GotoIfTrue(LabelId),
    GotoIfFalse(LabelId),
    /// A plain instruction with its immediate.
    Inst(Opcode, u16),
    /// A fused instruction with two immediates.
    Inst2(Opcode, u16, u16),
}

/// Resolve labels in every block, producing executable pages.
///
/// Jump targets must fit the 16-bit immediate; a target beyond that is a
/// compile-time error, not a runtime one.
pub fn link(blocks: &[Vec<Entity>]) -> Result<Vec<Vec<Word>>, CodeError> {
    let mut pages = Vec::with_capacity(blocks.len());
    for block in blocks {
        // first pass: label -> instruction index
        let mut targets: HashMap<LabelId, usize> = HashMap::new();
        let mut index = 0usize;
        for entity in block {
            match entity {
                Entity::Label(id) => {
                    targets.insert(*id, index);
                }
                _ => index += 1,
            }
        }

        let mut page = Vec::with_capacity(index);
        for entity in block {
            let word = match entity {
                Entity::Label(_) => continue,
                Entity::Goto(id) => Word::new(Opcode::Jump, resolve(&targets, *id)?),
                Entity::GotoIfTrue(id) => {
                    Word::new(Opcode::PopJumpIfTrue, resolve(&targets, *id)?)
                }
                Entity::GotoIfFalse(id) => {
                    Word::new(Opcode::PopJumpIfFalse, resolve(&targets, *id)?)
                }
                Entity::Inst(op, arg) => Word::new(*op, *arg),
                Entity::Inst2(op, a, b) => Word::with_args(*op, *a, *b),
            };
            page.push(word);
        }
        pages.push(page);
    }
    Ok(pages)
}

fn resolve(targets: &HashMap<LabelId, usize>, id: LabelId) -> Result<u16, CodeError> {
    let index = targets.get(&id).copied().ok_or_else(|| {
        CodeError::new(
            format!("internal error: jump to unknown label {id}"),
            ark_util::Span::DUMMY,
        )
    })?;
    u16::try_from(index).map_err(|_| {
        CodeError::new(
            "jump target does not fit in a page, the function is too large",
            ark_util::Span::DUMMY,
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_occupy_no_slot() {
        let block = vec![
            Entity::Inst(Opcode::LoadConst, 0),
            Entity::Label(0),
            Entity::Inst(Opcode::Pop, 0),
            Entity::Goto(0),
        ];
        let pages = link(&[block]).unwrap();
        assert_eq!(pages[0].len(), 3);
        assert_eq!(pages[0][2], Word::new(Opcode::Jump, 1));
    }

    #[test]
    fn test_forward_and_backward_jumps() {
        let block = vec![
            Entity::Label(10),
            Entity::Inst(Opcode::LoadConst, 0),
            Entity::GotoIfFalse(11),
            Entity::Goto(10),
            Entity::Label(11),
            Entity::Inst(Opcode::Halt, 0),
        ];
        let pages = link(&[block]).unwrap();
        assert_eq!(pages[0][1], Word::new(Opcode::PopJumpIfFalse, 3));
        assert_eq!(pages[0][2], Word::new(Opcode::Jump, 0));
    }

    #[test]
    fn test_unknown_label_is_an_error() {
        let block = vec![Entity::Goto(99)];
        assert!(link(&[block]).is_err());
    }
}
