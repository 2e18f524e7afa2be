//! Peephole fusion of common instruction pairs.
//!
//! Runs on the IR blocks before linking. Labels and gotos act as barriers:
//! no fusion happens across a jump target, so resolved offsets stay
//! correct. Two-argument fusions additionally require both immediates to
//! fit the packed 12-bit fields.

use tracing::trace;

use crate::compiler::{IrProgram, TableValue};
use crate::entity::Entity;
use crate::instruction::Opcode;

/// Maximum immediate representable in a packed 12-bit field.
const MAX_12_BIT: u16 = 0x0fff;

/// The IR peephole optimizer.
#[derive(Default)]
pub struct IrOptimizer;

impl IrOptimizer {
    pub fn new() -> Self {
        Self
    }

    /// Fuse instruction pairs in every block.
    pub fn process(&self, mut program: IrProgram) -> IrProgram {
        for block in &mut program.blocks {
            *block = fuse_block(block, &program.values);
        }
        program
    }
}

fn fuse_block(block: &[Entity], values: &[TableValue]) -> Vec<Entity> {
    let mut out = Vec::with_capacity(block.len());
    let mut i = 0;
    let end = block.len();

    let is_one = |index: u16| matches!(values.get(index as usize), Some(TableValue::Number(n)) if *n == 1.0);
    let is_declare = |op: Opcode| matches!(op, Opcode::Let | Opcode::Mut);

    while i < end {
        let Entity::Inst(first, arg_1) = block[i] else {
            out.push(block[i]);
            i += 1;
            continue;
        };

        let second = match block.get(i + 1) {
            Some(Entity::Inst(op, arg)) => Some((*op, *arg)),
            _ => None,
        };
        let third = match block.get(i + 2) {
            Some(Entity::Inst(op, arg)) => Some((*op, *arg)),
            _ => None,
        };

        if let Some((second, arg_2)) = second {
            let packable = arg_1 <= MAX_12_BIT && arg_2 <= MAX_12_BIT;

            // LOAD_CONST x, LOAD_CONST y        -> LOAD_CONST_LOAD_CONST x y
            if first == Opcode::LoadConst && second == Opcode::LoadConst && packable {
                out.push(Entity::Inst2(Opcode::LoadConstLoadConst, arg_1, arg_2));
                i += 2;
                continue;
            }
            // LOAD_CONST x, LET/MUT a           -> LOAD_CONST_STORE x a
            if first == Opcode::LoadConst && is_declare(second) && packable {
                out.push(Entity::Inst2(Opcode::LoadConstStore, arg_1, arg_2));
                i += 2;
                continue;
            }
            // LOAD_CONST x, STORE a             -> LOAD_CONST_SET_VAL x a
            if first == Opcode::LoadConst && second == Opcode::Store && packable {
                out.push(Entity::Inst2(Opcode::LoadConstSetVal, arg_1, arg_2));
                i += 2;
                continue;
            }
            // LOAD_SYMBOL a, LET/MUT b          -> STORE_FROM a b
            if first == Opcode::LoadSymbol && is_declare(second) && packable {
                out.push(Entity::Inst2(Opcode::StoreFrom, arg_1, arg_2));
                i += 2;
                continue;
            }
            // LOAD_SYMBOL a, STORE b            -> SET_VAL_FROM a b
            if first == Opcode::LoadSymbol && second == Opcode::Store && packable {
                out.push(Entity::Inst2(Opcode::SetValFrom, arg_1, arg_2));
                i += 2;
                continue;
            }

            if let Some((third, arg_3)) = third {
                let pack_13 = arg_1 <= MAX_12_BIT && arg_3 <= MAX_12_BIT;

                // LOAD_CONST 1, LOAD_SYMBOL a, ADD -> INCREMENT a
                if third == Opcode::Add
                    && first == Opcode::LoadConst
                    && second == Opcode::LoadSymbol
                    && is_one(arg_1)
                {
                    trace!(symbol = arg_2, "fusing increment");
                    out.push(Entity::Inst(Opcode::Increment, arg_2));
                    i += 3;
                    continue;
                }
                // LOAD_SYMBOL a, LOAD_CONST 1, ADD -> INCREMENT a
                if third == Opcode::Add
                    && first == Opcode::LoadSymbol
                    && second == Opcode::LoadConst
                    && is_one(arg_2)
                {
                    out.push(Entity::Inst(Opcode::Increment, arg_1));
                    i += 3;
                    continue;
                }
                // LOAD_SYMBOL a, LOAD_CONST 1, SUB -> DECREMENT a
                // (only this operand order: 1 - a is not a decrement)
                if third == Opcode::Sub
                    && first == Opcode::LoadSymbol
                    && second == Opcode::LoadConst
                    && is_one(arg_2)
                {
                    out.push(Entity::Inst(Opcode::Decrement, arg_1));
                    i += 3;
                    continue;
                }
                // LOAD_SYMBOL list, TAIL/HEAD, LET/MUT|STORE a
                if first == Opcode::LoadSymbol && second == Opcode::Tail && pack_13 {
                    if is_declare(third) {
                        out.push(Entity::Inst2(Opcode::StoreTail, arg_1, arg_3));
                        i += 3;
                        continue;
                    }
                    if third == Opcode::Store {
                        out.push(Entity::Inst2(Opcode::SetValTail, arg_1, arg_3));
                        i += 3;
                        continue;
                    }
                }
                if first == Opcode::LoadSymbol && second == Opcode::Head && pack_13 {
                    if is_declare(third) {
                        out.push(Entity::Inst2(Opcode::StoreHead, arg_1, arg_3));
                        i += 3;
                        continue;
                    }
                    if third == Opcode::Store {
                        out.push(Entity::Inst2(Opcode::SetValHead, arg_1, arg_3));
                        i += 3;
                        continue;
                    }
                }
            }
        }

        out.push(block[i]);
        i += 1;
    }
    out
}
