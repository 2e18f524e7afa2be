//! ark-ir - Instruction set and AST-to-bytecode lowering.
//!
//! The [`Compiler`] lowers a resolved AST into IR blocks (one per function
//! plus the main block), the [`IrOptimizer`] fuses common instruction
//! pairs, and [`link`](entity::link) resolves labels into page-relative
//! jump targets, producing the final [`Program`].

mod compiler;
mod entity;
mod instruction;
mod optimizer;

pub use compiler::{Compiler, IrProgram, Program, TableValue};
pub use entity::{link, Entity, LabelId};
pub use instruction::{Opcode, Word, FIRST_FUSED, FIRST_OPERATOR, VARIADIC_ARITY_BIT};
pub use optimizer::IrOptimizer;
