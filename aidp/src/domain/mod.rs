//! Domain types for the work loop

mod instruction;
mod task;
mod unit;

pub use instruction::{Instruction, InstructionKind, InstructionPriority};
pub use task::{MAX_DESCRIPTION_LEN, Task, TaskPriority, TaskStatus};
pub use unit::{NextMap, Unit, UnitDefinition, UnitKind, UnitResult, UnitStatus};

/// True when `s` still has content after trimming whitespace.
pub(crate) fn trimmed_non_empty(s: &str) -> bool {
    !s.trim().is_empty()
}
