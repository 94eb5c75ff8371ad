use serde::{Deserialize, Serialize};
use strum::IntoStaticStr;

/// One VM instruction.
///
/// Stack effects are written `[before] -> [after]`, top of stack last.
/// Jump operands are absolute instruction offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, Serialize, Deserialize)]
pub enum Inst {
    // Stack operations
    /// `[] -> [constant]`. Heap constants are materialized fresh on every load.
    LoadConst(u16),
    /// `[] -> [()]`
    LoadUnit,
    /// `[] -> [local]`
    LoadLocal(u16),
    /// `[value] -> []`
    StoreLocal(u16),
    /// `[a] -> [a, a]`
    Dup,
    /// `[a] -> []`
    Pop,

    // Construction
    /// `[v0, .., vn-1] -> [vec]`
    BuildVec(u16),
    /// `[v0, .., vn-1] -> [tuple]`
    BuildTuple(u16),

    // Containers
    /// `[container, index] -> [element]`. Works on vectors, tuples and strings.
    IndexGet,
    /// `[vec, index, value] -> []`
    IndexSet,
    /// `[vec, value] -> []`
    Push,
    /// `[container] -> [len]`
    Len,
    /// `[a, b] -> [a + b]`. Ints (checked), floats, string and vector concatenation.
    Add,

    // Iteration
    /// `[source] -> [iterator]`, walking front to back.
    Iter,
    /// `[source] -> [iterator]`, walking back to front.
    IterRev,
    /// Loop header. `[iterator] -> [iterator, item]`, or pops the iterator and
    /// jumps to the operand once it is exhausted.
    ForIter(u32),
    /// Explicit cursor step. `[iterator] -> [item]`, or `[iterator] -> []` and a
    /// jump to the operand once it is exhausted.
    IterNext(u32),

    // Output and control flow
    /// `[value] -> []`, writing the value and a newline to the print writer.
    Print,
    Jump(u32),
    /// `[value] -> ` returns `value` to the host; `()` when the stack is empty.
    Return,
}

impl Inst {
    /// Jump target, for instructions that have one.
    #[must_use]
    pub fn jump_target(self) -> Option<u32> {
        match self {
            Self::ForIter(target) | Self::IterNext(target) | Self::Jump(target) => Some(target),
            _ => None,
        }
    }

    /// Name of the instruction without its operand, e.g. `"ForIter"`.
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}
