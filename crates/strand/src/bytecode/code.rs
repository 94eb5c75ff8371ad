use std::fmt;

use serde::{Deserialize, Serialize};

use super::Inst;
use crate::object::Object;

/// A validated instruction stream with its constant pool.
///
/// Locals `0..num_inputs` are filled with the run's inputs; the remaining locals
/// start out as `()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Code {
    name: String,
    instructions: Vec<Inst>,
    constants: Vec<Object>,
    num_inputs: u16,
    num_locals: u16,
}

impl Code {
    /// Assembles and validates code.
    ///
    /// # Errors
    /// Returns `CodeError` if any operand refers outside the constant pool, the
    /// locals, or the instruction stream, or a constant is output-only.
    pub fn new(
        name: impl Into<String>,
        instructions: Vec<Inst>,
        constants: Vec<Object>,
        num_inputs: u16,
        num_locals: u16,
    ) -> Result<Self, CodeError> {
        let code = Self {
            name: name.into(),
            instructions,
            constants,
            num_inputs,
            num_locals,
        };
        code.validate()?;
        Ok(code)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn instructions(&self) -> &[Inst] {
        &self.instructions
    }

    #[must_use]
    pub fn constants(&self) -> &[Object] {
        &self.constants
    }

    #[must_use]
    pub fn num_inputs(&self) -> u16 {
        self.num_inputs
    }

    #[must_use]
    pub fn num_locals(&self) -> u16 {
        self.num_locals
    }

    /// Checks every operand. Jumping to `instructions.len()` is allowed and ends the run.
    ///
    /// # Errors
    /// The first problem found, in instruction order.
    pub fn validate(&self) -> Result<(), CodeError> {
        if self.num_inputs > self.num_locals {
            return Err(CodeError::TooManyInputs {
                inputs: self.num_inputs,
                locals: self.num_locals,
            });
        }
        if let Some(index) = self.constants.iter().position(|c| matches!(c, Object::Repr(_))) {
            return Err(CodeError::OutputOnlyConstant { index });
        }
        let end = self.instructions.len();
        for (at, inst) in self.instructions.iter().enumerate() {
            match *inst {
                Inst::LoadConst(index) if usize::from(index) >= self.constants.len() => {
                    return Err(CodeError::ConstOutOfRange { at, index });
                }
                Inst::LoadLocal(slot) | Inst::StoreLocal(slot) if slot >= self.num_locals => {
                    return Err(CodeError::LocalOutOfRange { at, slot });
                }
                Inst::ForIter(target) | Inst::IterNext(target) | Inst::Jump(target)
                    if !usize::try_from(target).is_ok_and(|t| t <= end) =>
                {
                    return Err(CodeError::JumpOutOfRange { at, target });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Display for Code {
    /// Disassembly, one instruction per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "code {} (inputs={}, locals={})",
            self.name, self.num_inputs, self.num_locals
        )?;
        for (at, inst) in self.instructions.iter().enumerate() {
            write!(f, "{at:>5}  {inst:?}")?;
            if let Inst::LoadConst(index) = inst
                && let Some(constant) = self.constants.get(usize::from(*index))
            {
                write!(f, "  ; {}", constant.repr())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Error returned when code is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeError {
    ConstOutOfRange { at: usize, index: u16 },
    LocalOutOfRange { at: usize, slot: u16 },
    JumpOutOfRange { at: usize, target: u32 },
    /// A forward jump label was never patched.
    UnpatchedJump { at: usize },
    /// `Repr` constants cannot be loaded.
    OutputOnlyConstant { index: usize },
    TooManyInputs { inputs: u16, locals: u16 },
    TooManyConstants,
    TooManyLocals,
    TooManyInstructions,
    /// An input slot was declared after a plain local.
    InputAfterLocal,
}

impl fmt::Display for CodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConstOutOfRange { at, index } => write!(f, "instruction {at}: constant {index} does not exist"),
            Self::LocalOutOfRange { at, slot } => write!(f, "instruction {at}: local {slot} does not exist"),
            Self::JumpOutOfRange { at, target } => write!(f, "instruction {at}: jump target {target} is out of range"),
            Self::UnpatchedJump { at } => write!(f, "instruction {at}: jump target was never set"),
            Self::OutputOnlyConstant { index } => write!(f, "constant {index} is output-only and cannot be loaded"),
            Self::TooManyInputs { inputs, locals } => write!(f, "{inputs} inputs do not fit in {locals} locals"),
            Self::TooManyConstants => f.write_str("more than 65536 constants"),
            Self::TooManyLocals => f.write_str("more than 65535 locals"),
            Self::TooManyInstructions => f.write_str("instruction offsets exceed u32"),
            Self::InputAfterLocal => f.write_str("inputs must be declared before locals"),
        }
    }
}

impl std::error::Error for CodeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jump_to_end_is_valid() {
        let code = Code::new("t", vec![Inst::Jump(1)], vec![], 0, 0);
        assert!(code.is_ok());
    }

    #[test]
    fn bad_operands_are_rejected() {
        assert_eq!(
            Code::new("t", vec![Inst::Jump(2)], vec![], 0, 0),
            Err(CodeError::JumpOutOfRange { at: 0, target: 2 })
        );
        assert_eq!(
            Code::new("t", vec![Inst::LoadUnit, Inst::LoadConst(0)], vec![], 0, 0),
            Err(CodeError::ConstOutOfRange { at: 1, index: 0 })
        );
        assert_eq!(
            Code::new("t", vec![Inst::StoreLocal(1)], vec![], 1, 1),
            Err(CodeError::LocalOutOfRange { at: 0, slot: 1 })
        );
        assert_eq!(
            Code::new("t", vec![], vec![Object::Repr("x".to_owned())], 0, 0),
            Err(CodeError::OutputOnlyConstant { index: 0 })
        );
    }

    #[test]
    fn disassembly_shows_constants() {
        let code = Code::new(
            "demo",
            vec![Inst::LoadConst(0), Inst::Return],
            vec![Object::String("Hello".to_owned())],
            0,
            0,
        )
        .unwrap();
        assert_eq!(
            code.to_string(),
            "code demo (inputs=0, locals=0)\n    0  LoadConst(0)  ; \"Hello\"\n    1  Return\n"
        );
    }
}
