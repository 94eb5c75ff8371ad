//! Builder for assembling instruction streams.
//!
//! `CodeBuilder` hands out input and local slots, collects constants, and patches
//! forward jumps once their target is known. Size overflows are remembered and
//! reported by `build()`, so emitting never fails.

use super::{
    Inst,
    code::{Code, CodeError},
};
use crate::object::Object;

/// Builder for [`Code`].
///
/// # Usage
///
/// ```
/// use strand::{CodeBuilder, Inst, Object};
///
/// // for x in [1, 2] { print(x) }
/// let mut b = CodeBuilder::new("loop");
/// b.emit_const(Object::Vec(vec![Object::Int(1), Object::Int(2)]));
/// b.emit(Inst::Iter);
/// let head = b.offset();
/// let exit = b.emit_for_iter();
/// b.emit(Inst::Print);
/// b.emit_jump(head);
/// b.patch_jump(exit);
/// let code = b.build().unwrap();
/// assert_eq!(code.instructions().len(), 5);
/// ```
#[derive(Debug, Default)]
pub struct CodeBuilder {
    name: String,
    instructions: Vec<Inst>,
    constants: Vec<Object>,
    num_inputs: u16,
    num_locals: u16,
    /// Labels handed out by `emit_for_iter`/`emit_iter_next`/`emit_forward_jump` and not yet patched.
    pending: Vec<usize>,
    /// First overflow hit while emitting.
    error: Option<CodeError>,
}

/// Placeholder target for jumps that have not been patched yet.
const UNPATCHED: u32 = u32::MAX;

impl CodeBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Declares the next input slot. Inputs take the first local slots, in order.
    pub fn input(&mut self) -> u16 {
        if self.num_locals > self.num_inputs {
            self.fail(CodeError::InputAfterLocal);
        }
        let slot = self.local();
        self.num_inputs = self.num_locals;
        slot
    }

    /// Declares a fresh local slot, initialized to `()`.
    pub fn local(&mut self) -> u16 {
        let slot = self.num_locals;
        match self.num_locals.checked_add(1) {
            Some(n) => self.num_locals = n,
            None => self.fail(CodeError::TooManyLocals),
        }
        slot
    }

    pub fn emit(&mut self, inst: Inst) {
        self.instructions.push(inst);
    }

    /// Adds `value` to the constant pool and emits a `LoadConst` for it.
    pub fn emit_const(&mut self, value: impl Into<Object>) {
        let index = u16::try_from(self.constants.len()).unwrap_or_else(|_| {
            self.fail(CodeError::TooManyConstants);
            0
        });
        self.constants.push(value.into());
        self.emit(Inst::LoadConst(index));
    }

    /// Offset the next emitted instruction will have; use it as a backward jump target.
    #[must_use]
    pub fn offset(&mut self) -> u32 {
        u32::try_from(self.instructions.len()).unwrap_or_else(|_| {
            self.fail(CodeError::TooManyInstructions);
            UNPATCHED
        })
    }

    /// Emits a `ForIter` whose exit target is patched later.
    #[must_use]
    pub fn emit_for_iter(&mut self) -> JumpLabel {
        self.emit_forward(Inst::ForIter(UNPATCHED))
    }

    /// Emits an `IterNext` whose exhausted target is patched later.
    #[must_use]
    pub fn emit_iter_next(&mut self) -> JumpLabel {
        self.emit_forward(Inst::IterNext(UNPATCHED))
    }

    /// Emits an unconditional `Jump` whose target is patched later.
    #[must_use]
    pub fn emit_forward_jump(&mut self) -> JumpLabel {
        self.emit_forward(Inst::Jump(UNPATCHED))
    }

    /// Emits a jump to a known offset.
    pub fn emit_jump(&mut self, target: u32) {
        self.emit(Inst::Jump(target));
    }

    /// Points a forward jump at the current offset.
    pub fn patch_jump(&mut self, label: JumpLabel) {
        let target = self.offset();
        self.pending.retain(|&at| at != label.0);
        if let Some(Inst::ForIter(t) | Inst::IterNext(t) | Inst::Jump(t)) = self.instructions.get_mut(label.0) {
            *t = target;
        }
    }

    /// Finishes the code, validating every operand.
    ///
    /// # Errors
    /// The first overflow recorded while emitting, an unpatched jump, or any
    /// error from [`Code::validate`].
    pub fn build(mut self) -> Result<Code, CodeError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if let Some(&at) = self.pending.iter().min() {
            return Err(CodeError::UnpatchedJump { at });
        }
        Code::new(
            self.name,
            self.instructions,
            self.constants,
            self.num_inputs,
            self.num_locals,
        )
    }

    fn emit_forward(&mut self, inst: Inst) -> JumpLabel {
        let at = self.instructions.len();
        self.emit(inst);
        self.pending.push(at);
        JumpLabel(at)
    }

    fn fail(&mut self, err: CodeError) {
        self.error.get_or_insert(err);
    }
}

/// Label for a forward jump that needs patching.
///
/// Pass this to `patch_jump()` once the target location is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JumpLabel(usize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_loop_patches_exit() {
        let mut b = CodeBuilder::new("t");
        let v = b.input();
        b.emit(Inst::LoadLocal(v));
        b.emit(Inst::Iter);
        let head = b.offset();
        let exit = b.emit_for_iter();
        b.emit(Inst::Pop);
        b.emit_jump(head);
        b.patch_jump(exit);
        b.emit(Inst::LoadUnit);
        b.emit(Inst::Return);
        let code = b.build().unwrap();
        assert_eq!(code.instructions()[2], Inst::ForIter(5));
        assert_eq!(code.num_inputs(), 1);
    }

    #[test]
    fn unpatched_jump_fails_build() {
        let mut b = CodeBuilder::new("t");
        b.emit(Inst::LoadUnit);
        let _never = b.emit_iter_next();
        assert_eq!(b.build(), Err(CodeError::UnpatchedJump { at: 1 }));
    }

    #[test]
    fn inputs_come_first() {
        let mut b = CodeBuilder::new("t");
        b.local();
        b.input();
        assert_eq!(b.build(), Err(CodeError::InputAfterLocal));
    }
}
