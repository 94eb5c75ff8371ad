//! Stack VM executing [`Code`].
//!
//! The VM owns its operand stack and locals and borrows the heap, the print writer
//! and the code for the duration of one run. Every value on the stack or in a local
//! holds one counted handle; instructions that consume a value release it with
//! `drop_with_heap`, and a run that ends (normally or by error) releases whatever
//! is left.

use std::{borrow::Cow, mem};

use super::{Code, Inst};
use crate::{
    exception::{ErrorKind, Exception, RunResult},
    heap::{DropWithHeap, Heap, HeapData, HeapId},
    io::PrintWriter,
    resource::ResourceTracker,
    tracer::{NoopTracer, VmTracer},
    types::{Direction, DynVec, Str, Tuple, VecIter},
    value::Value,
};

/// The bytecode virtual machine.
pub(crate) struct VM<'a, T: ResourceTracker, P: PrintWriter, Tr: VmTracer = NoopTracer> {
    /// Operand stack.
    stack: Vec<Value>,
    /// Local slots; the first `code.num_inputs()` hold the run's inputs.
    locals: Vec<Value>,
    heap: &'a mut Heap<T>,
    code: &'a Code,
    print_writer: &'a mut P,
    tracer: Tr,
    /// Offset of the next instruction.
    ip: usize,
}

impl<'a, T: ResourceTracker, P: PrintWriter, Tr: VmTracer> VM<'a, T, P, Tr> {
    pub fn new(code: &'a Code, heap: &'a mut Heap<T>, print_writer: &'a mut P, tracer: Tr) -> Self {
        Self {
            stack: Vec::new(),
            locals: Vec::new(),
            heap,
            code,
            print_writer,
            tracer,
            ip: 0,
        }
    }

    pub fn into_tracer(self) -> Tr {
        self.tracer
    }

    /// Runs the code to completion with `inputs` in the first local slots.
    ///
    /// Falling off the end of the instruction stream returns `()`. Errors carry the
    /// offset of the instruction that raised them.
    pub fn run(&mut self, inputs: Vec<Value>) -> RunResult<Value> {
        self.ip = 0;
        self.locals = inputs;
        self.locals
            .resize_with(usize::from(self.code.num_locals()).max(self.locals.len()), || Value::Unit);

        let result = self.run_loop();
        self.release_frame();
        result
    }

    fn run_loop(&mut self) -> RunResult<Value> {
        loop {
            let Some(&inst) = self.code.instructions().get(self.ip) else {
                self.tracer.on_return(self.ip);
                return Ok(Value::Unit);
            };
            let ip = self.ip;
            self.ip += 1;

            // For NoLimitTracker and NoopTracer these compile away.
            self.heap.tracker_mut().check_time().map_err(|e| Exception::from(e).with_ip(ip))?;
            self.tracer.on_instruction(ip, inst, self.stack.len());

            match self.step(ip, inst) {
                Ok(None) => {}
                Ok(Some(value)) => {
                    self.tracer.on_return(ip);
                    return Ok(value);
                }
                Err(err) => return Err(err.with_ip(ip)),
            }
        }
    }

    /// Executes one instruction, returning `Some` when the run is done.
    fn step(&mut self, ip: usize, inst: Inst) -> RunResult<Option<Value>> {
        match inst {
            // Stack operations
            Inst::LoadConst(index) => {
                let constant = self
                    .code
                    .constants()
                    .get(usize::from(index))
                    .ok_or_else(|| Exception::invalid_code(format!("constant {index} does not exist")))?
                    .clone();
                let value = constant.to_value(self.heap)?;
                self.stack.push(value);
            }
            Inst::LoadUnit => self.stack.push(Value::Unit),
            Inst::LoadLocal(slot) => {
                let value = self.local(slot)?.clone_with_heap(self.heap);
                self.stack.push(value);
            }
            Inst::StoreLocal(slot) => {
                let value = self.pop()?;
                let target = self
                    .locals
                    .get_mut(usize::from(slot))
                    .ok_or_else(|| Exception::invalid_code(format!("local {slot} does not exist")))?;
                mem::replace(target, value).drop_with_heap(self.heap);
            }
            Inst::Dup => {
                let top = self
                    .stack
                    .last()
                    .ok_or_else(|| Exception::invalid_code("stack underflow"))?
                    .clone_with_heap(self.heap);
                self.stack.push(top);
            }
            Inst::Pop => self.pop()?.drop_with_heap(self.heap),

            // Construction
            Inst::BuildVec(count) => {
                let values = self.pop_n(count)?;
                let id = self
                    .heap
                    .allocate_container(values, |values| HeapData::Vec(DynVec::from_values(values)))?;
                self.stack.push(Value::Ref(id));
            }
            Inst::BuildTuple(count) => {
                let values = self.pop_n(count)?;
                let id = self
                    .heap
                    .allocate_container(values, |values| HeapData::Tuple(Tuple::new(values)))?;
                self.stack.push(Value::Ref(id));
            }

            // Containers
            Inst::IndexGet => {
                let index = self.pop()?;
                let container = self.pop()?;
                let result = self.index_get(&container, &index);
                container.drop_with_heap(self.heap);
                index.drop_with_heap(self.heap);
                self.stack.push(result?);
            }
            Inst::IndexSet => {
                let value = self.pop()?;
                let index = self.pop()?;
                let container = self.pop()?;
                let result = self.index_set(&container, &index, value);
                container.drop_with_heap(self.heap);
                index.drop_with_heap(self.heap);
                result?;
            }
            Inst::Push => {
                let value = self.pop()?;
                let container = self.pop()?;
                let result = self.push_onto(&container, value);
                container.drop_with_heap(self.heap);
                result?;
            }
            Inst::Len => {
                let container = self.pop()?;
                let result = self.len_of(&container);
                container.drop_with_heap(self.heap);
                self.stack.push(result?);
            }
            Inst::Add => {
                let rhs = self.pop()?;
                let lhs = self.pop()?;
                let result = self.add(&lhs, &rhs);
                lhs.drop_with_heap(self.heap);
                rhs.drop_with_heap(self.heap);
                self.stack.push(result?);
            }

            // Iteration
            Inst::Iter => self.make_iter(Direction::Forward)?,
            Inst::IterRev => self.make_iter(Direction::Reverse)?,
            Inst::ForIter(target) => {
                let iter = self
                    .stack
                    .last()
                    .ok_or_else(|| Exception::invalid_code("stack underflow"))?;
                let id = self.iter_id(iter)?;
                if let Some(item) = self.advance(id) {
                    self.stack.push(item);
                } else {
                    self.pop()?.drop_with_heap(self.heap);
                    self.tracer.on_iter_exhausted(ip);
                    self.jump(target)?;
                }
            }
            Inst::IterNext(target) => {
                let iter = self.pop()?;
                let next = self.iter_id(&iter).map(|id| self.advance(id));
                iter.drop_with_heap(self.heap);
                if let Some(item) = next? {
                    self.stack.push(item);
                } else {
                    self.tracer.on_iter_exhausted(ip);
                    self.jump(target)?;
                }
            }

            // Output and control flow
            Inst::Print => {
                let value = self.pop()?;
                let text = value.display(self.heap);
                value.drop_with_heap(self.heap);
                self.print_writer.stdout_write(Cow::Owned(text))?;
                self.print_writer.stdout_push('\n')?;
            }
            Inst::Jump(target) => self.jump(target)?,
            Inst::Return => return Ok(Some(self.stack.pop().unwrap_or(Value::Unit))),
        }
        Ok(None)
    }

    fn pop(&mut self) -> RunResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| Exception::invalid_code("stack underflow"))
    }

    /// Pops the top `count` values, keeping their stack order.
    fn pop_n(&mut self, count: u16) -> RunResult<Vec<Value>> {
        let count = usize::from(count);
        let start = self
            .stack
            .len()
            .checked_sub(count)
            .ok_or_else(|| Exception::invalid_code("stack underflow"))?;
        Ok(self.stack.split_off(start))
    }

    fn local(&self, slot: u16) -> RunResult<&Value> {
        self.locals
            .get(usize::from(slot))
            .ok_or_else(|| Exception::invalid_code(format!("local {slot} does not exist")))
    }

    fn jump(&mut self, target: u32) -> RunResult<()> {
        self.ip = usize::try_from(target)
            .map_err(|_| Exception::invalid_code(format!("jump target {target} is out of range")))?;
        Ok(())
    }

    fn index_get(&self, container: &Value, index: &Value) -> RunResult<Value> {
        let heap = &*self.heap;
        match container.ref_id().and_then(|id| heap.get_if_live(id)) {
            Some(HeapData::Vec(v)) => v.get(resolve_index(index, v.len(), heap)?, heap),
            Some(HeapData::Tuple(t)) => t.get(resolve_index(index, t.len(), heap)?, heap),
            Some(HeapData::Str(s)) => {
                let len = s.char_len();
                let i = resolve_index(index, len, heap)?;
                s.char_at(i)
                    .map(Value::Char)
                    .ok_or_else(|| Exception::out_of_bounds(i, len))
            }
            _ => Err(Exception::type_mismatch(format!(
                "{} is not indexable",
                container.kind(heap)
            ))),
        }
    }

    /// Writes `value` into a vector slot. `value` is consumed whether or not the write succeeds.
    fn index_set(&mut self, container: &Value, index: &Value, value: Value) -> RunResult<()> {
        let Some(id) = self.vec_id(container) else {
            let err = Exception::type_mismatch(format!(
                "{} does not support item assignment",
                container.kind(self.heap)
            ));
            value.drop_with_heap(self.heap);
            return Err(err);
        };
        self.heap.with_entry_mut(id, |heap, data| {
            let HeapData::Vec(v) = data else {
                value.drop_with_heap(heap);
                return Err(Exception::type_mismatch("item assignment target is not a vec"));
            };
            match resolve_index(index, v.len(), heap) {
                Ok(i) => v.set(i, value, heap),
                Err(err) => {
                    value.drop_with_heap(heap);
                    Err(err)
                }
            }
        })
    }

    /// Appends `value` to a vector, asking the resource tracker first.
    fn push_onto(&mut self, container: &Value, value: Value) -> RunResult<()> {
        let Some(id) = self.vec_id(container) else {
            let err = Exception::type_mismatch(format!("{} has no method push", container.kind(self.heap)));
            value.drop_with_heap(self.heap);
            return Err(err);
        };
        if let Err(err) = self.heap.tracker_mut().on_container_insert() {
            value.drop_with_heap(self.heap);
            return Err(err.into());
        }
        if let HeapData::Vec(v) = self.heap.get_mut(id) {
            v.push(value);
        }
        Ok(())
    }

    fn len_of(&self, container: &Value) -> RunResult<Value> {
        let heap = &*self.heap;
        let len = match container.ref_id().and_then(|id| heap.get_if_live(id)) {
            Some(HeapData::Vec(v)) => v.len(),
            Some(HeapData::Tuple(t)) => t.len(),
            Some(HeapData::Str(s)) => s.char_len(),
            _ => {
                return Err(Exception::type_mismatch(format!(
                    "{} has no len",
                    container.kind(heap)
                )));
            }
        };
        i64::try_from(len)
            .map(Value::Int)
            .map_err(|_| Exception::new(ErrorKind::Overflow, "length does not fit in an int"))
    }

    fn add(&mut self, lhs: &Value, rhs: &Value) -> RunResult<Value> {
        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(*b)
                .map(Value::Int)
                .ok_or_else(|| Exception::new(ErrorKind::Overflow, format!("{a} + {b} overflows an int"))),
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(a + b)),
            (Value::Int(a), Value::Float(b)) => Ok(Value::Float(*a as f64 + b)),
            (Value::Float(a), Value::Int(b)) => Ok(Value::Float(a + *b as f64)),
            (Value::Ref(a), Value::Ref(b)) => {
                let data = match (self.heap.get_if_live(*a), self.heap.get_if_live(*b)) {
                    (Some(HeapData::Str(x)), Some(HeapData::Str(y))) => {
                        HeapData::Str(Str::new(format!("{}{}", x.as_str(), y.as_str())))
                    }
                    (Some(HeapData::Vec(x)), Some(HeapData::Vec(y))) => {
                        let values = x
                            .iter()
                            .chain(y.iter())
                            .map(|value| value.clone_with_heap(self.heap))
                            .collect();
                        return Ok(Value::Ref(
                            self.heap
                                .allocate_container(values, |values| HeapData::Vec(DynVec::from_values(values)))?,
                        ));
                    }
                    _ => return Err(self.add_mismatch(lhs, rhs)),
                };
                Ok(Value::Ref(self.heap.allocate(data)?))
            }
            _ => Err(self.add_mismatch(lhs, rhs)),
        }
    }

    fn add_mismatch(&self, lhs: &Value, rhs: &Value) -> Exception {
        Exception::type_mismatch(format!(
            "cannot add {} and {}",
            lhs.kind(self.heap),
            rhs.kind(self.heap)
        ))
    }

    /// Replaces the source on top of the stack with a heap-resident iterator over it.
    fn make_iter(&mut self, direction: Direction) -> RunResult<()> {
        let source = self.pop()?;
        let iter = VecIter::new(&source, direction, self.heap);
        source.drop_with_heap(self.heap);
        let iter = iter?;

        let (len, _) = iter.size_hint(self.heap);
        let (source_id, generation) = (iter.source(), iter.generation());
        match self.heap.allocate(HeapData::Iter(iter)) {
            Ok(id) => {
                self.tracer.on_iter_create(direction, len);
                self.stack.push(Value::Ref(id));
                Ok(())
            }
            Err(err) => {
                // the rejected iterator still holds a handle on its source
                if self.heap.is_live(source_id, generation) {
                    self.heap.dec_ref(source_id);
                }
                Err(err.into())
            }
        }
    }

    fn iter_id(&self, value: &Value) -> RunResult<HeapId> {
        match value.ref_id() {
            Some(id) if matches!(self.heap.get_if_live(id), Some(HeapData::Iter(_))) => Ok(id),
            _ => Err(Exception::type_mismatch(format!(
                "{} is not an iterator",
                value.kind(self.heap)
            ))),
        }
    }

    fn vec_id(&self, value: &Value) -> Option<HeapId> {
        value
            .ref_id()
            .filter(|id| matches!(self.heap.get_if_live(*id), Some(HeapData::Vec(_))))
    }

    /// Steps the iterator stored at `id`.
    fn advance(&mut self, id: HeapId) -> Option<Value> {
        self.heap.with_entry_mut(id, |heap, data| match data {
            HeapData::Iter(it) => it.next(heap),
            _ => None,
        })
    }

    /// Releases everything still on the stack or in a local.
    fn release_frame(&mut self) {
        mem::take(&mut self.stack).drop_with_heap(self.heap);
        mem::take(&mut self.locals).drop_with_heap(self.heap);
    }
}

/// Turns an index operand into a position within `0..len`.
fn resolve_index(index: &Value, len: usize, heap: &Heap<impl ResourceTracker>) -> RunResult<usize> {
    match index {
        Value::Int(i) => usize::try_from(*i)
            .ok()
            .filter(|&i| i < len)
            .ok_or_else(|| Exception::out_of_bounds(i, len)),
        other => Err(Exception::type_mismatch(format!(
            "index must be int, got {}",
            other.kind(heap)
        ))),
    }
}
