//! The dynamic vector: an ordered, growable sequence of untyped values.
//!
//! `DynVec` owns its elements. Element handles are counted, so pushing a vector
//! into another vector shares it rather than copying it. Reading an element returns
//! a new handle via `clone_with_heap`, and every element that leaves the vector
//! without being returned (overwritten by `set`, removed by `clear`) is released.
//!
//! Growth is never vetoed here: the VM asks the heap's resource tracker for
//! permission (`on_container_insert`) before calling `push` or `extend`.

use std::slice;

use crate::{
    exception::{Exception, RunResult},
    heap::{DropWithHeap, Heap},
    resource::ResourceTracker,
    value::Value,
};

#[derive(Debug, Default)]
pub(crate) struct DynVec(Vec<Value>);

impl DynVec {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a vector from already-owned values, preserving order.
    #[must_use]
    pub fn from_values(values: Vec<Value>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends `value`, taking ownership of its handle.
    pub fn push(&mut self, value: Value) {
        self.0.push(value);
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = Value>) {
        self.0.extend(values);
    }

    /// Removes the last element and hands its handle to the caller.
    pub fn pop(&mut self) -> Option<Value> {
        self.0.pop()
    }

    /// Returns a new handle to the element at `index`.
    pub fn get(&self, index: usize, heap: &Heap<impl ResourceTracker>) -> RunResult<Value> {
        self.0
            .get(index)
            .map(|value| value.clone_with_heap(heap))
            .ok_or_else(|| Exception::out_of_bounds(index, self.len()))
    }

    /// Replaces the element at `index`, releasing the displaced value.
    ///
    /// On `OutOfBounds` the rejected value is released instead, so the caller never
    /// has to clean up after a failed write.
    pub fn set(&mut self, index: usize, value: Value, heap: &mut Heap<impl ResourceTracker>) -> RunResult<()> {
        let len = self.len();
        match self.0.get_mut(index) {
            Some(slot) => {
                let old = std::mem::replace(slot, value);
                old.drop_with_heap(heap);
                Ok(())
            }
            None => {
                value.drop_with_heap(heap);
                Err(Exception::out_of_bounds(index, len))
            }
        }
    }

    /// Removes every element, releasing each one.
    pub fn clear(&mut self, heap: &mut Heap<impl ResourceTracker>) {
        std::mem::take(&mut self.0).drop_with_heap(heap);
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Value] {
        &self.0
    }

    /// Borrowing front-to-back walk over the elements.
    ///
    /// This is the host-side view; scripts iterate through a heap-resident [`super::VecIter`],
    /// which keeps its own handle on the vector.
    pub fn iter(&self) -> slice::Iter<'_, Value> {
        self.0.iter()
    }

    /// Borrowing back-to-front walk over the elements.
    pub fn iter_rev(&self) -> std::iter::Rev<slice::Iter<'_, Value>> {
        self.0.iter().rev()
    }

    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exception::ErrorKind, heap::HeapData, resource::NoLimitTracker, types::Str};

    fn hello(heap: &mut Heap<NoLimitTracker>) -> Value {
        Value::Ref(heap.allocate(HeapData::Str(Str::from("Hello"))).unwrap())
    }

    #[test]
    fn push_preserves_order_and_length() {
        let heap = Heap::new(NoLimitTracker);
        let mut v = DynVec::new();
        for i in 0..5_i64 {
            v.push(Value::Int(i * 10));
        }
        assert_eq!(v.len(), 5);
        for (index, expected) in [0, 10, 20, 30, 40].into_iter().enumerate() {
            assert!(matches!(v.get(index, &heap), Ok(Value::Int(n)) if n == expected));
        }
    }

    #[test]
    fn get_past_end_is_out_of_bounds() {
        let heap = Heap::new(NoLimitTracker);
        let v = DynVec::from_values(vec![Value::Int(1), Value::Int(2)]);
        let err = v.get(5, &heap).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
        assert_eq!(err.message(), "index 5 is out of bounds for length 2");
    }

    #[test]
    fn mixed_elements_walk_both_ways() {
        let mut heap = Heap::new(NoLimitTracker);
        let mut v = DynVec::new();
        let s = hello(&mut heap);
        v.push(s);
        v.push(Value::Int(42));

        let forward: Vec<String> = v.iter().map(|value| value.repr(&heap)).collect();
        assert_eq!(forward, vec![r#""Hello""#, "42"]);
        let reverse: Vec<String> = v.iter_rev().map(|value| value.repr(&heap)).collect();
        assert_eq!(reverse, vec!["42", r#""Hello""#]);
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn set_releases_displaced_value() {
        let mut heap = Heap::new(NoLimitTracker);
        let s = hello(&mut heap);
        let id = s.ref_id().unwrap();
        let mut v = DynVec::from_values(vec![s]);

        v.set(0, Value::Int(7), &mut heap).unwrap();
        assert_eq!(heap.refcount(id), 0);
        assert!(matches!(v.get(0, &heap), Ok(Value::Int(7))));
    }

    #[test]
    fn failed_set_releases_rejected_value() {
        let mut heap = Heap::new(NoLimitTracker);
        let s = hello(&mut heap);
        let id = s.ref_id().unwrap();
        let mut v = DynVec::new();

        let err = v.set(0, s, &mut heap).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
        assert_eq!(heap.refcount(id), 0);
        assert!(v.is_empty());
    }

    #[test]
    fn get_shares_heap_elements() {
        let mut heap = Heap::new(NoLimitTracker);
        let s = hello(&mut heap);
        let id = s.ref_id().unwrap();
        let mut v = DynVec::from_values(vec![s]);

        let copy = v.get(0, &heap).unwrap();
        assert_eq!(heap.refcount(id), 2);
        copy.drop_with_heap(&mut heap);
        v.clear(&mut heap);
        assert_eq!(heap.refcount(id), 0);
    }

    #[test]
    fn pop_returns_last() {
        let mut v = DynVec::from_values(vec![Value::Int(1), Value::Int(2)]);
        assert!(matches!(v.pop(), Some(Value::Int(2))));
        v.extend([Value::Int(3), Value::Int(4)]);
        assert_eq!(v.len(), 3);
    }
}
