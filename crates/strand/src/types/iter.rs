//! Cursors over vectors and tuples, used by `for` loops and explicit `iter()` calls.
//!
//! A `VecIter` stores indices rather than a Rust iterator, so `next()` only needs a
//! shared borrow of the heap and the iterator itself can live in a heap slot.
//!
//! The iterator holds a counted handle on its source together with the slot
//! generation it saw at creation. The index range `[front, back)` is fixed when the
//! iterator is created: elements pushed afterwards are not visited, element values
//! are read at the moment they are yielded, and a source that shrinks clamps the
//! range. If the source slot turns out to be dead or reused, the iterator reports
//! exhaustion instead of reading another object's data.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    exception::{Exception, RunResult},
    heap::{Heap, HeapData, HeapId},
    resource::ResourceTracker,
    value::Value,
};

/// Order in which an iterator walks its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Self::Forward => Self::Reverse,
            Self::Reverse => Self::Forward,
        }
    }
}

/// Remaining index range, or the sticky terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterState {
    Ready { front: usize, back: usize },
    Exhausted,
}

#[derive(Debug)]
pub(crate) struct VecIter {
    source: HeapId,
    generation: u32,
    direction: Direction,
    state: IterState,
}

impl VecIter {
    /// Creates a cursor over `source`, taking a new handle on it.
    ///
    /// Fails with `TypeMismatch` unless `source` is a vector or tuple.
    pub fn new(source: &Value, direction: Direction, heap: &Heap<impl ResourceTracker>) -> RunResult<Self> {
        let Some(id) = source.ref_id() else {
            return Err(Exception::not_iterable(source.kind(heap)));
        };
        let len = match heap.get_if_live(id) {
            Some(HeapData::Vec(v)) => v.len(),
            Some(HeapData::Tuple(t)) => t.len(),
            _ => return Err(Exception::not_iterable(source.kind(heap))),
        };
        heap.inc_ref(id);
        Ok(Self {
            source: id,
            generation: heap.generation(id),
            direction,
            state: IterState::Ready { front: 0, back: len },
        })
    }

    pub fn source(&self) -> HeapId {
        self.source
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.state == IterState::Exhausted
    }

    /// Yields a new handle to the next element, or `None` once the range is used up.
    ///
    /// After the first `None` every further call returns `None`.
    pub fn next(&mut self, heap: &Heap<impl ResourceTracker>) -> Option<Value> {
        let IterState::Ready { front, back } = self.state else {
            return None;
        };
        let Some(items) = self.items(heap) else {
            self.state = IterState::Exhausted;
            return None;
        };
        let back = back.min(items.len());
        if front >= back {
            self.state = IterState::Exhausted;
            return None;
        }
        let (index, state) = match self.direction {
            Direction::Forward => (front, IterState::Ready { front: front + 1, back }),
            Direction::Reverse => (back - 1, IterState::Ready { front, back: back - 1 }),
        };
        let value = items[index].clone_with_heap(heap);
        self.state = state;
        Some(value)
    }

    /// Number of elements still to be yielded, as `(lower, Some(upper))` bounds.
    #[must_use]
    pub fn size_hint(&self, heap: &Heap<impl ResourceTracker>) -> (usize, Option<usize>) {
        let remaining = match self.state {
            IterState::Ready { front, back } => self
                .items(heap)
                .map_or(0, |items| back.min(items.len()).saturating_sub(front)),
            IterState::Exhausted => 0,
        };
        (remaining, Some(remaining))
    }

    /// Returns a cursor over the same remaining range walking the other way.
    ///
    /// The returned iterator owns its own handle on the source; `self` is left untouched.
    #[must_use]
    pub fn rev(&self, heap: &Heap<impl ResourceTracker>) -> Self {
        let state = if self.is_exhausted() || self.items(heap).is_none() {
            IterState::Exhausted
        } else {
            heap.inc_ref(self.source);
            self.state
        };
        Self {
            source: self.source,
            generation: self.generation,
            direction: self.direction.flip(),
            state,
        }
    }

    /// Releases the source handle of an iterator that does not live in a heap slot.
    pub fn release(self, heap: &mut Heap<impl ResourceTracker>) {
        if heap.is_live(self.source, self.generation) {
            heap.dec_ref(self.source);
        }
    }

    fn items<'h>(&self, heap: &'h Heap<impl ResourceTracker>) -> Option<&'h [Value]> {
        if !heap.is_live(self.source, self.generation) {
            return None;
        }
        match heap.get_if_live(self.source)? {
            HeapData::Vec(v) => Some(v.as_slice()),
            HeapData::Tuple(t) => Some(t.as_slice()),
            HeapData::Str(_) | HeapData::Iter(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        heap::DropWithHeap,
        resource::NoLimitTracker,
        types::{DynVec, Str, Tuple},
    };

    fn hello_42(heap: &mut Heap<NoLimitTracker>) -> Value {
        let s = heap.allocate(HeapData::Str(Str::from("Hello"))).unwrap();
        let v = DynVec::from_values(vec![Value::Ref(s), Value::Int(42)]);
        Value::Ref(heap.allocate(HeapData::Vec(v)).unwrap())
    }

    fn drain(it: &mut VecIter, heap: &mut Heap<NoLimitTracker>) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(value) = it.next(heap) {
            out.push(value.repr(heap));
            value.drop_with_heap(heap);
        }
        out
    }

    #[test]
    fn forward_and_reverse_order() {
        let mut heap = Heap::new(NoLimitTracker);
        let v = hello_42(&mut heap);

        let mut fwd = VecIter::new(&v, Direction::Forward, &heap).unwrap();
        assert_eq!(drain(&mut fwd, &mut heap), vec![r#""Hello""#, "42"]);
        let mut rev = VecIter::new(&v, Direction::Reverse, &heap).unwrap();
        assert_eq!(drain(&mut rev, &mut heap), vec!["42", r#""Hello""#]);

        fwd.release(&mut heap);
        rev.release(&mut heap);
        v.drop_with_heap(&mut heap);
        assert_eq!(heap.stats().live_objects, 0);
    }

    #[test]
    fn exhaustion_is_sticky() {
        let mut heap = Heap::new(NoLimitTracker);
        let v = hello_42(&mut heap);
        let mut it = VecIter::new(&v, Direction::Forward, &heap).unwrap();
        drain(&mut it, &mut heap);
        assert!(it.is_exhausted());
        assert!(it.next(&heap).is_none());
        assert!(it.next(&heap).is_none());
        assert_eq!(it.size_hint(&heap), (0, Some(0)));
    }

    #[test]
    fn cursors_are_independent_and_restartable() {
        let mut heap = Heap::new(NoLimitTracker);
        let v = hello_42(&mut heap);
        let mut a = VecIter::new(&v, Direction::Forward, &heap).unwrap();
        a.next(&heap).drop_with_heap(&mut heap);

        let mut b = VecIter::new(&v, Direction::Forward, &heap).unwrap();
        assert_eq!(b.size_hint(&heap), (2, Some(2)));
        assert_eq!(drain(&mut b, &mut heap), vec![r#""Hello""#, "42"]);
        assert_eq!(drain(&mut a, &mut heap), vec!["42"]);
    }

    #[test]
    fn dropping_iterator_leaves_source_unchanged() {
        let mut heap = Heap::new(NoLimitTracker);
        let v = hello_42(&mut heap);
        let id = v.ref_id().unwrap();

        let mut it = VecIter::new(&v, Direction::Forward, &heap).unwrap();
        assert_eq!(heap.refcount(id), 2);
        it.next(&heap).drop_with_heap(&mut heap);
        it.release(&mut heap);

        assert_eq!(heap.refcount(id), 1);
        let HeapData::Vec(vec) = heap.get(id) else { panic!("expected vec") };
        assert_eq!(vec.len(), 2);
    }

    #[test]
    fn range_is_fixed_at_creation() {
        let mut heap = Heap::new(NoLimitTracker);
        let v = hello_42(&mut heap);
        let id = v.ref_id().unwrap();
        let mut it = VecIter::new(&v, Direction::Forward, &heap).unwrap();

        if let HeapData::Vec(vec) = heap.get_mut(id) {
            vec.push(Value::Int(99));
        }
        assert_eq!(drain(&mut it, &mut heap), vec![r#""Hello""#, "42"]);

        let mut it = VecIter::new(&v, Direction::Forward, &heap).unwrap();
        heap.with_entry_mut(id, |heap, data| {
            if let HeapData::Vec(vec) = data {
                vec.set(0, Value::Int(1), heap).unwrap();
                vec.pop();
            }
        });
        assert_eq!(drain(&mut it, &mut heap), vec!["1", "42"]);
    }

    #[test]
    fn shrinking_source_clamps_range() {
        let mut heap = Heap::new(NoLimitTracker);
        let v = hello_42(&mut heap);
        let id = v.ref_id().unwrap();
        let mut it = VecIter::new(&v, Direction::Reverse, &heap).unwrap();
        heap.with_entry_mut(id, |heap, data| {
            if let HeapData::Vec(vec) = data {
                vec.clear(heap);
            }
        });
        assert!(it.next(&heap).is_none());
        assert!(it.is_exhausted());
    }

    #[test]
    fn rev_turns_remaining_range_around() {
        let mut heap = Heap::new(NoLimitTracker);
        let t = Tuple::new(vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]);
        let t = Value::Ref(heap.allocate(HeapData::Tuple(t)).unwrap());
        let mut it = VecIter::new(&t, Direction::Forward, &heap).unwrap();
        it.next(&heap);

        let mut back = it.rev(&heap);
        assert_eq!(back.direction(), Direction::Reverse);
        assert_eq!(drain(&mut back, &mut heap), vec!["4", "3", "2"]);
        assert_eq!(drain(&mut it, &mut heap), vec!["2", "3", "4"]);
    }

    #[test]
    fn dead_source_yields_nothing() {
        let mut heap = Heap::new(NoLimitTracker);
        let id = heap.allocate(HeapData::Vec(DynVec::from_values(vec![Value::Int(1)]))).unwrap();
        let mut it = VecIter::new(&Value::Ref(id), Direction::Forward, &heap).unwrap();

        // force the source out from under the iterator, then recycle the slot
        heap.dec_ref(id);
        heap.dec_ref(id);
        let reused = heap.allocate(HeapData::Vec(DynVec::from_values(vec![Value::Int(5)]))).unwrap();
        assert_eq!(reused, id);

        assert!(it.next(&heap).is_none());
        assert!(it.is_exhausted());
        it.release(&mut heap);
        assert_eq!(heap.refcount(reused), 1);
    }

    #[test]
    fn non_sequences_are_not_iterable() {
        let heap = Heap::new(NoLimitTracker);
        let err = VecIter::new(&Value::Int(3), Direction::Forward, &heap).unwrap_err();
        assert_eq!(err.message(), "int is not iterable");
    }
}
