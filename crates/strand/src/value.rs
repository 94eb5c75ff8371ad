use std::fmt::{self, Write};

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    heap::{Heap, HeapData, HeapId},
    resource::{MAX_DATA_RECURSION_DEPTH, ResourceTracker},
};

/// The closed set of value variants, shared by runtime values and host objects.
///
/// Every consumer matches exhaustively on this tag; the marshalling layer uses it
/// to report what was expected and what was found.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    Unit,
    Bool,
    Int,
    Float,
    Char,
    String,
    Vec,
    Tuple,
    Iterator,
    /// Host-side placeholder for values with no structured representation.
    Opaque,
}

/// Primary value type representing script values at runtime.
///
/// Small immediate values are stored inline, while strings, vectors, tuples and
/// iterators live in the heap arena and are referenced via `Ref(HeapId)`.
///
/// NOTE: `Clone` is intentionally NOT derived. Use `clone_with_heap()` so the
/// referenced slot's count is incremented, and `drop_with_heap()` to release it.
#[derive(Debug)]
pub(crate) enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    Ref(HeapId),
}

impl Value {
    #[must_use]
    pub fn kind(&self, heap: &Heap<impl ResourceTracker>) -> ValueKind {
        match self {
            Self::Unit => ValueKind::Unit,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Char(_) => ValueKind::Char,
            Self::Ref(id) => heap.get_if_live(*id).map_or(ValueKind::Opaque, HeapData::kind),
        }
    }

    #[inline]
    #[must_use]
    pub fn ref_id(&self) -> Option<HeapId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Clones the value, incrementing the refcount of heap values.
    #[must_use]
    pub fn clone_with_heap(&self, heap: &Heap<impl ResourceTracker>) -> Self {
        match self {
            Self::Ref(id) => {
                heap.inc_ref(*id);
                Self::Ref(*id)
            }
            Self::Unit => Self::Unit,
            Self::Bool(b) => Self::Bool(*b),
            Self::Int(i) => Self::Int(*i),
            Self::Float(f) => Self::Float(*f),
            Self::Char(c) => Self::Char(*c),
        }
    }

    /// Text written by the `Print` instruction: strings and chars unquoted, everything else as `repr`.
    #[must_use]
    pub fn display(&self, heap: &Heap<impl ResourceTracker>) -> String {
        match self {
            Self::Char(c) => c.to_string(),
            Self::Ref(id) => match heap.get_if_live(*id) {
                Some(HeapData::Str(s)) => s.as_str().to_owned(),
                _ => self.repr(heap),
            },
            other => other.repr(heap),
        }
    }

    #[must_use]
    pub fn repr(&self, heap: &Heap<impl ResourceTracker>) -> String {
        let mut out = String::new();
        let mut seen = AHashSet::new();
        // writing into a String cannot fail
        let _ = self.repr_fmt(heap, &mut out, &mut seen, MAX_DATA_RECURSION_DEPTH);
        out
    }

    /// Writes the repr, using `[...]` / `(...)` placeholders for containers already
    /// being printed and for containers nested more than `depth` levels further down.
    fn repr_fmt(
        &self,
        heap: &Heap<impl ResourceTracker>,
        f: &mut impl Write,
        seen: &mut AHashSet<HeapId>,
        depth: u16,
    ) -> fmt::Result {
        match self {
            Self::Unit => f.write_str("()"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => float_repr_fmt(*v, f),
            Self::Char(c) => write!(f, "{c:?}"),
            Self::Ref(id) => {
                let Some(data) = heap.get_if_live(*id) else {
                    return f.write_str("<freed>");
                };
                match data {
                    HeapData::Str(s) => write!(f, "{:?}", s.as_str()),
                    HeapData::Iter(it) => write!(f, "<{} iterator>", it.direction()),
                    HeapData::Vec(v) => {
                        if depth == 0 || !seen.insert(*id) {
                            return f.write_str("[...]");
                        }
                        f.write_char('[')?;
                        sequence_fmt(v.as_slice(), heap, f, seen, depth - 1)?;
                        seen.remove(id);
                        f.write_char(']')
                    }
                    HeapData::Tuple(t) => {
                        if depth == 0 || !seen.insert(*id) {
                            return f.write_str("(...)");
                        }
                        f.write_char('(')?;
                        sequence_fmt(t.as_slice(), heap, f, seen, depth - 1)?;
                        if t.len() == 1 {
                            f.write_char(',')?;
                        }
                        seen.remove(id);
                        f.write_char(')')
                    }
                }
            }
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

fn sequence_fmt(
    items: &[Value],
    heap: &Heap<impl ResourceTracker>,
    f: &mut impl Write,
    seen: &mut AHashSet<HeapId>,
    depth: u16,
) -> fmt::Result {
    let mut iter = items.iter();
    if let Some(first) = iter.next() {
        first.repr_fmt(heap, f, seen, depth)?;
        for item in iter {
            f.write_str(", ")?;
            item.repr_fmt(heap, f, seen, depth)?;
        }
    }
    Ok(())
}

/// Floats always print with a fractional part (`1.0`, not `1`).
pub(crate) fn float_repr_fmt(v: f64, f: &mut impl Write) -> fmt::Result {
    write!(f, "{v:?}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        resource::NoLimitTracker,
        types::{DynVec, Str, Tuple},
    };

    #[test]
    fn repr_of_mixed_vector() {
        let mut heap = Heap::new(NoLimitTracker);
        let hello = heap.allocate(HeapData::Str(Str::new("Hello".to_owned()))).unwrap();
        let tuple = heap
            .allocate(HeapData::Tuple(Tuple::new(vec![Value::Int(2)])))
            .unwrap();
        let vec = heap
            .allocate(HeapData::Vec(DynVec::from_values(vec![
                Value::Ref(hello),
                Value::Int(42),
                Value::Float(1.0),
                Value::Char('x'),
                Value::Unit,
                Value::Ref(tuple),
            ])))
            .unwrap();
        assert_eq!(
            Value::Ref(vec).repr(&heap),
            r#"["Hello", 42, 1.0, 'x', (), (2,)]"#
        );
        assert_eq!(Value::Ref(hello).display(&heap), "Hello");
    }

    #[test]
    fn repr_breaks_cycles() {
        let mut heap = Heap::new(NoLimitTracker);
        let vec = heap.allocate(HeapData::Vec(DynVec::new())).unwrap();
        heap.inc_ref(vec);
        if let HeapData::Vec(v) = heap.get_mut(vec) {
            v.push(Value::Ref(vec));
        }
        assert_eq!(Value::Ref(vec).repr(&heap), "[[...]]");
    }

    #[test]
    fn repr_truncates_deep_nesting() {
        let mut heap = Heap::new(NoLimitTracker);
        let mut inner = heap.allocate(HeapData::Vec(DynVec::new())).unwrap();
        for _ in 0..=MAX_DATA_RECURSION_DEPTH {
            let outer = DynVec::from_values(vec![Value::Ref(inner)]);
            inner = heap.allocate(HeapData::Vec(outer)).unwrap();
        }
        let depth = usize::from(MAX_DATA_RECURSION_DEPTH);
        let expected = format!("{}[...]{}", "[".repeat(depth), "]".repeat(depth));
        assert_eq!(Value::Ref(inner).repr(&heap), expected);

        heap.dec_ref(inner);
        assert_eq!(heap.stats().live_objects, 0);
    }

    #[test]
    fn clone_with_heap_copies_immediates_and_counts_refs() {
        let mut heap = Heap::new(NoLimitTracker);
        assert!(matches!(Value::Int(7).clone_with_heap(&heap), Value::Int(7)));
        assert!(matches!(Value::Char('x').clone_with_heap(&heap), Value::Char('x')));
        assert!(matches!(Value::Unit.clone_with_heap(&heap), Value::Unit));

        let id = heap.allocate(HeapData::Vec(DynVec::new())).unwrap();
        let copy = Value::Ref(id).clone_with_heap(&heap);
        assert_eq!(heap.refcount(id), 2);
        assert_eq!(copy.ref_id(), Some(id));
    }

    #[test]
    fn kind_of_immediates() {
        let heap = Heap::new(NoLimitTracker);
        assert_eq!(Value::Unit.kind(&heap), ValueKind::Unit);
        assert_eq!(Value::from(true).kind(&heap), ValueKind::Bool);
        assert_eq!(Value::from(3).kind(&heap), ValueKind::Int);
        assert_eq!(Value::from(0.5).kind(&heap), ValueKind::Float);
        assert_eq!(ValueKind::Vec.to_string(), "vec");
    }
}
