use std::fmt::{self, Write};

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::{
    exception::{ErrorKind, Exception},
    heap::{DropWithHeap, Heap, HeapData, HeapId},
    resource::{MAX_DATA_RECURSION_DEPTH, ResourceError, ResourceTracker},
    types::{DynVec, Str, Tuple},
    value::{Value, ValueKind, float_repr_fmt},
};

/// A scripting value that can be passed to or returned from a run.
///
/// This is the public-facing, owned mirror of the runtime value. It can be freely
/// cloned, compared, serialized, or stored, and needs no heap.
///
/// # Input vs Output Variants
///
/// Every variant except `Repr` can be used as an input. `Repr` is output-only: it
/// stands in for values with no structured mapping (iterators, cyclic references).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Object {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    String(String),
    /// A dynamic vector; elements may be of any variant.
    Vec(Vec<Self>),
    Tuple(Vec<Self>),
    /// Output-only fallback holding the value's printed form.
    Repr(String),
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Char(c) => f.write_char(*c),
            _ => self.repr_fmt(f),
        }
    }
}

impl Object {
    /// Converts a `Value` into an `Object`, consuming the value's handle.
    pub(crate) fn new(value: Value, heap: &mut Heap<impl ResourceTracker>) -> Self {
        let object = Self::from_borrowed_value(&value, heap);
        value.drop_with_heap(heap);
        object
    }

    /// Snapshots a runtime value without touching its reference count.
    ///
    /// Containers nested deeper than [`MAX_DATA_RECURSION_DEPTH`] become `Repr("[...]")`
    /// or `Repr("(...)")`, like cycles.
    pub(crate) fn from_borrowed_value(value: &Value, heap: &Heap<impl ResourceTracker>) -> Self {
        let mut visiting = AHashSet::new();
        Self::from_value(value, heap, &mut visiting, MAX_DATA_RECURSION_DEPTH)
    }

    fn from_value(
        value: &Value,
        heap: &Heap<impl ResourceTracker>,
        visiting: &mut AHashSet<HeapId>,
        depth: u16,
    ) -> Self {
        match value {
            Value::Unit => Self::Unit,
            Value::Bool(b) => Self::Bool(*b),
            Value::Int(i) => Self::Int(*i),
            Value::Float(f) => Self::Float(*f),
            Value::Char(c) => Self::Char(*c),
            Value::Ref(id) => {
                let Some(data) = heap.get_if_live(*id) else {
                    return Self::Repr("<freed>".to_owned());
                };
                match data {
                    HeapData::Str(s) => Self::String(s.as_str().to_owned()),
                    HeapData::Iter(_) => Self::Repr(value.repr(heap)),
                    HeapData::Vec(v) => {
                        if depth == 0 || !visiting.insert(*id) {
                            return Self::Repr("[...]".to_owned());
                        }
                        let items = v
                            .iter()
                            .map(|item| Self::from_value(item, heap, visiting, depth - 1))
                            .collect();
                        visiting.remove(id);
                        Self::Vec(items)
                    }
                    HeapData::Tuple(t) => {
                        if depth == 0 || !visiting.insert(*id) {
                            return Self::Repr("(...)".to_owned());
                        }
                        let items = t
                            .as_slice()
                            .iter()
                            .map(|item| Self::from_value(item, heap, visiting, depth - 1))
                            .collect();
                        visiting.remove(id);
                        Self::Tuple(items)
                    }
                }
            }
        }
    }

    /// Converts this `Object` into a `Value`, allocating on the heap if needed.
    ///
    /// # Errors
    /// Returns `InvalidInputError` for the output-only `Repr` variant, for containers
    /// nested deeper than [`MAX_DATA_RECURSION_DEPTH`], or when a resource limit is
    /// hit while allocating. Nothing is left allocated on failure.
    pub(crate) fn to_value(self, heap: &mut Heap<impl ResourceTracker>) -> Result<Value, InvalidInputError> {
        self.to_value_within(heap, MAX_DATA_RECURSION_DEPTH)
    }

    fn to_value_within(self, heap: &mut Heap<impl ResourceTracker>, depth: u16) -> Result<Value, InvalidInputError> {
        if depth == 0 && matches!(self, Self::Vec(_) | Self::Tuple(_)) {
            return Err(InvalidInputError::TooDeep {
                limit: MAX_DATA_RECURSION_DEPTH,
            });
        }
        match self {
            Self::Unit => Ok(Value::Unit),
            Self::Bool(b) => Ok(Value::Bool(b)),
            Self::Int(i) => Ok(Value::Int(i)),
            Self::Float(f) => Ok(Value::Float(f)),
            Self::Char(c) => Ok(Value::Char(c)),
            Self::String(s) => Ok(Value::Ref(heap.allocate(HeapData::Str(Str::new(s)))?)),
            Self::Vec(items) => {
                let values = objects_to_values(items, heap, depth - 1)?;
                let id = heap.allocate_container(values, |values| HeapData::Vec(DynVec::from_values(values)))?;
                Ok(Value::Ref(id))
            }
            Self::Tuple(items) => {
                let values = objects_to_values(items, heap, depth - 1)?;
                let id = heap.allocate_container(values, |values| HeapData::Tuple(Tuple::new(values)))?;
                Ok(Value::Ref(id))
            }
            Self::Repr(_) => Err(InvalidInputError::invalid_type("repr")),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Unit => ValueKind::Unit,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Char(_) => ValueKind::Char,
            Self::String(_) => ValueKind::String,
            Self::Vec(_) => ValueKind::Vec,
            Self::Tuple(_) => ValueKind::Tuple,
            Self::Repr(_) => ValueKind::Opaque,
        }
    }

    /// Lowercase name of the variant, as used in error messages ("int", "vec", ...).
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind().into()
    }

    /// Element count for vectors and tuples, char count for strings.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::String(s) => Some(s.chars().count()),
            Self::Vec(items) | Self::Tuple(items) => Some(items.len()),
            _ => None,
        }
    }

    /// The printed form scripts would see for this value, with strings quoted.
    #[must_use]
    pub fn repr(&self) -> String {
        let mut s = String::new();
        // writing into a String cannot fail
        let _ = self.repr_fmt(&mut s);
        s
    }

    fn repr_fmt(&self, f: &mut impl Write) -> fmt::Result {
        match self {
            Self::Unit => f.write_str("()"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => float_repr_fmt(*v, f),
            Self::Char(c) => write!(f, "{c:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Repr(s) => f.write_str(s),
            Self::Vec(items) => {
                f.write_char('[')?;
                sequence_fmt(items, f)?;
                f.write_char(']')
            }
            Self::Tuple(items) => {
                f.write_char('(')?;
                sequence_fmt(items, f)?;
                if items.len() == 1 {
                    f.write_char(',')?;
                }
                f.write_char(')')
            }
        }
    }

    /// Converts to natural JSON.
    ///
    /// Vectors become arrays and scalars map directly. Variants JSON has no shape for
    /// use a single-key marker object:
    /// - `Unit` → `null`
    /// - `Char` → `{"$char": "c"}`
    /// - `Tuple` → `{"$tuple": [...]}`
    /// - `Repr` → `{"$repr": "..."}`
    ///
    /// Non-finite floats become `null`.
    #[must_use]
    pub fn to_json_value(&self) -> serde_json::Value {
        use serde_json::{Value as JV, json};
        match self {
            Self::Unit => JV::Null,
            Self::Bool(b) => JV::Bool(*b),
            Self::Int(i) => json!(i),
            Self::Float(f) => {
                if f.is_finite() {
                    json!(f)
                } else {
                    JV::Null
                }
            }
            Self::Char(c) => json!({"$char": c.to_string()}),
            Self::String(s) => JV::String(s.clone()),
            Self::Vec(items) => JV::Array(items.iter().map(Self::to_json_value).collect()),
            Self::Tuple(items) => json!({"$tuple": items.iter().map(Self::to_json_value).collect::<Vec<_>>()}),
            Self::Repr(s) => json!({"$repr": s}),
        }
    }

    /// Parses the JSON shape produced by [`Self::to_json_value`].
    ///
    /// # Errors
    /// Returns `InvalidInputError` for objects without a known marker, integers
    /// outside `i64`, and `$char` markers that do not hold exactly one char.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, InvalidInputError> {
        use serde_json::Value as JV;
        match value {
            JV::Null => Ok(Self::Unit),
            JV::Bool(b) => Ok(Self::Bool(b)),
            JV::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Self::Int(i))
                } else if n.is_f64()
                    && let Some(f) = n.as_f64()
                {
                    Ok(Self::Float(f))
                } else {
                    Err(InvalidInputError::invalid_type("integer out of range"))
                }
            }
            JV::String(s) => Ok(Self::String(s)),
            JV::Array(items) => Ok(Self::Vec(
                items.into_iter().map(Self::from_json_value).collect::<Result<_, _>>()?,
            )),
            JV::Object(map) => {
                let mut entries = map.into_iter();
                match (entries.next(), entries.next()) {
                    (Some((key, JV::Array(items))), None) if key == "$tuple" => Ok(Self::Tuple(
                        items.into_iter().map(Self::from_json_value).collect::<Result<_, _>>()?,
                    )),
                    (Some((key, JV::String(s))), None) if key == "$char" => {
                        let mut chars = s.chars();
                        match (chars.next(), chars.next()) {
                            (Some(c), None) => Ok(Self::Char(c)),
                            _ => Err(InvalidInputError::invalid_type("$char")),
                        }
                    }
                    (Some((key, JV::String(s))), None) if key == "$repr" => Ok(Self::Repr(s)),
                    _ => Err(InvalidInputError::invalid_type("object")),
                }
            }
        }
    }
}

impl From<&str> for Object {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Object {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Object {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Object {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Object {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<char> for Object {
    fn from(c: char) -> Self {
        Self::Char(c)
    }
}

fn sequence_fmt(items: &[Object], f: &mut impl Write) -> fmt::Result {
    let mut iter = items.iter();
    if let Some(first) = iter.next() {
        first.repr_fmt(f)?;
        for item in iter {
            f.write_str(", ")?;
            item.repr_fmt(f)?;
        }
    }
    Ok(())
}

/// Converts every item, releasing the ones already converted if a later one fails.
fn objects_to_values(
    items: Vec<Object>,
    heap: &mut Heap<impl ResourceTracker>,
    depth: u16,
) -> Result<Vec<Value>, InvalidInputError> {
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        match item.to_value_within(heap, depth) {
            Ok(value) => values.push(value),
            Err(err) => {
                values.drop_with_heap(heap);
                return Err(err);
            }
        }
    }
    Ok(values)
}

/// Error returned when an `Object` cannot be used as an input to a run.
///
/// This can occur when:
/// - an `Object` variant (`Repr`) is only valid as an output, not an input
/// - JSON input has no `Object` shape
/// - containers nest deeper than [`MAX_DATA_RECURSION_DEPTH`]
/// - a resource limit (memory, allocations) is exceeded during conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidInputError {
    /// The input has no runtime representation; holds a short description of what was found.
    InvalidType(&'static str),
    /// Containers nest more than `limit` levels deep.
    TooDeep { limit: u16 },
    /// A resource limit was exceeded during conversion.
    Resource(ResourceError),
}

impl InvalidInputError {
    #[must_use]
    pub fn invalid_type(type_name: &'static str) -> Self {
        Self::InvalidType(type_name)
    }
}

impl fmt::Display for InvalidInputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidType(type_name) => write!(f, "'{type_name}' is not a valid input value"),
            Self::TooDeep { limit } => write!(f, "input nests deeper than {limit} levels"),
            Self::Resource(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for InvalidInputError {}

impl From<ResourceError> for InvalidInputError {
    fn from(err: ResourceError) -> Self {
        Self::Resource(err)
    }
}

impl From<InvalidInputError> for Exception {
    fn from(err: InvalidInputError) -> Self {
        match err {
            InvalidInputError::Resource(e) => e.into(),
            InvalidInputError::InvalidType(_) | InvalidInputError::TooDeep { .. } => {
                Self::new(ErrorKind::InvalidInput, err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{LimitedTracker, NoLimitTracker, ResourceLimits};

    #[test]
    fn nested_objects_survive_the_heap() {
        let mut heap = Heap::new(NoLimitTracker);
        let obj = Object::Vec(vec![
            Object::String("Hello".to_owned()),
            Object::Tuple(vec![Object::Int(1), Object::Char('x')]),
            Object::Vec(vec![]),
        ]);
        let value = obj.clone().to_value(&mut heap).unwrap();
        assert_eq!(heap.stats().live_objects, 4);
        assert_eq!(Object::new(value, &mut heap), obj);
        assert_eq!(heap.stats().live_objects, 0);
    }

    #[test]
    fn failed_conversion_leaves_nothing_allocated() {
        let mut heap = Heap::new(NoLimitTracker);
        let obj = Object::Vec(vec![Object::String("a".to_owned()), Object::Repr("x".to_owned())]);
        let err = obj.to_value(&mut heap).unwrap_err();
        assert_eq!(err, InvalidInputError::InvalidType("repr"));
        assert_eq!(heap.stats().live_objects, 0);
    }

    #[test]
    fn allocation_limit_during_conversion() {
        let mut heap = Heap::new(LimitedTracker::new(ResourceLimits::new().max_allocations(2)));
        let obj = Object::Vec(vec![Object::String("a".to_owned()), Object::String("b".to_owned())]);
        let err = obj.to_value(&mut heap).unwrap_err();
        assert!(matches!(err, InvalidInputError::Resource(ResourceError::Allocation { .. })));
        assert_eq!(heap.stats().live_objects, 0);
        assert_eq!(Exception::from(err).kind(), ErrorKind::ResourceExhausted);
    }

    #[test]
    fn too_deep_input_is_rejected_without_allocating() {
        let mut heap = Heap::new(NoLimitTracker);
        let mut obj = Object::Vec(vec![Object::String("leaf".to_owned())]);
        for _ in 0..MAX_DATA_RECURSION_DEPTH {
            obj = Object::Tuple(vec![obj]);
        }
        let err = obj.to_value(&mut heap).unwrap_err();
        assert_eq!(err, InvalidInputError::TooDeep { limit: MAX_DATA_RECURSION_DEPTH });
        assert_eq!(heap.stats().live_objects, 0);
        assert_eq!(Exception::from(err).kind(), ErrorKind::InvalidInput);
    }
}
