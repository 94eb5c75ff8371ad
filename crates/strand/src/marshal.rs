//! Conversions between host Rust types and [`Object`].
//!
//! Every direction is a pure function returning `Result`; a failed conversion
//! never yields a partially built value.
//!
//! - Scalars map one-to-one: `()` ↔ unit, `bool`, `i64`, `f64`, `char`, `String`.
//!   Conversions are strict, so an `int` is never accepted where a `float` is expected.
//! - `Vec<T>` ↔ vector. Every element must match `T`.
//! - Host tuples `(A, B, ..)` ↔ the tuple variant.
//! - [`VecTuple<(A, B, ..)>`](VecTuple) ↔ a vector of exactly that length with
//!   per-slot types, for heterogeneous vectors such as `[2, "Hello World"]`.
//! - `Object` passes through untouched.
//!
//! Mismatches inside nested containers carry the full index path down to the
//! offending element.
//!
//! The [`TypeRegistry`] is the runtime-inspectable version of the same table, for
//! hosts that pick the element type dynamically and need `UnsupportedType` instead
//! of a compile error for types without a mapping.

use std::{
    any::{Any, TypeId, type_name},
    fmt,
};

use ahash::AHashMap;

use crate::{
    exception::{ErrorKind, Exception},
    object::Object,
    value::ValueKind,
};

/// Error returned when a host value and a scripting value do not line up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshalError {
    /// A value had a different variant than the host type maps to.
    TypeMismatch {
        /// Indices from the outermost container down to the mismatching value.
        path: Vec<usize>,
        expected: ValueKind,
        actual: ValueKind,
    },
    /// A fixed-arity projection met a sequence of another length.
    ArityMismatch {
        path: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    /// The host type has no registered mapping.
    UnsupportedType { type_name: &'static str },
}

impl MarshalError {
    #[must_use]
    pub fn type_mismatch(expected: ValueKind, actual: ValueKind) -> Self {
        Self::TypeMismatch {
            path: Vec::new(),
            expected,
            actual,
        }
    }

    #[must_use]
    pub fn arity_mismatch(expected: usize, actual: usize) -> Self {
        Self::ArityMismatch {
            path: Vec::new(),
            expected,
            actual,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::ArityMismatch { .. } => ErrorKind::ArityMismatch,
            Self::UnsupportedType { .. } => ErrorKind::UnsupportedType,
        }
    }

    /// Index path to the offending value; empty when the top-level value itself is at fault.
    #[must_use]
    pub fn path(&self) -> &[usize] {
        match self {
            Self::TypeMismatch { path, .. } | Self::ArityMismatch { path, .. } => path,
            Self::UnsupportedType { .. } => &[],
        }
    }

    /// Index of the offending element within the outermost container.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.path().first().copied()
    }

    /// Records that this error happened inside element `index` of an enclosing container.
    #[must_use]
    pub fn at(mut self, index: usize) -> Self {
        if let Self::TypeMismatch { path, .. } | Self::ArityMismatch { path, .. } = &mut self {
            path.insert(0, index);
        }
        self
    }
}

impl fmt::Display for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeMismatch { expected, actual, .. } => write!(f, "expected {expected}, got {actual}")?,
            Self::ArityMismatch { expected, actual, .. } => {
                write!(f, "expected a sequence of length {expected}, got length {actual}")?;
            }
            Self::UnsupportedType { type_name } => return write!(f, "no scripting mapping for host type `{type_name}`"),
        }
        let path = self.path();
        if !path.is_empty() {
            f.write_str(" at ")?;
            for index in path {
                write!(f, "[{index}]")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for MarshalError {}

impl From<MarshalError> for Exception {
    fn from(err: MarshalError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

/// Host types that correspond to exactly one scripting variant.
pub trait ValueType {
    const KIND: ValueKind;
}

/// Host → scripting conversion. Infallible: every implementor has a mapping.
pub trait IntoObject {
    fn into_object(self) -> Object;
}

/// Scripting → host conversion.
pub trait FromObject: Sized {
    /// # Errors
    /// Returns `MarshalError` when `object` does not have the shape `Self` maps to.
    fn from_object(object: Object) -> Result<Self, MarshalError>;
}

impl IntoObject for Object {
    fn into_object(self) -> Object {
        self
    }
}

impl FromObject for Object {
    fn from_object(object: Object) -> Result<Self, MarshalError> {
        Ok(object)
    }
}

macro_rules! scalar {
    ($ty:ty, $variant:ident) => {
        impl ValueType for $ty {
            const KIND: ValueKind = ValueKind::$variant;
        }

        impl IntoObject for $ty {
            fn into_object(self) -> Object {
                Object::$variant(self)
            }
        }

        impl FromObject for $ty {
            fn from_object(object: Object) -> Result<Self, MarshalError> {
                match object {
                    Object::$variant(v) => Ok(v),
                    other => Err(MarshalError::type_mismatch(ValueKind::$variant, other.kind())),
                }
            }
        }
    };
}

scalar!(bool, Bool);
scalar!(i64, Int);
scalar!(f64, Float);
scalar!(char, Char);
scalar!(String, String);

impl ValueType for () {
    const KIND: ValueKind = ValueKind::Unit;
}

impl IntoObject for () {
    fn into_object(self) -> Object {
        Object::Unit
    }
}

impl FromObject for () {
    fn from_object(object: Object) -> Result<Self, MarshalError> {
        match object {
            Object::Unit => Ok(()),
            other => Err(MarshalError::type_mismatch(ValueKind::Unit, other.kind())),
        }
    }
}

impl IntoObject for &str {
    fn into_object(self) -> Object {
        Object::String(self.to_owned())
    }
}

/// `None` ↔ unit; `Some(v)` is `v`'s own mapping.
impl<T: IntoObject> IntoObject for Option<T> {
    fn into_object(self) -> Object {
        self.map_or(Object::Unit, IntoObject::into_object)
    }
}

impl<T: FromObject> FromObject for Option<T> {
    fn from_object(object: Object) -> Result<Self, MarshalError> {
        match object {
            Object::Unit => Ok(None),
            other => T::from_object(other).map(Some),
        }
    }
}

impl<T> ValueType for Vec<T> {
    const KIND: ValueKind = ValueKind::Vec;
}

impl<T: IntoObject> IntoObject for Vec<T> {
    fn into_object(self) -> Object {
        Object::Vec(self.into_iter().map(IntoObject::into_object).collect())
    }
}

impl<T: FromObject> FromObject for Vec<T> {
    fn from_object(object: Object) -> Result<Self, MarshalError> {
        match object {
            Object::Vec(items) => items
                .into_iter()
                .enumerate()
                .map(|(index, item)| T::from_object(item).map_err(|e| e.at(index)))
                .collect(),
            other => Err(MarshalError::type_mismatch(ValueKind::Vec, other.kind())),
        }
    }
}

/// Host tuple types that can fill, or be filled from, a fixed run of slots.
///
/// Implemented for `()` and tuples of up to twelve elements. Host tuples use it to
/// map to the tuple variant; [`VecTuple`] uses it to project vectors.
pub trait FromSlots: Sized {
    const ARITY: usize;

    /// # Errors
    /// `ArityMismatch` when `items.len() != Self::ARITY`, otherwise the first
    /// slot error with its index prepended.
    fn from_slots(items: Vec<Object>) -> Result<Self, MarshalError>;
}

pub trait IntoSlots {
    fn into_slots(self) -> Vec<Object>;
}

impl FromSlots for () {
    const ARITY: usize = 0;

    fn from_slots(items: Vec<Object>) -> Result<Self, MarshalError> {
        if items.is_empty() {
            Ok(())
        } else {
            Err(MarshalError::arity_mismatch(0, items.len()))
        }
    }
}

impl IntoSlots for () {
    fn into_slots(self) -> Vec<Object> {
        Vec::new()
    }
}

macro_rules! tuple_slots {
    ($arity:literal => $($name:ident $index:tt),+) => {
        impl<$($name: FromObject),+> FromSlots for ($($name,)+) {
            const ARITY: usize = $arity;

            fn from_slots(items: Vec<Object>) -> Result<Self, MarshalError> {
                let actual = items.len();
                if actual != $arity {
                    return Err(MarshalError::arity_mismatch($arity, actual));
                }
                let mut items = items.into_iter();
                Ok(($(
                    {
                        let item = items.next().ok_or_else(|| MarshalError::arity_mismatch($arity, actual))?;
                        $name::from_object(item).map_err(|e| e.at($index))?
                    },
                )+))
            }
        }

        impl<$($name: IntoObject),+> IntoSlots for ($($name,)+) {
            fn into_slots(self) -> Vec<Object> {
                vec![$(self.$index.into_object()),+]
            }
        }

        impl<$($name),+> ValueType for ($($name,)+) {
            const KIND: ValueKind = ValueKind::Tuple;
        }

        impl<$($name: IntoObject),+> IntoObject for ($($name,)+) {
            fn into_object(self) -> Object {
                Object::Tuple(self.into_slots())
            }
        }

        impl<$($name: FromObject),+> FromObject for ($($name,)+) {
            fn from_object(object: Object) -> Result<Self, MarshalError> {
                match object {
                    Object::Tuple(items) => Self::from_slots(items),
                    other => Err(MarshalError::type_mismatch(ValueKind::Tuple, other.kind())),
                }
            }
        }
    };
}

tuple_slots!(1 => A 0);
tuple_slots!(2 => A 0, B 1);
tuple_slots!(3 => A 0, B 1, C 2);
tuple_slots!(4 => A 0, B 1, C 2, D 3);
tuple_slots!(5 => A 0, B 1, C 2, D 3, E 4);
tuple_slots!(6 => A 0, B 1, C 2, D 3, E 4, F 5);
tuple_slots!(7 => A 0, B 1, C 2, D 3, E 4, F 5, G 6);
tuple_slots!(8 => A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);
tuple_slots!(9 => A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8);
tuple_slots!(10 => A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9);
tuple_slots!(11 => A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10);
tuple_slots!(12 => A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7, I 8, J 9, K 10, L 11);

/// Fixed-arity, per-slot-typed view of a vector.
///
/// `VecTuple<(i64, String)>` accepts exactly the two-element vectors whose first
/// element is an int and second a string. Converting back produces a vector, not
/// a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VecTuple<T>(pub T);

impl<T> VecTuple<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> ValueType for VecTuple<T> {
    const KIND: ValueKind = ValueKind::Vec;
}

impl<T: IntoSlots> IntoObject for VecTuple<T> {
    fn into_object(self) -> Object {
        Object::Vec(self.0.into_slots())
    }
}

impl<T: FromSlots> FromObject for VecTuple<T> {
    fn from_object(object: Object) -> Result<Self, MarshalError> {
        match object {
            Object::Vec(items) => T::from_slots(items).map(Self),
            other => Err(MarshalError::type_mismatch(ValueKind::Vec, other.kind())),
        }
    }
}

/// Positional arguments for [`crate::Runner::call`]: `()` and host tuples of up to twelve elements.
pub trait IntoArgs {
    fn into_args(self) -> Vec<Object>;
}

impl<T: IntoSlots> IntoArgs for T {
    fn into_args(self) -> Vec<Object> {
        self.into_slots()
    }
}

/// One row of the [`TypeRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct TypeMapping {
    /// Rust type name, as reported by `std::any::type_name`.
    pub type_name: &'static str,
    /// Variant the host type maps to.
    pub kind: ValueKind,
    into_object: fn(Box<dyn Any>) -> Result<Object, MarshalError>,
    from_object: fn(Object) -> Result<Box<dyn Any>, MarshalError>,
}

/// Inspectable table from host types to scripting variants.
///
/// The static traits above cover code that knows its types at compile time; the
/// registry serves hosts that only learn the element type at runtime, and reports
/// `UnsupportedType` for anything unregistered.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    mappings: AHashMap<TypeId, TypeMapping>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TypeRegistry {
    /// A registry with no mappings at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            mappings: AHashMap::new(),
        }
    }

    /// A registry holding the scalar mappings: `()`, `bool`, `i64`, `f64`, `char`, `String`.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register::<()>();
        registry.register::<bool>();
        registry.register::<i64>();
        registry.register::<f64>();
        registry.register::<char>();
        registry.register::<String>();
        registry
    }

    /// Adds (or replaces) the mapping for `T`.
    pub fn register<T: ValueType + IntoObject + FromObject + 'static>(&mut self) -> &mut Self {
        self.mappings.insert(
            TypeId::of::<T>(),
            TypeMapping {
                type_name: type_name::<T>(),
                kind: T::KIND,
                into_object: boxed_into_object::<T>,
                from_object: boxed_from_object::<T>,
            },
        );
        self
    }

    #[must_use]
    pub fn get<T: 'static>(&self) -> Option<&TypeMapping> {
        self.mappings.get(&TypeId::of::<T>())
    }

    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.mappings.contains_key(&TypeId::of::<T>())
    }

    /// All mappings, sorted by type name.
    #[must_use]
    pub fn mappings(&self) -> Vec<&TypeMapping> {
        let mut mappings: Vec<_> = self.mappings.values().collect();
        mappings.sort_by_key(|m| m.type_name);
        mappings
    }

    fn mapping<T: 'static>(&self) -> Result<&TypeMapping, MarshalError> {
        self.get::<T>().ok_or(MarshalError::UnsupportedType {
            type_name: type_name::<T>(),
        })
    }

    /// Converts one host value through its registered mapping.
    ///
    /// # Errors
    /// `UnsupportedType` when `T` is not registered.
    pub fn to_object<T: 'static>(&self, value: T) -> Result<Object, MarshalError> {
        (self.mapping::<T>()?.into_object)(Box::new(value))
    }

    /// Converts one scripting value into the registered host type `T`.
    ///
    /// # Errors
    /// `UnsupportedType` when `T` is not registered, otherwise the mapping's own error.
    pub fn from_object<T: 'static>(&self, object: Object) -> Result<T, MarshalError> {
        let boxed = (self.mapping::<T>()?.from_object)(object)?;
        boxed.downcast::<T>().map(|b| *b).map_err(|_| MarshalError::UnsupportedType {
            type_name: type_name::<T>(),
        })
    }

    /// Inbound vector conversion: wraps each element in `T`'s variant, in order.
    ///
    /// # Errors
    /// `UnsupportedType` when `T` is not registered; nothing is converted in that case.
    pub fn vec_from_host<T: 'static>(&self, items: Vec<T>) -> Result<Object, MarshalError> {
        let mapping = self.mapping::<T>()?;
        items
            .into_iter()
            .map(|item| (mapping.into_object)(Box::new(item)))
            .collect::<Result<_, _>>()
            .map(Object::Vec)
    }

    /// Outbound uniform vector conversion.
    ///
    /// # Errors
    /// `UnsupportedType` when `T` is not registered, `TypeMismatch` with the index of
    /// the first element that does not match `T`'s variant.
    pub fn vec_to_host<T: 'static>(&self, object: Object) -> Result<Vec<T>, MarshalError> {
        let mapping = self.mapping::<T>()?;
        let items = match object {
            Object::Vec(items) => items,
            other => return Err(MarshalError::type_mismatch(ValueKind::Vec, other.kind())),
        };
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                let boxed = (mapping.from_object)(item).map_err(|e| e.at(index))?;
                boxed.downcast::<T>().map(|b| *b).map_err(|_| MarshalError::UnsupportedType {
                    type_name: type_name::<T>(),
                })
            })
            .collect()
    }
}

fn boxed_into_object<T: IntoObject + 'static>(value: Box<dyn Any>) -> Result<Object, MarshalError> {
    value
        .downcast::<T>()
        .map(|v| v.into_object())
        .map_err(|_| MarshalError::UnsupportedType {
            type_name: type_name::<T>(),
        })
}

fn boxed_from_object<T: FromObject + 'static>(object: Object) -> Result<Box<dyn Any>, MarshalError> {
    T::from_object(object).map(|v| Box::new(v) as Box<dyn Any>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_mismatch_reports_full_path() {
        let object = Object::Vec(vec![
            Object::Vec(vec![Object::Int(1)]),
            Object::Vec(vec![Object::Int(2), Object::String("x".to_owned())]),
        ]);
        let err = Vec::<Vec<i64>>::from_object(object).unwrap_err();
        assert_eq!(err.path(), &[1, 1]);
        assert_eq!(err.index(), Some(1));
        assert_eq!(err.to_string(), "expected int, got string at [1][1]");
    }

    #[test]
    fn int_is_not_accepted_as_float() {
        let err = f64::from_object(Object::Int(1)).unwrap_err();
        assert_eq!(err, MarshalError::type_mismatch(ValueKind::Float, ValueKind::Int));
    }

    #[test]
    fn unit_tuple_projects_empty_vec() {
        assert_eq!(VecTuple(()).into_object(), Object::Vec(vec![]));
        assert_eq!(VecTuple::<()>::from_object(Object::Vec(vec![])), Ok(VecTuple(())));
        let err = VecTuple::<()>::from_object(Object::Vec(vec![Object::Unit])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArityMismatch);
    }

    #[test]
    fn registry_lists_builtins_sorted() {
        let registry = TypeRegistry::with_builtins();
        let names: Vec<_> = registry.mappings().iter().map(|m| m.type_name).collect();
        assert_eq!(names, vec!["()", "alloc::string::String", "bool", "char", "f64", "i64"]);
        assert_eq!(registry.get::<i64>().map(|m| m.kind), Some(ValueKind::Int));
    }
}
