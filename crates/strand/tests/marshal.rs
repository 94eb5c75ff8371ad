//! Tests for moving host data into the runtime and back out.
//!
//! Covers the typed conversions (`Vec<T>`, `VecTuple`, host tuples), the error
//! each mismatch produces, and the `TypeRegistry` lookups.

use pretty_assertions::assert_eq;
use strand::{
    CodeBuilder, ErrorKind, FromObject, Inst, IntoObject, MarshalError, Object, Runner, TypeRegistry, ValueKind,
    VecTuple,
};

/// A runner that returns its single input unchanged.
fn echo() -> Runner {
    let mut b = CodeBuilder::new("echo");
    let v = b.input();
    b.emit(Inst::LoadLocal(v));
    b.emit(Inst::Return);
    Runner::new(b.build().unwrap()).unwrap()
}

// =============================================================================
// 1. Round Trips Through a Run
// =============================================================================

/// Host `[10]` becomes a one-element vector holding int 10 and comes back as `[10]`.
#[test]
fn vec_of_ints_round_trips() {
    assert_eq!(vec![10_i64].into_object(), Object::Vec(vec![Object::Int(10)]));

    let out: Vec<i64> = echo().call((vec![10_i64],)).unwrap();
    assert_eq!(out, vec![10]);
}

/// A vector built inside the run converts to the host type on the way out.
#[test]
fn vec_built_by_script_converts_out() {
    let mut b = CodeBuilder::new("build");
    b.emit_const("a");
    b.emit_const("b");
    b.emit(Inst::BuildVec(2));
    b.emit(Inst::Return);
    let runner = Runner::new(b.build().unwrap()).unwrap();

    let out: Vec<String> = runner.call(()).unwrap();
    assert_eq!(out, vec!["a".to_owned(), "b".to_owned()]);
}

/// `[2, "Hello World"]` reads as `VecTuple<(i64, String)>`.
#[test]
fn heterogeneous_vec_reads_as_vec_tuple() {
    let input = Object::Vec(vec![Object::Int(2), Object::String("Hello World".to_owned())]);
    let out: VecTuple<(i64, String)> = echo().call((input,)).unwrap();
    assert_eq!(out, VecTuple((2, "Hello World".to_owned())));
}

/// A three-slot adapter over a two-element vector fails with `ArityMismatch`.
#[test]
fn vec_tuple_arity_mismatch() {
    let input = Object::Vec(vec![Object::Int(2), Object::String("Hello World".to_owned())]);
    let err = echo()
        .call::<_, VecTuple<(i64, String, i64)>>((input,))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ArityMismatch);
    assert_eq!(err.message(), "expected a sequence of length 3, got length 2");
}

/// The empty adapter accepts only the empty vector.
#[test]
fn empty_vec_tuple() {
    let out: VecTuple<()> = echo().call((Object::Vec(vec![]),)).unwrap();
    assert_eq!(out, VecTuple(()));
    assert_eq!(VecTuple(()).into_object(), Object::Vec(vec![]));
}

/// Host tuples become scripting tuples, not vectors.
#[test]
fn host_tuples_map_to_tuple_variant() {
    let object = (1_i64, 'c', ()).into_object();
    assert_eq!(object, Object::Tuple(vec![Object::Int(1), Object::Char('c'), Object::Unit]));
    assert_eq!(object.repr(), "(1, 'c', ())");

    let out: (i64, char, ()) = echo().call(((1_i64, 'c', ()),)).unwrap();
    assert_eq!(out, (1, 'c', ()));
}

/// A twelve-slot adapter round-trips.
#[test]
fn twelve_slot_vec_tuple() {
    type Twelve = (i64, i64, i64, i64, i64, i64, i64, i64, i64, i64, i64, String);
    let value: VecTuple<Twelve> = VecTuple((1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, "twelve".to_owned()));
    let out: VecTuple<Twelve> = echo().call((value.clone(),)).unwrap();
    assert_eq!(value, out);
}

/// `None` crosses as unit and comes back as `None`.
#[test]
fn option_maps_none_to_unit() {
    let out: Vec<Option<i64>> = echo().call((vec![Some(1_i64), None],)).unwrap();
    assert_eq!(out, vec![Some(1), None]);
}

// =============================================================================
// 2. Mismatches
// =============================================================================

/// A uniform conversion names the first element with the wrong variant.
#[test]
fn uniform_mismatch_reports_index() {
    let object = Object::Vec(vec![Object::Int(1), Object::Int(2), Object::String("x".to_owned())]);
    let err = Vec::<i64>::from_object(object).unwrap_err();
    assert_eq!(
        err,
        MarshalError::TypeMismatch {
            path: vec![2],
            expected: ValueKind::Int,
            actual: ValueKind::String,
        }
    );
    assert_eq!(err.index(), Some(2));
    assert_eq!(err.to_string(), "expected int, got string at [2]");
}

/// Conversions are strict: an int is not a float.
#[test]
fn int_is_not_float() {
    let err = f64::from_object(Object::Int(1)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}

/// Per-slot mismatches in a `VecTuple` carry the slot index.
#[test]
fn vec_tuple_slot_mismatch() {
    let input = Object::Vec(vec![Object::Int(2), Object::Int(3)]);
    let err = echo()
        .call::<_, VecTuple<(i64, String)>>((input,))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    assert_eq!(err.message(), "expected string, got int at [1]");
}

/// Mismatches inside nested vectors report the index path down to the element.
#[test]
fn nested_mismatch_reports_path() {
    let input = vec![vec![1_i64], vec![2, 3]].into_object();
    let err = Vec::<Vec<String>>::from_object(input).unwrap_err();
    assert_eq!(err.path(), &[0, 0]);
}

// =============================================================================
// 3. TypeRegistry
// =============================================================================

/// The builtin registry covers the scalar types and converts through them.
#[test]
fn registry_converts_builtins() {
    let registry = TypeRegistry::with_builtins();
    assert!(registry.contains::<i64>());
    assert!(registry.contains::<String>());
    assert!(!registry.contains::<u8>());

    let object = registry.vec_from_host(vec![1_i64, 2]).unwrap();
    assert_eq!(object, Object::Vec(vec![Object::Int(1), Object::Int(2)]));
    let back: Vec<i64> = registry.vec_to_host(object).unwrap();
    assert_eq!(back, vec![1, 2]);
}

/// Unregistered element types fail with `UnsupportedType`.
#[test]
fn registry_rejects_unknown_types() {
    let registry = TypeRegistry::with_builtins();
    let err = registry.vec_from_host(vec![1_u8]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedType);
}

/// Registering a composite type makes it available by `TypeId`.
#[test]
fn registry_accepts_registered_types() {
    let mut registry = TypeRegistry::empty();
    registry.register::<VecTuple<(i64, String)>>();

    let object = Object::Vec(vec![Object::Int(2), Object::String("Hello World".to_owned())]);
    let value: VecTuple<(i64, String)> = registry.from_object(object).unwrap();
    assert_eq!(value.into_inner(), (2, "Hello World".to_owned()));

    let mapping = registry.get::<VecTuple<(i64, String)>>().unwrap();
    assert_eq!(mapping.kind, ValueKind::Vec);
}
