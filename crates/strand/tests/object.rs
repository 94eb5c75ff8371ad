//! Tests for `Object` display and the JSON mapping used by the CLI.

use pretty_assertions::assert_eq;
use serde_json::json;
use strand::{Object, ValueKind};

#[test]
fn json_maps_natural_shapes() {
    let object = Object::from_json_value(json!([1, "a", 1.5, true, null])).unwrap();
    assert_eq!(
        object,
        Object::Vec(vec![
            Object::Int(1),
            Object::String("a".to_owned()),
            Object::Float(1.5),
            Object::Bool(true),
            Object::Unit,
        ])
    );
    assert_eq!(object.to_json_value(), json!([1, "a", 1.5, true, null]));
}

#[test]
fn json_markers_cover_tuple_and_char() {
    let value = json!({"$tuple": [2, {"$char": "x"}]});
    let object = Object::from_json_value(value.clone()).unwrap();
    assert_eq!(object, Object::Tuple(vec![Object::Int(2), Object::Char('x')]));
    assert_eq!(object.to_json_value(), value);
}

#[test]
fn json_rejects_unknown_shapes() {
    assert!(Object::from_json_value(json!({"name": 1})).is_err());
    assert!(Object::from_json_value(json!({"$char": "xy"})).is_err());
    assert!(Object::from_json_value(json!(u64::MAX)).is_err());
}

#[test]
fn non_finite_floats_become_null() {
    assert_eq!(Object::Float(f64::NAN).to_json_value(), json!(null));
}

#[test]
fn display_and_repr() {
    let object = Object::Vec(vec![Object::String("Hello".to_owned()), Object::Int(42), Object::Tuple(vec![])]);
    assert_eq!(object.to_string(), r#"["Hello", 42, ()]"#);
    assert_eq!(Object::String("Hello".to_owned()).to_string(), "Hello");
    assert_eq!(Object::String("Hello".to_owned()).repr(), r#""Hello""#);
    assert_eq!(object.kind(), ValueKind::Vec);
    assert_eq!(object.type_name(), "vec");
    assert_eq!(object.len(), Some(3));
    assert_eq!(Object::String("héllo".to_owned()).len(), Some(5));
}
