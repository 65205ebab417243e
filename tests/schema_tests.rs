use serde_json::json;

use vanadio::schema::{Schema, type_string};

// ========== Validation ==========

#[test]
fn test_validate_accepts_conforming_values() {
    let schema = Schema::new(json!({
        "type": "object",
        "properties": {"name": {"type": "string"}},
        "required": ["name"]
    }));
    let value = json!({"name": "Ada"});
    assert_eq!(schema.validate(&value).unwrap(), value);
}

#[test]
fn test_validate_reports_nested_paths() {
    let schema = Schema::new(json!({
        "type": "object",
        "properties": {
            "address": {
                "type": "object",
                "properties": {"zip": {"type": "string"}},
                "required": ["zip"]
            }
        },
        "required": ["address"]
    }));
    let issues = schema
        .validate(&json!({"address": {"zip": 12345}}))
        .unwrap_err();
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].field(), "address.zip");
    assert!(!issues[0].message.is_empty());
}

#[test]
fn test_validate_reports_every_issue() {
    let schema = Schema::new(json!({
        "type": "object",
        "properties": {
            "a": {"type": "string"},
            "b": {"type": "number"}
        },
        "required": ["a", "b"]
    }));
    let issues = schema.validate(&json!({"a": 1, "b": "two"})).unwrap_err();
    assert_eq!(issues.len(), 2);
}

#[test]
fn test_broken_schema_degrades_to_a_root_issue() {
    // `type` must be a string or array of strings.
    let schema = Schema::new(json!({"type": 42}));
    let issues = schema.validate(&json!({})).unwrap_err();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].path.is_empty());
}

// ========== OpenAPI projection ==========

#[test]
fn test_to_openapi_strips_bookkeeping_keys() {
    let schema = Schema::new(json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "$id": "https://example.com/user.json",
        "type": "object",
        "properties": {"name": {"type": "string"}}
    }));
    let fragment = schema.to_openapi();
    assert!(fragment.get("$schema").is_none());
    assert!(fragment.get("$id").is_none());
    assert_eq!(fragment["type"], "object");
}

// ========== Type rendering ==========

#[test]
fn test_primitive_types() {
    assert_eq!(type_string(&json!({"type": "string"}), 0), "string");
    assert_eq!(type_string(&json!({"type": "number"}), 0), "number");
    assert_eq!(type_string(&json!({"type": "integer"}), 0), "number");
    assert_eq!(type_string(&json!({"type": "boolean"}), 0), "boolean");
    assert_eq!(type_string(&json!({"type": "null"}), 0), "null");
    assert_eq!(
        type_string(&json!({"type": "string", "format": "date-time"}), 0),
        "Date"
    );
}

#[test]
fn test_literals_and_enums() {
    assert_eq!(type_string(&json!({"const": "fixed"}), 0), "\"fixed\"");
    assert_eq!(type_string(&json!({"const": 3}), 0), "3");
    assert_eq!(
        type_string(&json!({"enum": ["red", "green", "blue"]}), 0),
        "\"red\" | \"green\" | \"blue\""
    );
}

#[test]
fn test_arrays_and_tuples() {
    assert_eq!(
        type_string(&json!({"type": "array", "items": {"type": "string"}}), 0),
        "string[]"
    );
    assert_eq!(
        type_string(
            &json!({"type": "array", "items": {"enum": ["a", "b"]}}),
            0
        ),
        "(\"a\" | \"b\")[]"
    );
    assert_eq!(
        type_string(
            &json!({
                "type": "array",
                "prefixItems": [{"type": "string"}, {"type": "number"}]
            }),
            0
        ),
        "[string, number]"
    );
}

#[test]
fn test_objects_mark_optional_keys() {
    let rendered = type_string(
        &json!({
            "type": "object",
            "properties": {
                "id": {"type": "string"},
                "note": {"type": "string"}
            },
            "required": ["id"]
        }),
        0,
    );
    assert!(rendered.contains("id: string;"));
    assert!(rendered.contains("note?: string;"));
}

#[test]
fn test_records_unions_and_nullables() {
    assert_eq!(
        type_string(
            &json!({"type": "object", "additionalProperties": {"type": "number"}}),
            0
        ),
        "Record<string, number>"
    );
    assert_eq!(
        type_string(&json!({"type": "object"}), 0),
        "Record<string, unknown>"
    );
    assert_eq!(
        type_string(
            &json!({"oneOf": [{"type": "string"}, {"type": "number"}]}),
            0
        ),
        "string | number"
    );
    assert_eq!(
        type_string(&json!({"type": ["string", "null"]}), 0),
        "string | null"
    );
}

#[test]
fn test_unknown_shapes_degrade_to_unknown() {
    assert_eq!(type_string(&json!(true), 0), "unknown");
    assert_eq!(type_string(&json!({"not": {"type": "string"}}), 0), "unknown");
    assert_eq!(type_string(&json!({"type": "wat"}), 0), "unknown");
}
