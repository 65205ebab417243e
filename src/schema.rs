//! Schema adapter.
//!
//! Route schemas are JSON Schema fragments (`serde_json::Value`). This module
//! wraps them behind three capabilities so the rest of the core stays
//! validator-agnostic:
//!
//! - `validate` checks a value and reports path + message issues,
//! - `to_openapi` projects the schema into an OpenAPI 3.1 fragment,
//! - `type_string` renders a best-effort TypeScript-flavoured type.
//!
//! Validators are compiled once, at route registration, never on the request
//! path. None of the operations here panic: a schema that fails to compile
//! turns every validation into a single root issue, and unknown schema
//! shapes degrade to `unknown` when rendered.

use serde_json::{Map, Value};

/// One validation failure, with the instance path split into segments.
#[derive(Debug, Clone)]
pub struct Issue {
    pub path: Vec<String>,
    pub message: String,
}

impl Issue {
    /// Dotted form of the path, used as the `field` of the error envelope.
    pub fn field(&self) -> String {
        self.path.join(".")
    }
}

/// A compiled schema. Owns the raw fragment plus the compiled validator.
pub struct Schema {
    raw: Value,
    validator: Option<jsonschema::Validator>,
    compile_error: Option<String>,
}

impl Schema {
    /// Compile a JSON Schema fragment. Compilation failures are recorded
    /// instead of raised; a broken schema rejects every value with the
    /// compiler's message.
    pub fn new(raw: Value) -> Self {
        match jsonschema::validator_for(&raw) {
            Ok(validator) => Schema {
                raw,
                validator: Some(validator),
                compile_error: None,
            },
            Err(err) => Schema {
                raw,
                compile_error: Some(err.to_string()),
                validator: None,
            },
        }
    }

    /// The raw JSON Schema fragment.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Validate a value. Returns the validated value on success, the full
    /// ordered issue list on failure.
    pub fn validate(&self, value: &Value) -> std::result::Result<Value, Vec<Issue>> {
        let Some(validator) = &self.validator else {
            return Err(vec![Issue {
                path: Vec::new(),
                message: self
                    .compile_error
                    .clone()
                    .unwrap_or_else(|| "schema failed to compile".to_string()),
            }]);
        };
        let issues: Vec<Issue> = validator
            .iter_errors(value)
            .map(|err| Issue {
                path: pointer_segments(&err.instance_path.to_string()),
                message: err.to_string(),
            })
            .collect();
        if issues.is_empty() {
            Ok(value.clone())
        } else {
            Err(issues)
        }
    }

    /// Project the schema into an OpenAPI 3.1 fragment. OpenAPI 3.1 embeds
    /// JSON Schema directly, so this strips bookkeeping keys and passes the
    /// rest through.
    pub fn to_openapi(&self) -> Value {
        match &self.raw {
            Value::Object(map) => {
                let cleaned: Map<String, Value> = map
                    .iter()
                    .filter(|(k, _)| k.as_str() != "$schema" && k.as_str() != "$id")
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Value::Object(cleaned)
            }
            other => other.clone(),
        }
    }

    /// Render the schema as a TypeScript-flavoured type string.
    pub fn type_string(&self, indent: usize) -> String {
        type_string(&self.raw, indent)
    }
}

/// Split a JSON Pointer (`/a/b/0`) into its segments.
fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect()
}

/// Render a JSON Schema fragment as a TypeScript-flavoured type string.
///
/// `indent` is the nesting depth used for object bodies. Anything the
/// renderer does not recognize comes out as `unknown`.
pub fn type_string(schema: &Value, indent: usize) -> String {
    let Some(map) = schema.as_object() else {
        return "unknown".to_string();
    };

    if let Some(constant) = map.get("const") {
        return literal(constant);
    }
    if let Some(Value::Array(variants)) = map.get("enum") {
        if variants.is_empty() {
            return "never".to_string();
        }
        return variants
            .iter()
            .map(literal)
            .collect::<Vec<_>>()
            .join(" | ");
    }
    for key in ["oneOf", "anyOf"] {
        if let Some(Value::Array(variants)) = map.get(key) {
            if !variants.is_empty() {
                return variants
                    .iter()
                    .map(|v| type_string(v, indent))
                    .collect::<Vec<_>>()
                    .join(" | ");
            }
        }
    }

    match map.get("type") {
        Some(Value::String(t)) => scalar_or_composite(t, map, indent),
        // `type: ["string", "null"]` style nullables.
        Some(Value::Array(types)) => {
            let rendered: Vec<String> = types
                .iter()
                .filter_map(|t| t.as_str())
                .map(|t| scalar_or_composite(t, map, indent))
                .collect();
            if rendered.is_empty() {
                "unknown".to_string()
            } else {
                rendered.join(" | ")
            }
        }
        // No `type` but object-ish keys still render as an object.
        None if map.contains_key("properties") => object_body(map, indent),
        _ => "unknown".to_string(),
    }
}

fn scalar_or_composite(t: &str, map: &Map<String, Value>, indent: usize) -> String {
    match t {
        "string" => match map.get("format").and_then(Value::as_str) {
            Some("date-time") | Some("date") => "Date".to_string(),
            _ => "string".to_string(),
        },
        "number" | "integer" => "number".to_string(),
        "boolean" => "boolean".to_string(),
        "null" => "null".to_string(),
        "array" => array_body(map, indent),
        "object" => object_body(map, indent),
        _ => "unknown".to_string(),
    }
}

fn array_body(map: &Map<String, Value>, indent: usize) -> String {
    // Tuples come through `prefixItems`.
    if let Some(Value::Array(items)) = map.get("prefixItems") {
        let inner: Vec<String> = items.iter().map(|i| type_string(i, indent)).collect();
        return format!("[{}]", inner.join(", "));
    }
    let inner = match map.get("items") {
        Some(items) => type_string(items, indent),
        None => "unknown".to_string(),
    };
    if inner.contains('|') {
        format!("({})[]", inner)
    } else {
        format!("{}[]", inner)
    }
}

fn object_body(map: &Map<String, Value>, indent: usize) -> String {
    if let Some(Value::Object(props)) = map.get("properties") {
        let required: Vec<&str> = map
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if props.is_empty() {
            return "{}".to_string();
        }
        let pad = "  ".repeat(indent + 1);
        let close = "  ".repeat(indent);
        let mut out = String::from("{\n");
        for (key, prop) in props {
            let marker = if required.contains(&key.as_str()) { "" } else { "?" };
            out.push_str(&format!(
                "{}{}{}: {};\n",
                pad,
                key,
                marker,
                type_string(prop, indent + 1)
            ));
        }
        out.push_str(&format!("{}}}", close));
        return out;
    }
    // Record types: object with a value schema and no fixed keys.
    match map.get("additionalProperties") {
        Some(ap @ Value::Object(_)) => {
            format!("Record<string, {}>", type_string(ap, indent))
        }
        _ => "Record<string, unknown>".to_string(),
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => "unknown".to_string(),
    }
}
