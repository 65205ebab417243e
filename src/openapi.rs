//! OpenAPI synthesizer.
//!
//! Projects the HTTP route registry into an OpenAPI 3.1.0 document. Route
//! paths render `:name` as `{name}`; a wildcard keeps a trailing `*` on the
//! path key while the declared parameter drops it. Declared responses always
//! win; 400 is added when the route validates input, 401 when it declares
//! security, 500 always. Output is deterministic for a fixed registry.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::router::{RouteDef, RouteRegistry, Segment};
use crate::settings::DocsOptions;

/// One operation, serialized into a path item.
#[derive(Debug, Clone, Serialize)]
struct Operation {
    #[serde(rename = "operationId", skip_serializing_if = "Option::is_none")]
    operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    deprecated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<Parameter>,
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    request_body: Option<Value>,
    responses: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    security: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
struct Parameter {
    name: String,
    #[serde(rename = "in")]
    location: &'static str,
    required: bool,
    schema: Value,
}

impl Parameter {
    fn path(name: &str) -> Self {
        Parameter {
            name: name.to_string(),
            location: "path",
            // Path parameters are always required strings.
            required: true,
            schema: json!({"type": "string"}),
        }
    }

    fn query(name: &str, required: bool, schema: Value) -> Self {
        Parameter {
            name: name.to_string(),
            location: "query",
            required,
            schema,
        }
    }
}

/// Build the OpenAPI 3.1 document for a registry.
pub fn build_document(registry: &RouteRegistry, docs: &DocsOptions) -> Value {
    let mut paths: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
    for def in registry.all() {
        if def.exclude_from_docs {
            continue;
        }
        let key = translate_path(&def);
        let operation =
            serde_json::to_value(build_operation(&def)).unwrap_or_else(|_| json!({}));
        paths
            .entry(key)
            .or_default()
            .insert(def.method.as_str().to_ascii_lowercase(), operation);
    }

    let mut info = Map::new();
    info.insert("title".to_string(), Value::String(docs.title.clone()));
    info.insert("version".to_string(), Value::String(docs.version.clone()));
    if let Some(description) = &docs.description {
        info.insert(
            "description".to_string(),
            Value::String(description.clone()),
        );
    }

    let mut components = Map::new();
    components.insert("schemas".to_string(), standard_error_schemas());
    if let Some(schemes) = &docs.security_schemes {
        components.insert("securitySchemes".to_string(), schemes.clone());
    }

    let mut document = Map::new();
    document.insert(
        "openapi".to_string(),
        Value::String("3.1.0".to_string()),
    );
    document.insert("info".to_string(), Value::Object(info));
    if !docs.servers.is_empty() {
        document.insert("servers".to_string(), Value::Array(docs.servers.clone()));
    }
    document.insert(
        "paths".to_string(),
        Value::Object(
            paths
                .into_iter()
                .map(|(path, item)| (path, Value::Object(item)))
                .collect(),
        ),
    );
    document.insert("components".to_string(), Value::Object(components));
    Value::Object(document)
}

/// Render the route path as an OpenAPI path key.
fn translate_path(def: &RouteDef) -> String {
    let rendered: Vec<String> = def
        .pattern
        .segments()
        .iter()
        .map(|segment| match segment {
            Segment::Literal(lit) => lit.clone(),
            Segment::Param(name) => format!("{{{}}}", name),
            Segment::Wildcard(name) => format!("{{{}}}*", name),
        })
        .collect();
    if rendered.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", rendered.join("/"))
    }
}

fn build_operation(def: &RouteDef) -> Operation {
    let mut parameters: Vec<Parameter> = def
        .pattern
        .param_names()
        .iter()
        .map(|name| Parameter::path(name))
        .collect();
    if let Some(schema) = &def.query_schema {
        parameters.extend(query_parameters(&schema.to_openapi()));
    }

    let request_body = def.body_schema.as_ref().map(|schema| {
        json!({
            "required": true,
            "content": {"application/json": {"schema": schema.to_openapi()}}
        })
    });

    let mut responses: BTreeMap<String, Value> = BTreeMap::new();
    match &def.success {
        Some(success) => {
            let mut block = Map::new();
            block.insert(
                "description".to_string(),
                Value::String(
                    success
                        .description
                        .clone()
                        .unwrap_or_else(|| "Success".to_string()),
                ),
            );
            if let Some(schema) = &success.schema {
                block.insert(
                    "content".to_string(),
                    json!({"application/json": {"schema": schema.to_openapi()}}),
                );
            }
            responses.insert(success.status.to_string(), Value::Object(block));
        }
        None => {
            responses.insert("200".to_string(), json!({"description": "Success"}));
        }
    }
    for (status, error) in &def.errors {
        let mut block = Map::new();
        block.insert(
            "description".to_string(),
            Value::String(error.description.clone()),
        );
        if let Some(schema) = &error.schema {
            block.insert(
                "content".to_string(),
                json!({"application/json": {"schema": schema.to_openapi()}}),
            );
        }
        responses.insert(status.to_string(), Value::Object(block));
    }

    // Default error responses; declared blocks always win.
    let validates = def.query_schema.is_some() || def.body_schema.is_some();
    if validates && !responses.contains_key("400") {
        responses.insert("400".to_string(), error_response("Validation error"));
    }
    if !def.security.is_empty() && !responses.contains_key("401") {
        responses.insert("401".to_string(), error_response("Unauthorized"));
    }
    if !responses.contains_key("500") {
        responses.insert("500".to_string(), error_response("Internal server error"));
    }

    let security = def
        .security
        .iter()
        .map(|requirement| serde_json::to_value(requirement).unwrap_or_else(|_| json!({})))
        .collect();

    Operation {
        operation_id: def.meta.operation_id.clone(),
        summary: def.meta.summary.clone(),
        description: def.meta.description.clone(),
        tags: def.meta.tags.clone(),
        deprecated: def.meta.deprecated,
        parameters,
        request_body,
        responses,
        security,
    }
}

/// Flatten an object query schema into parameter blocks. Non-object schemas
/// produce no parameters.
fn query_parameters(schema: &Value) -> Vec<Parameter> {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Vec::new();
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    properties
        .iter()
        .map(|(name, prop)| Parameter::query(name, required.contains(&name.as_str()), prop.clone()))
        .collect()
}

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": {"$ref": "#/components/schemas/ErrorResponse"}
            }
        }
    })
}

/// The standard envelope schemas preloaded into `components.schemas`.
fn standard_error_schemas() -> Value {
    json!({
        "ErrorResponse": {
            "type": "object",
            "properties": {
                "message": {"type": "string"},
                "code": {"type": "string"},
                "details": {}
            },
            "required": ["message", "code"]
        },
        "ValidationIssue": {
            "type": "object",
            "properties": {
                "field": {"type": "string"},
                "message": {"type": "string"}
            },
            "required": ["field", "message"]
        }
    })
}
