//! Compile `paths` entries into the tool catalog.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue, json};
use serde_yaml::Value;
use tracing::{debug, warn};

use crate::document::{Document, bool_field, key_string, scalar_string, str_field, to_json};

/// Verbs recognized under a path item. Matching is exact and lowercase.
pub const HTTP_METHODS: [&str; 7] = ["get", "post", "put", "delete", "patch", "options", "head"];

/// Parameter schema keys copied into the tool input schema besides `type`.
const PASSTHROUGH_SCHEMA_KEYS: [&str; 4] = ["enum", "format", "items", "default"];

pub const BODY_ARGUMENT: &str = "body";

static NON_WORD_CHAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_]").expect("valid non-word regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
    Unknown,
}

impl ParameterLocation {
    fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("path") => ParameterLocation::Path,
            Some("query") => ParameterLocation::Query,
            Some("header") => ParameterLocation::Header,
            Some("cookie") => ParameterLocation::Cookie,
            _ => ParameterLocation::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "in")]
    pub location: ParameterLocation,
    pub required: bool,
    pub description: String,
    /// Property schema as exposed in the tool's input schema.
    pub schema: JsonValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestBody {
    pub required: bool,
    pub content_type: Option<String>,
    pub description: Option<String>,
    pub properties: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub operation_id: String,
    pub path: String,
    pub method: String,
    pub summary: String,
    pub description: String,
    pub parameters: Vec<Parameter>,
    pub request_body: Option<RequestBody>,
    pub input_schema: JsonValue,
}

impl Operation {
    /// Text shown to the agent: the description, or the summary when empty.
    pub fn tool_description(&self) -> &str {
        if self.description.is_empty() {
            &self.summary
        } else {
            &self.description
        }
    }

    pub fn parameters_in(&self, location: ParameterLocation) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .iter()
            .filter(move |param| param.location == location)
    }
}

/// Why an operation was left out of the catalog.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("operation definition is not a mapping")]
    NotAMapping,
    #[error("'parameters' is not a sequence")]
    ParametersNotASequence,
    #[error("'requestBody' is not a mapping")]
    RequestBodyNotAMapping,
}

/// `{method}_{path}` with every non-word character of the path replaced by `_`.
pub fn synthesize_operation_id(method: &str, path: &str) -> String {
    format!("{method}_{}", NON_WORD_CHAR_RE.replace_all(path, "_"))
}

/// Every recognized `(path, method)` entry, in declaration order. Malformed
/// entries are logged and skipped.
pub fn extract_operations(document: &Document) -> Vec<Operation> {
    let mut operations = Vec::new();
    let Some(paths) = document.paths() else {
        warn!("OpenAPI spec has no 'paths' mapping; no tools will be exposed");
        return operations;
    };

    for (path_key, path_item) in paths {
        let path = key_string(path_key);
        let Some(methods) = path_item.as_mapping() else {
            warn!(path = %path, "path item is not a mapping, skipping");
            continue;
        };
        let shared_parameters = path_item.get("parameters");

        for (method_key, definition) in methods {
            let Some(method) = method_key.as_str() else {
                continue;
            };
            if !HTTP_METHODS.contains(&method) {
                continue;
            }
            match build_operation(&path, method, definition, shared_parameters) {
                Ok(operation) => {
                    debug!(
                        operation_id = %operation.operation_id,
                        method,
                        path = %path,
                        "extracted operation"
                    );
                    operations.push(operation);
                }
                Err(reason) => {
                    warn!(method, path = %path, reason = %reason, "skipping operation");
                }
            }
        }
    }

    if operations.is_empty() {
        warn!("no operations extracted from OpenAPI spec; serving zero tools");
    }
    operations
}

fn build_operation(
    path: &str,
    method: &str,
    definition: &Value,
    shared_parameters: Option<&Value>,
) -> Result<Operation, SkipReason> {
    if !definition.is_mapping() {
        return Err(SkipReason::NotAMapping);
    }

    let operation_id = definition
        .get("operationId")
        .and_then(scalar_string)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| synthesize_operation_id(method, path));
    let summary = str_field(definition, "summary")
        .filter(|summary| !summary.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} {path}", method.to_uppercase()));
    let description = str_field(definition, "description")
        .unwrap_or_default()
        .to_string();

    let mut parameters = parse_parameters(shared_parameters)?;
    for parameter in parse_parameters(definition.get("parameters"))? {
        match parameters
            .iter_mut()
            .find(|existing| existing.name == parameter.name && existing.location == parameter.location)
        {
            Some(existing) => *existing = parameter,
            None => parameters.push(parameter),
        }
    }

    let request_body = match definition.get("requestBody") {
        None | Some(Value::Null) => None,
        Some(body) if body.is_mapping() => Some(parse_request_body(body)),
        Some(_) => return Err(SkipReason::RequestBodyNotAMapping),
    };

    let input_schema = build_input_schema(&parameters, request_body.as_ref());

    Ok(Operation {
        operation_id,
        path: path.to_string(),
        method: method.to_string(),
        summary,
        description,
        parameters,
        request_body,
        input_schema,
    })
}

fn parse_parameters(value: Option<&Value>) -> Result<Vec<Parameter>, SkipReason> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(entries)) => Ok(entries.iter().filter_map(parse_parameter).collect()),
        Some(_) => Err(SkipReason::ParametersNotASequence),
    }
}

fn parse_parameter(entry: &Value) -> Option<Parameter> {
    let Some(name) = str_field(entry, "name") else {
        debug!("ignoring parameter without a name (unresolved $ref?)");
        return None;
    };
    let description = str_field(entry, "description")
        .filter(|description| !description.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{name} parameter"));

    let declared = entry.get("schema");
    let schema_type = declared
        .and_then(|schema| str_field(schema, "type"))
        .unwrap_or("string");
    let mut schema = json!({
        "type": schema_type,
        "description": description,
    });
    if let Some(declared) = declared {
        for key in PASSTHROUGH_SCHEMA_KEYS {
            if let Some(value) = declared.get(key) {
                schema[key] = to_json(value);
            }
        }
    }

    Some(Parameter {
        name: name.to_string(),
        location: ParameterLocation::parse(str_field(entry, "in")),
        required: bool_field(entry, "required"),
        description,
        schema,
    })
}

/// Only the first content type is inspected, in declaration order.
fn parse_request_body(body: &Value) -> RequestBody {
    let first_content = body
        .get("content")
        .and_then(Value::as_mapping)
        .and_then(|content| content.iter().next());
    let content_type = first_content.map(|(media_type, _)| key_string(media_type));
    let properties = first_content
        .and_then(|(_, media)| media.get("schema"))
        .and_then(|schema| schema.get("properties"))
        .filter(|properties| properties.is_mapping())
        .map(to_json);

    RequestBody {
        required: bool_field(body, "required"),
        content_type,
        description: str_field(body, "description").map(str::to_string),
        properties,
    }
}

fn build_input_schema(parameters: &[Parameter], request_body: Option<&RequestBody>) -> JsonValue {
    let mut properties = JsonMap::new();
    let mut required: Vec<String> = Vec::new();

    for parameter in parameters {
        properties.insert(parameter.name.clone(), parameter.schema.clone());
        if parameter.required && !required.contains(&parameter.name) {
            required.push(parameter.name.clone());
        }
    }

    if let Some(body) = request_body {
        let mut property = json!({
            "type": "object",
            "description": body.description.as_deref().unwrap_or("Request body"),
        });
        if let Some(nested) = &body.properties {
            property["properties"] = nested.clone();
        }
        properties.insert(BODY_ARGUMENT.to_string(), property);
        if body.required && !required.iter().any(|name| name == BODY_ARGUMENT) {
            required.push(BODY_ARGUMENT.to_string());
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
