use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_yaml::Value;
use tracing::warn;

use crate::document::Document;

static OPENAPI_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^3\.\d+\.\d+$").expect("valid openapi version regex"));

/// Structural findings for a document. Never blocks startup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.warnings.is_empty()
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

pub fn validate(document: &Document) -> ValidationReport {
    let mut report = ValidationReport::default();

    for key in ["openapi", "info", "paths"] {
        if document.get(key).is_none() {
            report.warn(format!("Missing required top-level field '{key}'"));
        }
    }

    if document.get("info").is_some() {
        if document.title().is_none() {
            report.warn("Missing required field 'info.title'");
        }
        if document.version().is_none() {
            report.warn("Missing required field 'info.version'");
        }
    }

    match document.get("paths") {
        None => {}
        Some(Value::Mapping(paths)) if paths.is_empty() => {
            report.warn("'paths' has no entries");
        }
        Some(Value::Mapping(_)) => {}
        Some(_) => report.warn("'paths' must be a mapping of path templates"),
    }

    if let Some(version) = document.openapi_version() {
        if !OPENAPI_VERSION_RE.is_match(&version) {
            report.warn(format!(
                "Unsupported OpenAPI version '{version}', expected 3.x.y"
            ));
        }
    }

    for warning in &report.warnings {
        warn!(warning = %warning, "OpenAPI spec validation");
    }
    report
}
