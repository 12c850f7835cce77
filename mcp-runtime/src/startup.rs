use std::path::PathBuf;

use openapi_mcp_core::{
    LoadedSpec, RepairOutcome, SpecError, SpecLocator, ValidationReport, extract_operations,
    load_spec, validate,
};
use serde_json::{Value, json};
use tracing::info;

use crate::RuntimeConfig;
use crate::catalog::ToolCatalog;

/// Everything built once before the first message is read.
#[derive(Debug)]
pub struct Startup {
    pub spec_path: PathBuf,
    pub repair: Option<RepairOutcome>,
    pub validation: ValidationReport,
    pub title: Option<String>,
    pub version: Option<String>,
    pub base_url: String,
    pub catalog: ToolCatalog,
}

impl Startup {
    /// Resolve, load (repairing if needed), validate and extract.
    pub fn prepare(config: &RuntimeConfig) -> Result<Self, SpecError> {
        let path = SpecLocator::from_env(config.spec_path.clone()).resolve()?;
        let loaded = load_spec(&path)?;
        Ok(Self::from_loaded(loaded))
    }

    pub fn from_loaded(loaded: LoadedSpec) -> Self {
        let validation = validate(&loaded.document);
        let catalog = ToolCatalog::new(extract_operations(&loaded.document));
        let base_url = loaded.document.base_url();
        info!(
            spec = %loaded.path.display(),
            tools = catalog.len(),
            base_url = %base_url,
            valid = validation.is_valid(),
            "tool catalog ready"
        );
        Self {
            spec_path: loaded.path,
            repair: loaded.repair,
            validation,
            title: loaded.document.title(),
            version: loaded.document.version(),
            base_url,
            catalog,
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.validation.is_valid() && !self.catalog.is_empty()
    }

    pub fn report(&self) -> Value {
        let repair = self.repair.as_ref().map(|outcome| {
            json!({
                "strategy": outcome.strategy,
                "backup_path": outcome.backup_path.display().to_string(),
            })
        });
        json!({
            "status": if self.is_healthy() { "ready" } else { "degraded" },
            "spec_path": self.spec_path.display().to_string(),
            "title": self.title,
            "version": self.version,
            "base_url": self.base_url,
            "repair": repair,
            "validation": {
                "valid": self.validation.is_valid(),
                "warnings": self.validation.warnings,
            },
            "tools": self.catalog.tool_definitions(),
        })
    }
}
