use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::document::Document;
use crate::error::SpecError;
use crate::repair::{RepairOutcome, repair_file};

pub const DEFAULT_SPEC_FILE: &str = "openapi.yaml";

const CWD_FALLBACKS: [&str; 4] = [
    "spec/openapi.yaml",
    "specs/openapi.yaml",
    "openapi.yml",
    "openapi.json",
];

/// Places searched for the OpenAPI document, in order.
#[derive(Debug, Clone)]
pub struct SpecLocator {
    pub explicit: Option<PathBuf>,
    pub program_dir: Option<PathBuf>,
    pub working_dir: PathBuf,
    pub config_dir: Option<PathBuf>,
}

impl SpecLocator {
    /// Locator for the running process: executable directory, current directory
    /// and the platform config directory.
    pub fn from_env(explicit: Option<PathBuf>) -> Self {
        let program_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));
        Self {
            explicit,
            program_dir,
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_dir: dirs::config_dir().map(|dir| dir.join("openapi-mcp")),
        }
    }

    pub fn candidates(&self) -> Vec<PathBuf> {
        let requested = self
            .explicit
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SPEC_FILE));
        if requested.is_absolute() {
            return vec![requested];
        }

        let mut candidates = Vec::new();
        if let Some(dir) = &self.program_dir {
            candidates.push(dir.join(&requested));
        }
        candidates.push(self.working_dir.join(&requested));
        for fallback in CWD_FALLBACKS {
            candidates.push(self.working_dir.join(fallback));
        }
        if let Some(dir) = &self.config_dir {
            candidates.push(dir.join(DEFAULT_SPEC_FILE));
        }
        candidates.dedup();
        candidates
    }

    pub fn resolve(&self) -> Result<PathBuf, SpecError> {
        for candidate in self.candidates() {
            if candidate.is_file() {
                debug!(path = %candidate.display(), "resolved OpenAPI spec path");
                return Ok(candidate);
            }
        }
        Err(SpecError::NotFound {
            path: self
                .explicit
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SPEC_FILE)),
        })
    }
}

/// Read and parse a spec file. Duplicate-key failures come back as
/// `SpecError::Parse { duplicate_key: true, .. }` for the caller to repair.
pub fn load_document(path: &Path) -> Result<Document, SpecError> {
    if !path.exists() {
        return Err(SpecError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|source| SpecError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Document::parse(&text)
}

#[derive(Debug)]
pub struct LoadedSpec {
    pub path: PathBuf,
    pub document: Document,
    pub repair: Option<RepairOutcome>,
}

/// Load a spec, running the repair chain when parsing fails on duplicate keys.
pub fn load_spec(path: &Path) -> Result<LoadedSpec, SpecError> {
    match load_document(path) {
        Ok(document) => {
            info!(path = %path.display(), "loaded OpenAPI spec");
            Ok(LoadedSpec {
                path: path.to_path_buf(),
                document,
                repair: None,
            })
        }
        Err(err) if err.is_duplicate_key() => {
            warn!(path = %path.display(), error = %err, "duplicate keys in OpenAPI spec, attempting repair");
            let outcome = repair_file(path)?;
            info!(
                strategy = outcome.strategy.as_str(),
                backup = %outcome.backup_path.display(),
                "repaired OpenAPI spec"
            );
            Ok(LoadedSpec {
                path: path.to_path_buf(),
                document: outcome.document.clone(),
                repair: Some(outcome),
            })
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repair::RepairStrategy;

    fn locator(dir: &Path) -> SpecLocator {
        SpecLocator {
            explicit: None,
            program_dir: None,
            working_dir: dir.to_path_buf(),
            config_dir: None,
        }
    }

    #[test]
    fn load_document_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_document(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, SpecError::NotFound { .. }));
    }

    #[test]
    fn non_duplicate_parse_error_fails_fast_without_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openapi.yaml");
        std::fs::write(&path, "openapi: 3.0.0\ninfo: [broken\n").unwrap();

        let err = load_spec(&path).unwrap_err();
        assert!(matches!(
            err,
            SpecError::Parse {
                duplicate_key: false,
                ..
            }
        ));
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1, "no backup should be written for fatal parse errors");
    }

    #[test]
    fn duplicate_info_and_servers_are_repaired_structurally() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("openapi.yaml");
        let original = "\
openapi: 3.0.0
info:
  title: Users API
  version: 1.0.0
servers:
  - url: https://api.example.com
paths:
  /users:
    get:
      operationId: listUsers
info:
  title: Duplicate
  version: 9.9.9
servers:
  - url: https://other.example.com
";
        std::fs::write(&path, original).unwrap();

        let loaded = load_spec(&path).unwrap();
        let repair = loaded.repair.expect("repair should have run");
        assert_eq!(repair.strategy, RepairStrategy::StructureAware);
        assert_eq!(loaded.document.title().as_deref(), Some("Users API"));
        assert_eq!(loaded.document.base_url(), "https://api.example.com");
        assert_eq!(std::fs::read_to_string(&repair.backup_path).unwrap(), original);
        assert!(load_document(&path).is_ok(), "working file should now parse");
    }

    #[test]
    fn resolve_prefers_working_dir_then_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("specs")).unwrap();
        std::fs::write(dir.path().join("specs/openapi.yaml"), "openapi: 3.0.0\n").unwrap();
        assert_eq!(
            locator(dir.path()).resolve().unwrap(),
            dir.path().join("specs/openapi.yaml")
        );

        std::fs::write(dir.path().join("openapi.yaml"), "openapi: 3.0.0\n").unwrap();
        assert_eq!(
            locator(dir.path()).resolve().unwrap(),
            dir.path().join("openapi.yaml")
        );
    }

    #[test]
    fn resolve_checks_program_dir_before_working_dir() {
        let program = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        std::fs::write(program.path().join("api.yaml"), "openapi: 3.0.0\n").unwrap();
        std::fs::write(work.path().join("api.yaml"), "openapi: 3.0.0\n").unwrap();

        let locator = SpecLocator {
            explicit: Some(PathBuf::from("api.yaml")),
            program_dir: Some(program.path().to_path_buf()),
            working_dir: work.path().to_path_buf(),
            config_dir: None,
        };
        assert_eq!(locator.resolve().unwrap(), program.path().join("api.yaml"));
    }

    #[test]
    fn resolve_missing_absolute_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut locator = locator(dir.path());
        locator.explicit = Some(dir.path().join("missing.yaml"));
        assert!(matches!(
            locator.resolve(),
            Err(SpecError::NotFound { .. })
        ));
    }
}
