//! Recovery for specs that fail to parse because of duplicate mapping keys.
//!
//! Hand-edited or concatenated specs often end up with a second `info:` or
//! `servers:` block. Each strategy below is a pure function over the raw lines
//! producing a candidate text; a candidate is only accepted once it reparses.
//! The original bytes are copied to a sibling backup before the working file is
//! overwritten with the accepted candidate.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::document::Document;
use crate::error::SpecError;

const REPAIRABLE_SECTIONS: [&str; 4] = ["info", "servers", "paths", "components"];

static PATHS_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^paths:(?:[ \t].*)?$").expect("valid paths header regex"));
static COMPONENTS_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^components:(?:[ \t].*)?$").expect("valid components header regex")
});

const RECOVERED_HEADER: &str = "\
openapi: 3.0.0
info:
  title: Recovered API
  version: 1.0.0
servers:
  - url: http://localhost:8080
";

pub const MINIMAL_SPEC: &str = "\
openapi: 3.0.0
info:
  title: Minimal API
  version: 1.0.0
servers:
  - url: http://localhost:8080
paths:
  /health:
    get:
      operationId: healthCheck
      summary: Health check
      responses:
        '200':
          description: OK
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairStrategy {
    StructureAware,
    NaiveDedup,
    SurgicalReconstruction,
    MinimalSpec,
}

impl RepairStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            RepairStrategy::StructureAware => "structure_aware",
            RepairStrategy::NaiveDedup => "naive_dedup",
            RepairStrategy::SurgicalReconstruction => "surgical_reconstruction",
            RepairStrategy::MinimalSpec => "minimal_spec",
        }
    }
}

/// An accepted candidate: its text and the document it parsed to.
#[derive(Debug, Clone)]
pub struct RepairedSpec {
    pub strategy: RepairStrategy,
    pub text: String,
    pub document: Document,
}

#[derive(Debug, Clone)]
pub struct RepairOutcome {
    pub strategy: RepairStrategy,
    pub backup_path: PathBuf,
    pub document: Document,
}

/// Back up `path`, repair its contents and promote the accepted candidate over it.
pub fn repair_file(path: &Path) -> Result<RepairOutcome, SpecError> {
    let original = std::fs::read_to_string(path).map_err(|source| SpecError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let backup_path = backup_path_for(path);
    std::fs::write(&backup_path, &original).map_err(|source| SpecError::Write {
        path: backup_path.clone(),
        source,
    })?;
    debug!(backup = %backup_path.display(), "saved original spec");

    let repaired = repair_text(&original)?;
    std::fs::write(path, &repaired.text).map_err(|source| SpecError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(RepairOutcome {
        strategy: repaired.strategy,
        backup_path,
        document: repaired.document,
    })
}

/// Run the strategy chain over `text` without touching the filesystem.
pub fn repair_text(text: &str) -> Result<RepairedSpec, SpecError> {
    let lines: Vec<&str> = text.lines().collect();

    match remove_duplicate_sections(&lines) {
        Some(candidate) => {
            if let Some(repaired) = accept(RepairStrategy::StructureAware, candidate) {
                return Ok(repaired);
            }
            if let Some(repaired) =
                accept(RepairStrategy::SurgicalReconstruction, reconstruct(&lines))
            {
                return Ok(repaired);
            }
        }
        None => {
            if let Some(repaired) = accept(RepairStrategy::NaiveDedup, naive_dedup(&lines)) {
                return Ok(repaired);
            }
        }
    }

    warn!("falling back to the built-in minimal spec; original operations are unavailable");
    Document::parse(MINIMAL_SPEC)
        .map(|document| RepairedSpec {
            strategy: RepairStrategy::MinimalSpec,
            text: MINIMAL_SPEC.to_string(),
            document,
        })
        .map_err(|err| SpecError::RepairExhausted {
            message: err.to_string(),
        })
}

fn accept(strategy: RepairStrategy, candidate: String) -> Option<RepairedSpec> {
    match Document::parse(&candidate) {
        Ok(document) => Some(RepairedSpec {
            strategy,
            text: candidate,
            document,
        }),
        Err(err) => {
            warn!(strategy = strategy.as_str(), error = %err, "repair candidate rejected");
            None
        }
    }
}

fn backup_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "openapi.yaml".to_string());
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    path.with_file_name(format!("{file_name}.{stamp}.bak"))
}

/// Key of a zero-indentation `key:` line.
fn top_level_key(line: &str) -> Option<&str> {
    if line.starts_with([' ', '\t', '#', '-']) {
        return None;
    }
    let (key, rest) = line.split_once(':')?;
    if !(rest.is_empty() || rest.starts_with([' ', '\t'])) {
        return None;
    }
    let key = key.trim().trim_matches(|c| c == '"' || c == '\'');
    (!key.is_empty()).then_some(key)
}

/// A non-blank line back at column zero closes the open block. Comments and
/// zero-indent sequence items (`- url: ...` under `servers:`) do not.
fn is_block_boundary(line: &str) -> bool {
    if line.trim().is_empty() || line.starts_with([' ', '\t', '#']) {
        return false;
    }
    !line.starts_with('-') || line.starts_with("---")
}

fn block_end(lines: &[&str], start: usize) -> usize {
    let mut end = start + 1;
    while end < lines.len() && !is_block_boundary(lines[end]) {
        end += 1;
    }
    end
}

/// Drop every later repeat of `info`, `servers`, `paths` or `components`
/// together with its block. `None` when no such repeat exists.
fn remove_duplicate_sections(lines: &[&str]) -> Option<String> {
    let mut seen = HashSet::new();
    let mut removed = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let duplicate = top_level_key(lines[i])
            .filter(|key| REPAIRABLE_SECTIONS.contains(key))
            .is_some_and(|key| !seen.insert(key));
        if duplicate {
            let end = block_end(lines, i);
            debug!(line = i + 1, end, "dropping duplicate top-level block");
            removed.push(i..end);
            i = end;
            continue;
        }
        i += 1;
    }
    if removed.is_empty() {
        return None;
    }

    let kept: Vec<&str> = lines
        .iter()
        .enumerate()
        .filter(|(idx, _)| !removed.iter().any(|range| range.contains(idx)))
        .map(|(_, line)| *line)
        .collect();
    Some(join_lines(&kept))
}

/// Line scan that drops any top-level key already seen, with its block.
fn naive_dedup(lines: &[&str]) -> String {
    let mut seen = HashSet::new();
    let mut skipping = false;
    let mut kept = Vec::with_capacity(lines.len());
    for line in lines {
        if let Some(key) = top_level_key(line) {
            skipping = !seen.insert(key);
        } else if is_block_boundary(line) {
            skipping = false;
        }
        if !skipping {
            kept.push(*line);
        }
    }
    join_lines(&kept)
}

/// Fixed header plus the first `paths:` and `components:` blocks found.
fn reconstruct(lines: &[&str]) -> String {
    let paths = extract_block(lines, &PATHS_HEADER_RE).unwrap_or_else(|| "paths: {}".to_string());
    let components = extract_block(lines, &COMPONENTS_HEADER_RE)
        .unwrap_or_else(|| "components: {}".to_string());
    format!("{RECOVERED_HEADER}{paths}\n{components}\n")
}

fn extract_block(lines: &[&str], header: &Regex) -> Option<String> {
    let start = lines.iter().position(|line| header.is_match(line))?;
    let end = block_end(lines, start);
    Some(lines[start..end].join("\n").trim_end().to_string())
}

fn join_lines(lines: &[&str]) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}
