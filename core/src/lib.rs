//! Spec-to-tool compiler: load an OpenAPI document (repairing duplicate keys when
//! needed), check its shape, and extract the operation catalog.

pub mod document;
pub mod error;
pub mod loader;
pub mod operation;
pub mod repair;
pub mod validate;

pub use document::{DEFAULT_BASE_URL, Document};
pub use error::SpecError;
pub use loader::{LoadedSpec, SpecLocator, load_document, load_spec};
pub use operation::{
    BODY_ARGUMENT, Operation, Parameter, ParameterLocation, RequestBody, extract_operations,
    synthesize_operation_id,
};
pub use repair::{RepairOutcome, RepairStrategy};
pub use validate::{ValidationReport, validate};
