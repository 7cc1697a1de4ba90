//! Capability-specific validation and payload construction.
//!
//! A [`Capability`] knows one provider model: which endpoint it is served
//! from, which parameters it accepts, how to turn validated parameters into
//! the provider's request body, and where the result artifact lives in the
//! provider's response.

mod design;
mod dock;
mod fold;
mod inverse_fold;

use std::sync::LazyLock;

use async_trait::async_trait;
use helix_core::job_kind::JobKind;
use helix_core::validation::ValidationReport;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::JobError;
use crate::sources::ExternalSources;

pub use design::Design;
pub use dock::Dock;
pub use fold::{Fold, FoldModel};
pub use inverse_fold::InverseFold;

/// Four-character PDB identifier, e.g. `1R42`.
static PDB_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9][A-Za-z0-9]{3}$").expect("valid regex"));

/// UniProt accession number shape.
static UNIPROT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[OPQ][0-9][A-Z0-9]{3}[0-9]|[A-NR-Z][0-9](?:[A-Z][A-Z0-9]{2}[0-9]){1,2})$")
        .expect("valid regex")
});

/// One provider model exposed as a job kind.
#[async_trait]
pub trait Capability: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Endpoint path relative to the provider base URL.
    fn endpoint_path(&self, params: &Value) -> &'static str;

    /// Check the caller's parameters, collecting every violation.
    fn validate(&self, params: &Value) -> ValidationReport;

    /// Merge the parameters over the model defaults and resolve any
    /// identifier-based input into inline content.
    async fn build_payload(
        &self,
        params: &Value,
        sources: &ExternalSources,
    ) -> Result<Value, JobError>;

    /// Keys under which the provider returns the result artifact, in
    /// order of preference.
    fn result_keys(&self) -> &'static [&'static str];

    /// File extension of the stored artifact.
    fn artifact_extension(&self) -> &'static str;
}

static DESIGN: Design = Design;
static FOLD: Fold = Fold;
static INVERSE_FOLD: InverseFold = InverseFold;
static DOCK: Dock = Dock;

/// The capability implementation for a job kind.
pub fn capability_for(kind: JobKind) -> &'static dyn Capability {
    match kind {
        JobKind::Design => &DESIGN,
        JobKind::Fold => &FOLD,
        JobKind::InverseFold => &INVERSE_FOLD,
        JobKind::Dock => &DOCK,
    }
}

// ---- parameter helpers ----

/// Read an optional field, reporting a type mismatch against its name.
///
/// Missing and `null` fields are `None` without an error.
pub(crate) fn field<T: DeserializeOwned>(
    params: &Value,
    name: &str,
    report: &mut ValidationReport,
) -> Option<T> {
    match params.get(name) {
        None | Some(Value::Null) => None,
        Some(value) => match serde_json::from_value(value.clone()) {
            Ok(parsed) => Some(parsed),
            Err(_) => {
                report.push(name, format!("must be {}", expected_type::<T>()));
                None
            }
        },
    }
}

/// Read an optional string field, treating blank strings as absent.
pub(crate) fn text_field(
    params: &Value,
    name: &str,
    report: &mut ValidationReport,
) -> Option<String> {
    field::<String>(params, name, report)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn expected_type<T>() -> &'static str {
    let name = std::any::type_name::<T>();
    if name.contains("Vec") {
        "a list"
    } else if name.contains("String") {
        "a string"
    } else if name.contains("f64") || name.contains("f32") {
        "a number"
    } else if name.contains("bool") {
        "a boolean"
    } else {
        "an integer"
    }
}

/// Parameters must be a JSON object before any field can be checked.
pub(crate) fn require_object(params: &Value, report: &mut ValidationReport) -> bool {
    if params.is_object() {
        true
    } else {
        report.push("parameters", "must be a JSON object");
        false
    }
}

pub(crate) fn check_pdb_id(report: &mut ValidationReport, field: &str, id: Option<&str>) {
    if let Some(id) = id {
        if !PDB_ID_RE.is_match(id) {
            report.push(field, "must be a 4-character PDB identifier such as 1R42");
        }
    }
}

pub(crate) fn check_uniprot_id(report: &mut ValidationReport, field: &str, id: Option<&str>) {
    if let Some(id) = id {
        if !UNIPROT_ID_RE.is_match(&id.to_ascii_uppercase()) {
            report.push(field, "must be a UniProt accession such as P69905");
        }
    }
}

/// Fail with the validation report when parameters reach the payload
/// builder without passing validation.
pub(crate) fn ensure_valid(report: ValidationReport) -> Result<(), JobError> {
    report.into_result().map_err(JobError::Validation)
}

/// Inline PDB content, or the ATOM records of an RCSB entry.
pub(crate) async fn resolve_structure(
    inline: Option<String>,
    pdb_id: Option<String>,
    inline_field: &str,
    sources: &ExternalSources,
) -> Result<String, JobError> {
    match (inline, pdb_id) {
        (Some(content), _) => Ok(content),
        (None, Some(id)) => sources.fetch_pdb(&id).await,
        (None, None) => {
            let mut report = ValidationReport::new();
            report.exactly_one_of((inline_field, false), ("pdb_id", false));
            Err(JobError::Validation(report))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn every_kind_has_a_capability() {
        for kind in JobKind::ALL {
            assert_eq!(capability_for(kind).kind(), kind);
        }
    }

    #[test]
    fn field_reports_type_mismatch_by_name() {
        let mut report = ValidationReport::new();
        let params = json!({"diffusion_steps": "many"});
        let steps: Option<i64> = field(&params, "diffusion_steps", &mut report);
        assert!(steps.is_none());
        assert!(report.mentions("diffusion_steps"));
        assert_eq!(report.errors()[0].message, "must be an integer");
    }

    #[test]
    fn blank_text_counts_as_missing() {
        let mut report = ValidationReport::new();
        assert_eq!(text_field(&json!({"contigs": "   "}), "contigs", &mut report), None);
        assert!(report.is_valid());
    }

    #[test]
    fn identifier_shapes() {
        let mut report = ValidationReport::new();
        check_pdb_id(&mut report, "pdb_id", Some("1R42"));
        check_uniprot_id(&mut report, "uniprot_id", Some("P69905"));
        check_uniprot_id(&mut report, "uniprot_id", Some("a0a023gpi8"));
        assert!(report.is_valid());

        check_pdb_id(&mut report, "pdb_id", Some("R42"));
        check_uniprot_id(&mut report, "uniprot_id", Some("HBA_HUMAN"));
        assert!(report.mentions("pdb_id"));
        assert!(report.mentions("uniprot_id"));
    }

    #[test]
    fn non_object_parameters_are_rejected() {
        let mut report = ValidationReport::new();
        assert!(!require_object(&json!(["contigs"]), &mut report));
        assert!(report.mentions("parameters"));
    }
}
