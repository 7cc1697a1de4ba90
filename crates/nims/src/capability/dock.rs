//! Ligand docking with DiffDock.

use async_trait::async_trait;
use helix_core::job_kind::JobKind;
use helix_core::validation::ValidationReport;
use serde_json::{json, Value};
use validator::Validate;

use super::{check_pdb_id, ensure_valid, field, require_object, resolve_structure, text_field};
use super::Capability;
use crate::error::JobError;
use crate::sources::ExternalSources;

const ENDPOINT: &str = "/biology/mit/diffdock";

const DEFAULT_NUM_POSES: i64 = 10;
const DEFAULT_STEPS: i64 = 18;
const DEFAULT_TIME_DIVISIONS: i64 = 20;

pub struct Dock;

#[derive(Debug, Validate)]
struct DockParams {
    ligand: Option<String>,
    ligand_file_type: Option<String>,
    protein: Option<String>,
    pdb_id: Option<String>,
    #[validate(range(min = 1, max = 100))]
    num_poses: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    steps: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    time_divisions: Option<i64>,
}

impl DockParams {
    fn parse(params: &Value) -> (Self, ValidationReport) {
        let mut report = ValidationReport::new();
        let object = require_object(params, &mut report);

        let parsed = Self {
            ligand: text_field(params, "ligand", &mut report),
            ligand_file_type: text_field(params, "ligand_file_type", &mut report),
            protein: text_field(params, "protein", &mut report),
            pdb_id: text_field(params, "pdb_id", &mut report),
            num_poses: field(params, "num_poses", &mut report),
            steps: field(params, "steps", &mut report),
            time_divisions: field(params, "time_divisions", &mut report),
        };
        if !object {
            return (parsed, report);
        }

        if let Err(errors) = parsed.validate() {
            report.merge_validator(errors);
        }
        report.require("ligand", parsed.ligand.is_some());
        if let Some(kind) = parsed.ligand_file_type.as_deref() {
            if !matches!(kind, "txt" | "sdf" | "mol2") {
                report.push("ligand_file_type", "must be one of: txt, sdf, mol2");
            }
        }
        report.exactly_one_of(
            ("protein", parsed.protein.is_some()),
            ("pdb_id", parsed.pdb_id.is_some()),
        );
        check_pdb_id(&mut report, "pdb_id", parsed.pdb_id.as_deref());

        (parsed, report)
    }
}

/// SMILES strings are single-line; anything multi-line is a structure file.
fn infer_ligand_type(ligand: &str) -> &'static str {
    if ligand.contains('\n') {
        "sdf"
    } else {
        "txt"
    }
}

#[async_trait]
impl Capability for Dock {
    fn kind(&self) -> JobKind {
        JobKind::Dock
    }

    fn endpoint_path(&self, _params: &Value) -> &'static str {
        ENDPOINT
    }

    fn validate(&self, params: &Value) -> ValidationReport {
        DockParams::parse(params).1
    }

    async fn build_payload(
        &self,
        params: &Value,
        sources: &ExternalSources,
    ) -> Result<Value, JobError> {
        let (parsed, report) = DockParams::parse(params);
        ensure_valid(report)?;

        let ligand = parsed.ligand.unwrap_or_default();
        let ligand_file_type = parsed
            .ligand_file_type
            .unwrap_or_else(|| infer_ligand_type(&ligand).to_string());
        let protein = resolve_structure(parsed.protein, parsed.pdb_id, "protein", sources).await?;

        Ok(json!({
            "ligand": ligand,
            "ligand_file_type": ligand_file_type,
            "protein": protein,
            "num_poses": parsed.num_poses.unwrap_or(DEFAULT_NUM_POSES),
            "steps": parsed.steps.unwrap_or(DEFAULT_STEPS),
            "time_divisions": parsed.time_divisions.unwrap_or(DEFAULT_TIME_DIVISIONS),
            "save_trajectory": false,
            "is_staged": false,
        }))
    }

    fn result_keys(&self) -> &'static [&'static str] {
        &["ligand_positions", "poses", "output"]
    }

    fn artifact_extension(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    #[test]
    fn ligand_is_required() {
        let report = Dock.validate(&json!({"pdb_id": "6N4O"}));
        assert!(report.mentions("ligand"));
        assert!(!report.mentions("pdb_id"));
    }

    #[test]
    fn sampling_counts_bounded() {
        let report = Dock.validate(&json!({
            "ligand": "CCO",
            "protein": "ATOM",
            "num_poses": 0,
            "steps": 101,
            "time_divisions": 1000,
        }));
        for field in ["num_poses", "steps", "time_divisions"] {
            assert!(report.mentions(field), "{field}");
        }
    }

    #[tokio::test]
    async fn payload_infers_smiles_ligand_type() {
        let sources = ExternalSources::new(reqwest::Client::new(), &ProviderConfig::default());
        let payload = Dock
            .build_payload(&json!({"ligand": "CCO", "protein": "ATOM 1"}), &sources)
            .await
            .unwrap();
        assert_eq!(payload["ligand_file_type"], "txt");
        assert_eq!(payload["num_poses"], DEFAULT_NUM_POSES);
        assert_eq!(payload["protein"], "ATOM 1");
    }
}
