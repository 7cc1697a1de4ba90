//! Backbone design with RFdiffusion.

use std::sync::LazyLock;

use async_trait::async_trait;
use helix_core::job_kind::JobKind;
use helix_core::validation::ValidationReport;
use regex::Regex;
use serde_json::{json, Value};
use validator::Validate;

use super::{check_pdb_id, ensure_valid, field, require_object, resolve_structure, text_field};
use super::Capability;
use crate::error::JobError;
use crate::sources::ExternalSources;

const ENDPOINT: &str = "/biology/ipd/rfdiffusion/generate";

/// Diffusion steps when the caller does not choose.
pub const DEFAULT_DIFFUSION_STEPS: i64 = 15;

/// Hotspot residue such as `A50`: chain letter then residue number.
static HOTSPOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][0-9]+$").expect("valid regex"));

pub struct Design;

#[derive(Debug, Validate)]
struct DesignParams {
    contigs: Option<String>,
    #[validate(range(min = 1, max = 100))]
    diffusion_steps: Option<i64>,
    hotspot_res: Vec<String>,
    input_pdb: Option<String>,
    pdb_id: Option<String>,
}

impl DesignParams {
    fn parse(params: &Value) -> (Self, ValidationReport) {
        let mut report = ValidationReport::new();
        let object = require_object(params, &mut report);

        let parsed = Self {
            contigs: text_field(params, "contigs", &mut report),
            diffusion_steps: field(params, "diffusion_steps", &mut report),
            hotspot_res: field(params, "hotspot_res", &mut report).unwrap_or_default(),
            input_pdb: text_field(params, "input_pdb", &mut report),
            pdb_id: text_field(params, "pdb_id", &mut report),
        };
        if !object {
            return (parsed, report);
        }

        if let Err(errors) = parsed.validate() {
            report.merge_validator(errors);
        }
        report.require("contigs", parsed.contigs.is_some());
        for residue in &parsed.hotspot_res {
            if !HOTSPOT_RE.is_match(residue) {
                report.push(
                    "hotspot_res",
                    format!("'{residue}' is not a residue like A50"),
                );
            }
        }
        report.exactly_one_of(
            ("input_pdb", parsed.input_pdb.is_some()),
            ("pdb_id", parsed.pdb_id.is_some()),
        );
        check_pdb_id(&mut report, "pdb_id", parsed.pdb_id.as_deref());

        (parsed, report)
    }
}

#[async_trait]
impl Capability for Design {
    fn kind(&self) -> JobKind {
        JobKind::Design
    }

    fn endpoint_path(&self, _params: &Value) -> &'static str {
        ENDPOINT
    }

    fn validate(&self, params: &Value) -> ValidationReport {
        DesignParams::parse(params).1
    }

    async fn build_payload(
        &self,
        params: &Value,
        sources: &ExternalSources,
    ) -> Result<Value, JobError> {
        let (parsed, report) = DesignParams::parse(params);
        ensure_valid(report)?;

        let structure =
            resolve_structure(parsed.input_pdb, parsed.pdb_id, "input_pdb", sources).await?;

        Ok(json!({
            "input_pdb": structure,
            "contigs": parsed.contigs,
            "hotspot_res": parsed.hotspot_res,
            "diffusion_steps": parsed.diffusion_steps.unwrap_or(DEFAULT_DIFFUSION_STEPS),
        }))
    }

    fn result_keys(&self) -> &'static [&'static str] {
        &["output_pdb", "pdb"]
    }

    fn artifact_extension(&self) -> &'static str {
        "pdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;

    fn sources() -> ExternalSources {
        ExternalSources::new(reqwest::Client::new(), &ProviderConfig::default())
    }

    #[test]
    fn valid_parameters_pass() {
        let report = Design.validate(&json!({
            "contigs": "A20-60/0 50-100",
            "hotspot_res": ["A50", "A51"],
            "diffusion_steps": 50,
            "pdb_id": "1R42",
        }));
        assert_eq!(report.outcome(), (true, &[][..]));
    }

    #[test]
    fn missing_contigs_is_named() {
        let report = Design.validate(&json!({"input_pdb": "ATOM ..."}));
        assert!(!report.is_valid());
        assert!(report.mentions("contigs"));
    }

    #[test]
    fn diffusion_steps_bounded() {
        for steps in [0, 101, -3] {
            let report = Design.validate(&json!({
                "contigs": "50",
                "input_pdb": "ATOM",
                "diffusion_steps": steps,
            }));
            assert!(report.mentions("diffusion_steps"), "{steps}");
        }
        for steps in [1, 100] {
            let report = Design.validate(&json!({
                "contigs": "50",
                "input_pdb": "ATOM",
                "diffusion_steps": steps,
            }));
            assert!(report.is_valid(), "{steps}");
        }
    }

    #[test]
    fn all_violations_are_collected() {
        let report = Design.validate(&json!({
            "diffusion_steps": 500,
            "hotspot_res": ["50A"],
            "input_pdb": "ATOM",
            "pdb_id": "1R42",
        }));
        for field in ["contigs", "diffusion_steps", "hotspot_res", "pdb_id"] {
            assert!(report.mentions(field), "{field}");
        }
    }

    #[test]
    fn neither_input_mode_is_rejected() {
        let report = Design.validate(&json!({"contigs": "50"}));
        assert!(report.mentions("input_pdb"));
        assert!(report.mentions("pdb_id"));
    }

    #[tokio::test]
    async fn payload_applies_defaults_over_inline_structure() {
        let payload = Design
            .build_payload(&json!({"contigs": "A1-50", "input_pdb": "ATOM 1"}), &sources())
            .await
            .unwrap();
        assert_eq!(
            payload,
            json!({
                "input_pdb": "ATOM 1",
                "contigs": "A1-50",
                "hotspot_res": [],
                "diffusion_steps": DEFAULT_DIFFUSION_STEPS,
            })
        );
    }

    #[tokio::test]
    async fn payload_refuses_invalid_parameters() {
        let err = Design
            .build_payload(&json!({"input_pdb": "ATOM 1"}), &sources())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Validation(r) if r.mentions("contigs")));
    }
}
