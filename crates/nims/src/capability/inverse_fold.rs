//! Sequence design for a fixed backbone with ProteinMPNN.

use async_trait::async_trait;
use helix_core::job_kind::JobKind;
use helix_core::validation::ValidationReport;
use serde_json::{json, Value};
use validator::Validate;

use super::{check_pdb_id, ensure_valid, field, require_object, resolve_structure, text_field};
use super::Capability;
use crate::error::JobError;
use crate::sources::ExternalSources;

const ENDPOINT: &str = "/biology/ipd/proteinmpnn/predict";

const DEFAULT_SEQUENCES_PER_TARGET: i64 = 1;
const DEFAULT_SAMPLING_TEMP: f64 = 0.1;

pub struct InverseFold;

#[derive(Debug, Validate)]
struct InverseFoldParams {
    input_pdb: Option<String>,
    pdb_id: Option<String>,
    #[validate(range(min = 1, max = 100))]
    num_seq_per_target: Option<i64>,
    #[validate(range(
        exclusive_min = 0.0,
        max = 1.0,
        message = "must be greater than 0 and at most 1"
    ))]
    sampling_temp: Option<f64>,
    ca_only: Option<bool>,
    use_soluble_model: Option<bool>,
}

impl InverseFoldParams {
    fn parse(params: &Value) -> (Self, ValidationReport) {
        let mut report = ValidationReport::new();
        let object = require_object(params, &mut report);

        let parsed = Self {
            input_pdb: text_field(params, "input_pdb", &mut report),
            pdb_id: text_field(params, "pdb_id", &mut report),
            num_seq_per_target: field(params, "num_seq_per_target", &mut report),
            sampling_temp: field(params, "sampling_temp", &mut report),
            ca_only: field(params, "ca_only", &mut report),
            use_soluble_model: field(params, "use_soluble_model", &mut report),
        };
        if !object {
            return (parsed, report);
        }

        if let Err(errors) = parsed.validate() {
            report.merge_validator(errors);
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
impl Capability for InverseFold {
    fn kind(&self) -> JobKind {
        JobKind::InverseFold
    }

    fn endpoint_path(&self, _params: &Value) -> &'static str {
        ENDPOINT
    }

    fn validate(&self, params: &Value) -> ValidationReport {
        InverseFoldParams::parse(params).1
    }

    async fn build_payload(
        &self,
        params: &Value,
        sources: &ExternalSources,
    ) -> Result<Value, JobError> {
        let (parsed, report) = InverseFoldParams::parse(params);
        ensure_valid(report)?;

        let structure =
            resolve_structure(parsed.input_pdb, parsed.pdb_id, "input_pdb", sources).await?;

        Ok(json!({
            "input_pdb": structure,
            "ca_only": parsed.ca_only.unwrap_or(false),
            "use_soluble_model": parsed.use_soluble_model.unwrap_or(false),
            "num_seq_per_target": parsed.num_seq_per_target.unwrap_or(DEFAULT_SEQUENCES_PER_TARGET),
            "sampling_temp": [parsed.sampling_temp.unwrap_or(DEFAULT_SAMPLING_TEMP)],
        }))
    }

    fn result_keys(&self) -> &'static [&'static str] {
        &["mfasta", "sequences"]
    }

    fn artifact_extension(&self) -> &'static str {
        "fasta"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_temperature_excludes_zero() {
        let base = |temp: f64| json!({"input_pdb": "ATOM", "sampling_temp": temp});
        assert!(InverseFold.validate(&base(0.0)).mentions("sampling_temp"));
        assert!(InverseFold.validate(&base(1.5)).mentions("sampling_temp"));
        assert!(InverseFold.validate(&base(1.0)).is_valid());
        assert!(InverseFold.validate(&base(0.2)).is_valid());
    }

    #[test]
    fn sequences_per_target_bounded() {
        let report = InverseFold.validate(&json!({"pdb_id": "1R42", "num_seq_per_target": 0}));
        assert!(report.mentions("num_seq_per_target"));
    }

    #[test]
    fn malformed_pdb_id_is_named() {
        let report = InverseFold.validate(&json!({"pdb_id": "ABCDE"}));
        assert!(report.mentions("pdb_id"));
    }
}
