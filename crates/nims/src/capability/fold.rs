//! Structure prediction from a single sequence (AlphaFold2 / OpenFold2).

use async_trait::async_trait;
use helix_core::job_kind::JobKind;
use helix_core::validation::ValidationReport;
use serde_json::{json, Value};
use validator::Validate;

use super::{check_uniprot_id, ensure_valid, field, require_object, text_field, Capability};
use crate::error::JobError;
use crate::sources::ExternalSources;

const ALPHAFOLD2_ENDPOINT: &str = "/biology/deepmind/alphafold2";
const OPENFOLD2_ENDPOINT: &str =
    "/biology/openfold/openfold2/predict-structure-from-msa-and-template";

/// Longest sequence accepted by the folding models.
pub const MAX_SEQUENCE_LENGTH: u64 = 4000;

/// The twenty standard amino acids.
const AMINO_ACIDS: &str = "ACDEFGHIKLMNPQRSTVWY";

/// Folding model served behind the `fold` kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FoldModel {
    #[default]
    AlphaFold2,
    OpenFold2,
}

impl FoldModel {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "alphafold2" => Some(FoldModel::AlphaFold2),
            "openfold2" => Some(FoldModel::OpenFold2),
            _ => None,
        }
    }

    fn endpoint(self) -> &'static str {
        match self {
            FoldModel::AlphaFold2 => ALPHAFOLD2_ENDPOINT,
            FoldModel::OpenFold2 => OPENFOLD2_ENDPOINT,
        }
    }
}

pub struct Fold;

#[derive(Debug, Validate)]
struct FoldParams {
    #[validate(length(min = 1, max = 4000, message = "must be 1 to 4000 residues long"))]
    sequence: Option<String>,
    uniprot_id: Option<String>,
    model: FoldModel,
    #[validate(range(min = 1, max = 10))]
    iterations: Option<i64>,
    relax_prediction: Option<bool>,
}

impl FoldParams {
    fn parse(params: &Value) -> (Self, ValidationReport) {
        let mut report = ValidationReport::new();
        let object = require_object(params, &mut report);

        let model = match text_field(params, "model", &mut report) {
            None => FoldModel::default(),
            Some(name) => FoldModel::from_name(&name).unwrap_or_else(|| {
                report.push("model", "must be one of: alphafold2, openfold2");
                FoldModel::default()
            }),
        };
        let parsed = Self {
            sequence: text_field(params, "sequence", &mut report).map(normalize_sequence),
            uniprot_id: text_field(params, "uniprot_id", &mut report),
            model,
            iterations: field(params, "iterations", &mut report),
            relax_prediction: field(params, "relax_prediction", &mut report),
        };
        if !object {
            return (parsed, report);
        }

        if let Err(errors) = parsed.validate() {
            report.merge_validator(errors);
        }
        if let Some(bad) = parsed.sequence.as_deref().and_then(nonstandard_residue) {
            report.push(
                "sequence",
                format!("contains '{bad}', which is not a standard amino acid"),
            );
        }
        report.exactly_one_of(
            ("sequence", parsed.sequence.is_some()),
            ("uniprot_id", parsed.uniprot_id.is_some()),
        );
        check_uniprot_id(&mut report, "uniprot_id", parsed.uniprot_id.as_deref());

        (parsed, report)
    }
}

fn nonstandard_residue(sequence: &str) -> Option<char> {
    sequence.chars().find(|c| !AMINO_ACIDS.contains(*c))
}

/// Uppercase and strip whitespace so pasted multi-line sequences validate.
fn normalize_sequence(raw: String) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

#[async_trait]
impl Capability for Fold {
    fn kind(&self) -> JobKind {
        JobKind::Fold
    }

    fn endpoint_path(&self, params: &Value) -> &'static str {
        params
            .get("model")
            .and_then(Value::as_str)
            .and_then(FoldModel::from_name)
            .unwrap_or_default()
            .endpoint()
    }

    fn validate(&self, params: &Value) -> ValidationReport {
        FoldParams::parse(params).1
    }

    async fn build_payload(
        &self,
        params: &Value,
        sources: &ExternalSources,
    ) -> Result<Value, JobError> {
        let (parsed, report) = FoldParams::parse(params);
        ensure_valid(report)?;

        let sequence = match (parsed.sequence, parsed.uniprot_id) {
            (Some(sequence), _) => sequence,
            (None, Some(accession)) => {
                let sequence =
                    normalize_sequence(sources.fetch_uniprot_sequence(&accession).await?);
                if let Some(bad) = nonstandard_residue(&sequence) {
                    return Err(JobError::Source(format!(
                        "UniProt entry {accession} contains '{bad}', which is not a standard amino acid"
                    )));
                }
                if sequence.len() as u64 > MAX_SEQUENCE_LENGTH {
                    return Err(JobError::Source(format!(
                        "UniProt entry {accession} is {} residues long; the limit is {MAX_SEQUENCE_LENGTH}",
                        sequence.len()
                    )));
                }
                sequence
            }
            (None, None) => {
                let mut report = ValidationReport::new();
                report.exactly_one_of(("sequence", false), ("uniprot_id", false));
                return Err(JobError::Validation(report));
            }
        };
        let relax = parsed.relax_prediction.unwrap_or(false);

        Ok(match parsed.model {
            FoldModel::AlphaFold2 => json!({
                "sequence": sequence,
                "algorithm": "mmseqs2",
                "e_value": 0.0001,
                "iterations": parsed.iterations.unwrap_or(1),
                "databases": ["small_bfd"],
                "relax_prediction": relax,
                "skip_template_search": true,
            }),
            FoldModel::OpenFold2 => json!({
                "sequence": sequence,
                "selected_models": [1, 2],
                "relax_prediction": relax,
            }),
        })
    }

    fn result_keys(&self) -> &'static [&'static str] {
        &["structures_in_ranked_order", "pdb", "output_pdb", "structure"]
    }

    fn artifact_extension(&self) -> &'static str {
        "pdb"
    }
}
