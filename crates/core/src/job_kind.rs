//! Capability kinds that can produce a job.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which capability produced a job. Stored as text in the `jobs.kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Backbone design (RFdiffusion).
    Design,
    /// Structure prediction from sequence (AlphaFold2 / OpenFold2).
    Fold,
    /// Sequence design for a fixed backbone (ProteinMPNN).
    InverseFold,
    /// Ligand docking (DiffDock).
    Dock,
}

impl JobKind {
    /// Every supported kind, in display order.
    pub const ALL: [JobKind; 4] = [
        JobKind::Design,
        JobKind::Fold,
        JobKind::InverseFold,
        JobKind::Dock,
    ];

    /// Canonical snake_case name, as persisted.
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Design => "design",
            JobKind::Fold => "fold",
            JobKind::InverseFold => "inverse_fold",
            JobKind::Dock => "dock",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown capability name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown job kind '{0}'. Must be one of: design, fold, inverse_fold, dock")]
pub struct UnknownJobKind(pub String);

impl FromStr for JobKind {
    type Err = UnknownJobKind;

    /// Accepts the canonical names plus kebab-case (`inverse-fold`) for URLs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "design" => Ok(JobKind::Design),
            "fold" => Ok(JobKind::Fold),
            "inverse_fold" => Ok(JobKind::InverseFold),
            "dock" => Ok(JobKind::Dock),
            _ => Err(UnknownJobKind(s.to_string())),
        }
    }
}
