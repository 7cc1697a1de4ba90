//! Field-level validation report.
//!
//! Validation collects every violation rather than stopping at the first
//! one. Each entry names the offending field so API clients can highlight
//! it.

use std::fmt;

use serde::Serialize;

/// One violated rule on one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Accumulates [`FieldError`]s for a single parameter set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationReport {
    errors: Vec<FieldError>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation on `field`.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Record a "required" violation when `present` is false.
    pub fn require(&mut self, field: &str, present: bool) {
        if !present {
            self.push(field, "is required");
        }
    }

    /// Require exactly one of two mutually exclusive inputs.
    ///
    /// Both missing is reported on both fields; both present is reported on
    /// the second field.
    pub fn exactly_one_of(&mut self, first: (&str, bool), second: (&str, bool)) {
        match (first.1, second.1) {
            (true, false) | (false, true) => {}
            (false, false) => {
                let msg = format!("one of '{}' or '{}' is required", first.0, second.0);
                self.push(first.0, msg.clone());
                self.push(second.0, msg);
            }
            (true, true) => self.push(
                second.0,
                format!("cannot be combined with '{}'", first.0),
            ),
        }
    }

    /// Fold the errors of a `validator`-derived check into this report.
    pub fn merge_validator(&mut self, errors: validator::ValidationErrors) {
        let mut fields: Vec<(String, Vec<validator::ValidationError>)> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| (field.to_string(), errs.clone()))
            .collect();
        fields.sort_by(|a, b| a.0.cmp(&b.0));

        for (field, errs) in fields {
            for err in errs {
                self.push(field.clone(), describe(&err));
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// `(ok, errors)` view of the report.
    pub fn outcome(&self) -> (bool, &[FieldError]) {
        (self.is_valid(), &self.errors)
    }

    /// `true` if any error names `field`.
    pub fn mentions(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// `Ok(())` when empty, otherwise the report itself.
    pub fn into_result(self) -> Result<(), ValidationReport> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Render a `validator` error as a human-readable message.
fn describe(err: &validator::ValidationError) -> String {
    if let Some(message) = &err.message {
        return message.to_string();
    }
    match err.code.as_ref() {
        "range" => match (err.params.get("min"), err.params.get("max")) {
            (Some(min), Some(max)) => format!("must be between {min} and {max}"),
            (Some(min), None) => format!("must be at least {min}"),
            (None, Some(max)) => format!("must be at most {max}"),
            (None, None) => "is out of range".to_string(),
        },
        "length" => "has an invalid length".to_string(),
        code => format!("failed check '{code}'"),
    }
}
