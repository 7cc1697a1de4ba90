//! External sources for identifier-based inputs.
//!
//! When a caller passes a PDB id or a UniProt accession instead of inline
//! content, the payload builder fetches the referenced entry here and
//! reduces it to what the provider accepts.

use crate::config::ProviderConfig;
use crate::error::JobError;

/// Maximum number of `ATOM` records forwarded to the provider.
pub const MAX_PDB_ATOM_LINES: usize = 400;

/// Fetches PDB entries from RCSB and sequences from UniProt.
pub struct ExternalSources {
    client: reqwest::Client,
    rcsb_base_url: String,
    uniprot_base_url: String,
}

impl ExternalSources {
    pub fn new(client: reqwest::Client, config: &ProviderConfig) -> Self {
        Self {
            client,
            rcsb_base_url: config.rcsb_base_url.clone(),
            uniprot_base_url: config.uniprot_base_url.clone(),
        }
    }

    /// Download a PDB entry and keep only its leading `ATOM` records.
    pub async fn fetch_pdb(&self, pdb_id: &str) -> Result<String, JobError> {
        let id = pdb_id.trim().to_ascii_uppercase();
        let url = format!("{}/{}.pdb", self.rcsb_base_url, id);
        let text = self.fetch_text(&url, "PDB entry", &id).await?;

        let atoms = filter_atom_records(&text, MAX_PDB_ATOM_LINES);
        if atoms.is_empty() {
            return Err(JobError::Source(format!(
                "PDB entry {id} contains no ATOM records"
            )));
        }
        tracing::debug!(pdb_id = %id, bytes = atoms.len(), "Fetched PDB entry");
        Ok(atoms)
    }

    /// Download a UniProt entry as FASTA and return its bare sequence.
    pub async fn fetch_uniprot_sequence(&self, accession: &str) -> Result<String, JobError> {
        let id = accession.trim().to_ascii_uppercase();
        let url = format!("{}/{}.fasta", self.uniprot_base_url, id);
        let text = self.fetch_text(&url, "UniProt entry", &id).await?;

        let sequence = fasta_sequence(&text);
        if sequence.is_empty() {
            return Err(JobError::Source(format!(
                "UniProt entry {id} has an empty sequence"
            )));
        }
        tracing::debug!(accession = %id, length = sequence.len(), "Fetched UniProt sequence");
        Ok(sequence)
    }

    async fn fetch_text(&self, url: &str, what: &str, id: &str) -> Result<String, JobError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| JobError::Source(format!("Failed to fetch {what} {id}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(JobError::Source(format!("{what} {id} does not exist")));
        }
        if !status.is_success() {
            return Err(JobError::Source(format!(
                "Failed to fetch {what} {id}: HTTP {}",
                status.as_u16()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| JobError::Source(format!("Failed to read {what} {id}: {e}")))
    }
}

/// Keep the first `limit` lines that are `ATOM` records.
pub fn filter_atom_records(pdb: &str, limit: usize) -> String {
    pdb.lines()
        .filter(|line| line.starts_with("ATOM"))
        .take(limit)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Concatenate the sequence lines of the first FASTA record.
pub fn fasta_sequence(fasta: &str) -> String {
    let mut sequence = String::new();
    let mut seen_header = false;
    for line in fasta.lines().map(str::trim) {
        if line.starts_with('>') {
            if seen_header {
                break;
            }
            seen_header = true;
            continue;
        }
        sequence.extend(line.chars().filter(|c| !c.is_whitespace()));
    }
    sequence.to_ascii_uppercase()
}
