//! Result artifact extraction and storage.
//!
//! Providers wrap their output differently: some return the artifact at the
//! top level, some nest it in one or more `result` envelopes, some encode
//! the envelope as a JSON string. [`extract_artifact`] normalizes all of
//! these; [`ArtifactStore`] writes the outcome to disk.

use std::io;
use std::path::{Path, PathBuf};

use helix_core::job_kind::JobKind;
use serde_json::Value;

/// Nesting depth searched for result keys.
const MAX_SEARCH_DEPTH: usize = 8;

/// Keys that hold structure text inside a ranked-structure entry.
const STRUCTURE_KEYS: &[&str] = &["structure", "pdb", "output_pdb"];

/// Find the artifact in a provider response under the first matching key.
pub fn extract_artifact(body: &Value, keys: &[&str]) -> Option<Value> {
    let unwrapped = unwrap_envelopes(body);
    keys.iter()
        .find_map(|key| find_key(&unwrapped, key, 0))
        .cloned()
}

/// Peel nested `result` envelopes, decoding string-encoded JSON on the way.
pub fn unwrap_envelopes(body: &Value) -> Value {
    let mut current = decode_json_string(body);
    loop {
        match current.get("result") {
            Some(inner) if !inner.is_null() => {
                let next = decode_json_string(inner);
                if !(next.is_object() || next.is_array()) {
                    return current;
                }
                current = next;
            }
            _ => return current,
        }
    }
}

fn decode_json_string(value: &Value) -> Value {
    if let Value::String(text) = value {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                return parsed;
            }
        }
    }
    value.clone()
}

fn find_key<'a>(value: &'a Value, key: &str, depth: usize) -> Option<&'a Value> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => {
            if let Some(found) = map.get(key).filter(|v| !is_empty(v)) {
                return Some(found);
            }
            map.values().find_map(|v| find_key(v, key, depth + 1))
        }
        Value::Array(items) => items.iter().find_map(|v| find_key(v, key, depth + 1)),
        _ => None,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Render an extracted artifact as file content for `extension`.
///
/// Text formats take the top-ranked entry of a list and the structure text
/// inside an entry object; `json` keeps the full value.
pub fn render_artifact(value: &Value, extension: &str) -> String {
    if extension == "json" {
        return serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    }
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => match items.first() {
            Some(first) => render_artifact(first, extension),
            None => String::new(),
        },
        Value::Object(map) => STRUCTURE_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}

/// Filesystem store for result artifacts.
///
/// Layout: `<root>/<kind>/<job_id>.<ext>`. Files are written to a temporary
/// sibling and renamed so readers never see a partial artifact.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Final path of a job's artifact.
    pub fn path_for(&self, kind: JobKind, job_id: &str, extension: &str) -> io::Result<PathBuf> {
        if !is_safe_file_stem(job_id) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("job id '{job_id}' is not usable as a file name"),
            ));
        }
        Ok(self
            .root
            .join(kind.as_str())
            .join(format!("{job_id}.{extension}")))
    }

    /// Write an artifact atomically and return its path.
    pub async fn write(
        &self,
        kind: JobKind,
        job_id: &str,
        extension: &str,
        content: &str,
    ) -> io::Result<PathBuf> {
        let path = self.path_for(kind, job_id, extension)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let tmp = path.with_extension(format!("{extension}.tmp"));
        tokio::fs::write(&tmp, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e);
        }

        tracing::debug!(path = %path.display(), bytes = content.len(), "Stored result artifact");
        Ok(path)
    }

    /// Read back an artifact by its stored reference.
    pub async fn read(&self, reference: &str) -> io::Result<String> {
        tokio::fs::read_to_string(reference).await
    }

    /// Delete an artifact that was written but never attached to a job.
    pub async fn discard(&self, path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to discard artifact");
        }
    }
}

fn is_safe_file_stem(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
