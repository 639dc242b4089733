//! Report records (raw report files delivered by the vendor)
//!
//! The whole payload becomes one Artifact, identified by its SHA-256.
//! Artifacts score 0: they are only kept when the floor is 0.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::{present, NormalizeError};
use crate::logic::identifier::{self, CanonicalFields};
use crate::logic::normalizer::context::RecordOutput;
use crate::logic::objects::{CandidateObject, ObjectKind};

#[derive(Debug, Clone, Deserialize)]
pub struct ReportRecord {
    pub file_name: String,
    pub content: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ReportRecord {
    /// Declared mime type, or a guess from the file extension
    pub fn mime_type(&self) -> &str {
        if let Some(mime) = present(&self.mime_type) {
            return mime;
        }
        let extension = self
            .file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" => "text/csv",
            "json" => "application/json",
            "txt" | "log" => "text/plain",
            "xml" => "application/xml",
            _ => "application/octet-stream",
        }
    }
}

pub fn normalize(record: &ReportRecord, out: &mut RecordOutput<'_>) -> Result<(), NormalizeError> {
    if record.file_name.trim().is_empty() {
        return Err(NormalizeError::Validation {
            field: "file_name".to_string(),
            reason: "empty file name".to_string(),
        });
    }

    let payload = record.content.as_bytes();
    let digest = hex::encode(Sha256::digest(payload));

    let mut fields = CanonicalFields::new();
    fields.insert("hashes".to_string(), json!({ "SHA-256": digest }));
    let derived = identifier::derive(ObjectKind::Artifact, &fields)?;

    let mut artifact = CandidateObject::new(ObjectKind::Artifact, derived.id)
        .with_attr("payload_bin", STANDARD.encode(payload))
        .with_attr("mime_type", record.mime_type())
        .with_attr("hashes", json!({ "SHA-256": digest }))
        .with_attr("x_filename", record.file_name.trim())
        .with_score(Some(0));
    if let Some(description) = present(&record.description) {
        artifact.set_attr("x_description", Value::from(description));
    }

    out.push(artifact);
    Ok(())
}
