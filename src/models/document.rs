use serde::{Deserialize, Serialize};

/// Maximum number of characters of note text persisted in the vector store.
/// The full text is still used for embedding generation; only the stored
/// copy is capped, since clinical notes can run far past practical column
/// limits.
pub const MAX_STORED_TEXT_CHARS: usize = 10_000;

/// A document record as it appears in the input file, before validation.
/// Fields are optional so that malformed records can be collected and
/// reported instead of failing the whole parse.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub source_bundle: Option<String>,
}

impl RawDocument {
    /// Check required fields. Returns a descriptive reason on failure so
    /// callers can batch-collect validation errors.
    pub fn validate(&self) -> Option<String> {
        if self.resource_id.as_deref().is_none_or(str::is_empty) {
            return Some("missing resource_id".to_string());
        }
        if self.patient_id.as_deref().is_none_or(str::is_empty) {
            return Some("missing patient_id".to_string());
        }
        if self.document_type.as_deref().is_none_or(str::is_empty) {
            return Some("missing document_type".to_string());
        }
        match self.text_content.as_deref() {
            None => Some("missing text_content".to_string()),
            Some(text) if text.trim().is_empty() => Some("empty text_content".to_string()),
            Some(_) => None,
        }
    }
}

/// A validated, preprocessed clinical document ready for vectorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalDocument {
    pub resource_id: String,
    pub patient_id: String,
    pub document_type: String,
    /// Full note text, used for embedding generation.
    pub text_content: String,
    /// Storage copy, capped at [`MAX_STORED_TEXT_CHARS`] characters.
    pub text_content_truncated: String,
    pub source_bundle: Option<String>,
}

impl ClinicalDocument {
    /// Build a document from a validated raw record: collapses whitespace
    /// in the note text and produces the truncated storage copy.
    ///
    /// Call [`RawDocument::validate`] first; this returns the validation
    /// reason as an error if the record is malformed.
    pub fn from_raw(raw: RawDocument) -> Result<Self, String> {
        if let Some(reason) = raw.validate() {
            return Err(reason);
        }

        let text_content = collapse_whitespace(raw.text_content.as_deref().unwrap_or_default());
        let text_content_truncated = truncate_chars(&text_content, MAX_STORED_TEXT_CHARS);

        Ok(Self {
            resource_id: raw.resource_id.unwrap_or_default(),
            patient_id: raw.patient_id.unwrap_or_default(),
            document_type: raw.document_type.unwrap_or_default(),
            text_content,
            text_content_truncated,
            source_bundle: raw.source_bundle,
        })
    }
}

/// Collapse runs of whitespace (including newlines) into single spaces.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space && !out.is_empty() {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    if out.ends_with(' ') {
        out.pop();
    }
    out
}

/// Truncate to at most `max_chars` characters, respecting char boundaries.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}
