//! Core data models used throughout qa-harness.
//!
//! These types represent the questions, documents, and results that flow
//! through the resolution pipeline. [`UnifiedResult`] is the single response
//! contract returned to callers regardless of which path answered the
//! question.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which resolution path a question is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intent {
    /// Translate to SQL and execute against the catalog database.
    Structured,
    /// Semantic retrieval over the indexed knowledge corpus.
    Knowledge,
    /// Only produced on total pipeline failure.
    Unknown,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::Structured => write!(f, "STRUCTURED"),
            Intent::Knowledge => write!(f, "KNOWLEDGE"),
            Intent::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Coarse classification of how much decomposition a question likely needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

/// A single result row: column name → tagged value, in column order.
///
/// `serde_json::Map` is built with `preserve_order`, so merging rows from
/// different queries never depends on column-name hashing or casing.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// A document in the knowledge corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    /// Stable unique identifier.
    pub id: String,
    pub title: Option<String>,
    pub content: String,
    /// Embedding vector; generated lazily on first similarity computation.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl KnowledgeDocument {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: Some(title.into()),
            content: content.into(),
            embedding: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Outcome of the structured (SQL) resolution path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredQueryResult {
    pub original_question: String,
    /// The sanitized query that was (or would have been) executed.
    pub generated_sql: Option<String>,
    pub raw_rows: Option<Vec<Row>>,
    /// Deterministic tabular rendering of the rows, or a failure message.
    pub formatted: String,
    /// Human-readable summary naming the query and row count.
    pub explanation: String,
    pub success: bool,
}

/// The single externally visible response contract.
///
/// Exactly one of `generated_sql` + `raw_rows` or `sources` is meaningfully
/// populated, mirroring which resolver ran. Merged high-complexity results
/// are the exception: they carry rows aggregated across sub-resolutions with
/// the intent fixed to [`Intent::Structured`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnifiedResult {
    pub original_question: String,
    pub intent: Intent,
    pub answer: String,
    pub suggestions: Vec<String>,
    pub generated_sql: Option<String>,
    pub raw_rows: Option<Vec<Row>>,
    pub sources: Option<Vec<KnowledgeDocument>>,
    pub success: bool,
    pub error_message: Option<String>,
}

impl UnifiedResult {
    /// Build from a structured resolution outcome.
    pub fn from_structured(result: StructuredQueryResult) -> Self {
        let error_message = if result.success {
            None
        } else {
            Some(result.explanation.clone())
        };
        Self {
            original_question: result.original_question,
            intent: Intent::Structured,
            answer: result.formatted,
            suggestions: Vec::new(),
            generated_sql: result.generated_sql,
            raw_rows: result.raw_rows,
            sources: None,
            success: result.success,
            error_message,
        }
    }

    /// Build a total-failure result with [`Intent::Unknown`].
    pub fn error(question: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            original_question: question.to_string(),
            intent: Intent::Unknown,
            answer: format!("Error processing the question: {}", message),
            suggestions: Vec::new(),
            generated_sql: None,
            raw_rows: None,
            sources: None,
            success: false,
            error_message: Some(message),
        }
    }
}

/// Point-in-time snapshot of cache activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    /// Hit percentage over all lookups, rounded to 2 decimals; 0 when no
    /// lookups have occurred.
    pub hit_rate: f64,
    pub current_size: usize,
    pub top_queries: Vec<String>,
    pub approx_size_bytes: u64,
    pub oldest_entry_age_secs: u64,
}
