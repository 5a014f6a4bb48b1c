use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single RDF term as it appears in a SPARQL `SELECT` binding.
///
/// The variants mirror the term types of the SPARQL 1.1 JSON results format.
/// A variable that is unbound in a row simply has no entry in that row's
/// binding map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RdfTerm {
    /// A resource identifier (IRI).
    Uri(String),
    /// A plain literal, optionally language-tagged.
    Literal { value: String, lang: Option<String> },
    /// A literal with an explicit datatype IRI.
    TypedLiteral { value: String, datatype: String },
    /// A blank node label.
    Bnode(String),
}

impl RdfTerm {
    /// The flattened string form used by the simplified and tabular formats.
    pub fn plain(&self) -> &str {
        match self {
            RdfTerm::Uri(value) => value,
            RdfTerm::Literal { value, .. } => value,
            RdfTerm::TypedLiteral { value, .. } => value,
            RdfTerm::Bnode(value) => value,
        }
    }
}

/// One row of a result set: variable name to bound term.
pub type BindingRow = HashMap<String, RdfTerm>;

/// The normalized answer to a SPARQL `SELECT` query.
///
/// `vars` preserves the column order reported by the endpoint; `rows`
/// preserve the endpoint's row order. Formatters must not reorder or drop
/// either.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawResultSet {
    pub vars: Vec<String>,
    pub rows: Vec<BindingRow>,
}

impl RawResultSet {
    pub fn new(vars: Vec<String>, rows: Vec<BindingRow>) -> Self {
        Self { vars, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Point-in-time cache counters returned by the `cache` tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub current_size: usize,
    pub max_size: usize,
    pub strategy: String,
}

/// Response envelope for the `cache` management tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CacheActionResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CacheStatsSnapshot>,
}

impl CacheActionResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: Some(message.into()),
            stats: None,
        }
    }

    pub fn with_stats(stats: CacheStatsSnapshot) -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            stats: Some(stats),
        }
    }
}

/// A legal document surfaced by the `search_documents` tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SearchDocument {
    pub uri: String,
    pub title: String,
    pub date: String,
    #[serde(rename = "type")]
    pub doc_type: String,
}

/// Response envelope for the `search_documents` tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SearchResponse {
    pub results: Vec<SearchDocument>,
    pub count: usize,
    pub query_used: String,
}
