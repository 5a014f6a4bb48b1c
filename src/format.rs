//! Result formatters: pure transforms from a [`RawResultSet`] into one of
//! three JSON output shapes. Row and column order always match the order
//! returned by the endpoint; no formatter drops rows or columns.
//!
//! `serde_json` is built with `preserve_order`, so object keys come out in
//! insertion order and the shapes below are byte-stable.

use crate::model::{RawResultSet, RdfTerm};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;

/// The three supported output encodings.
///
/// `raw` is the standard SPARQL 1.1 JSON results document; the original
/// server called this format `json`, so that token is accepted as an alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    #[value(alias = "json")]
    #[serde(alias = "json")]
    Raw,
    Simplified,
    Tabular,
}

impl ResultFormat {
    /// Every token accepted by the `query` tool's `format` argument.
    pub const ACCEPTED_TOKENS: &'static [&'static str] =
        &["raw", "json", "simplified", "tabular"];

    /// Parse a caller-supplied format token. Case-insensitive.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "raw" | "json" => Some(ResultFormat::Raw),
            "simplified" => Some(ResultFormat::Simplified),
            "tabular" => Some(ResultFormat::Tabular),
            _ => None,
        }
    }

    /// Canonical token, used in cache keys and statistics.
    pub fn token(&self) -> &'static str {
        match self {
            ResultFormat::Raw => "raw",
            ResultFormat::Simplified => "simplified",
            ResultFormat::Tabular => "tabular",
        }
    }

    /// Apply this format to a result set.
    pub fn format(&self, results: &RawResultSet) -> Value {
        match self {
            ResultFormat::Raw => format_raw(results),
            ResultFormat::Simplified => format_simplified(results),
            ResultFormat::Tabular => format_tabular(results),
        }
    }
}

impl fmt::Display for ResultFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Standard SPARQL JSON results shape with explicit term type tags:
/// `{"head": {"vars": [...]}, "results": {"bindings": [...]}}`.
///
/// Unbound variables are omitted from a row's binding object, which is how
/// the wire format itself represents absence.
pub fn format_raw(results: &RawResultSet) -> Value {
    let bindings: Vec<Value> = results
        .rows
        .iter()
        .map(|row| {
            let mut binding = Map::new();
            for var in &results.vars {
                if let Some(term) = row.get(var) {
                    binding.insert(var.clone(), term_to_json(term));
                }
            }
            Value::Object(binding)
        })
        .collect();

    json!({
        "head": { "vars": results.vars },
        "results": { "bindings": bindings },
    })
}

/// One flat object per row: `{"results": [{col: value, ...}], "count": N}`.
///
/// Every column appears in every row; an unbound variable becomes an empty
/// string rather than an omitted key.
pub fn format_simplified(results: &RawResultSet) -> Value {
    let rows: Vec<Value> = results
        .rows
        .iter()
        .map(|row| {
            let mut flat = Map::new();
            for var in &results.vars {
                let value = row.get(var).map(|term| term.plain()).unwrap_or_default();
                flat.insert(var.clone(), Value::String(value.to_string()));
            }
            Value::Object(flat)
        })
        .collect();

    json!({
        "results": rows,
        "count": results.rows.len(),
    })
}

/// Column list plus value matrix: `{"columns": [...], "rows": [[...], ...]}`.
pub fn format_tabular(results: &RawResultSet) -> Value {
    let rows: Vec<Value> = results
        .rows
        .iter()
        .map(|row| {
            let cells: Vec<Value> = results
                .vars
                .iter()
                .map(|var| {
                    let value = row.get(var).map(|term| term.plain()).unwrap_or_default();
                    Value::String(value.to_string())
                })
                .collect();
            Value::Array(cells)
        })
        .collect();

    json!({
        "columns": results.vars,
        "rows": rows,
    })
}

fn term_to_json(term: &RdfTerm) -> Value {
    match term {
        RdfTerm::Uri(value) => json!({ "type": "uri", "value": value }),
        RdfTerm::Literal { value, lang: None } => {
            json!({ "type": "literal", "value": value })
        }
        RdfTerm::Literal {
            value,
            lang: Some(lang),
        } => json!({ "type": "literal", "value": value, "xml:lang": lang }),
        RdfTerm::TypedLiteral { value, datatype } => {
            json!({ "type": "typed-literal", "value": value, "datatype": datatype })
        }
        RdfTerm::Bnode(value) => json!({ "type": "bnode", "value": value }),
    }
}
