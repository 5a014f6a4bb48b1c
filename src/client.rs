//! HTTP client for the remote SPARQL endpoint.
//!
//! Speaks the SPARQL 1.1 Protocol: the query is POSTed form-encoded and the
//! response is the standard `application/sparql-results+json` document,
//! decoded into a [`RawResultSet`]. The rest of the server treats the
//! endpoint as an opaque call behind the [`SparqlEndpoint`] trait, which
//! also gives tests a seam for mock endpoints.

use crate::model::{BindingRow, RawResultSet, RdfTerm};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Failure modes of a remote query, kept distinct for error reporting.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("request to endpoint timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("endpoint returned HTTP status {0}")]
    Status(u16),

    #[error("malformed results document: {0}")]
    Malformed(String),
}

/// The remote query collaborator: one synchronous-looking call that either
/// yields a normalized result set or fails.
#[async_trait]
pub trait SparqlEndpoint: Send + Sync {
    async fn select(&self, query: &str) -> Result<RawResultSet, EndpointError>;
}

/// Production endpoint implementation backed by `reqwest`.
pub struct HttpSparqlClient {
    http: reqwest::Client,
    endpoint_url: String,
}

impl HttpSparqlClient {
    /// Build a client with the configured request timeout.
    pub fn new(endpoint_url: impl Into<String>, timeout: Duration) -> Result<Self, EndpointError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EndpointError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint_url: endpoint_url.into(),
        })
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }
}

#[async_trait]
impl SparqlEndpoint for HttpSparqlClient {
    async fn select(&self, query: &str) -> Result<RawResultSet, EndpointError> {
        let mut form = HashMap::new();
        form.insert("query", query);

        let response = self
            .http
            .post(&self.endpoint_url)
            .header(reqwest::header::ACCEPT, SPARQL_RESULTS_JSON)
            .form(&form)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(EndpointError::Status(status.as_u16()));
        }

        let body = response.text().await.map_err(classify_reqwest_error)?;
        parse_results(&body)
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> EndpointError {
    if error.is_timeout() {
        EndpointError::Timeout
    } else {
        EndpointError::Transport(error.to_string())
    }
}

/// Decode a SPARQL JSON results document into the normalized result set.
pub fn parse_results(body: &str) -> Result<RawResultSet, EndpointError> {
    let doc: ResultsDocument =
        serde_json::from_str(body).map_err(|e| EndpointError::Malformed(e.to_string()))?;

    let mut rows = Vec::with_capacity(doc.results.bindings.len());
    for binding in doc.results.bindings {
        let mut row = BindingRow::new();
        for (var, term) in binding {
            row.insert(var, term.into_term()?);
        }
        rows.push(row);
    }

    Ok(RawResultSet::new(doc.head.vars, rows))
}

#[derive(Debug, Deserialize)]
struct ResultsDocument {
    head: Head,
    results: Results,
}

#[derive(Debug, Deserialize)]
struct Head {
    #[serde(default)]
    vars: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Results {
    #[serde(default)]
    bindings: Vec<HashMap<String, WireTerm>>,
}

#[derive(Debug, Deserialize)]
struct WireTerm {
    #[serde(rename = "type")]
    kind: String,
    value: String,
    #[serde(rename = "xml:lang")]
    lang: Option<String>,
    datatype: Option<String>,
}

impl WireTerm {
    fn into_term(self) -> Result<RdfTerm, EndpointError> {
        let term = match (self.kind.as_str(), self.datatype) {
            ("uri", _) => RdfTerm::Uri(self.value),
            ("bnode", _) => RdfTerm::Bnode(self.value),
            ("literal", Some(datatype)) | ("typed-literal", Some(datatype)) => {
                RdfTerm::TypedLiteral {
                    value: self.value,
                    datatype,
                }
            }
            ("literal", None) | ("typed-literal", None) => RdfTerm::Literal {
                value: self.value,
                lang: self.lang,
            },
            (other, _) => {
                return Err(EndpointError::Malformed(format!(
                    "unknown term type '{other}'"
                )));
            }
        };
        Ok(term)
    }
}
